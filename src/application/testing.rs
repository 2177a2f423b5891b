//! Shared fakes for the application tests.

use crate::domain::events::ProgressEvent;
use crate::domain::preset::{QualityPreset, VariantDescriptor};
use crate::ports::codec::{CodecPort, EncodeOutcome};
use crate::ports::notifier::{ProgressSink, PublishError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, ProgressEvent)>>,
}

impl RecordingSink {
    pub fn recorded(&self) -> Vec<(String, ProgressEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.recorded().into_iter().map(|(_, e)| e).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, channel: &str, event: ProgressEvent) -> Result<usize, PublishError> {
        self.events
            .lock()
            .unwrap()
            .push((channel.to_string(), event));
        Ok(1)
    }
}

/// Writes a tiny playlist and one segment for every preset not listed as failing.
pub struct ScriptedCodec {
    pub failing: HashSet<String>,
    pub duration: f64,
}

impl ScriptedCodec {
    pub fn succeeding() -> Self {
        Self {
            failing: HashSet::new(),
            duration: 42.0,
        }
    }

    pub fn failing(presets: &[&str]) -> Self {
        Self {
            failing: presets.iter().map(|p| p.to_string()).collect(),
            duration: 42.0,
        }
    }
}

#[async_trait]
impl CodecPort for ScriptedCodec {
    async fn encode_variant(&self, _input: &Path, output_dir: &Path, preset: &QualityPreset) -> EncodeOutcome {
        if self.failing.contains(&preset.name) {
            return EncodeOutcome::Failed {
                stderr: format!("{}: encoder exploded", preset.name),
            };
        }
        let dir = output_dir.join(&preset.name);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join(format!("{}.m3u8", preset.name)),
            format!(
                "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\n{}_000.ts\n#EXT-X-ENDLIST\n",
                preset.name
            ),
        )
        .await
        .unwrap();
        tokio::fs::write(dir.join(format!("{}_000.ts", preset.name)), b"ts")
            .await
            .unwrap();
        EncodeOutcome::Encoded(VariantDescriptor::from_preset(preset))
    }

    async fn probe_duration(&self, _input: &Path) -> f64 {
        self.duration
    }
}
