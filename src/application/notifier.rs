//! Best-effort progress fan-out.

use crate::domain::events::{progress_channel, ProgressEvent, Stage};
use crate::domain::video::VideoId;
use crate::ports::notifier::{ProgressSink, PublishError};
use std::sync::Arc;
use tracing::debug;

/// Owns the sink for the lifetime of the process. Every publish swallows its
/// error so a pipeline never stalls on a missing listener.
#[derive(Clone)]
pub struct ProgressNotifier {
    sink: Arc<dyn ProgressSink>,
}

impl ProgressNotifier {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, event: ProgressEvent) {
        let channel = progress_channel(event.video_id());
        match self.sink.publish(&channel, event) {
            Ok(_) => {}
            Err(PublishError::NoSubscribers(_)) => {}
            Err(e) => debug!(channel = %channel, error = %e, "progress event dropped"),
        }
    }

    pub fn progress(&self, video_id: VideoId, stage: Stage, percent: u8, message: impl Into<String>) {
        self.emit(ProgressEvent::Progress {
            video_id,
            stage,
            percent: percent.min(100),
            message: message.into(),
        });
    }

    pub fn complete(&self, video_id: VideoId, hls_path: impl Into<String>) {
        self.emit(ProgressEvent::Complete {
            video_id,
            hls_path: hls_path.into(),
            message: String::from("Video processing completed"),
        });
    }

    pub fn error(&self, video_id: VideoId, message: impl Into<String>, detail: Option<String>) {
        self.emit(ProgressEvent::Error {
            video_id,
            message: message.into(),
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::RecordingSink;

    struct BrokenSink;

    impl ProgressSink for BrokenSink {
        fn publish(&self, _channel: &str, _event: ProgressEvent) -> Result<usize, PublishError> {
            Err(PublishError::Transport(String::from("connection reset")))
        }
    }

    #[test]
    fn test_transport_errors_are_swallowed() {
        let notifier = ProgressNotifier::new(Arc::new(BrokenSink));
        notifier.progress(1, Stage::Encoding, 10, "Encoding 1080p");
        notifier.complete(1, "videos/hls/x");
    }

    #[test]
    fn test_events_go_to_the_video_channel() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = ProgressNotifier::new(sink.clone());

        notifier.progress(9, Stage::Uploading, 250, "Uploading");
        let recorded = sink.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "video_progress_9");
        assert!(matches!(recorded[0].1, ProgressEvent::Progress { percent: 100, .. }));
    }
}
