//! Codec runner on top of the `ffmpeg` and `ffprobe` command line tools.

use crate::config::PipelineConfig;
use crate::domain::hls::MediaPlaylist;
use crate::domain::preset::{QualityPreset, VariantDescriptor};
use crate::error::PipelineError;
use crate::ports::codec::{CodecPort, EncodeOutcome};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct FfmpegCodec {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    segment_duration: u32,
}

impl FfmpegCodec {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>, segment_duration: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            segment_duration,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path, config.segment_duration)
    }

    /// Startup check: the encoder binary must be runnable on this host.
    pub async fn ensure_available(&self) -> Result<(), PipelineError> {
        let status = Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                info!(ffmpeg = %self.ffmpeg.display(), "encoder found");
                Ok(())
            }
            Ok(status) => Err(PipelineError::EncoderUnavailable(format!(
                "{} -version exited with {}",
                self.ffmpeg.display(),
                status
            ))),
            Err(e) => Err(PipelineError::EncoderUnavailable(format!(
                "{}: {}",
                self.ffmpeg.display(),
                e
            ))),
        }
    }

    fn encode_args(&self, input: &Path, variant_dir: &Path, preset: &QualityPreset) -> Vec<OsString> {
        let segment_pattern = variant_dir.join(preset.segment_pattern());
        let playlist = variant_dir.join(format!("{}.m3u8", preset.name));

        let mut args: Vec<OsString> = Vec::new();
        let mut push = |value: &dyn AsRef<std::ffi::OsStr>| args.push(value.as_ref().to_os_string());

        push(&"-y");
        push(&"-i");
        push(&input);
        push(&"-c:v");
        push(&"libx264");
        push(&"-c:a");
        push(&"aac");
        push(&"-b:v");
        push(&format!("{}k", preset.video_kbps));
        push(&"-b:a");
        push(&format!("{}k", preset.audio_kbps));
        push(&"-maxrate");
        push(&format!("{}k", preset.maxrate_kbps));
        push(&"-bufsize");
        push(&format!("{}k", preset.bufsize_kbps));
        push(&"-s");
        push(&preset.resolution());
        push(&"-profile:v");
        push(&"main");
        push(&"-level");
        push(&"4.0");
        push(&"-start_number");
        push(&"0");
        push(&"-hls_time");
        push(&self.segment_duration.to_string());
        push(&"-hls_list_size");
        push(&"0");
        push(&"-hls_segment_filename");
        push(&segment_pattern);
        push(&"-f");
        push(&"hls");
        push(&playlist);
        args
    }
}

#[async_trait]
impl CodecPort for FfmpegCodec {
    async fn encode_variant(&self, input: &Path, output_dir: &Path, preset: &QualityPreset) -> EncodeOutcome {
        let variant_dir = output_dir.join(&preset.name);
        if let Err(e) = tokio::fs::create_dir_all(&variant_dir).await {
            return EncodeOutcome::Failed {
                stderr: format!("could not create {}: {}", variant_dir.display(), e),
            };
        }

        debug!(preset = %preset.name, input = %input.display(), "starting encoder");
        let output = Command::new(&self.ffmpeg)
            .args(self.encode_args(input, &variant_dir, preset))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return EncodeOutcome::Failed {
                    stderr: format!("failed to spawn {}: {}", self.ffmpeg.display(), e),
                }
            }
        };

        if !output.status.success() {
            return EncodeOutcome::Failed {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
        }

        let playlist_path = variant_dir.join(format!("{}.m3u8", preset.name));
        match tokio::fs::read_to_string(&playlist_path).await {
            Ok(content) if !MediaPlaylist::parse(&content).segments.is_empty() => {
                EncodeOutcome::Encoded(VariantDescriptor::from_preset(preset))
            }
            Ok(_) => EncodeOutcome::Failed {
                stderr: format!("{} lists no segments", playlist_path.display()),
            },
            Err(e) => EncodeOutcome::Failed {
                stderr: format!("{} missing after encode: {}", playlist_path.display(), e),
            },
        }
    }

    async fn probe_duration(&self, input: &Path) -> f64 {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(input)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                stdout.trim().parse::<f64>().unwrap_or_else(|_| {
                    warn!(output = %stdout.trim(), "unparseable ffprobe duration");
                    0.0
                })
            }
            Ok(output) => {
                warn!(stderr = %String::from_utf8_lossy(&output.stderr), "ffprobe failed");
                0.0
            }
            Err(e) => {
                warn!(error = %e, "could not run ffprobe");
                0.0
            }
        }
    }
}
