use crate::domain::preset::{QualityPreset, VariantDescriptor};
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    Encoded(VariantDescriptor),
    /// Soft failure with whatever the encoder wrote to stderr.
    Failed { stderr: String },
}

/// External encoder/prober producing one HLS variant per call.
#[async_trait]
pub trait CodecPort: Send + Sync {
    /// Encode `input` into `{output_dir}/{preset}/{preset}.m3u8` plus segments.
    /// Never errors; failures come back as [`EncodeOutcome::Failed`].
    async fn encode_variant(&self, input: &Path, output_dir: &Path, preset: &QualityPreset) -> EncodeOutcome;

    /// Source duration in seconds, `0.0` when probing fails.
    async fn probe_duration(&self, input: &Path) -> f64;
}
