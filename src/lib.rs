//! hlsforge - Video ingestion and HLS transcoding pipeline
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (video, ad slots, jobs, presets, hls)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Pipeline services that use ports
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Local/monolith deployment (Redis queue and repository, filesystem storage)
//! - `aws`: S3 object storage on top of `local`

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use config::PipelineConfig;
pub use error::PipelineError;

#[cfg(feature = "aws")]
pub use config::AwsConfig;

pub use domain::hls;
