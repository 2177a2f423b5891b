//! Ports - Trait definitions for every external collaborator of the pipeline.

pub mod ads;
pub mod codec;
pub mod notifier;
pub mod queue;
pub mod repository;
pub mod storage;
