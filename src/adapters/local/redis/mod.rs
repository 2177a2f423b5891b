//! Redis adapter for local deployment.
//!
//! This module provides Redis-backed implementations of:
//! - `JobQueuePort` for job enqueueing/dequeueing
//! - `VideoRepository` for video records and the processing claim
//! - `AdSlotSource` for the ad catalog

mod ads;
mod error;
mod pool;
mod queue;
mod repository;

pub use error::QueueError;
pub use pool::RedisPool;

/// Redis key constants
const JOB_QUEUE_HIGH_PRIORITY: &str = "hlsforge:jobs:high";
const JOB_QUEUE_NORMAL: &str = "hlsforge:jobs:normal";
const VIDEO_PREFIX: &str = "hlsforge:video:";
const VIDEO_INDEX_PREFIX: &str = "hlsforge:video_index:";
const AD_SLOTS_KEY: &str = "hlsforge:ad_slots";
const VIDEO_AD_SLOTS_PREFIX: &str = "hlsforge:ad_slots:";
