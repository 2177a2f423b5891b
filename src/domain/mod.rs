//! Domain layer - Pure business logic.

pub mod ad_slot;
pub mod events;
pub mod hls;
pub mod jobs;
pub mod layout;
pub mod preset;
pub mod video;
