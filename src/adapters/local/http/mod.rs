//! HTTP inbound adapter: chunk upload, assembly trigger, HLS serving,
//! video deletion/cancellation/re-transcoding and the live progress WebSocket.

mod error;
mod progress;
mod streaming;
mod uploads;
mod videos;

pub use error::ApiError;

use crate::adapters::hub::EventHub;
use crate::application::assembler::ChunkAssembler;
use crate::application::lifecycle::StorageLifecycle;
use crate::application::orchestrator::TranscodeOrchestrator;
use crate::application::streaming::StreamingService;
use crate::ports::ads::AdSlotSource;
use crate::ports::codec::CodecPort;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::VideoRepository;
use crate::ports::storage::ObjectStore;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Everything the handlers reach for.
pub struct AppState<S, Q, R, A, C> {
    pub assembler: Arc<ChunkAssembler<S, Q, R>>,
    pub orchestrator: Arc<TranscodeOrchestrator<S, R, C>>,
    pub streaming: Arc<StreamingService<S, R, A>>,
    pub lifecycle: StorageLifecycle<S>,
    pub repo: R,
    pub hub: Arc<EventHub>,
}

impl<S: Clone, Q, R: Clone, A, C> Clone for AppState<S, Q, R, A, C> {
    fn clone(&self) -> Self {
        Self {
            assembler: self.assembler.clone(),
            orchestrator: self.orchestrator.clone(),
            streaming: self.streaming.clone(),
            lifecycle: self.lifecycle.clone(),
            repo: self.repo.clone(),
            hub: self.hub.clone(),
        }
    }
}

pub fn router<S, Q, R, A, C>(state: AppState<S, Q, R, A, C>) -> Router
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + 'static,
    R: VideoRepository + Clone + 'static,
    A: AdSlotSource + 'static,
    C: CodecPort + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/streaming/upload-chunk", post(uploads::upload_chunk::<S, Q, R, A, C>))
        .route("/streaming/assemble-chunks", post(uploads::assemble_chunks::<S, Q, R, A, C>))
        .route("/streaming/hls/:public_id/*path", get(streaming::serve_hls::<S, Q, R, A, C>))
        .route("/streaming/videos/:id", delete(videos::delete_video::<S, Q, R, A, C>))
        .route("/streaming/videos/:id/status", get(videos::video_status::<S, Q, R, A, C>))
        .route("/streaming/videos/:id/cancel", post(videos::cancel_video::<S, Q, R, A, C>))
        .route("/streaming/videos/:id/transcode", post(videos::requeue_transcode::<S, Q, R, A, C>))
        .route("/ws/video-progress/:video_id", get(progress::video_progress::<S, Q, R, A, C>))
        .layer(cors)
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}
