use super::{ApiError, AppState};
use crate::application::assembler::JobTicket;
use crate::application::lifecycle::PurgeReport;
use crate::domain::video::{ProcessingStatus, VideoId};
use crate::error::PipelineError;
use crate::ports::ads::AdSlotSource;
use crate::ports::codec::CodecPort;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::VideoRepository;
use crate::ports::storage::ObjectStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct VideoStatusResponse {
    pub id: VideoId,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub hls_master_playlist: Option<String>,
    pub duration: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// The durable view of a video's processing state.
pub async fn video_status<S, Q, R, A, C>(
    State(state): State<AppState<S, Q, R, A, C>>,
    Path(id): Path<VideoId>,
) -> Result<Json<VideoStatusResponse>, ApiError>
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + 'static,
    R: VideoRepository + Clone + 'static,
    A: AdSlotSource + 'static,
    C: CodecPort + 'static,
{
    let video = state
        .repo
        .get(id)
        .await?
        .ok_or_else(|| PipelineError::VideoNotFound(id.to_string()))?;
    Ok(Json(VideoStatusResponse {
        id: video.id,
        processing_status: video.processing_status,
        processing_error: video.processing_error,
        hls_master_playlist: video.hls_master_playlist,
        duration: video.duration,
    }))
}

/// Drop the record and purge everything stored for it.
pub async fn delete_video<S, Q, R, A, C>(
    State(state): State<AppState<S, Q, R, A, C>>,
    Path(id): Path<VideoId>,
) -> Result<Json<PurgeReport>, ApiError>
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + 'static,
    R: VideoRepository + Clone + 'static,
    A: AdSlotSource + 'static,
    C: CodecPort + 'static,
{
    let video = state
        .repo
        .delete(id)
        .await?
        .ok_or_else(|| PipelineError::VideoNotFound(id.to_string()))?;
    state.orchestrator.cancel(id);

    let report = state.lifecycle.purge_video(&video).await;
    info!(video_id = id, hls_objects = report.hls_objects_deleted, "video purged");
    Ok(Json(report))
}

pub async fn cancel_video<S, Q, R, A, C>(
    State(state): State<AppState<S, Q, R, A, C>>,
    Path(id): Path<VideoId>,
) -> Json<CancelResponse>
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + 'static,
    R: VideoRepository + Clone + 'static,
    A: AdSlotSource + 'static,
    C: CodecPort + 'static,
{
    Json(CancelResponse {
        cancelled: state.orchestrator.cancel(id),
    })
}

/// Restart transcoding from the stored original after a failed run.
pub async fn requeue_transcode<S, Q, R, A, C>(
    State(state): State<AppState<S, Q, R, A, C>>,
    Path(id): Path<VideoId>,
) -> Result<(StatusCode, Json<JobTicket>), ApiError>
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + 'static,
    R: VideoRepository + Clone + 'static,
    A: AdSlotSource + 'static,
    C: CodecPort + 'static,
{
    let ticket = state.assembler.requeue_transcode(id).await?;
    Ok((StatusCode::ACCEPTED, Json(ticket)))
}
