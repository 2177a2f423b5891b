use super::{ApiError, AppState};
use crate::application::streaming::ServedBody;
use crate::ports::ads::AdSlotSource;
use crate::ports::codec::CodecPort;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::VideoRepository;
use crate::ports::storage::ObjectStore;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

/// `GET /streaming/hls/{slugOrUid}/{path}`
pub async fn serve_hls<S, Q, R, A, C>(
    State(state): State<AppState<S, Q, R, A, C>>,
    Path((public_id, path)): Path<(String, String)>,
) -> Result<Response, ApiError>
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + 'static,
    R: VideoRepository + Clone + 'static,
    A: AdSlotSource + 'static,
    C: CodecPort + 'static,
{
    let asset = state.streaming.serve(&public_id, &path).await?;
    let body = match asset.body {
        ServedBody::Manifest(text) => Body::from(text),
        ServedBody::Stream(stream) => Body::from_stream(stream),
    };

    Ok((
        [
            (header::CONTENT_TYPE, asset.content_type),
            (header::CACHE_CONTROL, asset.cache_control.to_string()),
        ],
        body,
    )
        .into_response())
}
