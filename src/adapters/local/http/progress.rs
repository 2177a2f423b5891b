use super::AppState;
use crate::domain::events::{progress_channel, ProgressEvent};
use crate::domain::video::VideoId;
use crate::ports::ads::AdSlotSource;
use crate::ports::codec::CodecPort;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::VideoRepository;
use crate::ports::storage::ObjectStore;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// `GET /ws/video-progress/{videoId}`
pub async fn video_progress<S, Q, R, A, C>(
    State(state): State<AppState<S, Q, R, A, C>>,
    Path(video_id): Path<VideoId>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + 'static,
    R: VideoRepository + Clone + 'static,
    A: AdSlotSource + 'static,
    C: CodecPort + 'static,
{
    // Subscribe before the upgrade so no event slips between the two.
    let events = state.hub.subscribe(&progress_channel(video_id));
    ws.on_upgrade(move |socket| forward_events(socket, video_id, events))
}

fn encode(event: &ProgressEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            warn!(error = %e, "could not encode progress event");
            None
        }
    }
}

async fn forward_events(
    mut socket: WebSocket,
    video_id: VideoId,
    mut events: broadcast::Receiver<ProgressEvent>,
) {
    let hello = ProgressEvent::Connection {
        video_id,
        message: format!("Connected to progress updates for video {}", video_id),
    };
    if let Some(message) = encode(&hello) {
        if socket.send(message).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Some(message) = encode(&event) else { continue };
                    if socket.send(message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(video_id, skipped, "progress subscriber lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(video_id, "progress subscriber disconnected");
}
