use super::{ApiError, AppState};
use crate::application::assembler::{JobTicket, ChunkReceipt, ChunkUpload};
use crate::domain::video::VideoId;
use crate::ports::ads::AdSlotSource;
use crate::ports::codec::CodecPort;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::VideoRepository;
use crate::ports::storage::ObjectStore;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use std::str::FromStr;

fn parse_field<T: FromStr>(name: &str, value: Option<String>) -> Result<T, ApiError> {
    let value = value.ok_or_else(|| ApiError::bad_request(format!("missing field {}", name)))?;
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid {}: {:?}", name, value)))
}

/// Multipart fields: `videoId`, `chunkIndex`, `totalChunks`, `fileName`, `chunk`.
pub async fn upload_chunk<S, Q, R, A, C>(
    State(state): State<AppState<S, Q, R, A, C>>,
    mut multipart: Multipart,
) -> Result<Json<ChunkReceipt>, ApiError>
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + 'static,
    R: VideoRepository + Clone + 'static,
    A: AdSlotSource + 'static,
    C: CodecPort + 'static,
{
    let mut video_id = None;
    let mut chunk_index = None;
    let mut total_chunks = None;
    let mut file_name = None;
    let mut data: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name().unwrap_or_default() {
            "videoId" => video_id = Some(field.text().await?),
            "chunkIndex" => chunk_index = Some(field.text().await?),
            "totalChunks" => total_chunks = Some(field.text().await?),
            "fileName" => file_name = Some(field.text().await?),
            "chunk" => data = Some(field.bytes().await?),
            _ => {}
        }
    }

    let upload = ChunkUpload {
        video_id: parse_field::<VideoId>("videoId", video_id)?,
        chunk_index: parse_field("chunkIndex", chunk_index)?,
        total_chunks: parse_field("totalChunks", total_chunks)?,
        file_name: file_name.ok_or_else(|| ApiError::bad_request("missing field fileName"))?,
        data: data.ok_or_else(|| ApiError::bad_request("missing field chunk"))?,
    };

    Ok(Json(state.assembler.store_chunk(upload).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleRequest {
    pub video_id: VideoId,
    pub file_name: String,
}

pub async fn assemble_chunks<S, Q, R, A, C>(
    State(state): State<AppState<S, Q, R, A, C>>,
    Json(request): Json<AssembleRequest>,
) -> Result<(StatusCode, Json<JobTicket>), ApiError>
where
    S: ObjectStore + Clone + 'static,
    Q: JobQueuePort + 'static,
    R: VideoRepository + Clone + 'static,
    A: AdSlotSource + 'static,
    C: CodecPort + 'static,
{
    let ticket = state
        .assembler
        .trigger_assembly(request.video_id, &request.file_name)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(ticket)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_reports_name() {
        assert_eq!(parse_field::<u32>("chunkIndex", Some(String::from(" 3 "))).unwrap(), 3);

        let err = parse_field::<u32>("chunkIndex", Some(String::from("three"))).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("chunkIndex"));

        let err = parse_field::<u32>("totalChunks", None).unwrap_err();
        assert_eq!(err.message, "missing field totalChunks");
    }
}
