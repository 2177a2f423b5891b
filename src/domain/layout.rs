//! Object-store key layout.

use super::video::VideoId;

pub const CHUNKS_ROOT: &str = "videos/chunks/";
pub const ORIGINALS_ROOT: &str = "videos/originals/";
pub const HLS_ROOT: &str = "videos/hls/";
pub const MASTER_PLAYLIST: &str = "master.m3u8";

pub fn chunk_prefix(video_id: VideoId) -> String {
    format!("{}{}/", CHUNKS_ROOT, video_id)
}

pub fn chunk_key(video_id: VideoId, index: u32) -> String {
    format!("{}{}", chunk_prefix(video_id), chunk_file_name(index))
}

pub fn chunk_file_name(index: u32) -> String {
    format!("chunk_{:04}", index)
}

/// Parses `chunk_0007` (optionally with a leading prefix) back into `7`.
pub fn parse_chunk_index(key: &str) -> Option<u32> {
    let name = key.rsplit('/').next()?;
    let digits = name.strip_prefix("chunk_")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn original_key(video_id: VideoId, file_name: &str) -> String {
    format!("{}{}_{}", ORIGINALS_ROOT, video_id, file_name)
}

/// Base remote directory of a video's HLS tree, without trailing slash.
pub fn hls_dir(uid: &str) -> String {
    format!("{}{}", HLS_ROOT, uid)
}

pub fn join_key(dir: &str, rel: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), rel.trim_start_matches('/'))
}

/// Rejects anything that could escape the directory it is joined onto.
pub fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path.split('/').all(|part| part != ".." && part != ".")
}
