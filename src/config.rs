//! Configuration for different deployment environments.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration shared by the HTTP front and the pipeline workers.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Redis connection URL
    pub redis_url: String,
    /// Root directory of the filesystem object store
    pub storage_root: PathBuf,
    /// Scratch directory for downloads and encoder output
    pub work_dir: PathBuf,
    /// Public base URL used when rewriting manifests into proxy URLs
    pub backend_url: String,
    /// Target HLS segment length in seconds
    pub segment_duration: u32,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Number of concurrent job workers
    pub workers: usize,
    /// Attempts before a failing job is dropped
    pub job_max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub job_retry_backoff_secs: u64,
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let addr = env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1"));
        let port = env::var("PORT").unwrap_or_else(|_| String::from("3000"));
        let backend_url =
            env::var("BACKEND_URL").unwrap_or_else(|_| format!("http://{}:{}", addr, port));

        Self {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| String::from("redis://127.0.0.1/")),
            storage_root: env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./storage")),
            work_dir: env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            segment_duration: parse_or("HLS_SEGMENT_DURATION", 6),
            ffmpeg_path: env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            ffprobe_path: env::var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffprobe")),
            workers: parse_or("WORKERS", 2),
            job_max_attempts: parse_or("JOB_MAX_ATTEMPTS", 3),
            job_retry_backoff_secs: parse_or("JOB_RETRY_BACKOFF_SECS", 30),
            addr,
            port,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            addr: String::from("127.0.0.1"),
            port: String::from("3000"),
            redis_url: String::from("redis://127.0.0.1/"),
            storage_root: PathBuf::from("./storage"),
            work_dir: env::temp_dir(),
            backend_url: String::from("http://127.0.0.1:3000"),
            segment_duration: 6,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            workers: 2,
            job_max_attempts: 3,
            job_retry_backoff_secs: 30,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Configuration for S3-backed storage.
#[cfg(feature = "aws")]
#[derive(Clone, Debug)]
pub struct AwsConfig {
    /// S3 bucket holding chunks, originals and HLS trees
    pub s3_bucket: String,
}

#[cfg(feature = "aws")]
impl AwsConfig {
    /// Load configuration from environment variables.
    /// Panics if required variables are not set.
    pub fn from_env() -> Self {
        Self {
            s3_bucket: env::var("S3_BUCKET").expect("S3_BUCKET env var required"),
        }
    }
}
