//! Transfer client seam.
//!
//! The engine only depends on the `DownloadClient` trait; the bundled
//! `CurlClient` drives a curl Easy handle from a blocking task and owns its
//! own bounded retry loop, so a single failure surfacing to the processor
//! means retries are already exhausted.

mod easy;
pub mod retry;

pub use easy::CurlClient;

use std::path::PathBuf;

use async_trait::async_trait;

/// Percent-progress callback, invoked from the transfer thread.
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// One transfer request. `destination` is the directory to write into; the
/// filename is derived from the URL.
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Attempts the client may make before giving up (including the first).
    pub max_retries: u32,
    pub on_progress: Option<ProgressFn>,
}

/// Transfer failure after the client's own retries are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP {0}")]
    Http(u32),
    #[error(transparent)]
    Curl(#[from] curl::Error),
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
    #[error("invalid download URL: {0}")]
    InvalidUrl(String),
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error("transfer task failed: {0}")]
    Task(String),
}

/// External download client consumed by the job processor.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    async fn download(&self, request: DownloadRequest) -> Result<(), ClientError>;
}
