//! Production transfer client: curl Easy handles on blocking tasks.

use std::cell::Cell;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use curl::easy::Easy;

use super::retry::{classify, RetryDecision, RetryPolicy};
use super::{ClientError, DownloadClient, DownloadRequest};

/// Downloads a URL into the destination directory with a bounded retry loop.
/// Each file is written to a `.part` sibling and renamed on completion so an
/// interrupted transfer never leaves a truncated final file.
pub struct CurlClient {
    /// Per-attempt timeout; None disables it.
    attempt_timeout: Option<Duration>,
}

impl CurlClient {
    pub fn new(attempt_timeout: Option<Duration>) -> Self {
        Self { attempt_timeout }
    }
}

#[async_trait]
impl DownloadClient for CurlClient {
    async fn download(&self, request: DownloadRequest) -> Result<(), ClientError> {
        let attempt_timeout = self.attempt_timeout;
        tokio::task::spawn_blocking(move || download_blocking(&request, attempt_timeout))
            .await
            .map_err(|e| ClientError::Task(e.to_string()))?
    }
}

fn download_blocking(
    request: &DownloadRequest,
    attempt_timeout: Option<Duration>,
) -> Result<(), ClientError> {
    let file_name = file_name_from_url(&request.url)?;
    fs::create_dir_all(&request.destination)?;
    let final_path = request.destination.join(&file_name);
    let part_path = request.destination.join(format!("{}.part", file_name));

    let policy = RetryPolicy {
        max_attempts: request.max_retries.max(1),
        ..RetryPolicy::default()
    };

    let mut attempt = 1u32;
    loop {
        match transfer_once(request, &part_path, &final_path, attempt_timeout) {
            Ok(()) => return Ok(()),
            Err(err) => {
                let kind = classify(&err);
                match policy.decide(attempt, kind) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::debug!(
                            url = %request.url,
                            attempt,
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "transfer attempt failed, backing off"
                        );
                        std::thread::sleep(delay);
                        attempt += 1;
                    }
                    RetryDecision::NoRetry => {
                        let _ = fs::remove_file(&part_path);
                        if attempt > 1 {
                            return Err(ClientError::RetriesExhausted {
                                attempts: attempt,
                                last: err.to_string(),
                            });
                        }
                        return Err(err);
                    }
                }
            }
        }
    }
}

fn transfer_once(
    request: &DownloadRequest,
    part_path: &Path,
    final_path: &Path,
    attempt_timeout: Option<Duration>,
) -> Result<(), ClientError> {
    let mut file = fs::File::create(part_path)?;
    let mut write_error: Option<std::io::Error> = None;
    let last_percent = Cell::new(u8::MAX);

    let mut easy = Easy::new();
    easy.url(&request.url)?;
    easy.follow_location(true)?;
    easy.fail_on_error(false)?;
    if let Some(timeout) = attempt_timeout {
        easy.timeout(timeout)?;
    }
    easy.progress(request.on_progress.is_some())?;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| match file.write_all(data) {
            Ok(()) => Ok(data.len()),
            Err(e) => {
                write_error = Some(e);
                // Short write aborts the transfer; the stored error wins below.
                Ok(0)
            }
        })?;
        if let Some(on_progress) = &request.on_progress {
            transfer.progress_function(|dl_total, dl_now, _, _| {
                if dl_total > 0.0 {
                    let percent = ((dl_now / dl_total) * 100.0).clamp(0.0, 100.0) as u8;
                    if percent != last_percent.get() {
                        last_percent.set(percent);
                        on_progress(percent);
                    }
                }
                true
            })?;
        }
        transfer.perform()
    };

    if let Some(e) = write_error {
        return Err(ClientError::Storage(e));
    }
    perform_result?;

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(ClientError::Http(code));
    }

    file.flush()?;
    drop(file);
    fs::rename(part_path, final_path)?;
    Ok(())
}

/// Derive a safe filename from the URL's last path segment.
fn file_name_from_url(raw: &str) -> Result<String, ClientError> {
    let parsed = url::Url::parse(raw).map_err(|_| ClientError::InvalidUrl(raw.to_string()))?;
    let name = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("download.bin");
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return Ok("download.bin".to_string());
    }
    Ok(sanitized)
}
