//! Job processor: start-time admission, transfer execution, terminal bookkeeping.
//!
//! State can change between the orchestrator selecting a job and a worker
//! starting it, so quota and concurrency are re-validated here. A rejected job
//! is discarded without side effects; its row stays `pending` for a later pass.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::client::{DownloadClient, DownloadRequest};
use crate::ledger::ConcurrencyLedger;
use crate::queue::{DownloadJob, JobEvent, JobEvents};
use crate::quota::QuotaTracker;
use crate::store::{DownloadStatus, StateDb, TransitionError};

/// How a job left the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Admission failed (quota or slot); the row is still `pending`.
    Rejected,
    /// Transfer succeeded; the row is `success`.
    Completed,
    /// Transfer failed after the client's retries; the row is `failed`.
    Failed,
}

pub struct JobProcessor {
    db: StateDb,
    quota: QuotaTracker,
    ledger: Arc<ConcurrencyLedger>,
    client: Arc<dyn DownloadClient>,
    downloads_dir: PathBuf,
    max_retries: u32,
    events: JobEvents,
}

impl JobProcessor {
    pub fn new(
        db: StateDb,
        quota: QuotaTracker,
        ledger: Arc<ConcurrencyLedger>,
        client: Arc<dyn DownloadClient>,
        downloads_dir: PathBuf,
        max_retries: u32,
        events: JobEvents,
    ) -> Self {
        Self {
            db,
            quota,
            ledger,
            client,
            downloads_dir,
            max_retries,
            events,
        }
    }

    /// Run one job end to end. Returns `Ok` for every scheduling outcome;
    /// `Err` is reserved for store/infrastructure failures.
    pub async fn process(&self, job: &DownloadJob) -> Result<JobOutcome> {
        let Some(hoster) = self
            .db
            .get_hoster(&job.hoster_id)
            .await
            .context("load hoster for admission check")?
        else {
            tracing::warn!(
                hoster_id = %job.hoster_id,
                download_id = job.download_id,
                "job references an unknown hoster"
            );
            return Ok(JobOutcome::Rejected);
        };

        // A row can be queued by two passes (submission leaves it pending);
        // only the first worker to reach it may run it.
        match self
            .db
            .get_download(job.download_id)
            .await
            .context("load download for admission check")?
        {
            Some(row) if row.status == DownloadStatus::Pending => {}
            Some(row) => {
                tracing::debug!(
                    download_id = job.download_id,
                    status = row.status.as_str(),
                    "download no longer pending, skipping"
                );
                return Ok(JobOutcome::Rejected);
            }
            None => {
                tracing::warn!(download_id = job.download_id, "queued download row is gone");
                return Ok(JobOutcome::Rejected);
            }
        }

        if self.quota.has_reached_quota(&job.hoster_id).await? {
            tracing::debug!(hoster_id = %job.hoster_id, "quota reached at start time");
            return Ok(JobOutcome::Rejected);
        }
        if !self.ledger.try_acquire(&job.hoster_id, hoster.max_concurrency) {
            tracing::debug!(hoster_id = %job.hoster_id, "no concurrency slot at start time");
            return Ok(JobOutcome::Rejected);
        }
        // From here the slot is held until the terminal status is persisted.
        let _slot = self.ledger.guard(&job.hoster_id);

        if let Err(err) = self
            .db
            .set_status(job.download_id, DownloadStatus::Downloading)
            .await
        {
            // Two workers can race past the pending check; the loser sees an
            // illegal transition and simply backs off.
            if err.downcast_ref::<TransitionError>().is_some() {
                tracing::debug!(
                    download_id = job.download_id,
                    "lost the claim race, skipping"
                );
                return Ok(JobOutcome::Rejected);
            }
            return Err(err).context("mark download as downloading");
        }

        // Admitted and claimed; only now does the job count as started.
        self.events.emit(JobEvent::Active {
            download_id: job.download_id,
        });

        let request = DownloadRequest {
            url: job.url.clone(),
            destination: self.downloads_dir.clone(),
            max_retries: self.max_retries,
            on_progress: Some(self.progress_callback(job.download_id)),
        };

        match self.client.download(request).await {
            Ok(()) => {
                self.db
                    .set_status(job.download_id, DownloadStatus::Success)
                    .await
                    .context("mark download as success")?;
                tracing::info!(download_id = job.download_id, url = %job.url, "download completed");
                Ok(JobOutcome::Completed)
            }
            Err(err) => {
                self.db
                    .set_status(job.download_id, DownloadStatus::Failed)
                    .await
                    .context("mark download as failed")?;
                tracing::warn!(
                    download_id = job.download_id,
                    url = %job.url,
                    error = %err,
                    "download failed"
                );
                Ok(JobOutcome::Failed)
            }
        }
    }

    fn progress_callback(&self, download_id: i64) -> Box<dyn Fn(u8) + Send + Sync> {
        let events = self.events.clone();
        Box::new(move |percent| {
            events.emit(JobEvent::Progress {
                download_id,
                percent,
            });
        })
    }
}
