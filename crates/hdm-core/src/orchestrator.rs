//! Enqueue orchestrator: one serialized selection-and-submission pass.
//!
//! A pass fills available global capacity with pending downloads, hoster by
//! hoster in stable id order. Submission queues a job without changing its
//! status; the processor re-validates admission when the job actually starts.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::ledger::ConcurrencyLedger;
use crate::queue::{DownloadJob, WorkQueue};
use crate::quota::QuotaTracker;
use crate::store::StateDb;

/// What one pass did, for logging and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassSummary {
    /// Jobs submitted to the work queue, across all hosters.
    pub submitted: usize,
    /// Eligible hosters examined before the global budget ran out.
    pub hosters_considered: usize,
}

pub struct EnqueueOrchestrator {
    db: StateDb,
    quota: QuotaTracker,
    ledger: Arc<ConcurrencyLedger>,
    queue: WorkQueue,
    pass_lock: tokio::sync::Mutex<()>,
}

impl EnqueueOrchestrator {
    pub fn new(
        db: StateDb,
        quota: QuotaTracker,
        ledger: Arc<ConcurrencyLedger>,
        queue: WorkQueue,
    ) -> Self {
        Self {
            db,
            quota,
            ledger,
            queue,
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one orchestration pass. Concurrent callers are serialized; the
    /// cumulative budget check guarantees a pass never submits more jobs than
    /// `global_slots_left()` measured at its start.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let _pass = self.pass_lock.lock().await;

        let mut summary = PassSummary::default();
        let mut slots_left = self.ledger.global_slots_left();
        if slots_left == 0 {
            tracing::debug!("no global slots left, skipping pass");
            return Ok(summary);
        }

        let hosters = self
            .db
            .list_eligible_hosters()
            .await
            .context("list eligible hosters")?;

        for hoster in hosters {
            if slots_left == 0 {
                break;
            }
            summary.hosters_considered += 1;

            let quota = self.quota.quota_left(&hoster.id).await?;
            if quota.exhausted() {
                tracing::debug!(hoster_id = %hoster.id, "quota exhausted, skipping hoster");
                continue;
            }

            let mut budget = self
                .ledger
                .hoster_slots_left(&hoster.id, hoster.max_concurrency)
                .min(slots_left);
            if let Some(remaining) = quota.min_remaining() {
                budget = budget.min(remaining.max(0) as usize);
            }
            if budget == 0 {
                continue;
            }

            let pending = self
                .db
                .get_pending_by_hoster(&hoster.id, budget as i64)
                .await
                .with_context(|| format!("fetch pending downloads for {}", hoster.id))?;
            if pending.is_empty() {
                continue;
            }

            let jobs: Vec<DownloadJob> = pending
                .iter()
                .map(|row| DownloadJob {
                    download_id: row.id,
                    hoster_id: row.hoster_id.clone(),
                    url: row.url.clone(),
                    priority: row.priority,
                })
                .collect();
            let submitted = self.queue.submit_bulk(jobs).await?;

            tracing::debug!(hoster_id = %hoster.id, submitted, "submitted pending downloads");
            slots_left -= submitted;
            summary.submitted += submitted;
        }

        Ok(summary)
    }
}
