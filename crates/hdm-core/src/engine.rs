//! Engine assembly: reconciliation, worker pool, and the trigger loop.
//!
//! Startup order matters: the ledger is rebuilt from persisted `downloading`
//! rows before any worker can accept a job, so the in-memory counters never
//! start ahead of or behind the store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::client::DownloadClient;
use crate::config::HdmConfig;
use crate::ledger::ConcurrencyLedger;
use crate::orchestrator::EnqueueOrchestrator;
use crate::processor::JobProcessor;
use crate::queue::{spawn_workers, JobEvent, JobEvents, WorkQueue};
use crate::quota::QuotaTracker;
use crate::store::StateDb;
use crate::trigger::{self, OrchestratorTrigger};

/// Running engine. Dropping the handle does not stop the tasks; call
/// `shutdown` for an orderly stop.
pub struct EngineHandle {
    trigger: OrchestratorTrigger,
    queue: WorkQueue,
    ledger: Arc<ConcurrencyLedger>,
    events_rx: Option<mpsc::Receiver<JobEvent>>,
    workers: JoinSet<()>,
    trigger_task: JoinHandle<()>,
}

impl EngineHandle {
    /// Request an orchestration pass (e.g. right after adding downloads).
    pub fn trigger(&self) -> &OrchestratorTrigger {
        &self.trigger
    }

    /// Jobs currently being processed.
    pub fn active_count(&self) -> usize {
        self.queue.active_count()
    }

    /// Ledger view, for status display.
    pub fn ledger(&self) -> &ConcurrencyLedger {
        &self.ledger
    }

    /// Take the job-event receiver (first caller gets it).
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<JobEvent>> {
        self.events_rx.take()
    }

    /// Stop the trigger loop, close the queue, and wait for workers to finish
    /// their current jobs.
    pub async fn shutdown(mut self) {
        self.trigger_task.abort();
        let _ = (&mut self.trigger_task).await;

        // Dropping the last queue sender closes the channel; workers drain
        // what is already queued and exit.
        drop(self.queue);
        drop(self.trigger);
        while let Some(res) = self.workers.join_next().await {
            if let Err(err) = res {
                if !err.is_cancelled() {
                    tracing::warn!(error = %err, "worker task ended abnormally");
                }
            }
        }
        tracing::info!("engine stopped");
    }
}

/// Reconcile state, spawn the worker pool and trigger loop, and fire the
/// initial orchestration pass.
pub async fn start(
    db: StateDb,
    cfg: &HdmConfig,
    client: Arc<dyn DownloadClient>,
) -> Result<EngineHandle> {
    let downloads_dir = cfg.resolve_downloads_dir()?;
    tokio::fs::create_dir_all(&downloads_dir)
        .await
        .with_context(|| format!("create downloads dir {}", downloads_dir.display()))?;

    // Persisted state wins over anything held in memory before a restart.
    let ledger = Arc::new(ConcurrencyLedger::new(cfg.max_concurrent_downloads));
    let in_flight = db
        .downloading_counts_by_hoster()
        .await
        .context("read downloading rows for reconciliation")?;
    ledger.reconcile(in_flight);

    let quota = QuotaTracker::new(db.clone());
    let (events, events_rx) = JobEvents::channel(256);
    let (queue, job_rx, active) = WorkQueue::new(cfg.queue_capacity);
    let (trigger, trigger_rx) = trigger::channel();

    let processor = Arc::new(JobProcessor::new(
        db.clone(),
        quota.clone(),
        Arc::clone(&ledger),
        client,
        downloads_dir,
        cfg.client_max_retries,
        events.clone(),
    ));

    let workers = spawn_workers(
        cfg.max_concurrent_downloads,
        job_rx,
        active,
        processor,
        trigger.clone(),
        events,
    );

    let orchestrator = Arc::new(EnqueueOrchestrator::new(
        db,
        quota,
        Arc::clone(&ledger),
        queue.clone(),
    ));
    let trigger_task = tokio::spawn(trigger::run_trigger_loop(
        orchestrator,
        trigger_rx,
        Duration::from_secs(cfg.orchestrate_interval_secs),
    ));

    tracing::info!(
        workers = cfg.max_concurrent_downloads,
        interval_secs = cfg.orchestrate_interval_secs,
        "engine started"
    );

    Ok(EngineHandle {
        trigger,
        queue,
        ledger,
        events_rx: Some(events_rx),
        workers,
        trigger_task,
    })
}
