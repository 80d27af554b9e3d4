//! Capacity-bounded work queue between the orchestrator and the worker pool.
//!
//! Submission is a queuing action only; a job's row stays `pending` until the
//! processor admits it. Workers pull from a shared receiver, so the pool size
//! (= global max concurrent downloads) bounds how many transfers run at once.
//! Lifecycle events (active/progress/completed/failed) are published on a
//! best-effort observer channel; terminal outcomes re-fire the orchestrator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::processor::{JobOutcome, JobProcessor};
use crate::store::DownloadId;
use crate::trigger::OrchestratorTrigger;

/// One unit of admitted-for-queuing work. Carries everything the processor
/// needs so it never re-reads the row before the admission check.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub download_id: DownloadId,
    pub hoster_id: String,
    pub url: String,
    pub priority: i64,
}

/// Lifecycle notification published while a job moves through the pool.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// The job passed admission and its transfer is starting.
    Active { download_id: DownloadId },
    /// Transfer progress in percent.
    Progress { download_id: DownloadId, percent: u8 },
    /// Transfer finished and the row is `success`.
    Completed { download_id: DownloadId },
    /// Transfer failed and the row is `failed`.
    Failed { download_id: DownloadId },
}

/// Best-effort publisher for job events. Dropping events when the observer
/// lags is fine; the state store stays authoritative.
#[derive(Clone)]
pub struct JobEvents {
    tx: Option<mpsc::Sender<JobEvent>>,
}

impl JobEvents {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Publisher that discards everything (no observer attached).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: JobEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

/// Receiver side of the queue, shared by all workers.
pub type JobReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<DownloadJob>>>;

/// Submission handle for the work queue.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<DownloadJob>,
    active: Arc<AtomicUsize>,
}

impl WorkQueue {
    /// Create a queue with the given capacity. The receiver is handed to
    /// `spawn_workers`; the `AtomicUsize` tracks jobs currently being
    /// processed (not jobs waiting in the channel).
    pub fn new(capacity: usize) -> (Self, JobReceiver, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let active = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                active: Arc::clone(&active),
            },
            Arc::new(tokio::sync::Mutex::new(rx)),
            active,
        )
    }

    /// Queue one job. Applies backpressure when the queue is full; errors only
    /// when the worker pool has shut down.
    pub async fn submit(&self, job: DownloadJob) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| anyhow::anyhow!("work queue closed"))
    }

    /// Queue a batch in order. Returns the number submitted.
    pub async fn submit_bulk(&self, jobs: Vec<DownloadJob>) -> Result<usize> {
        let mut submitted = 0;
        for job in jobs {
            self.submit(job).await?;
            submitted += 1;
        }
        Ok(submitted)
    }

    /// Jobs currently being processed by workers.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// Spawn `count` workers pulling from `rx`. Each worker runs the processor on
/// one job at a time; terminal outcomes fire the orchestrator trigger so freed
/// capacity is reallocated immediately.
pub(crate) fn spawn_workers(
    count: usize,
    rx: JobReceiver,
    active: Arc<AtomicUsize>,
    processor: Arc<JobProcessor>,
    trigger: OrchestratorTrigger,
    events: JobEvents,
) -> JoinSet<()> {
    let mut workers = JoinSet::new();
    for worker_id in 0..count.max(1) {
        let rx = Arc::clone(&rx);
        let active = Arc::clone(&active);
        let processor = Arc::clone(&processor);
        let trigger = trigger.clone();
        let events = events.clone();
        workers.spawn(async move {
            loop {
                let job = { rx.lock().await.recv().await };
                let Some(job) = job else {
                    tracing::debug!(worker_id, "work queue closed, worker exiting");
                    break;
                };

                active.fetch_add(1, Ordering::Relaxed);
                let outcome = processor.process(&job).await;
                active.fetch_sub(1, Ordering::Relaxed);

                match outcome {
                    Ok(JobOutcome::Rejected) => {
                        // Row stays pending; a later pass reconsiders it once
                        // quota or a slot opens up. No trigger here, or a
                        // saturated hoster would spin the orchestrator.
                        tracing::debug!(download_id = job.download_id, "job rejected at start");
                    }
                    Ok(JobOutcome::Completed) => {
                        events.emit(JobEvent::Completed {
                            download_id: job.download_id,
                        });
                        trigger.fire();
                    }
                    Ok(JobOutcome::Failed) => {
                        events.emit(JobEvent::Failed {
                            download_id: job.download_id,
                        });
                        trigger.fire();
                    }
                    Err(err) => {
                        // Store or queue infrastructure failure. Surface it
                        // loudly; masking it risks ledger/store divergence,
                        // which the next startup reconciliation repairs.
                        tracing::error!(
                            download_id = job.download_id,
                            error = format!("{:#}", err),
                            "job processing failed with an infrastructure error"
                        );
                    }
                }
            }
        });
    }
    workers
}
