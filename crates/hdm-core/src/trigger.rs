//! Scheduling trigger: periodic tick plus event-driven re-invocation.
//!
//! Requests are coalesced through a capacity-1 channel: while a pass is
//! pending or running, further `fire` calls collapse into the one already
//! queued instead of piling up duplicates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::orchestrator::EnqueueOrchestrator;

/// Handle used to request an orchestration pass. Cheap to clone; firing is
/// non-blocking and never fails.
#[derive(Clone)]
pub struct OrchestratorTrigger {
    tx: mpsc::Sender<()>,
}

impl OrchestratorTrigger {
    /// Request a pass. A full channel means one is already queued, which is
    /// exactly the coalescing we want.
    pub fn fire(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Create the trigger handle and the receiver consumed by `run_trigger_loop`.
pub fn channel() -> (OrchestratorTrigger, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (OrchestratorTrigger { tx }, rx)
}

/// Serialized trigger loop: one orchestration pass per wakeup, woken by the
/// periodic interval or by an event trigger, whichever comes first. The first
/// interval tick fires immediately, giving the startup pass.
pub async fn run_trigger_loop(
    orchestrator: Arc<EnqueueOrchestrator>,
    mut rx: mpsc::Receiver<()>,
    period: Duration,
) {
    let mut tick = tokio::time::interval(period.max(Duration::from_secs(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            msg = rx.recv() => {
                if msg.is_none() {
                    tracing::debug!("all trigger handles dropped, stopping orchestration loop");
                    break;
                }
            }
        }

        match orchestrator.run_pass().await {
            Ok(summary) if summary.submitted > 0 => {
                tracing::info!(submitted = summary.submitted, "orchestration pass queued jobs");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = format!("{:#}", err), "orchestration pass failed");
            }
        }
    }
}
