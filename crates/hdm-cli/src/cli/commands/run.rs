//! `hdm run`: start the engine and report job events until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hdm_core::client::CurlClient;
use hdm_core::config::HdmConfig;
use hdm_core::engine;
use hdm_core::queue::JobEvent;
use hdm_core::store::StateDb;

pub async fn run_engine(db: StateDb, cfg: HdmConfig) -> Result<()> {
    let client = Arc::new(CurlClient::new(
        cfg.attempt_timeout_secs.map(Duration::from_secs),
    ));
    let mut handle = engine::start(db, &cfg, client).await?;
    let mut events = handle
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("job events already taken"))?;

    println!(
        "hdm engine running ({} workers, pass every {}s). Ctrl-C to stop.",
        cfg.max_concurrent_downloads, cfg.orchestrate_interval_secs
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nstopping...");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(JobEvent::Active { download_id }) => {
                        println!("download {} started", download_id);
                    }
                    Some(JobEvent::Progress { download_id, percent }) => {
                        tracing::debug!(download_id, percent, "progress");
                    }
                    Some(JobEvent::Completed { download_id }) => {
                        println!("download {} completed", download_id);
                    }
                    Some(JobEvent::Failed { download_id }) => {
                        println!("download {} failed (see log)", download_id);
                    }
                    None => break,
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
