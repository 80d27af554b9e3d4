//! End-to-end engine tests: seed a state database, run the engine with a fake
//! transfer client, and watch admission control drive the lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use hdm_core::client::{ClientError, DownloadClient, DownloadRequest};
use hdm_core::config::HdmConfig;
use hdm_core::engine;
use hdm_core::store::{DownloadStatus, Hoster, HosterLimits, StateDb};

/// Succeeds instantly unless the URL contains "fail".
struct ScriptedClient;

#[async_trait]
impl DownloadClient for ScriptedClient {
    async fn download(&self, request: DownloadRequest) -> Result<(), ClientError> {
        if let Some(progress) = &request.on_progress {
            progress(100);
        }
        if request.url.contains("fail") {
            return Err(ClientError::RetriesExhausted {
                attempts: 3,
                last: "HTTP 503".to_string(),
            });
        }
        Ok(())
    }
}

fn test_config(dir: &std::path::Path) -> HdmConfig {
    HdmConfig {
        max_concurrent_downloads: 2,
        downloads_dir: Some(dir.join("downloads")),
        orchestrate_interval_secs: 1,
        queue_capacity: 16,
        client_max_retries: 1,
        attempt_timeout_secs: None,
        log_file: None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn downloads_run_to_terminal_states() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = StateDb::open_at(dir.path().join("state.db")).await?;

    db.upsert_hoster(&Hoster {
        id: "alpha".to_string(),
        name: "Alpha Host".to_string(),
        max_concurrency: 2,
        active: true,
    })
    .await?;
    db.add_download("alpha", "https://alpha.example.com/one.bin", "one", 5)
        .await?;
    db.add_download("alpha", "https://alpha.example.com/two.bin", "two", 1)
        .await?;
    db.add_download("alpha", "https://alpha.example.com/fail.bin", "three", 9)
        .await?;

    let handle = engine::start(db.clone(), &test_config(dir.path()), Arc::new(ScriptedClient)).await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let pending = db.get_by_status(DownloadStatus::Pending).await?;
        let downloading = db.get_by_status(DownloadStatus::Downloading).await?;
        if pending.is_empty() && downloading.is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "downloads did not reach terminal states in time"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let success = db.get_by_status(DownloadStatus::Success).await?;
    let failed = db.get_by_status(DownloadStatus::Failed).await?;
    assert_eq!(success.len(), 2);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].url.contains("fail"));

    assert_eq!(handle.active_count(), 0);
    assert_eq!(handle.ledger().total_in_flight(), 0);
    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn hourly_cap_blocks_further_attempts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = StateDb::open_at(dir.path().join("state.db")).await?;

    db.upsert_hoster(&Hoster {
        id: "beta".to_string(),
        name: "Beta Host".to_string(),
        max_concurrency: 3,
        active: true,
    })
    .await?;
    db.set_limits(
        "beta",
        &HosterLimits {
            hourly: Some(1),
            daily: None,
            monthly: None,
        },
    )
    .await?;
    db.add_download("beta", "https://beta.example.com/a.bin", "a", 0)
        .await?;
    db.add_download("beta", "https://beta.example.com/b.bin", "b", 0)
        .await?;

    let handle = engine::start(db.clone(), &test_config(dir.path()), Arc::new(ScriptedClient)).await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if db.get_by_status(DownloadStatus::Success).await?.len() == 1 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "first download never completed"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Give the periodic pass a chance to (wrongly) pick up the second one.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(db.get_by_status(DownloadStatus::Success).await?.len(), 1);
    assert_eq!(db.get_by_status(DownloadStatus::Pending).await?.len(), 1);
    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn startup_reconciliation_counts_persisted_in_flight_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = StateDb::open_at(dir.path().join("state.db")).await?;

    db.upsert_hoster(&Hoster {
        id: "gamma".to_string(),
        name: "Gamma Host".to_string(),
        max_concurrency: 2,
        active: true,
    })
    .await?;
    // A previous process died mid-transfer: the row is stuck in downloading.
    let stuck = db
        .add_download("gamma", "https://gamma.example.com/stuck.bin", "stuck", 0)
        .await?
        .unwrap();
    db.set_status(stuck, DownloadStatus::Downloading).await?;
    db.add_download("gamma", "https://gamma.example.com/next.bin", "next", 0)
        .await?;

    let mut cfg = test_config(dir.path());
    cfg.max_concurrent_downloads = 1;
    let handle = engine::start(db.clone(), &cfg, Arc::new(ScriptedClient)).await?;

    // The stuck row occupies the only global slot, so nothing gets admitted.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(handle.ledger().total_in_flight(), 1);
    assert_eq!(handle.ledger().in_flight("gamma"), 1);
    assert_eq!(db.get_by_status(DownloadStatus::Pending).await?.len(), 1);
    assert_eq!(db.get_by_status(DownloadStatus::Success).await?.len(), 0);

    handle.shutdown().await;
    Ok(())
}
