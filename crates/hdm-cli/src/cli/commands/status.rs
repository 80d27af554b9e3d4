//! `hdm status`: downloads grouped by lifecycle status.

use anyhow::Result;
use hdm_core::store::{DownloadStatus, StateDb};

pub async fn run_status(db: StateDb) -> Result<()> {
    let downloads = db.list_downloads().await?;
    if downloads.is_empty() {
        println!("no downloads");
        return Ok(());
    }

    for status in [
        DownloadStatus::Downloading,
        DownloadStatus::Pending,
        DownloadStatus::Failed,
        DownloadStatus::Success,
    ] {
        let group: Vec<_> = downloads.iter().filter(|d| d.status == status).collect();
        if group.is_empty() {
            continue;
        }
        println!("{} ({}):", status.as_str(), group.len());
        for d in group {
            println!(
                "  #{:<5} {:<12} prio {:<3} {}",
                d.id, d.hoster_id, d.priority, d.url
            );
        }
    }
    Ok(())
}
