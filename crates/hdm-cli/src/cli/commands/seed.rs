//! `hdm seed`: sample hosters, limits, and pending downloads for trying the
//! scheduler out. Upserts, so running it twice is harmless.

use anyhow::Result;
use hdm_core::store::{Hoster, HosterLimits, StateDb};

pub async fn run_seed(db: StateDb) -> Result<()> {
    let hosters = [
        (
            Hoster {
                id: "rapidfile".to_string(),
                name: "RapidFile".to_string(),
                max_concurrency: 3,
                active: true,
            },
            Some(HosterLimits {
                hourly: Some(10),
                daily: Some(100),
                monthly: Some(1000),
            }),
        ),
        (
            Hoster {
                id: "megashare".to_string(),
                name: "MegaShare".to_string(),
                max_concurrency: 1,
                active: true,
            },
            Some(HosterLimits {
                hourly: Some(2),
                daily: None,
                monthly: None,
            }),
        ),
        (
            Hoster {
                id: "freestore".to_string(),
                name: "FreeStore".to_string(),
                max_concurrency: 5,
                active: true,
            },
            None,
        ),
    ];

    for (hoster, limits) in &hosters {
        db.upsert_hoster(hoster).await?;
        if let Some(limits) = limits {
            db.set_limits(&hoster.id, limits).await?;
        }
    }

    let downloads = [
        ("rapidfile", "https://rapidfile.example.com/debian-12.5.0-amd64-netinst.iso", 5),
        ("rapidfile", "https://rapidfile.example.com/ubuntu-24.04-live-server.iso", 1),
        ("megashare", "https://megashare.example.com/dataset-2024.tar.gz", 0),
        ("freestore", "https://freestore.example.com/backup-weekly.zip", 3),
    ];

    let mut added = 0;
    for (hoster, url, priority) in downloads {
        if db.add_download(hoster, url, url, priority).await?.is_some() {
            added += 1;
        }
    }

    println!("seeded {} hosters, {} new downloads", hosters.len(), added);
    Ok(())
}
