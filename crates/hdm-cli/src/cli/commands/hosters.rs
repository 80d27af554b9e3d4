//! `hdm hosters`: hoster overview with ceilings and remaining quota.

use anyhow::Result;
use hdm_core::quota::{HosterQuota, PeriodQuota, QuotaTracker};
use hdm_core::store::StateDb;

fn fmt_period(q: PeriodQuota) -> String {
    match q {
        PeriodQuota::Unlimited => "-".to_string(),
        PeriodQuota::Remaining(n) => n.max(0).to_string(),
    }
}

pub async fn run_hosters(db: StateDb) -> Result<()> {
    let hosters = db.list_hosters().await?;
    if hosters.is_empty() {
        println!("no hosters configured (try `hdm seed`)");
        return Ok(());
    }

    let tracker = QuotaTracker::new(db.clone());
    println!(
        "{:<12} {:<20} {:>6} {:>8}  quota left (h/d/m)",
        "id", "name", "slots", "active"
    );
    for hoster in hosters {
        let quota = tracker.quota_left(&hoster.id).await?;
        let quota_str = match quota {
            HosterQuota::Unrestricted => "unrestricted".to_string(),
            HosterQuota::Limited(left) => format!(
                "{}/{}/{}",
                fmt_period(left.hourly),
                fmt_period(left.daily),
                fmt_period(left.monthly)
            ),
        };
        println!(
            "{:<12} {:<20} {:>6} {:>8}  {}",
            hoster.id,
            hoster.name,
            hoster.max_concurrency,
            if hoster.active { "yes" } else { "no" },
            quota_str
        );
    }
    Ok(())
}
