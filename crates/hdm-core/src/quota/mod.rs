//! Per-hoster quota tracking over rolling hour/day/month windows.
//!
//! Usage is derived at read time from the download state store: every attempt
//! (downloading, success, or failed) whose `updated_at` falls inside a window
//! consumes quota for that window. Nothing is cached; the store is the single
//! source of truth.

mod window;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};

use crate::store::StateDb;

/// Remaining quota for one period. `Remaining` may go negative when a cap was
/// lowered after attempts were already made; callers clamp as needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodQuota {
    /// No cap configured for this period.
    Unlimited,
    /// `cap - used` for a configured period.
    Remaining(i64),
}

impl PeriodQuota {
    pub fn remaining(&self) -> Option<i64> {
        match self {
            PeriodQuota::Unlimited => None,
            PeriodQuota::Remaining(n) => Some(*n),
        }
    }

    fn exhausted(&self) -> bool {
        matches!(self, PeriodQuota::Remaining(n) if *n <= 0)
    }
}

/// Remaining quota across all three periods for one hoster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLeft {
    pub hourly: PeriodQuota,
    pub daily: PeriodQuota,
    pub monthly: PeriodQuota,
}

impl QuotaLeft {
    /// Smallest remaining count over the configured periods, or `None` when
    /// every period is unlimited.
    pub fn min_remaining(&self) -> Option<i64> {
        [self.hourly, self.daily, self.monthly]
            .iter()
            .filter_map(|p| p.remaining())
            .min()
    }

    /// True when any configured period has no quota left.
    pub fn exhausted(&self) -> bool {
        [self.hourly, self.daily, self.monthly]
            .iter()
            .any(|p| p.exhausted())
    }
}

/// Quota view for one hoster. A hoster without any limits row is
/// `Unrestricted`, which is distinct from a hoster whose caps are used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HosterQuota {
    Unrestricted,
    Limited(QuotaLeft),
}

impl HosterQuota {
    pub fn exhausted(&self) -> bool {
        match self {
            HosterQuota::Unrestricted => false,
            HosterQuota::Limited(left) => left.exhausted(),
        }
    }

    /// Smallest configured remaining count; `None` means no bound applies.
    pub fn min_remaining(&self) -> Option<i64> {
        match self {
            HosterQuota::Unrestricted => None,
            HosterQuota::Limited(left) => left.min_remaining(),
        }
    }
}

/// Computes remaining quota per hoster from the state store.
#[derive(Clone)]
pub struct QuotaTracker {
    db: StateDb,
}

impl QuotaTracker {
    pub fn new(db: StateDb) -> Self {
        Self { db }
    }

    /// Remaining quota for a hoster, evaluated at the current local time.
    pub async fn quota_left(&self, hoster_id: &str) -> Result<HosterQuota> {
        self.quota_left_at(hoster_id, &Local::now()).await
    }

    /// True iff any configured period is used up. Unconfigured periods (and
    /// hosters without a limits row) never block.
    pub async fn has_reached_quota(&self, hoster_id: &str) -> Result<bool> {
        Ok(self.quota_left(hoster_id).await?.exhausted())
    }

    /// Time-injectable variant so tests can pin the evaluation instant.
    pub(crate) async fn quota_left_at<Tz: TimeZone>(
        &self,
        hoster_id: &str,
        now: &DateTime<Tz>,
    ) -> Result<HosterQuota> {
        let Some(limits) = self.db.get_limits(hoster_id).await? else {
            return Ok(HosterQuota::Unrestricted);
        };

        // Each configured period is evaluated independently; a partially
        // configured limits row caps only the periods it names.
        let hourly = self
            .period_quota(hoster_id, limits.hourly, window::hour_start(now))
            .await?;
        let daily = self
            .period_quota(hoster_id, limits.daily, window::day_start(now))
            .await?;
        let monthly = self
            .period_quota(hoster_id, limits.monthly, window::month_start(now))
            .await?;

        Ok(HosterQuota::Limited(QuotaLeft {
            hourly,
            daily,
            monthly,
        }))
    }

    async fn period_quota(
        &self,
        hoster_id: &str,
        cap: Option<i64>,
        window_start: i64,
    ) -> Result<PeriodQuota> {
        let Some(cap) = cap else {
            return Ok(PeriodQuota::Unlimited);
        };
        let used = self.db.count_attempts_since(hoster_id, window_start).await?;
        Ok(PeriodQuota::Remaining(cap - used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::open_memory;
    use crate::store::{DownloadStatus, Hoster, HosterLimits, StateDb};
    use chrono::{TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap()
    }

    async fn seed(db: &StateDb, limits: Option<HosterLimits>) -> anyhow::Result<()> {
        db.upsert_hoster(&Hoster {
            id: "h1".to_string(),
            name: "Hoster One".to_string(),
            max_concurrency: 3,
            active: true,
        })
        .await?;
        if let Some(limits) = limits {
            db.set_limits("h1", &limits).await?;
        }
        Ok(())
    }

    /// Insert `n` attempts with `updated_at` pinned to `ts`.
    async fn attempts(db: &StateDb, prefix: &str, n: i64, ts: i64) -> anyhow::Result<()> {
        for i in 0..n {
            db.insert_with_status(
                "h1",
                &format!("{}-{}", prefix, i),
                DownloadStatus::Success,
                ts,
            )
            .await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn quota_left_subtracts_usage_per_period() -> anyhow::Result<()> {
        let db = open_memory().await?;
        seed(
            &db,
            Some(HosterLimits {
                hourly: Some(10),
                daily: Some(100),
                monthly: Some(1000),
            }),
        )
        .await?;

        let now = now();
        // Five attempts inside the current hour count against all windows.
        attempts(&db, "h", 5, now.timestamp() - 60).await?;

        let tracker = QuotaTracker::new(db);
        let quota = tracker.quota_left_at("h1", &now).await?;
        let HosterQuota::Limited(left) = quota else {
            panic!("expected limited quota");
        };
        assert_eq!(left.hourly, PeriodQuota::Remaining(5));
        assert_eq!(left.daily, PeriodQuota::Remaining(95));
        assert_eq!(left.monthly, PeriodQuota::Remaining(995));
        assert_eq!(left.min_remaining(), Some(5));
        assert!(!quota.exhausted());
        Ok(())
    }

    #[tokio::test]
    async fn attempts_in_older_windows_only_count_toward_wider_periods() -> anyhow::Result<()> {
        let db = open_memory().await?;
        seed(
            &db,
            Some(HosterLimits {
                hourly: Some(10),
                daily: Some(100),
                monthly: Some(1000),
            }),
        )
        .await?;

        let now = now();
        let yesterday = Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap();
        let last_month = Utc.with_ymd_and_hms(2024, 2, 20, 12, 0, 0).unwrap();
        attempts(&db, "today", 2, now.timestamp() - 60).await?;
        attempts(&db, "yday", 3, yesterday.timestamp()).await?;
        attempts(&db, "feb", 4, last_month.timestamp()).await?;

        let tracker = QuotaTracker::new(db);
        let HosterQuota::Limited(left) = tracker.quota_left_at("h1", &now).await? else {
            panic!("expected limited quota");
        };
        assert_eq!(left.hourly, PeriodQuota::Remaining(8));
        assert_eq!(left.daily, PeriodQuota::Remaining(98));
        // February attempts are outside the March window.
        assert_eq!(left.monthly, PeriodQuota::Remaining(995));
        Ok(())
    }

    #[tokio::test]
    async fn one_exhausted_period_reaches_quota_regardless_of_others() -> anyhow::Result<()> {
        let db = open_memory().await?;
        seed(
            &db,
            Some(HosterLimits {
                hourly: Some(10),
                daily: Some(100),
                monthly: Some(1000),
            }),
        )
        .await?;

        let now = now();
        attempts(&db, "h", 10, now.timestamp() - 60).await?;

        let tracker = QuotaTracker::new(db);
        let quota = tracker.quota_left_at("h1", &now).await?;
        assert!(quota.exhausted());
        assert_eq!(quota.min_remaining(), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn missing_limits_row_is_unrestricted_not_zero() -> anyhow::Result<()> {
        let db = open_memory().await?;
        seed(&db, None).await?;

        let now = now();
        attempts(&db, "h", 50, now.timestamp() - 60).await?;

        let tracker = QuotaTracker::new(db);
        let quota = tracker.quota_left_at("h1", &now).await?;
        assert_eq!(quota, HosterQuota::Unrestricted);
        assert!(!quota.exhausted());
        assert_eq!(quota.min_remaining(), None);
        Ok(())
    }

    #[tokio::test]
    async fn partial_limits_cap_only_configured_periods() -> anyhow::Result<()> {
        let db = open_memory().await?;
        seed(
            &db,
            Some(HosterLimits {
                hourly: Some(3),
                daily: None,
                monthly: None,
            }),
        )
        .await?;

        let now = now();
        attempts(&db, "h", 3, now.timestamp() - 60).await?;

        let tracker = QuotaTracker::new(db);
        let quota = tracker.quota_left_at("h1", &now).await?;
        let HosterQuota::Limited(left) = quota else {
            panic!("expected limited quota");
        };
        assert_eq!(left.hourly, PeriodQuota::Remaining(0));
        assert_eq!(left.daily, PeriodQuota::Unlimited);
        assert_eq!(left.monthly, PeriodQuota::Unlimited);
        assert!(quota.exhausted());
        Ok(())
    }
}
