//! Hoster directory: read-only view for the scheduler, upserts for seeding.

use anyhow::Result;
use sqlx::Row;

use super::db::StateDb;
use super::types::{Hoster, HosterLimits};

fn row_to_hoster(row: &sqlx::sqlite::SqliteRow) -> Hoster {
    let max_concurrency: i64 = row.get("max_concurrency");
    let active: i64 = row.get("active");
    Hoster {
        id: row.get("id"),
        name: row.get("name"),
        max_concurrency: max_concurrency.max(0) as usize,
        active: active != 0,
    }
}

impl StateDb {
    /// Create or replace a hoster. Used by seeding; real admin flows live
    /// outside the core.
    pub async fn upsert_hoster(&self, hoster: &Hoster) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO hosters (id, name, max_concurrency, active)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                max_concurrency = excluded.max_concurrency,
                active = excluded.active
            "#,
        )
        .bind(&hoster.id)
        .bind(&hoster.name)
        .bind(hoster.max_concurrency as i64)
        .bind(hoster.active as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create or replace the volume limits for a hoster.
    pub async fn set_limits(&self, hoster_id: &str, limits: &HosterLimits) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO hoster_limits (hoster_id, hourly, daily, monthly)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (hoster_id) DO UPDATE SET
                hourly = excluded.hourly,
                daily = excluded.daily,
                monthly = excluded.monthly
            "#,
        )
        .bind(hoster_id)
        .bind(limits.hourly)
        .bind(limits.daily)
        .bind(limits.monthly)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Hosters eligible for scheduling, in stable (id) order so an
    /// orchestration pass always visits them the same way.
    pub async fn list_eligible_hosters(&self) -> Result<Vec<Hoster>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, max_concurrency, active
            FROM hosters
            WHERE active = 1
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_hoster).collect())
    }

    /// Every hoster, eligible or not. Used by the CLI overview.
    pub async fn list_hosters(&self) -> Result<Vec<Hoster>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, max_concurrency, active
            FROM hosters
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_hoster).collect())
    }

    /// Fetch a single hoster.
    pub async fn get_hoster(&self, id: &str) -> Result<Option<Hoster>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, max_concurrency, active
            FROM hosters
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_hoster))
    }

    /// Volume limits for a hoster. `None` means no limits row at all, which
    /// callers must treat as unrestricted rather than zero quota.
    pub async fn get_limits(&self, hoster_id: &str) -> Result<Option<HosterLimits>> {
        let row = sqlx::query(
            r#"
            SELECT hourly, daily, monthly
            FROM hoster_limits
            WHERE hoster_id = ?1
            "#,
        )
        .bind(hoster_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| HosterLimits {
            hourly: row.get("hourly"),
            daily: row.get("daily"),
            monthly: row.get("monthly"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::db::open_memory;
    use super::*;

    fn hoster(id: &str, active: bool) -> Hoster {
        Hoster {
            id: id.to_string(),
            name: format!("Hoster {}", id),
            max_concurrency: 4,
            active,
        }
    }

    #[tokio::test]
    async fn eligible_hosters_filtered_and_ordered() -> anyhow::Result<()> {
        let db = open_memory().await?;
        db.upsert_hoster(&hoster("beta", true)).await?;
        db.upsert_hoster(&hoster("alpha", true)).await?;
        db.upsert_hoster(&hoster("gamma", false)).await?;

        let eligible = db.list_eligible_hosters().await?;
        let ids: Vec<&str> = eligible.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);

        assert_eq!(db.list_hosters().await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn limits_distinguish_missing_row_from_partial_caps() -> anyhow::Result<()> {
        let db = open_memory().await?;
        db.upsert_hoster(&hoster("h1", true)).await?;

        // No row at all: unrestricted.
        assert!(db.get_limits("h1").await?.is_none());

        // Partial row: hourly capped, other periods unlimited.
        db.set_limits(
            "h1",
            &HosterLimits {
                hourly: Some(10),
                daily: None,
                monthly: None,
            },
        )
        .await?;
        let limits = db.get_limits("h1").await?.unwrap();
        assert_eq!(limits.hourly, Some(10));
        assert_eq!(limits.daily, None);
        assert_eq!(limits.monthly, None);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_hoster_replaces_fields() -> anyhow::Result<()> {
        let db = open_memory().await?;
        db.upsert_hoster(&hoster("h1", true)).await?;
        let mut updated = hoster("h1", false);
        updated.max_concurrency = 9;
        db.upsert_hoster(&updated).await?;

        let got = db.get_hoster("h1").await?.unwrap();
        assert_eq!(got.max_concurrency, 9);
        assert!(!got.active);
        Ok(())
    }
}
