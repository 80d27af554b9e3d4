//! Download row operations: intake, pending selection, status transitions,
//! quota counting, and startup reconciliation queries.

use anyhow::Result;
use sqlx::Row;
use std::collections::HashMap;

use super::db::{unix_timestamp, StateDb};
use super::types::{DownloadId, DownloadRow, DownloadStatus, TransitionError};

fn row_to_download(row: &sqlx::sqlite::SqliteRow) -> DownloadRow {
    let status: String = row.get("status");
    DownloadRow {
        id: row.get("id"),
        hoster_id: row.get("hoster_id"),
        url: row.get("url"),
        fingerprint: row.get("fingerprint"),
        priority: row.get("priority"),
        status: DownloadStatus::from_str(&status),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl StateDb {
    /// Insert a new pending download. Returns `None` when the
    /// (hoster, fingerprint) pair already exists (dedup key).
    pub async fn add_download(
        &self,
        hoster_id: &str,
        url: &str,
        fingerprint: &str,
        priority: i64,
    ) -> Result<Option<DownloadId>> {
        let now = unix_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO downloads (hoster_id, url, fingerprint, priority, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (hoster_id, fingerprint) DO NOTHING
            "#,
        )
        .bind(hoster_id)
        .bind(url)
        .bind(fingerprint)
        .bind(priority)
        .bind(DownloadStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(result.last_insert_rowid()))
    }

    /// Fetch up to `limit` pending downloads for one hoster, highest priority
    /// first, oldest first within equal priority.
    pub async fn get_pending_by_hoster(
        &self,
        hoster_id: &str,
        limit: i64,
    ) -> Result<Vec<DownloadRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, hoster_id, url, fingerprint, priority, status, created_at, updated_at
            FROM downloads
            WHERE hoster_id = ?1 AND status = 'pending'
            ORDER BY priority DESC, created_at ASC, id ASC
            LIMIT ?2
            "#,
        )
        .bind(hoster_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_download).collect())
    }

    /// Count download attempts for a hoster since `since` (Unix seconds).
    /// Any attempt consumes quota: downloading, success, and failed all count.
    pub async fn count_attempts_since(&self, hoster_id: &str, since: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM downloads
            WHERE hoster_id = ?1
              AND updated_at >= ?2
              AND status IN ('downloading', 'success', 'failed')
            "#,
        )
        .bind(hoster_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("n"))
    }

    /// All downloads currently in the given status.
    pub async fn get_by_status(&self, status: DownloadStatus) -> Result<Vec<DownloadRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, hoster_id, url, fingerprint, priority, status, created_at, updated_at
            FROM downloads
            WHERE status = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_download).collect())
    }

    /// In-flight counts per hoster, for rebuilding the concurrency ledger on startup.
    pub async fn downloading_counts_by_hoster(&self) -> Result<HashMap<String, usize>> {
        let rows = sqlx::query(
            r#"
            SELECT hoster_id, COUNT(*) AS n
            FROM downloads
            WHERE status = 'downloading'
            GROUP BY hoster_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let hoster_id: String = row.get("hoster_id");
            let n: i64 = row.get("n");
            out.insert(hoster_id, n as usize);
        }
        Ok(out)
    }

    /// Fetch a single download row.
    pub async fn get_download(&self, id: DownloadId) -> Result<Option<DownloadRow>> {
        let row = sqlx::query(
            r#"
            SELECT id, hoster_id, url, fingerprint, priority, status, created_at, updated_at
            FROM downloads
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_download))
    }

    /// List every download row, newest first. Used by the CLI status view.
    pub async fn list_downloads(&self) -> Result<Vec<DownloadRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, hoster_id, url, fingerprint, priority, status, created_at, updated_at
            FROM downloads
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_download).collect())
    }

    /// Move a download to `next`, enforcing the forward-only state machine.
    ///
    /// The current status is read and validated in the same transaction as the
    /// update, so a concurrent writer cannot slip an illegal transition through.
    pub async fn set_status(&self, id: DownloadId, next: DownloadStatus) -> Result<()> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT status FROM downloads WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            anyhow::bail!("download {} not found", id);
        };
        let current_str: String = row.get("status");
        let current = DownloadStatus::from_str(&current_str);

        if !current.can_transition_to(next) {
            tx.commit().await?;
            return Err(TransitionError {
                id,
                from: current,
                to: next,
            }
            .into());
        }

        sqlx::query(
            r#"
            UPDATE downloads
            SET status = ?1,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(next.as_str())
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Test seam: insert a download with an explicit status and timestamp so
    /// quota windows and reconciliation can be exercised deterministically.
    #[cfg(test)]
    pub(crate) async fn insert_with_status(
        &self,
        hoster_id: &str,
        fingerprint: &str,
        status: DownloadStatus,
        timestamp: i64,
    ) -> Result<DownloadId> {
        let result = sqlx::query(
            r#"
            INSERT INTO downloads (hoster_id, url, fingerprint, priority, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5)
            "#,
        )
        .bind(hoster_id)
        .bind(format!("https://{}.example.com/{}", hoster_id, fingerprint))
        .bind(fingerprint)
        .bind(status.as_str())
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
