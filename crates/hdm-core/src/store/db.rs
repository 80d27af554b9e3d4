//! SQLite-backed state database: connection, migrations, timestamp helpers.
//!
//! Hoster and download CRUD lives in `hosters` and `downloads`.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the SQLite-backed state database.
///
/// The database file lives under the XDG state directory:
/// `~/.local/state/hdm/state.db`.
#[derive(Clone)]
pub struct StateDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl StateDb {
    /// Open (or create) the default state database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("hdm")?;
        let state_dir = xdg_dirs.get_state_home().join("hdm");
        let db_path = state_dir.join("state.db");

        // Ensure parent directory exists.
        tokio::fs::create_dir_all(&state_dir).await?;

        let uri = path_to_sqlite_uri(&db_path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;

        let db = StateDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    /// Intended for tests so the DB can be placed in a temp directory.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;
        let db = StateDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        // Hosters and their limits are written by an external admin process
        // (and the CLI seed command); the core only reads them.
        //
        // - a NULL cap in hoster_limits means that period is unlimited
        // - (hoster_id, fingerprint) is the download dedup key
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hosters (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                max_concurrency INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hoster_limits (
                hoster_id TEXT PRIMARY KEY REFERENCES hosters(id),
                hourly INTEGER,
                daily INTEGER,
                monthly INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hoster_id TEXT NOT NULL REFERENCES hosters(id),
                url TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (hoster_id, fingerprint)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_downloads_hoster_status
            ON downloads (hoster_id, status, priority DESC, created_at ASC);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Current time as Unix seconds (for DB timestamps).
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<StateDb> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let db = StateDb { pool };
    db.migrate().await?;
    Ok(db)
}
