//! Logging bootstrap: append-only file sink with a stderr fallback.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,hdm=debug"))
}

/// Default log file under the XDG state dir: `~/.local/state/hdm/hdm.log`.
pub fn default_log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("hdm")?;
    Ok(xdg_dirs.get_state_home().join("hdm").join("hdm.log"))
}

/// Initialize logging to `path`, or to the default state-dir file when `None`
/// (the `log_file` config field feeds this). Errors when the file cannot be
/// opened so the caller can fall back to `init_logging_stderr`.
pub fn init_logging(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_log_path()?,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
        .init();

    tracing::info!("logging to {}", path.display());
    Ok(())
}

/// Stderr-only logging, for when the log file is unwritable.
pub fn init_logging_stderr() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_the_log_file_at_an_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("engine.log");

        init_logging(Some(&path)).unwrap();
        tracing::info!("bootstrap check");

        assert!(path.exists());
    }

    #[test]
    fn fails_when_the_log_path_is_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(init_logging(Some(dir.path())).is_err());
    }
}
