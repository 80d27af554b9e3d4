use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_orchestrate_interval() -> u64 {
    3600
}

fn default_queue_capacity() -> usize {
    256
}

fn default_client_max_retries() -> u32 {
    3
}

fn default_attempt_timeout() -> Option<u64> {
    // A stuck transfer would otherwise hold a concurrency slot forever.
    Some(3600)
}

/// Global configuration loaded from `~/.config/hdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HdmConfig {
    /// Maximum concurrent downloads across all hosters (worker pool size).
    pub max_concurrent_downloads: usize,
    /// Directory where finished files are written. Defaults to
    /// `~/.local/share/hdm/downloads` when unset.
    #[serde(default)]
    pub downloads_dir: Option<PathBuf>,
    /// Log file path. Defaults to `~/.local/state/hdm/hdm.log` when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Seconds between periodic orchestration passes (default hourly).
    #[serde(default = "default_orchestrate_interval")]
    pub orchestrate_interval_secs: u64,
    /// Capacity of the work queue between orchestrator and workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Retry attempts the transfer client makes per download.
    #[serde(default = "default_client_max_retries")]
    pub client_max_retries: u32,
    /// Per-attempt transfer timeout in seconds (None = no timeout).
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: Option<u64>,
}

impl Default for HdmConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 10,
            downloads_dir: None,
            log_file: None,
            orchestrate_interval_secs: default_orchestrate_interval(),
            queue_capacity: default_queue_capacity(),
            client_max_retries: default_client_max_retries(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

impl HdmConfig {
    /// Resolve the downloads directory: the configured path, or the XDG data dir.
    pub fn resolve_downloads_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.downloads_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("hdm")?;
        Ok(xdg_dirs.get_data_home().join("hdm").join("downloads"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("hdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<HdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = HdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: HdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
