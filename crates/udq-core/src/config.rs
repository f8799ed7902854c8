use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Lowest accepted concurrency limit.
pub const MIN_CONCURRENT: usize = 1;
/// Highest accepted concurrency limit.
pub const MAX_CONCURRENT: usize = 10;

/// Clamps a requested concurrency limit into `[MIN_CONCURRENT, MAX_CONCURRENT]`.
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(MIN_CONCURRENT, MAX_CONCURRENT)
}

/// Transfer backend: simulated progress (demo/testing) or a real HTTP transfer via libcurl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferBackend {
    #[default]
    Simulated,
    Http,
}

/// Tuning for the simulated transfer (optional `[simulated]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// Smallest progress step per sample, in percent.
    pub min_step_percent: f64,
    /// Largest progress step per sample, in percent.
    pub max_step_percent: f64,
    /// Probability (0.0..=1.0) that a sample fails the transfer.
    pub failure_rate: f64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            min_step_percent: 2.0,
            max_step_percent: 10.0,
            failure_rate: 0.0,
        }
    }
}

/// Global configuration loaded from `~/.config/udq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdqConfig {
    /// Maximum jobs downloading at once. Clamped to [1, 10] when applied.
    pub max_concurrent: usize,
    /// Scheduler tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Transfer sampling cadence in milliseconds.
    pub sample_interval_ms: u64,
    /// Session/owner recorded on every job created by this process.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Transfer backend: "simulated" (default) or "http".
    #[serde(default)]
    pub backend: TransferBackend,
    /// Directory for finished files (http backend). Defaults to the current directory.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Archive completed jobs to `archive.jsonl` in the state dir.
    #[serde(default = "default_archive")]
    pub archive: bool,
    #[serde(default)]
    pub simulated: SimulatedConfig,
}

fn default_archive() -> bool {
    true
}

impl Default for UdqConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            tick_interval_ms: 1000,
            sample_interval_ms: 500,
            owner_id: None,
            backend: TransferBackend::Simulated,
            download_dir: None,
            archive: true,
            simulated: SimulatedConfig::default(),
        }
    }
}

impl UdqConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    /// Concurrency limit after clamping.
    pub fn concurrency(&self) -> usize {
        clamp_concurrency(self.max_concurrent)
    }

    /// Owner id for new jobs: configured value, else `$USER`, else "local".
    pub fn owner(&self) -> String {
        self.owner_id
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "local".to_string())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("udq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// State directory (`~/.local/state/udq`) holding the queue record, archive and socket.
pub fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("udq")?;
    Ok(xdg_dirs.get_state_home())
}

/// Unix socket a running `udq run` listens on for control commands.
pub fn default_control_socket_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("control.sock"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UdqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = UdqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: UdqConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    if cfg.max_concurrent != cfg.concurrency() {
        tracing::warn!(
            requested = cfg.max_concurrent,
            applied = cfg.concurrency(),
            "max_concurrent out of range, clamping"
        );
    }
    Ok(cfg)
}
