//! Configuration file management for treadle.
//!
//! Provides a TOML-based config file at `~/.config/treadle/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATE_FILE: &str = "treadle_state.json";
pub const DEFAULT_POOL_SIZE: usize = 10;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Path of the durable queue state file.
    pub state_file: String,
    /// Soft admission cap for newly scheduled jobs.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the treadle config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/treadle` or `~/.config/treadle`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("treadle");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("treadle")
}

/// Return the path to the treadle config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct TreadleConfig {
    pub state_file: PathBuf,
    pub pool_size: usize,
}

impl TreadleConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - State file: `cli_state_file` > `TREADLE_STATE_FILE` env >
    ///   `config_file.scheduler.state_file` > [`DEFAULT_STATE_FILE`]
    /// - Pool size: `cli_pool_size` > `TREADLE_POOL_SIZE` env >
    ///   `config_file.scheduler.pool_size` > [`DEFAULT_POOL_SIZE`]
    pub fn resolve(cli_state_file: Option<&str>, cli_pool_size: Option<usize>) -> Result<Self> {
        let file_config = load_config().ok();

        let state_file = if let Some(path) = cli_state_file {
            path.to_string()
        } else if let Ok(path) = std::env::var("TREADLE_STATE_FILE") {
            path
        } else if let Some(ref cfg) = file_config {
            cfg.scheduler.state_file.clone()
        } else {
            DEFAULT_STATE_FILE.to_string()
        };

        let pool_size = if let Some(size) = cli_pool_size {
            size
        } else if let Ok(raw) = std::env::var("TREADLE_POOL_SIZE") {
            raw.parse()
                .context("TREADLE_POOL_SIZE env var is not a valid pool size")?
        } else if let Some(ref cfg) = file_config {
            cfg.scheduler.pool_size
        } else {
            DEFAULT_POOL_SIZE
        };

        Ok(Self {
            state_file: PathBuf::from(state_file),
            pool_size,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
