use anyhow::{anyhow, Context, Result};
use log::{info, LevelFilter};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::realtime::RECENTLY_OFFLINE_WINDOW_SECS;
use crate::transport::protocol::MAX_FRAME_BYTES;

pub const ENV_LISTEN: &str = "CHATTERBOX_LISTEN";
pub const ENV_PRESENCE_WINDOW: &str = "CHATTERBOX_PRESENCE_WINDOW_SECS";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    /// Seconds a disconnected user stays RecentlyOffline
    pub presence_window_secs: i64,
    /// Outbound queue length per connected session
    pub session_buffer: usize,
    /// Longest client line accepted, in bytes
    pub max_frame_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            listen_addr: "127.0.0.1:5050".to_string(),
            presence_window_secs: RECENTLY_OFFLINE_WINDOW_SECS,
            session_buffer: 100,
            max_frame_bytes: MAX_FRAME_BYTES,
            log_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn presence_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.presence_window_secs)
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| anyhow!("Unknown log level '{}'", self.log_level))
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup(ENV_LISTEN) {
            self.listen_addr = addr;
        }
        if let Some(secs) = lookup(ENV_PRESENCE_WINDOW) {
            self.presence_window_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds, got '{}'", ENV_PRESENCE_WINDOW, secs))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.presence_window_secs <= 0 {
            return Err(anyhow!("presence_window_secs must be positive"));
        }
        if self.session_buffer == 0 {
            return Err(anyhow!("session_buffer must be at least 1"));
        }
        if self.max_frame_bytes == 0 {
            return Err(anyhow!("max_frame_bytes must be at least 1"));
        }
        self.log_level_filter()?;
        Ok(())
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("chatterbox-relay");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Load the config from `path`, or from the default location when `None`.
/// A missing default file yields the defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default_path = get_config_dir()?.join("config.json");
            if !default_path.exists() {
                info!("No config at {}, using defaults", default_path.display());
                return Ok(RelayConfig::default());
            }
            default_path
        }
    };

    let mut file = File::open(&config_path)
        .with_context(|| format!("Failed to open config {}", config_path.display()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let config: RelayConfig = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid config {}", config_path.display()))?;
    info!("Loaded config from {}", config_path.display());

    Ok(config)
}

pub fn save_config(config: &RelayConfig, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;
    info!("Config saved to {}", path.display());
    Ok(())
}
