//! Daemon configuration.
//!
//! Settings come from three layers: built-in defaults, an optional TOML
//! file, and command-line flags. Each layer only overrides the keys it sets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// One configuration layer; unset keys fall through to the layer below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub api_port: Option<u16>,
    pub proxy_port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub stop_grace_secs: Option<u64>,
    pub log_format: Option<LogFormat>,
}

impl ConfigLayer {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let layer: ConfigLayer = toml::from_str(&content)?;
        Ok(layer)
    }
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub api_port: u16,
    pub proxy_port: u16,
    pub data_dir: PathBuf,
    pub stop_grace: Duration,
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            proxy_port: 8000,
            data_dir: PathBuf::from("/var/lib/deployflow"),
            stop_grace: Duration::from_secs(5),
            log_format: LogFormat::Text,
        }
    }
}

impl DaemonConfig {
    /// Apply `layer` on top of the current settings.
    pub fn merge(mut self, layer: ConfigLayer) -> Self {
        if let Some(port) = layer.api_port {
            self.api_port = port;
        }
        if let Some(port) = layer.proxy_port {
            self.proxy_port = port;
        }
        if let Some(dir) = layer.data_dir {
            self.data_dir = dir;
        }
        if let Some(secs) = layer.stop_grace_secs {
            self.stop_grace = Duration::from_secs(secs);
        }
        if let Some(format) = layer.log_format {
            self.log_format = format;
        }
        self
    }

    /// Path of the record store inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("deployflow.redb")
    }
}
