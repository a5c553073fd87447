//! Configuration file structure (kiln.toml).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use kiln_server::{local_network_ip, DevServerConfig};
use kiln_tasks::{Category, ConfigError, PathEntry, PathRegistry};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    /// Defaults to the LAN address
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_open")]
    pub open: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            open: default_open(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WatchSettings {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}

/// `[paths]`: an optional output root plus one table per overridden category.
#[derive(Debug, Deserialize, Default)]
pub struct PathsConfig {
    pub root: Option<PathBuf>,
    #[serde(flatten)]
    pub entries: BTreeMap<Category, PathEntry>,
}

fn default_port() -> u16 {
    3000
}
fn default_open() -> bool {
    true
}
fn default_delay_ms() -> u64 {
    200
}

impl ConfigFile {
    /// The default path table with this file's overrides applied.
    pub fn registry(&self) -> Result<PathRegistry, ConfigError> {
        PathRegistry::with_overrides(
            self.paths.root.clone(),
            self.paths
                .entries
                .iter()
                .map(|(category, entry)| (*category, entry.clone())),
        )
    }

    /// Delay between a change event and the task run.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.watch.delay_ms)
    }

    /// Server settings for serving `root`; command-line flags take precedence.
    pub fn server_config(&self, root: PathBuf, port: Option<u16>, no_open: bool) -> DevServerConfig {
        DevServerConfig {
            root,
            host: self
                .server
                .host
                .clone()
                .unwrap_or_else(|| local_network_ip().to_string()),
            port: port.unwrap_or(self.server.port),
            open: self.server.open && !no_open,
            ..Default::default()
        }
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config = parse_config(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        tracing::info!("Loaded config from {}", path.display());
        return Ok(config);
    }
    Ok(ConfigFile::default())
}

fn parse_config(content: &str) -> Result<ConfigFile, toml::de::Error> {
    toml::from_str(content)
}
