//! Configuration file support for the relay.
//!
//! Loads settings from `~/.config/qso-relay/config.toml` on Linux
//! (or platform-appropriate location on other OSes). The LdA account itself
//! lives in the separate settings file, see [`crate::settings`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use crate::profile::Registry;
use crate::settings::SettingsStore;
use crate::upload::LDA_API_URL;

/// Application configuration loaded from TOML file.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging program to listen for at startup.
    pub software: String,

    /// Address the UDP listener binds to.
    pub bind_address: IpAddr,

    /// LdA submission endpoint.
    pub api_url: String,

    /// Settings file path. Defaults to the platform config directory.
    pub settings_path: Option<PathBuf>,

    /// Per-software listen port overrides, keyed by software id.
    pub ports: HashMap<String, u16>,

    /// Print statistics every N seconds (0 = never).
    pub stats_interval: u64,

    /// Enable Prometheus metrics HTTP endpoint.
    pub metrics_enabled: bool,

    /// Port for Prometheus metrics HTTP endpoint.
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            software: "log4om".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            api_url: LDA_API_URL.to_string(),
            settings_path: None,
            ports: HashMap::new(),
            stats_interval: 0,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("qso-relay/config.toml"))
    }

    /// Build the profile registry with the configured port overrides applied.
    pub fn registry(&self) -> Result<Registry> {
        Registry::builtin()
            .with_ports(self.ports.iter().map(|(id, port)| (id.as_str(), *port)))
            .context("Invalid [ports] override")
    }

    /// Settings store at the configured or default location.
    pub fn settings_store(&self) -> Result<SettingsStore> {
        self.settings_path
            .clone()
            .or_else(SettingsStore::default_path)
            .map(SettingsStore::new)
            .context("No settings path configured and no config directory available")
    }

    /// Validate all configuration settings.
    pub fn validate(&self) -> Result<()> {
        let registry = self.registry()?;
        registry.require(&self.software)?;

        if self.api_url.trim().is_empty() {
            anyhow::bail!("api_url must not be empty");
        }
        Ok(())
    }
}
