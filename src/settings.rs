//! Persisted user settings (LdA account and callsigns).
//!
//! Stored as JSON so it stays editable by hand:
//!
//! ```json
//! {
//!   "username": "lu9wt",
//!   "password": "secret",
//!   "mainCallSign": "LU9WT",
//!   "aliases": ["LU9WT/P"],
//!   "lastUpdated": "2024-01-01T12:00:00Z"
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::qso::Credentials;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid JSON in settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write settings file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Contents of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub username: String,
    pub password: String,
    pub main_call_sign: String,
    /// Other callsigns the operator logs under.
    pub aliases: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Settings {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password, &self.main_call_sign)
    }
}

/// Location of the settings file. Every [`SettingsStore::load`] reads the
/// file again, so edits apply to the next message without a restart.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the default path to the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("qso-relay/settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings file. A file that does not exist yet reads as empty
    /// settings.
    pub async fn load(&self) -> Result<Settings, SettingsError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings file at {}", self.path.display());
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Write `settings`, stamping `lastUpdated`. Creates the parent directory
    /// if needed.
    pub async fn save(&self, settings: &Settings) -> Result<Settings, SettingsError> {
        let mut settings = settings.clone();
        settings.last_updated = Some(Utc::now());

        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await.map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(&settings)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(write_err)?;

        Ok(settings)
    }
}
