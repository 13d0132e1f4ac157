//! Preferences file and environment settings.
//!
//! Preferences are a small JSON document in the user's home directory holding defaults
//! (project, region, proxy) and the cached OAuth token. Environment settings are read
//! once at startup through the `config` crate's environment source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Prefix of every flowctl environment variable.
pub const ENV_PREFIX: &str = "FLOWCTL";

/// Variable naming the ambient service account credentials file.
pub const CREDENTIALS_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Directory under the home directory holding the preferences file.
pub const PREFERENCES_DIR: &str = ".flowctl";

/// Preferences file name.
pub const PREFERENCES_FILE: &str = "config.json";

/// Errors that can occur while loading or saving configuration.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Cannot find home directory")]
    NoHomeDirectory,
    #[error("IO operation failed on path {path}: {source}")]
    IO {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Preferences file {path} is not valid JSON: {source}")]
    ParsePreferences {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON serialization failed: {source}")]
    SerdeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to read environment settings: {source}")]
    Environment {
        #[source]
        source: config::ConfigError,
    },
}

/// Settings read from `FLOWCTL_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvSettings {
    /// Disables all network I/O; every API call succeeds as a no-op.
    #[serde(default)]
    pub dryrun: bool,
    /// Only errors are logged.
    #[serde(default)]
    pub skiplog: bool,
    /// Debug level logging.
    #[serde(default)]
    pub debug: bool,
    /// Tokens are never written to the preferences file.
    #[serde(default)]
    pub skipcache: bool,
    /// Optional connect timeout for the HTTP client, e.g. "10s".
    #[serde(default, with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    /// Service account credentials path, taken from `GOOGLE_APPLICATION_CREDENTIALS`.
    #[serde(skip)]
    pub credentials_path: Option<PathBuf>,
}

impl EnvSettings {
    /// Reads settings from the process environment.
    pub fn load() -> Result<Self, Error> {
        Self::from_vars(utf8_vars(std::env::vars_os()))
    }

    /// Reads settings from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, Error> {
        let credentials_path = vars.get(CREDENTIALS_ENV_VAR).map(PathBuf::from);

        let source = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(vars));

        let mut settings: EnvSettings = config::Config::builder()
            .add_source(source)
            .build()
            .map_err(|source| Error::Environment { source })?
            .try_deserialize()
            .map_err(|source| Error::Environment { source })?;

        settings.credentials_path = credentials_path;
        Ok(settings)
    }
}

/// Keeps the variables whose name and value are valid UTF-8.
fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Persisted user preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Default project id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Default region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Proxy URL applied to every outbound request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Cached OAuth access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Last time the cached credentials were refreshed and checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl Preferences {
    /// Default preferences file location.
    pub fn default_path() -> Result<PathBuf, Error> {
        let home = dirs::home_dir().ok_or(Error::NoHomeDirectory)?;
        Ok(home.join(PREFERENCES_DIR).join(PREFERENCES_FILE))
    }

    /// Loads preferences from the default location.
    pub fn load() -> Result<Self, Error> {
        Self::load_from(&Self::default_path()?)
    }

    /// Loads preferences from a path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            debug!(path = %path.display(), "No preferences file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| Error::IO {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|source| Error::ParsePreferences {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Saves preferences to the default location.
    pub fn save(&self) -> Result<(), Error> {
        self.save_to(&Self::default_path()?)
    }

    /// Saves preferences to a path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::IO {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|source| Error::SerdeJson { source })?;
        std::fs::write(path, content).map_err(|source| Error::IO {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Saved preferences");
        Ok(())
    }

    /// Records a refreshed token and the time it was obtained.
    pub fn record_token(&mut self, token: String, now: DateTime<Utc>) {
        self.token = Some(token);
        self.last_checked = Some(now);
    }

    /// Whether the last check is older than `interval` (or never happened).
    pub fn check_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_checked {
            Some(last) => match chrono::Duration::from_std(interval) {
                Ok(interval) => now - last >= interval,
                Err(_) => false,
            },
            None => true,
        }
    }
}
