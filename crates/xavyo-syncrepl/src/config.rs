//! Sync configuration
//!
//! Loaded from a YAML file, then overridden from environment variables.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::ldap_url::{LdapUrl, LdapUrlError};
use crate::publisher::DEFAULT_SINK_URL;

/// Configuration file read when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "pypubsub-ldap.yaml";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("invalid LDAP URL: {0}")]
    LdapUrl(#[from] LdapUrlError),
}

/// Configuration of the sync process.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Directory to watch, as an LDAP URL carrying base DN, scope, attributes,
    /// filter and bind credentials.
    pub ldapurl: LdapUrl,

    /// Sink receiving one PUT per change.
    #[serde(default = "default_pubsub_url")]
    pub pubsuburl: String,

    /// Fixed delay before reconnecting after a failure.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Timeout for opening the LDAP connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout for a sink request. No timeout when absent.
    #[serde(default)]
    pub sink_timeout_secs: Option<u64>,

    /// Upgrade plain `ldap://` connections with STARTTLS.
    #[serde(default)]
    pub starttls: bool,
}

fn default_pubsub_url() -> String {
    DEFAULT_SINK_URL.to_string()
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl SyncConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
                path: path.as_ref().display().to_string(),
                source,
            })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key))
    }

    /// Apply overrides from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn apply_overrides<F>(&mut self, reader: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        if let Ok(url) = reader("LDAP_SYNC_URL") {
            self.ldapurl = LdapUrl::parse(&url)?;
        }
        if let Ok(url) = reader("LDAP_SYNC_PUBSUB_URL") {
            self.pubsuburl = url;
        }
        if let Ok(delay) = reader("LDAP_SYNC_RETRY_DELAY_SECS") {
            self.retry_delay_secs = delay.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue("LDAP_SYNC_RETRY_DELAY_SECS".into(), e.to_string())
            })?;
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn sink_timeout(&self) -> Option<Duration> {
        self.sink_timeout_secs.map(Duration::from_secs)
    }
}
