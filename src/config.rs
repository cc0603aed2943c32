//! Harness configuration.
//!
//! Resolution order: built-in defaults, then the TOML file, then whatever the
//! caller overrides from flags or environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use serde::Deserialize;
use thiserror::Error;

use crate::retry::RetryPolicy;

const CONFIG_DIR: &str = "acctest";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub terraform_bin: PathBuf,
    /// Parent directory; each case gets its own subdirectory.
    pub work_dir: PathBuf,
    pub probe_retry: RetrySettings,
    pub tolerate_access_revoked: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            terraform_bin: PathBuf::from("terraform"),
            work_dir: std::env::temp_dir().join(CONFIG_DIR),
            probe_retry: RetrySettings::default(),
            tolerate_access_revoked: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay_ms: 1_000,
            max_delay_ms: 20_000,
        }
    }
}

impl HarnessConfig {
    /// `~/.config/acctest/config.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads `path` if given, otherwise the default location when it exists.
    ///
    /// An explicit path that cannot be read is an error; a missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.probe_retry.max_attempts,
            Duration::from_millis(self.probe_retry.initial_delay_ms),
            Duration::from_millis(self.probe_retry.max_delay_ms),
        )
    }

    /// Shared AWS configuration built from the default credential chain.
    pub async fn sdk_config(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &self.profile {
            loader = loader.profile_name(profile);
        }
        loader.load().await
    }
}
