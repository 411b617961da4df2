//! TOML settings, overlaid with `NWCD_*` environment variables, mirroring
//! `cdk-mintd::config`/`env_vars`.

use std::path::PathBuf;

use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingOutput {
    /// Log to stderr only
    Stderr,
    /// Log to file only
    File,
    /// Log to both stderr and file (default)
    #[default]
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub output: LoggingOutput,
    pub console_level: Option<String>,
    pub file_level: Option<String>,
}

/// The provider's identity and network endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    /// The relay this provider connects to.
    pub relay: String,
    /// Optional relay URL advertised in pairing URLs instead of `relay`.
    pub relay_alias: Option<String>,
    /// Human-readable label included in `get_info` responses.
    pub alias: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            relay: "wss://relay.damus.io".to_string(),
            relay_alias: None,
            alias: "nwcd".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Top-level settings, loaded from `<work_dir>/config.toml` and overlaid
/// with environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub info: Info,
}

impl Settings {
    /// Load settings from `config_file_name` (or the default location),
    /// falling back to defaults on any error, mirroring
    /// `cdk-mintd::config::Settings::new`.
    #[must_use]
    pub fn new<P>(config_file_name: Option<P>) -> Self
    where
        P: Into<PathBuf>,
    {
        let default_settings = Self::default();
        match Self::new_from_default(&default_settings, config_file_name) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("Error reading config file, falling back to defaults: {e:?}");
                default_settings
            }
        }
    }

    fn new_from_default<P>(default: &Settings, config_file_name: Option<P>) -> Result<Self, ConfigError>
    where
        P: Into<PathBuf>,
    {
        let path = config_file_name
            .map(Into::into)
            .unwrap_or_else(|| PathBuf::from("config.toml"));

        let config = Config::builder()
            .add_source(Config::try_from(default)?)
            .add_source(File::from(path).required(false))
            .build()?;

        config.try_deserialize()
    }

    /// Overlay `NWCD_*` environment variables on top of file/default
    /// settings. Environment variables take priority.
    pub fn from_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(relay) = std::env::var(crate::env_vars::ENV_RELAY) {
            self.info.relay = relay;
        }
        if let Ok(alias) = std::env::var(crate::env_vars::ENV_RELAY_ALIAS) {
            self.info.relay_alias = Some(alias);
        }
        if let Ok(alias) = std::env::var(crate::env_vars::ENV_ALIAS) {
            self.info.alias = alias;
        }
        Ok(self)
    }
}
