//! Runtime settings loaded from TOML.
//!
//! ```toml
//! [log]
//! level = "info"
//! ansi = false
//!
//! [yahoo]
//! timeout_secs = 30
//! max_retries = 3
//! base_delay_ms = 500
//!
//! [csv]
//! dir = "data/prices"
//! ```
//!
//! Every section and field is optional. The Yahoo provider is always
//! registered; the CSV provider only when `[csv]` is present.

use crate::data::csv::CsvProvider;
use crate::data::provider::{ProviderError, ProviderRegistry};
use crate::data::yahoo::YahooProvider;
use crate::fetcher::FetcherConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::Dispatch;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid log level '{0}' (expected off, error, warn, info, debug or trace)")]
    LogLevel(String),

    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: LogSettings,
    pub yahoo: YahooSettings,
    pub csv: Option<CsvSettings>,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Providers described by these settings.
    pub fn registry(&self) -> Result<ProviderRegistry, ConfigError> {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(YahooProvider::new(&self.yahoo)?));
        if let Some(csv) = &self.csv {
            registry.register(Arc::new(CsvProvider::new(&csv.dir)));
        }
        Ok(registry)
    }

    pub fn fetcher_config(&self) -> Result<FetcherConfig, ConfigError> {
        Ok(FetcherConfig::new(self.registry()?).with_log(self.log.dispatch()?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            ansi: false,
        }
    }
}

impl LogSettings {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.level
            .trim()
            .parse()
            .map_err(|_| ConfigError::LogLevel(self.level.clone()))
    }

    /// A stderr subscriber honoring these settings.
    pub fn dispatch(&self) -> Result<Dispatch, ConfigError> {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(self.level_filter()?)
            .with_ansi(self.ansi)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        Ok(Dispatch::new(subscriber))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YahooSettings {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for YahooSettings {
    fn default() -> Self {
        Self {
            base_url: "https://query2.finance.yahoo.com".into(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvSettings {
    pub dir: PathBuf,
}
