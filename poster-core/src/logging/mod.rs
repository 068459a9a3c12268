//! Logging subsystem
//!
//! One `tracing` subscriber for the whole process, configured by the
//! `[logging]` section of the configuration file. `RUST_LOG`, when set,
//! replaces the configured level with its own filter directives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{fmt as sink, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Line format of emitted events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggingError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Plain => "plain",
            LogFormat::Json => "json",
        })
    }
}

/// The `[logging]` configuration section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub timestamps: bool,
    /// Print the module path of each event
    pub targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, format: LogFormat::Plain, timestamps: true, targets: true }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, ..Default::default() }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    pub fn without_targets(mut self) -> Self {
        self.targets = false;
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(self.level.as_str()).map_err(|e| LoggingError::Filter(e.to_string())),
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = sink::layer().with_target(self.targets);
        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => layer.json().boxed(),
            (LogFormat::Json, false) => layer.json().without_time().boxed(),
            (LogFormat::Plain, true) => layer.boxed(),
            (LogFormat::Plain, false) => layer.without_time().boxed(),
        }
    }
}

/// Install the global subscriber with default settings
///
/// # Example
/// ```
/// poster_core::logging::init_logging().ok();
/// ```
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with(&LogConfig::default())
}

/// Install the global subscriber described by `config`.
///
/// Fails if a subscriber is already installed.
///
/// # Example
/// ```
/// use poster_core::logging::{init_logging_with, LogConfig, LogFormat, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_format(LogFormat::Json).without_targets();
/// init_logging_with(&config).ok();
/// ```
pub fn init_logging_with(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = config.filter()?;
    tracing_subscriber::registry()
        .with(config.layer())
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
