use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    /// An environment override that does not parse
    #[error("{key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    /// Parsed, but unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
