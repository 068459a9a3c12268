use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoggingError {
    #[error("Unknown log level '{0}' (expected trace, debug, info, warn or error)")]
    UnknownLevel(String),

    #[error("Unknown log format '{0}' (expected plain or json)")]
    UnknownFormat(String),

    /// `RUST_LOG` or the level could not be turned into a filter
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}
