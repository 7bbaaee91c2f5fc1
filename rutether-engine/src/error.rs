//! Error types for the reconciliation engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or starting the engine
///
/// The running reconciliation loop itself never fails: detection misses
/// and command failures are logged and absorbed. These errors surface
/// only at startup.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network plumbing error
    #[error("network error: {0}")]
    Net(#[from] tether_net::Error),
}
