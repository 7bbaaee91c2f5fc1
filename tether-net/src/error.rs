//! Error types for tether-net

use std::io;

use thiserror::Error;

/// Result type alias for tether-net operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while querying or mutating network state
#[derive(Debug, Error)]
pub enum Error {
    /// The external command could not be executed at all
    #[error("failed to run {program}: {source}")]
    Command {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Link or address enumeration returned unusable output
    #[error("interface enumeration failed: {0}")]
    Enumeration(String),
}

impl Error {
    /// Check if the error is a permission-related error
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::Command { source, .. } if source.kind() == io::ErrorKind::PermissionDenied)
    }
}
