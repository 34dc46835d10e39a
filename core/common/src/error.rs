//! Common error types for Homekeep.

use thiserror::Error;

/// Top-level error type for secret core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing, malformed, or expired session.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Access policy denied the request.
    ///
    /// The message is fixed so that callers learn nothing about which rule
    /// rejected them.
    #[error("not authorized")]
    Forbidden,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input on a write path.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// A structurally valid record could not be served (corruption or key
    /// mismatch).
    #[error("Internal error: {0}")]
    Internal(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Startup configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status code the controller layer reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Auth(_) => 401,
            Error::Forbidden => 403,
            Error::NotFound(_) => 404,
            Error::Validation(_) => 400,
            Error::Crypto(_)
            | Error::Internal(_)
            | Error::Storage(_)
            | Error::Serialization(_)
            | Error::Config(_) => 500,
        }
    }

    /// Whether the caller can act on this error (as opposed to an operator).
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
