//! Error types for the Keen SDK.

use serde_json::Value;

/// Errors that can occur when using the Keen SDK.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Project id was empty.
    #[error("Invalid project id: {project_id:?}")]
    InvalidProjectId { project_id: String },

    /// Persistence strategy could not be resolved or is misconfigured.
    #[error("Invalid persistence strategy: {0}")]
    InvalidPersistenceStrategy(String),

    /// A key required for the attempted operation is not configured.
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Scoped key could not be created or decrypted.
    #[error("Invalid scoped key: {0}")]
    InvalidScopedKey(String),

    /// Collection name or event body is malformed.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Query is missing a parameter its kind requires.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The API answered with a non-success status.
    #[error("Keen API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        error_code: Option<Value>,
        message: String,
    },

    /// The API answered successfully but the body lacked the expected shape.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    /// Transport failure, including timeouts. Never rewrapped.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is a transport-level timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Http(e) if e.is_timeout())
    }

    /// API-supplied error code, if this is an API error that carried one.
    pub fn error_code(&self) -> Option<&Value> {
        match self {
            Error::Api { error_code, .. } => error_code.as_ref(),
            _ => None,
        }
    }
}
