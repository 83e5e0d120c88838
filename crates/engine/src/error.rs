use std::path::Path;
use thiserror::Error;

/// Errors surfaced by the engine and its backends
#[derive(Debug, Error)]
pub enum VcsError {
    /// Invalid locator, target directory, or revision selector. Raised
    /// before any repository is touched.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A backend subprocess or library call failed (clone, checkout, log,
    /// diff, cat). Wraps the backend-native failure message.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The requested path does not exist at the given revision.
    #[error("No content for '{path}' at revision {revision}")]
    ContentNotFound { path: String, revision: String },

    /// An internal invariant was violated. Indicates a backend adapter bug,
    /// not an environmental condition; never downgraded to a skip.
    #[error("Model consistency violation: {0}")]
    ModelConsistency(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    /// Create a Configuration error from any displayable message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a Backend error from any error type
    pub fn backend<E: std::error::Error>(error: E) -> Self {
        Self::Backend(error.to_string())
    }

    /// Create a ContentNotFound error from a path and revision
    pub fn content_not_found(path: &Path, revision: impl Into<String>) -> Self {
        Self::ContentNotFound {
            path: path.display().to_string(),
            revision: revision.into(),
        }
    }

    /// Create a ModelConsistency error from any displayable message
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::ModelConsistency(msg.into())
    }
}
