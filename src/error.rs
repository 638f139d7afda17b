//! Error types
//!
//! Store and collaborator failures are collected into [`ImportError`] at the
//! boundary of an import call and handed to the failure policy. The only
//! error an import call returns is [`DistributionError`], which asks the
//! consumer to deliver the same offset again.

use std::error::Error as StdError;

use thiserror::Error;

/// Errors raised by the durable record store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No session could be acquired for the subservice
    #[error("cannot open store session for subservice '{subservice}': {reason}")]
    Authorization { subservice: String, reason: String },

    /// Staging or committing failed
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of the import pre-processing hook
#[derive(Debug, Error)]
#[error("import pre-processing failed: {0}")]
pub struct PreProcessError(pub String);

/// Failure of the import post-processing hook
#[derive(Debug, Error)]
#[error("import post-processing failed: {0}")]
pub struct PostProcessError(pub String);

/// Failure of the cache invalidation hook
#[derive(Debug, Error)]
#[error("cache invalidation failed: {0}")]
pub struct InvalidationError(pub String);

/// Failure of the package apply collaborator
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApplyError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ApplyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<StoreError> for ApplyError {
    fn from(e: StoreError) -> Self {
        ApplyError::with_source("package content could not be staged", e)
    }
}

/// Failure of a fire-and-forget send to a sink
#[derive(Debug, Error)]
#[error("send failed: {0}")]
pub struct SendError(pub String);

/// Any failure while importing a package or invalidating a cache
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    PreProcess(#[from] PreProcessError),

    #[error(transparent)]
    PostProcess(#[from] PostProcessError),

    #[error(transparent)]
    Invalidation(#[from] InvalidationError),

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// Error returned to the consumer loop when a package was not handled
#[derive(Debug, Error)]
pub enum DistributionError {
    /// The same offset must be delivered again
    #[error("{message}")]
    RetryRequested {
        message: String,
        #[source]
        cause: ImportError,
    },

    /// The retry budget was exhausted but the removal could not be stored
    #[error("error removing failed package")]
    RemoveFailed(#[source] StoreError),
}

impl DistributionError {
    pub fn is_retry_requested(&self) -> bool {
        matches!(self, DistributionError::RetryRequested { .. })
    }
}

/// Render an error and its `source()` chain, one cause per line
pub fn error_chain(error: &dyn StdError) -> String {
    let mut rendered = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        rendered.push_str("\nCaused by: ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_renders_sources() {
        let store = StoreError::Persistence("disk full".to_string());
        let apply = ApplyError::with_source("install failed", store);
        let import = ImportError::from(apply);

        let chain = error_chain(&import);
        assert_eq!(
            chain,
            "install failed\nCaused by: persistence failure: disk full"
        );
    }

    #[test]
    fn test_retry_requested_keeps_cause() {
        let err = DistributionError::RetryRequested {
            message: "retry later".to_string(),
            cause: ImportError::from(PreProcessError("nope".to_string())),
        };

        assert!(err.is_retry_requested());
        assert_eq!(
            error_chain(&err),
            "retry later\nCaused by: import pre-processing failed: nope"
        );
    }
}
