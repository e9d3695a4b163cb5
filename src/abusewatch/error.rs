//! Error types for detection, state access and pipeline operation
//!
//! "Threshold not met" is never represented here: every criterion returns an
//! empty alert list for that case. Errors are reserved for conditions the caller
//! has to act on:
//!
//! - **Retryable**: the durable state store could not be reached. The surrounding
//!   runtime retries the processing step; the core never retries on its own.
//! - **Fatal**: an alert failed its structural invariant at construction. This is a
//!   programming defect and the pipeline aborts rather than emit the alert.
//! - **Everything else**: configuration, list loading and serialization problems
//!   surfaced at start-up or at the edges.

use std::path::PathBuf;

/// Main error type for the detection core
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// Durable state store could not service a request
    #[error("State store unavailable for '{namespace}/{key}': {reason}")]
    StateUnavailable {
        namespace: String,
        key: String,
        reason: String,
    },

    /// Persisted value exists but could not be decoded
    #[error("Corrupt state value for '{namespace}/{key}': {reason}")]
    StateCorrupt {
        namespace: String,
        key: String,
        reason: String,
    },

    /// Alert failed the structural invariant at construction
    #[error("Alert schema violation, missing fields: {missing:?}")]
    AlertSchema { missing: Vec<&'static str> },

    /// Invalid pipeline or detector configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Static list could not be read at start-up
    #[error("Failed to load list from '{}': {source}", path.display())]
    ListLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Alert or event (de)serialization failed
    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    /// A partition or sink channel closed unexpectedly
    #[error("Pipeline closed: {reason}")]
    PipelineClosed { reason: String },

    /// A side input was dropped before publishing a complete snapshot
    #[error("Side input '{name}' closed before a snapshot was published")]
    SideInputUnavailable { name: String },
}

impl DetectionError {
    /// Create a state unavailable error
    pub fn state_unavailable(
        namespace: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StateUnavailable {
            namespace: namespace.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt state error
    pub fn state_corrupt(
        namespace: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StateCorrupt {
            namespace: namespace.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a closed pipeline error
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::PipelineClosed {
            reason: reason.into(),
        }
    }

    /// Whether the caller should retry the processing step that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StateUnavailable { .. })
    }

    /// Whether this error indicates a defect that must abort processing
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AlertSchema { .. })
    }
}

impl From<serde_json::Error> for DetectionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for DetectionError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for detection operations
pub type DetectionResult<T> = Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let err = DetectionError::state_unavailable("velocity", "uid-1", "connection refused");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());

        let err = DetectionError::AlertSchema {
            missing: vec!["summary"],
        };
        assert!(err.is_fatal());
        assert!(!err.is_retryable());

        assert!(!DetectionError::config("bad").is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = DetectionError::state_unavailable("velocity", "uid-1", "timeout");
        assert_eq!(
            err.to_string(),
            "State store unavailable for 'velocity/uid-1': timeout"
        );

        let err = DetectionError::ListLoad {
            path: PathBuf::from("/nonexistent/list.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("/nonexistent/list.txt"));
    }
}
