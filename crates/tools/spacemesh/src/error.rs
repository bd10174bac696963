//! Error types for the spacemesh crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a prediction client talking to a hosted space
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request timeout after {0}s")]
    TimeoutError(u64),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    /// The space accepted the call but reported an error event
    #[error("Remote error on {endpoint}: {message}")]
    RemoteError { endpoint: String, message: String },

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Errors raised while persisting an artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("download of {url} returned status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("file payload has neither url nor path")]
    EmptyPayload,

    #[error("invalid image data: {0}")]
    InvalidImage(String),
}

/// Workflow-level errors
///
/// Every variant produced by a run carries the operation id so callers can
/// cross-reference the logs of the failing run.
#[derive(Debug, Error)]
pub enum Error {
    /// A remote step kept failing until the retry ceiling was reached
    #[error("[{operation_id}] {step} failed after {attempts} attempts: {source}")]
    RemoteOperationFailed {
        operation_id: String,
        step: String,
        attempts: u32,
        #[source]
        source: PredictError,
    },

    /// The generation endpoint returned nothing usable
    #[error("[{operation_id}] generation failed: {reason}")]
    GenerationFailed {
        operation_id: String,
        reason: String,
    },

    /// Neither the preferred nor the fallback mesh slot carried a file
    #[error("[{operation_id}] no valid mesh found in generation result")]
    NoValidMeshFound { operation_id: String },

    /// Writing the debug snapshot failed; never returned from a run
    #[error("[{operation_id}] failed to write diagnostic snapshot {path}: {source}")]
    DiagnosticWriteFailed {
        operation_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[{operation_id}] failed to save {label}: {source}")]
    ArtifactWrite {
        operation_id: String,
        label: String,
        #[source]
        source: ArtifactError,
    },

    #[error("[{operation_id}] unreadable input image: {source}")]
    InvalidImage {
        operation_id: String,
        #[source]
        source: ArtifactError,
    },

    /// No adapter matches the space's endpoints and no hint is configured
    #[error("[{operation_id}] unsupported space: {space}")]
    UnsupportedSpace { operation_id: String, space: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Operation id of the run that produced this error, if any
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            Error::RemoteOperationFailed { operation_id, .. }
            | Error::GenerationFailed { operation_id, .. }
            | Error::NoValidMeshFound { operation_id }
            | Error::DiagnosticWriteFailed { operation_id, .. }
            | Error::ArtifactWrite { operation_id, .. }
            | Error::InvalidImage { operation_id, .. }
            | Error::UnsupportedSpace { operation_id, .. } => Some(operation_id),
            Error::Config(_) => None,
        }
    }

    /// Returns true if the run may succeed when repeated later
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RemoteOperationFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_is_carried() {
        let err = Error::NoValidMeshFound {
            operation_id: "op-7".to_string(),
        };
        assert_eq!(err.operation_id(), Some("op-7"));
        assert!(err.to_string().contains("op-7"));
        assert!(!err.is_transient());

        let err = Error::UnsupportedSpace {
            operation_id: "op-8".to_string(),
            space: "someone/else".to_string(),
        };
        assert_eq!(err.operation_id(), Some("op-8"));
        assert_eq!(err.to_string(), "[op-8] unsupported space: someone/else");

        let err = Error::Config("bad".to_string());
        assert_eq!(err.operation_id(), None);
    }

    #[test]
    fn test_remote_failure_keeps_source() {
        let err = Error::RemoteOperationFailed {
            operation_id: "op-1".to_string(),
            step: "generate".to_string(),
            attempts: 5,
            source: PredictError::TimeoutError(600),
        };
        assert!(err.is_transient());
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Request timeout after 600s"));
    }
}
