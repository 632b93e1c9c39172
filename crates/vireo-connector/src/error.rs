//! Connector facade error types
//!
//! Error definitions with timeout/record-level classification. A timeout
//! is retryable by the caller of the orchestrator at whole-run
//! granularity; every other variant is fatal to the current record only.

use thiserror::Error;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The external system did not answer within the deadline.
    ///
    /// Never retried internally; the orchestrator's caller decides
    /// whether to retry the whole run.
    #[error("connector timeout after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The external system is temporarily unavailable.
    #[error("target system unavailable: {message}")]
    Unavailable { message: String },

    /// Object not found in the external system.
    #[error("object not found: {uid}")]
    ObjectNotFound { uid: String },

    /// Object already exists in the external system (create conflict).
    #[error("object already exists: {uid}")]
    ObjectAlreadyExists { uid: String },

    /// The external system rejected the data.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// The requested entity kind is not served by this connector.
    #[error("unsupported entity kind: {kind}")]
    UnsupportedKind { kind: String },

    /// The supplied cursor is no longer usable and a full
    /// reconciliation is required.
    #[error("sync cursor expired or invalid: {message}")]
    CursorInvalid { message: String },

    /// An operation against the external system failed.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Check if this error is a timeout.
    ///
    /// Timeouts surface as run-level failures; everything else is
    /// caught at record granularity.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectorError::Timeout { .. })
    }

    /// Check if this error is transient and a later retry of the whole
    /// run may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::Timeout { .. } | ConnectorError::Unavailable { .. }
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::Timeout { .. } => "TIMEOUT",
            ConnectorError::Unavailable { .. } => "UNAVAILABLE",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::UnsupportedKind { .. } => "UNSUPPORTED_KIND",
            ConnectorError::CursorInvalid { .. } => "CURSOR_INVALID",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    // Convenience constructors

    /// Create a timeout error.
    pub fn timeout(timeout_secs: u64) -> Self {
        ConnectorError::Timeout { timeout_secs }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        ConnectorError::Unavailable {
            message: message.into(),
        }
    }

    /// Create an object-not-found error.
    pub fn not_found(uid: impl Into<String>) -> Self {
        ConnectorError::ObjectNotFound { uid: uid.into() }
    }

    /// Create an already-exists error.
    pub fn already_exists(uid: impl Into<String>) -> Self {
        ConnectorError::ObjectAlreadyExists { uid: uid.into() }
    }

    /// Create an invalid-data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }

    /// Create a cursor-invalid error.
    pub fn cursor_invalid(message: impl Into<String>) -> Self {
        ConnectorError::CursorInvalid {
            message: message.into(),
        }
    }

    /// Create an operation-failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation-failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let err = ConnectorError::timeout(30);
        assert!(err.is_timeout());
        assert!(err.is_transient());

        let err = ConnectorError::not_found("jdoe");
        assert!(!err.is_timeout());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_errors() {
        assert!(ConnectorError::unavailable("maintenance").is_transient());
        assert!(!ConnectorError::invalid_data("bad attribute").is_transient());
        assert!(!ConnectorError::operation_failed("rejected").is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = ConnectorError::timeout(30);
        assert_eq!(err.to_string(), "connector timeout after 30 seconds");

        let err = ConnectorError::not_found("uid=jdoe");
        assert_eq!(err.to_string(), "object not found: uid=jdoe");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ConnectorError::timeout(5).error_code(), "TIMEOUT");
        assert_eq!(
            ConnectorError::cursor_invalid("expired").error_code(),
            "CURSOR_INVALID"
        );
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = ConnectorError::operation_failed_with_source("write failed", source_err);

        if let ConnectorError::OperationFailed { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected OperationFailed variant");
        }
    }
}
