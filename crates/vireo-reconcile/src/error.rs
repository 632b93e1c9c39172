//! Engine error taxonomy.
//!
//! Two tiers: [`EngineError`] aborts the whole run (no cursor update);
//! [`RecordError`] is caught per record, folded into a failed outcome,
//! and never aborts the run.

use thiserror::Error;

use vireo_connector::ConnectorError;

use crate::correlation::CorrelationError;
use crate::cursor::CursorError;
use crate::mapping::MappingError;
use crate::policy::ProviderError;
use crate::store::StoreError;

/// A run-level failure. Surfaced to the caller; the cursor is never
/// advanced past one of these.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A configuration defect detected at INIT, before any record.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Mapping or policy could not be obtained.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The mapping violates its invariants.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// The external stream could not be started.
    #[error("failed to start external scan: {source}")]
    StreamStart {
        #[source]
        source: ConnectorError,
    },

    /// The external scan failed mid-stream.
    #[error("external scan failed: {source}")]
    Scan {
        #[source]
        source: ConnectorError,
    },

    /// The internal store failed at run granularity (population paging,
    /// link enumeration).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Cursor state could not be read or persisted.
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl EngineError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration {
            message: message.into(),
        }
    }

    /// Whether the failure was a connector timeout, retryable by the
    /// caller at whole-run granularity.
    pub fn is_timeout(&self) -> bool {
        match self {
            EngineError::StreamStart { source } | EngineError::Scan { source } => {
                source.is_timeout()
            }
            _ => false,
        }
    }
}

impl From<CorrelationError> for EngineError {
    fn from(err: CorrelationError) -> Self {
        // Only configuration-tier correlation errors surface at run
        // level; the rest stay record-scoped.
        EngineError::Configuration {
            message: err.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A failure scoped to one record. Recorded, never propagated.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Correlation failed for this record.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// The internal store rejected a dispatch.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The connector rejected a dispatch.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// The record could not be projected.
    #[error(transparent)]
    Mapping(#[from] MappingError),
}
