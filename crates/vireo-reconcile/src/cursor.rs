//! Cursor persistence contract.
//!
//! One opaque watermark per (resource, entity-kind) pair. The pull
//! orchestrator writes it at most once per run, strictly after the scan
//! completed without an engine-level failure, so a crash mid-run leaves
//! the old cursor intact and the next run reprocesses from the last
//! checkpoint.

use async_trait::async_trait;
use thiserror::Error;

use vireo_connector::{ResourceId, SyncCursor};

use crate::entity::EntityKind;

/// Error from the cursor store.
#[derive(Debug, Error)]
pub enum CursorError {
    /// The backing store failed to read or write the cursor.
    #[error("cursor store error: {message}")]
    Backend { message: String },
}

impl CursorError {
    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        CursorError::Backend {
            message: message.into(),
        }
    }
}

/// Result type for cursor operations.
pub type CursorResult<T> = Result<T, CursorError>;

/// Persistence for incremental-sync cursors.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the stored cursor, if any.
    async fn load(&self, resource: ResourceId, kind: EntityKind)
        -> CursorResult<Option<SyncCursor>>;

    /// Persist a cursor, replacing any previous value.
    async fn save(
        &self,
        resource: ResourceId,
        kind: EntityKind,
        cursor: &SyncCursor,
    ) -> CursorResult<()>;
}
