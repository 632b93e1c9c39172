//! The connector facade: the uniform capability surface the
//! reconciliation engine requires from an external system.
//!
//! A connector is opaque to the engine; how it performs I/O against a
//! directory, database, or SaaS API is its own concern. The facade
//! speaks in external object classes (plain strings such as `"user"` or
//! `"group"`), which the engine resolves from its kind profiles.

use async_trait::async_trait;

use crate::change::{ChangeBatch, RecordPage, SyncCursor};
use crate::error::ConnectorResult;
use crate::filter::{Filter, PageRequest, SearchOptions};
use crate::record::ExternalRecord;

/// A write operation against the external system.
#[derive(Debug, Clone)]
pub enum WriteOperation {
    /// Create a new object from the given record.
    Create(ExternalRecord),
    /// Update the object identified by the record's uid.
    Update(ExternalRecord),
    /// Delete the object with the given uid.
    Delete { uid: String },
}

impl WriteOperation {
    /// The uid this operation targets, if already known.
    pub fn uid(&self) -> &str {
        match self {
            WriteOperation::Create(record) | WriteOperation::Update(record) => record.uid(),
            WriteOperation::Delete { uid } => uid,
        }
    }
}

/// Uniform search/stream/fetch/write operations against one external
/// system.
///
/// All calls may fail with [`ConnectorError::Timeout`] (retryable by
/// the orchestrator's caller, never retried internally) or another
/// variant (fatal to the current record only).
///
/// [`ConnectorError::Timeout`]: crate::error::ConnectorError::Timeout
#[async_trait]
pub trait ConnectorFacade: Send + Sync {
    /// Search for records matching a filter.
    async fn search(
        &self,
        object_class: &str,
        filter: &Filter,
        options: &SearchOptions,
    ) -> ConnectorResult<Vec<ExternalRecord>>;

    /// The connector's current change watermark.
    ///
    /// The pull orchestrator captures this *before* streaming begins,
    /// so a change arriving mid-scan is re-delivered on the next run
    /// rather than missed.
    async fn current_cursor(&self, object_class: &str) -> ConnectorResult<SyncCursor>;

    /// Fetch the deltas that occurred since the given cursor.
    ///
    /// `None` requests an initial sync: every current object is
    /// delivered as a create. Batches are chained through
    /// [`ChangeBatch::resume`] while [`ChangeBatch::has_more`] is set.
    async fn changes_since(
        &self,
        object_class: &str,
        cursor: Option<&SyncCursor>,
        batch_size: u32,
    ) -> ConnectorResult<ChangeBatch>;

    /// List every record of an object class, one page at a time.
    async fn list_all(&self, object_class: &str, page: &PageRequest)
        -> ConnectorResult<RecordPage>;

    /// Fetch a single record by its opaque uid.
    async fn fetch_by_id(
        &self,
        object_class: &str,
        uid: &str,
    ) -> ConnectorResult<Option<ExternalRecord>>;

    /// Apply a write operation; returns the (possibly new) uid.
    async fn write(&self, object_class: &str, op: WriteOperation) -> ConnectorResult<String>;
}
