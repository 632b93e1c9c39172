//! Change-stream types: deltas, cursors, and batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::ExternalRecord;

/// Kind of change observed in an external system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    /// New object created.
    Create,
    /// Existing object updated.
    Update,
    /// Object deleted.
    Delete,
}

impl DeltaKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaKind::Create => "create",
            DeltaKind::Update => "update",
            DeltaKind::Delete => "delete",
        }
    }
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeltaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(DeltaKind::Create),
            "update" => Ok(DeltaKind::Update),
            "delete" => Ok(DeltaKind::Delete),
            _ => Err(format!("Unknown delta kind: {s}")),
        }
    }
}

/// One unit of external change.
///
/// A delete carries only the uid; creates and updates carry the full
/// record as read from the external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    /// The kind of change.
    pub kind: DeltaKind,
    /// The changed object's opaque uid.
    pub uid: String,
    /// The record, absent for deletes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ExternalRecord>,
    /// When the change happened, if the source system says.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Delta {
    /// A delta for a created object.
    pub fn created(record: ExternalRecord) -> Self {
        Self {
            kind: DeltaKind::Create,
            uid: record.uid().to_string(),
            record: Some(record),
            timestamp: None,
        }
    }

    /// A delta for an updated object.
    pub fn updated(record: ExternalRecord) -> Self {
        Self {
            kind: DeltaKind::Update,
            uid: record.uid().to_string(),
            record: Some(record),
            timestamp: None,
        }
    }

    /// A delta for a deleted object; only the uid survives.
    pub fn deleted(uid: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Delete,
            uid: uid.into(),
            record: None,
            timestamp: None,
        }
    }

    /// Set the change timestamp (builder style).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether the object is present in the external system after this
    /// change.
    pub fn is_present(&self) -> bool {
        self.kind != DeltaKind::Delete
    }
}

/// Opaque, connector-supplied watermark for incremental sync.
///
/// The engine never interprets the value; ordering is the connector's
/// contract. A cursor is advanced only strictly after a fully
/// successful incremental run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(String);

impl SyncCursor {
    /// Create a cursor from a connector-supplied value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The opaque value.
    pub fn value(&self) -> &str {
        &self.0
    }

    /// Whether the cursor carries a usable watermark.
    pub fn is_usable(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One batch of deltas from an incremental change stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// The deltas, in the connector's delivery order.
    pub deltas: Vec<Delta>,
    /// Cursor to resume the stream from for the next batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<SyncCursor>,
    /// Whether more deltas are available after this batch.
    pub has_more: bool,
}

impl ChangeBatch {
    /// A batch with no changes.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            deltas: Vec::new(),
            resume: None,
            has_more: false,
        }
    }

    /// A batch with the given deltas.
    #[must_use]
    pub fn with_deltas(deltas: Vec<Delta>) -> Self {
        Self {
            deltas,
            resume: None,
            has_more: false,
        }
    }

    /// Set the resume cursor.
    #[must_use]
    pub fn with_resume(mut self, cursor: SyncCursor) -> Self {
        self.resume = Some(cursor);
        self
    }

    /// Indicate that more deltas are available.
    #[must_use]
    pub fn with_more(mut self) -> Self {
        self.has_more = true;
        self
    }
}

/// One page of records from a full listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPage {
    /// The records, in the connector's listing order.
    pub records: Vec<ExternalRecord>,
    /// Whether more records exist beyond this page.
    pub has_more: bool,
}
