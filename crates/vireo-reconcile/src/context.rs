//! Per-run resolved configuration.
//!
//! One explicit cache object per run, passed by reference through the
//! orchestrator; never a process-wide static.

use std::sync::Arc;

use vireo_connector::SyncCursor;

use crate::entity::KindProfile;
use crate::mapping::Mapping;
use crate::policy::SyncPolicy;

/// Resolved configuration for one entity kind within a run.
#[derive(Clone)]
pub(crate) struct KindContext {
    /// The kind capability.
    pub profile: KindProfile,
    /// Resolved mapping.
    pub mapping: Arc<Mapping>,
    /// Resolved policy.
    pub policy: Arc<SyncPolicy>,
    /// Cursor loaded at INIT (incremental runs only).
    pub stored_cursor: Option<SyncCursor>,
    /// Connector watermark captured at scan start; persisted at
    /// FINALIZING on clean incremental runs.
    pub captured_cursor: Option<SyncCursor>,
}

impl KindContext {
    pub fn new(profile: KindProfile, mapping: Arc<Mapping>, policy: Arc<SyncPolicy>) -> Self {
        Self {
            profile,
            mapping,
            policy,
            stored_cursor: None,
            captured_cursor: None,
        }
    }
}
