//! # Reconciliation Engine
//!
//! Bidirectional reconciliation between vireo identity records and
//! external systems reached through the connector facade.
//!
//! This crate provides:
//! - Correlation of loosely-identified external records to internal
//!   entities
//! - A conflict-resolution decision matrix
//! - Incremental-cursor bookkeeping
//! - Partial-failure-tolerant pull and push orchestration
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌───────────────┐
//! │ Connector Facade│────►│ Pull / Push      │────►│ Internal      │
//! │ (LDAP/DB/SaaS)  │     │ Orchestrator     │     │ Store         │
//! └─────────────────┘     └────────┬─────────┘     └───────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         ▼                        ▼                        ▼
//! ┌───────────────┐      ┌─────────────────┐      ┌─────────────────┐
//! │  Correlation  │      │ Decision Matrix │      │  Run Report     │
//! │    Engine     │      │                 │      │  Builder        │
//! └───────────────┘      └─────────────────┘      └─────────────────┘
//! ```
//!
//! ## Processing model
//!
//! Each run executes on a single task driven by an external scheduler
//! (at most one concurrent run per resource and direction). Record
//! processing is strictly sequential. A per-record failure is caught
//! and recorded as a failed outcome; only engine-level failures abort
//! the run, and the sync cursor is never advanced past one.
//!
//! ## Example
//!
//! ```ignore
//! use vireo_reconcile::{PullOrchestrator, RunOptions};
//!
//! let orchestrator = PullOrchestrator::new(connector, store, provider, cursors, rules);
//! let report = orchestrator
//!     .run(&ctx, resource, &profiles, &RunOptions::incremental())
//!     .await?;
//! println!("{}", report.render());
//! ```

pub mod correlation;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod mapping;
pub mod matrix;
pub mod policy;
pub mod pull;
pub mod push;
pub mod report;
pub mod store;

mod context;

// Re-exports for convenience
pub use correlation::{
    CorrelationEngine, CorrelationError, CorrelationResult, CorrelationRule,
    CorrelationRuleRegistry,
};
pub use cursor::{CursorError, CursorResult, CursorStore};
pub use entity::{Entity, EntityId, EntityKind, KindProfile, SchemaType};
pub use error::{EngineError, EngineResult, RecordError};
pub use mapping::{
    InboundProjection, InternalRef, Mapping, MappingError, MappingItem, Purpose,
};
pub use matrix::{decide_pull, decide_push, Decision, MatchState, Operation};
pub use policy::{
    DeleteAction, MatchedAction, PolicyProvider, ProviderError, SyncPolicy, UnmatchedAction,
};
pub use pull::{PullOrchestrator, RunOptions};
pub use push::{PushOptions, PushOrchestrator, PUSH_PAGE_SIZE};
pub use report::{
    Direction, Outcome, RunMode, RunReport, RunReportBuilder, RunSummary, TraceLevel,
};
pub use store::{
    AttributeUpdate, AuthorizationContext, Condition, InternalStore, PopulationQuery,
    SearchPredicate, StoreError, StoreResult,
};
