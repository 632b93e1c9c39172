//! # Connector Facade
//!
//! The uniform contract between the vireo reconciliation engine and
//! external identity-bearing systems (directories, databases, SaaS
//! APIs).
//!
//! This crate defines:
//! - [`ExternalRecord`] and [`AttributeValue`] - the external data model
//! - [`Filter`] and pagination types for searching
//! - [`Delta`], [`SyncCursor`], and [`ChangeBatch`] - the change stream
//! - [`ConnectorFacade`] - the capability trait connectors implement
//! - [`ConnectorError`] - the error taxonomy with timeout classification
//!
//! The engine treats a connector as an opaque capability: search,
//! stream changes, fetch by id, write. How a connector reaches its
//! target system is out of scope here.

pub mod change;
pub mod error;
pub mod facade;
pub mod filter;
pub mod ids;
pub mod record;

// Re-exports for convenience
pub use change::{ChangeBatch, Delta, DeltaKind, RecordPage, SyncCursor};
pub use error::{ConnectorError, ConnectorResult};
pub use facade::{ConnectorFacade, WriteOperation};
pub use filter::{Filter, PageRequest, SearchOptions};
pub use ids::ResourceId;
pub use record::{AttributeValue, ExternalRecord};
