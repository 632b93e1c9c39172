//! Synchronization policy model and the read-only provider contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use vireo_connector::ResourceId;

use crate::entity::EntityKind;
use crate::mapping::Mapping;

/// What to do with an external record that correlated to exactly one
/// internal entity not yet linked to the resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedAction {
    /// Link the entity, then apply the inbound projection.
    #[default]
    UpdateAndLink,
    /// Link the entity without touching its attributes.
    LinkOnly,
    /// Leave the entity unlinked; the account is not ours to own.
    Unassign,
    /// Remove the account from the external system.
    Deprovision,
}

impl MatchedAction {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchedAction::UpdateAndLink => "update_and_link",
            MatchedAction::LinkOnly => "link_only",
            MatchedAction::Unassign => "unassign",
            MatchedAction::Deprovision => "deprovision",
        }
    }
}

impl fmt::Display for MatchedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MatchedAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "update_and_link" => Ok(MatchedAction::UpdateAndLink),
            "link_only" => Ok(MatchedAction::LinkOnly),
            "unassign" => Ok(MatchedAction::Unassign),
            "deprovision" => Ok(MatchedAction::Deprovision),
            _ => Err(format!("Unknown matched action: {s}")),
        }
    }
}

/// What to do with an external record that correlated to no internal
/// entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedAction {
    /// Create an internal entity from the inbound projection and link it.
    #[default]
    Provision,
    /// Create a minimal internal entity and link it, without projecting
    /// attributes or writing back externally.
    Assign,
    /// Leave the record alone.
    Ignore,
}

impl UnmatchedAction {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedAction::Provision => "provision",
            UnmatchedAction::Assign => "assign",
            UnmatchedAction::Ignore => "ignore",
        }
    }
}

impl fmt::Display for UnmatchedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UnmatchedAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "provision" => Ok(UnmatchedAction::Provision),
            "assign" => Ok(UnmatchedAction::Assign),
            "ignore" => Ok(UnmatchedAction::Ignore),
            _ => Err(format!("Unknown unmatched action: {s}")),
        }
    }
}

/// What to do when the external account of a linked entity disappears.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteAction {
    /// Drop the link, keep the entity.
    #[default]
    Unlink,
    /// Delete the internal entity as well.
    Delete,
}

impl DeleteAction {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteAction::Unlink => "unlink",
            DeleteAction::Delete => "delete",
        }
    }
}

impl fmt::Display for DeleteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeleteAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unlink" => Ok(DeleteAction::Unlink),
            "delete" => Ok(DeleteAction::Delete),
            _ => Err(format!("Unknown delete action: {s}")),
        }
    }
}

/// Per-resource (or global) synchronization policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Key of a registered correlation rule for this entity kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_rule: Option<String>,
    /// Ordered internal attribute names for alternate-search
    /// correlation; each must be mapped for the inbound direction.
    #[serde(default)]
    pub alternate_search_attributes: Vec<String>,
    /// Action for matched-but-unlinked records.
    #[serde(default)]
    pub matched_action: MatchedAction,
    /// Action for unmatched records.
    #[serde(default)]
    pub unmatched_action: UnmatchedAction,
    /// Action when a linked account is deleted externally.
    #[serde(default)]
    pub delete_action: DeleteAction,
    /// Whether push deprovisions entities that left the population
    /// scope while still linked.
    #[serde(default)]
    pub deprovision_out_of_scope: bool,
}

impl SyncPolicy {
    /// Set the correlation rule key (builder style).
    #[must_use]
    pub fn with_correlation_rule(mut self, key: impl Into<String>) -> Self {
        self.correlation_rule = Some(key.into());
        self
    }

    /// Set the alternate search attributes (builder style).
    #[must_use]
    pub fn with_alternate_search(mut self, attributes: Vec<String>) -> Self {
        self.alternate_search_attributes = attributes;
        self
    }

    /// Set the matched action (builder style).
    #[must_use]
    pub fn with_matched_action(mut self, action: MatchedAction) -> Self {
        self.matched_action = action;
        self
    }

    /// Set the unmatched action (builder style).
    #[must_use]
    pub fn with_unmatched_action(mut self, action: UnmatchedAction) -> Self {
        self.unmatched_action = action;
        self
    }

    /// Set the delete action (builder style).
    #[must_use]
    pub fn with_delete_action(mut self, action: DeleteAction) -> Self {
        self.delete_action = action;
        self
    }
}

/// Error from the policy/mapping provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No mapping configured for the resource and kind.
    #[error("no mapping configured for resource {resource}, kind {kind}")]
    MappingNotFound {
        resource: ResourceId,
        kind: EntityKind,
    },

    /// No policy configured for the resource and kind.
    #[error("no policy configured for resource {resource}, kind {kind}")]
    PolicyNotFound {
        resource: ResourceId,
        kind: EntityKind,
    },
}

/// Read-only lookup of policies and mappings by resource.
///
/// The engine never mutates either.
pub trait PolicyProvider: Send + Sync {
    /// The mapping for a resource and entity kind.
    fn mapping(&self, resource: ResourceId, kind: EntityKind) -> Result<Arc<Mapping>, ProviderError>;

    /// The policy for a resource and entity kind.
    fn policy(&self, resource: ResourceId, kind: EntityKind)
        -> Result<Arc<SyncPolicy>, ProviderError>;
}
