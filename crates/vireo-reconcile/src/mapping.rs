//! Attribute mapping between internal and external representations.
//!
//! A [`Mapping`] is an ordered set of [`MappingItem`]s. Exactly one
//! item is the designated account-id item; it doubles as the fallback
//! correlation key. Items participate in a projection only when their
//! purpose matches the direction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use vireo_connector::{AttributeValue, ExternalRecord};

use crate::entity::Entity;
use crate::store::AttributeUpdate;

/// Error raised by mapping construction or resolution.
#[derive(Debug, Error)]
pub enum MappingError {
    /// No item is flagged as the account-id item.
    #[error("mapping has no account-id item")]
    MissingAccountId,

    /// More than one item is flagged as the account-id item.
    #[error("mapping has {count} account-id items, expected exactly one")]
    MultipleAccountIds { count: usize },

    /// The record carries no value for the account-id attribute.
    #[error("record '{uid}' has no value for account-id attribute '{attribute}'")]
    AccountIdValueMissing { uid: String, attribute: String },
}

/// Purpose a mapping item serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Inbound only (external to internal).
    Sync,
    /// Outbound only (internal to external).
    Propagation,
    /// Both directions.
    Both,
}

impl Purpose {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Sync => "sync",
            Purpose::Propagation => "propagation",
            Purpose::Both => "both",
        }
    }

    /// Check if this purpose includes the inbound direction.
    #[must_use]
    pub fn includes_inbound(&self) -> bool {
        matches!(self, Purpose::Sync | Purpose::Both)
    }

    /// Check if this purpose includes the outbound direction.
    #[must_use]
    pub fn includes_outbound(&self) -> bool {
        matches!(self, Purpose::Propagation | Purpose::Both)
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sync" => Ok(Purpose::Sync),
            "propagation" => Ok(Purpose::Propagation),
            "both" => Ok(Purpose::Both),
            _ => Err(format!("Unknown mapping purpose: {s}")),
        }
    }
}

/// The internal side of a mapping item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InternalRef {
    /// A plain schema attribute.
    Attribute { name: String },
    /// A derived attribute (computed by the store, lookup-only inbound).
    DerivedAttribute { name: String },
    /// The entity's unique name.
    Name,
    /// The entity's identifier.
    Id,
}

impl InternalRef {
    /// A plain attribute reference.
    pub fn attribute(name: impl Into<String>) -> Self {
        InternalRef::Attribute { name: name.into() }
    }

    /// A derived attribute reference.
    pub fn derived(name: impl Into<String>) -> Self {
        InternalRef::DerivedAttribute { name: name.into() }
    }

    /// The plain-attribute name, if this reference is one.
    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            InternalRef::Attribute { name } => Some(name),
            _ => None,
        }
    }
}

/// One attribute mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingItem {
    /// External attribute name.
    pub external_attribute: String,
    /// Internal attribute reference.
    pub internal_ref: InternalRef,
    /// Direction(s) this item participates in.
    pub purpose: Purpose,
    /// Whether this is the designated account-id item.
    #[serde(default)]
    pub account_id: bool,
    /// Whether a present-but-empty external value clears the internal
    /// attribute.
    #[serde(default)]
    pub nullable: bool,
}

impl MappingItem {
    /// Create a bidirectional item.
    pub fn new(external: impl Into<String>, internal_ref: InternalRef) -> Self {
        Self {
            external_attribute: external.into(),
            internal_ref,
            purpose: Purpose::Both,
            account_id: false,
            nullable: false,
        }
    }

    /// Set the purpose (builder style).
    #[must_use]
    pub fn with_purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = purpose;
        self
    }

    /// Mark as the account-id item (builder style).
    #[must_use]
    pub fn account_id(mut self) -> Self {
        self.account_id = true;
        self
    }

    /// Mark as nullable (builder style).
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Result of an inbound projection: attribute changes plus the mapped
/// entity name, if the mapping carries one.
#[derive(Debug, Clone, Default)]
pub struct InboundProjection {
    /// Attribute changes to apply.
    pub update: AttributeUpdate,
    /// New entity name, when an inbound item maps to [`InternalRef::Name`].
    pub name: Option<String>,
}

/// An ordered set of mapping items with exactly one account-id item.
///
/// Only constructible through [`Mapping::new`], which enforces the
/// account-id invariant.
#[derive(Debug, Clone, Serialize)]
pub struct Mapping {
    items: Vec<MappingItem>,
    #[serde(skip)]
    account_idx: usize,
}

impl Mapping {
    /// Create a mapping, validating the account-id invariant.
    pub fn new(items: Vec<MappingItem>) -> Result<Self, MappingError> {
        let indices: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.account_id)
            .map(|(idx, _)| idx)
            .collect();
        match indices.as_slice() {
            [] => Err(MappingError::MissingAccountId),
            [idx] => Ok(Self {
                items,
                account_idx: *idx,
            }),
            _ => Err(MappingError::MultipleAccountIds {
                count: indices.len(),
            }),
        }
    }

    /// The mapping items, in declaration order.
    pub fn items(&self) -> &[MappingItem] {
        &self.items
    }

    /// The designated account-id item.
    pub fn account_id_item(&self) -> &MappingItem {
        &self.items[self.account_idx]
    }

    /// The item whose internal side is the given plain attribute and
    /// whose purpose covers the inbound direction.
    pub fn inbound_item_for_attribute(&self, attribute: &str) -> Option<&MappingItem> {
        self.items.iter().find(|i| {
            i.purpose.includes_inbound() && i.internal_ref.attribute_name() == Some(attribute)
        })
    }

    /// Resolve the account-id value from a record.
    ///
    /// The first non-null value of the account-id item's external
    /// attribute; falls back to the record's uid when the attribute is
    /// the conventional `"uid"` name and absent from the attribute set.
    pub fn resolve_account_id(&self, record: &ExternalRecord) -> Result<AttributeValue, MappingError> {
        let item = self.account_id_item();
        if let Some(value) = record.first_value(&item.external_attribute) {
            return Ok(value.clone());
        }
        if item.external_attribute == "uid" {
            return Ok(AttributeValue::String(record.uid().to_string()));
        }
        Err(MappingError::AccountIdValueMissing {
            uid: record.uid().to_string(),
            attribute: item.external_attribute.clone(),
        })
    }

    /// Project a record inbound.
    ///
    /// Only items whose purpose covers `Sync` participate. Values are
    /// copied, never aliased. An attribute absent from the record
    /// leaves the internal value untouched; a nullable item present but
    /// empty clears it.
    pub fn project_inbound(&self, record: &ExternalRecord) -> InboundProjection {
        let mut projection = InboundProjection::default();
        for item in self.items.iter().filter(|i| i.purpose.includes_inbound()) {
            let Some(values) = record.get(&item.external_attribute) else {
                continue;
            };
            let usable: Vec<AttributeValue> =
                values.iter().filter(|v| !v.is_null()).cloned().collect();
            match &item.internal_ref {
                InternalRef::Attribute { name } => {
                    if usable.is_empty() {
                        if item.nullable {
                            projection.update.clear.push(name.clone());
                        }
                    } else {
                        projection.update.set.insert(name.clone(), usable);
                    }
                }
                InternalRef::Name => {
                    if let Some(first) = usable.first() {
                        projection.name = Some(first.to_text());
                    }
                }
                // Lookup-only references; nothing to write inbound.
                InternalRef::DerivedAttribute { .. } | InternalRef::Id => {}
            }
        }
        projection
    }

    /// Project an entity outbound.
    ///
    /// Only items whose purpose covers `Propagation` participate.
    /// Derived attributes are read from the entity as materialized by
    /// the store.
    pub fn project_outbound(&self, entity: &Entity) -> HashMap<String, Vec<AttributeValue>> {
        let mut out = HashMap::new();
        for item in self.items.iter().filter(|i| i.purpose.includes_outbound()) {
            let values: Vec<AttributeValue> = match &item.internal_ref {
                InternalRef::Attribute { name } | InternalRef::DerivedAttribute { name } => entity
                    .attributes
                    .get(name)
                    .map(|v| v.iter().filter(|v| !v.is_null()).cloned().collect())
                    .unwrap_or_default(),
                InternalRef::Name => vec![AttributeValue::String(entity.name.clone())],
                InternalRef::Id => vec![AttributeValue::String(entity.id.to_string())],
            };
            if !values.is_empty() || item.nullable {
                out.insert(item.external_attribute.clone(), values);
            }
        }
        out
    }
}
