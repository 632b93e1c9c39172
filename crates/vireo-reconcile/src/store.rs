//! Internal store contract.
//!
//! The engine never talks to a database directly; it consumes this
//! capability trait, scoped to an authorization context supplied by the
//! caller. Correlation uses only the read side; the matrix + dispatch
//! step is the only writer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;
use thiserror::Error;

use vireo_connector::{AttributeValue, ResourceId};

use crate::entity::{Entity, EntityId, EntityKind};

/// Error from the internal store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("entity not found: {id}")]
    NotFound { id: EntityId },

    /// The caller's authorization context does not cover the entity.
    #[error("entity {id} is outside the authorization context")]
    NotAuthorized { id: EntityId },

    /// A uniqueness constraint was violated.
    #[error("constraint violation: {message}")]
    Constraint { message: String },

    /// The store backend failed.
    #[error("store backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    /// Create a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        StoreError::Constraint {
            message: message.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The set of internal entity identifiers the current run is allowed to
/// touch. Computed by the caller of the engine, never here.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationContext {
    allowed: Option<HashSet<EntityId>>,
}

impl AuthorizationContext {
    /// A context allowing every entity.
    pub fn unrestricted() -> Self {
        Self { allowed: None }
    }

    /// A context restricted to the given entity ids.
    pub fn restricted(allowed: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            allowed: Some(allowed.into_iter().collect()),
        }
    }

    /// Whether the context covers an entity.
    pub fn allows(&self, id: EntityId) -> bool {
        match &self.allowed {
            Some(set) => set.contains(&id),
            None => true,
        }
    }
}

/// One condition of a search predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// A plain attribute equals the given value.
    AttributeEquals {
        attribute: String,
        value: AttributeValue,
    },
    /// A plain attribute carries no value.
    AttributeIsNull { attribute: String },
    /// A derived attribute equals the given text.
    DerivedEquals { attribute: String, value: String },
    /// The entity name equals the given text.
    NameEquals { name: String },
    /// The entity id equals the given id.
    IdEquals { id: EntityId },
}

/// A conjunctive search predicate over internal entities.
///
/// Correlation rules and the alternate-attribute path both reduce to
/// one of these; the store evaluates it read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPredicate {
    /// All conditions must hold.
    pub conditions: Vec<Condition>,
}

impl SearchPredicate {
    /// An empty predicate (matches nothing by convention).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition (builder style).
    #[must_use]
    pub fn attribute_equals(
        mut self,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.conditions.push(Condition::AttributeEquals {
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }

    /// Add an is-null condition (builder style).
    #[must_use]
    pub fn attribute_is_null(mut self, attribute: impl Into<String>) -> Self {
        self.conditions.push(Condition::AttributeIsNull {
            attribute: attribute.into(),
        });
        self
    }

    /// Whether the predicate has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A query bounding the push population.
///
/// Entities must carry every listed attribute value to qualify; an
/// empty query selects the full population of the kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopulationQuery {
    /// Required attribute values, conjunctive.
    #[serde(default)]
    pub required: HashMap<String, AttributeValue>,
}

impl PopulationQuery {
    /// The full population of a kind.
    pub fn full() -> Self {
        Self::default()
    }

    /// Require an attribute value (builder style).
    #[must_use]
    pub fn require(
        mut self,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.required.insert(attribute.into(), value.into());
        self
    }

    /// Whether the query selects the full population.
    pub fn is_full(&self) -> bool {
        self.required.is_empty()
    }
}

/// Attribute changes produced by an inbound projection.
///
/// `set` replaces value lists; `clear` removes attributes that were
/// explicitly emptied externally. Attributes in neither map are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct AttributeUpdate {
    /// Value lists to set.
    pub set: HashMap<String, Vec<AttributeValue>>,
    /// Attributes to clear.
    pub clear: Vec<String>,
}

impl AttributeUpdate {
    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.clear.is_empty()
    }
}

/// Read/write capability over the internal identity store.
///
/// Every call is scoped to the caller-supplied authorization context.
#[async_trait]
pub trait InternalStore: Send + Sync {
    /// Find an entity by id.
    async fn find_by_id(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        id: EntityId,
    ) -> StoreResult<Option<Entity>>;

    /// Find entities whose plain attribute equals the value; `None`
    /// matches entities without the attribute.
    async fn find_by_attribute(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        attribute: &str,
        value: Option<&AttributeValue>,
    ) -> StoreResult<Vec<Entity>>;

    /// Find entities by a derived attribute value.
    async fn find_by_derived_attribute(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        attribute: &str,
        value: &str,
    ) -> StoreResult<Vec<Entity>>;

    /// Find an entity by its unique name.
    async fn find_by_name(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        name: &str,
    ) -> StoreResult<Option<Entity>>;

    /// Evaluate a conjunctive predicate.
    async fn search(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        predicate: &SearchPredicate,
    ) -> StoreResult<Vec<Entity>>;

    /// List a population page in a stable order.
    async fn list(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        query: &PopulationQuery,
        offset: u64,
        limit: usize,
    ) -> StoreResult<Vec<Entity>>;

    /// Create an entity.
    async fn create(&self, ctx: &AuthorizationContext, entity: Entity) -> StoreResult<EntityId>;

    /// Apply an attribute update to an entity.
    async fn update(
        &self,
        ctx: &AuthorizationContext,
        id: EntityId,
        update: AttributeUpdate,
    ) -> StoreResult<()>;

    /// Delete an entity.
    async fn delete(&self, ctx: &AuthorizationContext, id: EntityId) -> StoreResult<()>;

    /// Link an entity to an external account on a resource.
    async fn link(
        &self,
        ctx: &AuthorizationContext,
        id: EntityId,
        resource: ResourceId,
        uid: &str,
    ) -> StoreResult<()>;

    /// Remove an entity's link on a resource.
    async fn unlink(
        &self,
        ctx: &AuthorizationContext,
        id: EntityId,
        resource: ResourceId,
    ) -> StoreResult<()>;

    /// The entity linked to an external uid on a resource, if any.
    async fn find_by_link(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        kind: EntityKind,
        uid: &str,
    ) -> StoreResult<Option<EntityId>>;

    /// The external uid an entity is linked to on a resource, if any.
    async fn link_for(
        &self,
        ctx: &AuthorizationContext,
        id: EntityId,
        resource: ResourceId,
    ) -> StoreResult<Option<String>>;

    /// Every (entity, uid) link recorded for a resource and kind.
    async fn links_for_resource(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        kind: EntityKind,
    ) -> StoreResult<Vec<(EntityId, String)>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_context() {
        let a = EntityId::new();
        let b = EntityId::new();

        let open = AuthorizationContext::unrestricted();
        assert!(open.allows(a));

        let scoped = AuthorizationContext::restricted([a]);
        assert!(scoped.allows(a));
        assert!(!scoped.allows(b));
    }

    #[test]
    fn test_predicate_builder() {
        let predicate = SearchPredicate::new()
            .attribute_equals("mail", "j@x.com")
            .attribute_is_null("employeeNumber");
        assert_eq!(predicate.conditions.len(), 2);
        assert!(!predicate.is_empty());
    }

    #[test]
    fn test_population_query() {
        assert!(PopulationQuery::full().is_full());
        let scoped = PopulationQuery::full().require("department", "eng");
        assert!(!scoped.is_full());
    }

    #[test]
    fn test_attribute_update_emptiness() {
        let mut update = AttributeUpdate::default();
        assert!(update.is_empty());
        update.clear.push("mail".to_string());
        assert!(!update.is_empty());
    }
}
