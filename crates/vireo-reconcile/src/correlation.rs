//! Correlation engine: matching external records to internal entities.
//!
//! Three lookup paths, in strict priority order: a registered
//! correlation rule, the policy's alternate search attributes, and the
//! mapping's account-id item as fallback. All paths are read-only;
//! multiple matches are never silently merged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use vireo_connector::{AttributeValue, ExternalRecord};

use crate::entity::{EntityId, KindProfile};
use crate::mapping::{InternalRef, Mapping, MappingError};
use crate::policy::SyncPolicy;
use crate::store::{AuthorizationContext, InternalStore, SearchPredicate, StoreError};

/// Error raised during correlation.
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// A caller configuration defect: the policy references something
    /// the mapping cannot resolve, or an unregistered rule.
    #[error("correlation configuration error: {message}")]
    Configuration { message: String },

    /// The record's account-id value could not be resolved.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// The internal store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CorrelationError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        CorrelationError::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error is a caller configuration defect.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CorrelationError::Configuration { .. })
    }
}

/// Candidate internal entities for one external record.
///
/// Candidates are kept in a stable, defined order (sorted by id), so
/// the many-match tie-break is deterministic across runs and stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationResult {
    candidates: Vec<EntityId>,
}

impl CorrelationResult {
    /// Build a result from candidate ids; sorts and deduplicates.
    pub fn from_candidates(mut candidates: Vec<EntityId>) -> Self {
        candidates.sort();
        candidates.dedup();
        Self { candidates }
    }

    /// No candidate.
    pub fn none() -> Self {
        Self::default()
    }

    /// The candidates, in stable order.
    pub fn candidates(&self) -> &[EntityId] {
        &self.candidates
    }

    /// Whether no entity matched.
    pub fn is_none(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Whether exactly one entity matched.
    pub fn is_single(&self) -> bool {
        self.candidates.len() == 1
    }

    /// Whether more than one entity matched.
    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }

    /// The deterministic tie-break: first candidate in stable order.
    pub fn primary(&self) -> Option<EntityId> {
        self.candidates.first().copied()
    }
}

/// A pluggable correlation strategy for one entity kind.
///
/// Implementations turn a record into a search predicate over internal
/// entities; the engine executes it. The set of implementations is a
/// closed, statically registered table, selected by a policy key.
pub trait CorrelationRule: Send + Sync {
    /// Build the search predicate for a record.
    fn build_predicate(&self, record: &ExternalRecord) -> Result<SearchPredicate, CorrelationError>;
}

/// Closed registry of correlation rules, keyed by policy tag.
#[derive(Default)]
pub struct CorrelationRuleRegistry {
    rules: HashMap<String, Arc<dyn CorrelationRule>>,
}

impl CorrelationRuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule under a key (builder style).
    #[must_use]
    pub fn with_rule(mut self, key: impl Into<String>, rule: Arc<dyn CorrelationRule>) -> Self {
        self.rules.insert(key.into(), rule);
        self
    }

    /// Look up a rule by key.
    pub fn get(&self, key: &str) -> Option<&Arc<dyn CorrelationRule>> {
        self.rules.get(key)
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The correlation engine.
///
/// Holds the read side of the internal store and the rule registry;
/// never mutates internal state.
pub struct CorrelationEngine {
    store: Arc<dyn InternalStore>,
    registry: Arc<CorrelationRuleRegistry>,
}

impl CorrelationEngine {
    /// Create a correlation engine.
    pub fn new(store: Arc<dyn InternalStore>, registry: Arc<CorrelationRuleRegistry>) -> Self {
        Self { store, registry }
    }

    /// Validate that a policy's correlation configuration is satisfiable
    /// against a mapping. Called at run INIT, before any record.
    pub fn validate_policy(
        &self,
        policy: &SyncPolicy,
        mapping: &Mapping,
    ) -> Result<(), CorrelationError> {
        if let Some(key) = &policy.correlation_rule {
            if self.registry.get(key).is_none() {
                return Err(CorrelationError::configuration(format!(
                    "correlation rule '{key}' is not registered"
                )));
            }
        }
        for attribute in &policy.alternate_search_attributes {
            if mapping.inbound_item_for_attribute(attribute).is_none() {
                return Err(CorrelationError::configuration(format!(
                    "alternate search attribute '{attribute}' has no inbound mapping item"
                )));
            }
        }
        Ok(())
    }

    /// Correlate a record to internal entities.
    pub async fn correlate(
        &self,
        ctx: &AuthorizationContext,
        record: &ExternalRecord,
        mapping: &Mapping,
        policy: &SyncPolicy,
        profile: &KindProfile,
    ) -> Result<CorrelationResult, CorrelationError> {
        // Priority 1: registered rule.
        if let Some(key) = &policy.correlation_rule {
            let rule = self.registry.get(key).ok_or_else(|| {
                CorrelationError::configuration(format!(
                    "correlation rule '{key}' is not registered"
                ))
            })?;
            let predicate = rule.build_predicate(record)?;
            let matches = self.store.search(ctx, profile.kind, &predicate).await?;
            return Ok(self.collect(record, matches.into_iter().map(|e| e.id)));
        }

        // Priority 2: alternate search attributes.
        if !policy.alternate_search_attributes.is_empty() {
            let predicate = self.alternate_predicate(record, mapping, policy)?;
            let matches = self.store.search(ctx, profile.kind, &predicate).await?;
            return Ok(self.collect(record, matches.into_iter().map(|e| e.id)));
        }

        // Priority 3: account-id fallback.
        self.correlate_by_account_id(ctx, record, mapping, profile)
            .await
    }

    /// Build the conjunctive equality predicate for the alternate
    /// search attributes.
    fn alternate_predicate(
        &self,
        record: &ExternalRecord,
        mapping: &Mapping,
        policy: &SyncPolicy,
    ) -> Result<SearchPredicate, CorrelationError> {
        let mut predicate = SearchPredicate::new();
        for attribute in &policy.alternate_search_attributes {
            let item = mapping.inbound_item_for_attribute(attribute).ok_or_else(|| {
                CorrelationError::configuration(format!(
                    "alternate search attribute '{attribute}' has no inbound mapping item"
                ))
            })?;
            match record.first_value(&item.external_attribute) {
                Some(value) => {
                    predicate = predicate.attribute_equals(attribute.clone(), value.clone());
                }
                // Absent or empty externally: require IS NULL internally.
                None => {
                    predicate = predicate.attribute_is_null(attribute.clone());
                }
            }
        }
        Ok(predicate)
    }

    /// Interpret the account-id value according to the mapped internal
    /// reference and perform the corresponding lookup.
    ///
    /// Values that fail to parse against the target type degrade to raw
    /// text rather than raising, so correlation never aborts here.
    async fn correlate_by_account_id(
        &self,
        ctx: &AuthorizationContext,
        record: &ExternalRecord,
        mapping: &Mapping,
        profile: &KindProfile,
    ) -> Result<CorrelationResult, CorrelationError> {
        let item = mapping.account_id_item();
        let raw = mapping.resolve_account_id(record)?.to_text();

        let ids: Vec<EntityId> = match &item.internal_ref {
            InternalRef::Attribute { name } => {
                let value = profile
                    .schema_type(name)
                    .parse_value(&raw)
                    .unwrap_or_else(|| AttributeValue::String(raw.clone()));
                self.store
                    .find_by_attribute(ctx, profile.kind, name, Some(&value))
                    .await?
                    .into_iter()
                    .map(|e| e.id)
                    .collect()
            }
            InternalRef::DerivedAttribute { name } => self
                .store
                .find_by_derived_attribute(ctx, profile.kind, name, &raw)
                .await?
                .into_iter()
                .map(|e| e.id)
                .collect(),
            InternalRef::Name => self
                .store
                .find_by_name(ctx, profile.kind, &raw)
                .await?
                .into_iter()
                .map(|e| e.id)
                .collect(),
            InternalRef::Id => match EntityId::parse(&raw) {
                Ok(id) => self
                    .store
                    .find_by_id(ctx, profile.kind, id)
                    .await?
                    .into_iter()
                    .map(|e| e.id)
                    .collect(),
                // Not an id after all; degrade to a name lookup.
                Err(_) => self
                    .store
                    .find_by_name(ctx, profile.kind, &raw)
                    .await?
                    .into_iter()
                    .map(|e| e.id)
                    .collect(),
            },
        };

        Ok(self.collect(record, ids.into_iter()))
    }

    fn collect(
        &self,
        record: &ExternalRecord,
        ids: impl Iterator<Item = EntityId>,
    ) -> CorrelationResult {
        let result = CorrelationResult::from_candidates(ids.collect());
        if result.is_ambiguous() {
            warn!(
                uid = %record.uid(),
                candidates = result.candidates().len(),
                "ambiguous correlation, taking first candidate in stable order"
            );
        } else {
            debug!(
                uid = %record.uid(),
                matched = result.is_single(),
                "correlation finished"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_result_stable_order_and_dedup() {
        let a = EntityId::from_uuid(Uuid::from_u128(7));
        let b = EntityId::from_uuid(Uuid::from_u128(3));
        let result = CorrelationResult::from_candidates(vec![a, b, a]);
        assert_eq!(result.candidates(), &[b, a]);
        assert!(result.is_ambiguous());
        assert_eq!(result.primary(), Some(b));
    }

    #[test]
    fn test_result_cardinality() {
        assert!(CorrelationResult::none().is_none());
        let single = CorrelationResult::from_candidates(vec![EntityId::new()]);
        assert!(single.is_single());
        assert!(!single.is_ambiguous());
    }

    #[test]
    fn test_registry_lookup() {
        struct MailRule;
        impl CorrelationRule for MailRule {
            fn build_predicate(
                &self,
                record: &ExternalRecord,
            ) -> Result<SearchPredicate, CorrelationError> {
                let mail = record
                    .first_value("mail")
                    .cloned()
                    .unwrap_or(AttributeValue::Null);
                Ok(SearchPredicate::new().attribute_equals("mail", mail))
            }
        }

        let registry = CorrelationRuleRegistry::new().with_rule("by-mail", Arc::new(MailRule));
        assert!(registry.get("by-mail").is_some());
        assert!(registry.get("by-phone").is_none());
        assert_eq!(registry.len(), 1);
    }
}
