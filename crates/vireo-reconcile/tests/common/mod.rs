//! In-memory collaborator fakes shared by the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vireo_connector::{
    ChangeBatch, ConnectorError, ConnectorFacade, ConnectorResult, Delta, ExternalRecord, Filter,
    PageRequest, RecordPage, ResourceId, SearchOptions, SyncCursor, WriteOperation,
};
use vireo_reconcile::{
    AttributeUpdate, AuthorizationContext, Condition, CursorResult, CursorStore, Entity, EntityId,
    EntityKind, InternalStore, Mapping, PolicyProvider, PopulationQuery, ProviderError,
    SearchPredicate, StoreError, StoreResult, SyncPolicy,
};

// =============================================================================
// In-memory internal store
// =============================================================================

struct LinkRow {
    resource: ResourceId,
    kind: EntityKind,
    uid: String,
    entity: EntityId,
}

#[derive(Default)]
struct StoreState {
    entities: BTreeMap<EntityId, Entity>,
    links: Vec<LinkRow>,
}

/// In-memory store with call counters and configurable create failures.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    list_pages: AtomicUsize,
    fail_create_names: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity directly, bypassing counters.
    pub fn insert_entity(&self, entity: Entity) -> EntityId {
        let id = entity.id;
        self.state.lock().unwrap().entities.insert(id, entity);
        id
    }

    /// Seed a link directly.
    pub fn insert_link(&self, resource: ResourceId, kind: EntityKind, uid: &str, entity: EntityId) {
        self.state.lock().unwrap().links.push(LinkRow {
            resource,
            kind,
            uid: uid.to_string(),
            entity,
        });
    }

    /// Make `create` fail for entities with the given name.
    pub fn fail_create_for(&self, name: &str) {
        self.fail_create_names
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.state.lock().unwrap().entities.get(&id).cloned()
    }

    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.state
            .lock()
            .unwrap()
            .entities
            .values()
            .find(|e| e.name == name)
            .cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.state.lock().unwrap().entities.len()
    }

    pub fn link_count(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    pub fn is_linked(&self, resource: ResourceId, uid: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .links
            .iter()
            .any(|l| l.resource == resource && l.uid == uid)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn list_pages(&self) -> usize {
        self.list_pages.load(Ordering::SeqCst)
    }

    fn matches_value(entity: &Entity, attribute: &str, value: &vireo_connector::AttributeValue) -> bool {
        entity
            .attributes
            .get(attribute)
            .is_some_and(|values| values.contains(value))
    }

    fn attribute_is_null(entity: &Entity, attribute: &str) -> bool {
        match entity.attributes.get(attribute) {
            Some(values) => values.iter().all(|v| v.is_null()),
            None => true,
        }
    }
}

#[async_trait]
impl InternalStore for MemoryStore {
    async fn find_by_id(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        id: EntityId,
    ) -> StoreResult<Option<Entity>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .entities
            .get(&id)
            .filter(|e| e.kind == kind && ctx.allows(e.id))
            .cloned())
    }

    async fn find_by_attribute(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        attribute: &str,
        value: Option<&vireo_connector::AttributeValue>,
    ) -> StoreResult<Vec<Entity>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .entities
            .values()
            .filter(|e| e.kind == kind && ctx.allows(e.id))
            .filter(|e| match value {
                Some(v) => Self::matches_value(e, attribute, v),
                None => Self::attribute_is_null(e, attribute),
            })
            .cloned()
            .collect())
    }

    async fn find_by_derived_attribute(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        attribute: &str,
        value: &str,
    ) -> StoreResult<Vec<Entity>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .entities
            .values()
            .filter(|e| e.kind == kind && ctx.allows(e.id))
            .filter(|e| {
                e.attributes
                    .get(attribute)
                    .is_some_and(|values| values.iter().any(|v| v.to_text() == value))
            })
            .cloned()
            .collect())
    }

    async fn find_by_name(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        name: &str,
    ) -> StoreResult<Option<Entity>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .entities
            .values()
            .find(|e| e.kind == kind && e.name == name && ctx.allows(e.id))
            .cloned())
    }

    async fn search(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        predicate: &SearchPredicate,
    ) -> StoreResult<Vec<Entity>> {
        if predicate.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .entities
            .values()
            .filter(|e| e.kind == kind && ctx.allows(e.id))
            .filter(|e| {
                predicate.conditions.iter().all(|c| match c {
                    Condition::AttributeEquals { attribute, value } => {
                        Self::matches_value(e, attribute, value)
                    }
                    Condition::AttributeIsNull { attribute } => {
                        Self::attribute_is_null(e, attribute)
                    }
                    Condition::DerivedEquals { attribute, value } => e
                        .attributes
                        .get(attribute)
                        .is_some_and(|values| values.iter().any(|v| &v.to_text() == value)),
                    Condition::NameEquals { name } => &e.name == name,
                    Condition::IdEquals { id } => e.id == *id,
                })
            })
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        ctx: &AuthorizationContext,
        kind: EntityKind,
        query: &PopulationQuery,
        offset: u64,
        limit: usize,
    ) -> StoreResult<Vec<Entity>> {
        self.list_pages.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state
            .entities
            .values()
            .filter(|e| e.kind == kind && ctx.allows(e.id))
            .filter(|e| {
                query
                    .required
                    .iter()
                    .all(|(attr, value)| Self::matches_value(e, attr, value))
            })
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create(&self, _ctx: &AuthorizationContext, entity: Entity) -> StoreResult<EntityId> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_names.lock().unwrap().contains(&entity.name) {
            return Err(StoreError::constraint(format!(
                "create rejected for '{}'",
                entity.name
            )));
        }
        let id = entity.id;
        self.state.lock().unwrap().entities.insert(id, entity);
        Ok(id)
    }

    async fn update(
        &self,
        _ctx: &AuthorizationContext,
        id: EntityId,
        update: AttributeUpdate,
    ) -> StoreResult<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let entity = state
            .entities
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;
        for (attr, values) in update.set {
            entity.attributes.insert(attr, values);
        }
        for attr in update.clear {
            entity.attributes.remove(&attr);
        }
        Ok(())
    }

    async fn delete(&self, _ctx: &AuthorizationContext, id: EntityId) -> StoreResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state
            .entities
            .remove(&id)
            .ok_or(StoreError::NotFound { id })?;
        state.links.retain(|l| l.entity != id);
        Ok(())
    }

    async fn link(
        &self,
        _ctx: &AuthorizationContext,
        id: EntityId,
        resource: ResourceId,
        uid: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let kind = state
            .entities
            .get(&id)
            .map(|e| e.kind)
            .ok_or(StoreError::NotFound { id })?;
        state.links.retain(|l| !(l.entity == id && l.resource == resource));
        state.links.push(LinkRow {
            resource,
            kind,
            uid: uid.to_string(),
            entity: id,
        });
        Ok(())
    }

    async fn unlink(
        &self,
        _ctx: &AuthorizationContext,
        id: EntityId,
        resource: ResourceId,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .links
            .retain(|l| !(l.entity == id && l.resource == resource));
        Ok(())
    }

    async fn find_by_link(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        kind: EntityKind,
        uid: &str,
    ) -> StoreResult<Option<EntityId>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .links
            .iter()
            .find(|l| l.resource == resource && l.kind == kind && l.uid == uid)
            .map(|l| l.entity)
            .filter(|id| ctx.allows(*id)))
    }

    async fn link_for(
        &self,
        _ctx: &AuthorizationContext,
        id: EntityId,
        resource: ResourceId,
    ) -> StoreResult<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .links
            .iter()
            .find(|l| l.entity == id && l.resource == resource)
            .map(|l| l.uid.clone()))
    }

    async fn links_for_resource(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        kind: EntityKind,
    ) -> StoreResult<Vec<(EntityId, String)>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .links
            .iter()
            .filter(|l| l.resource == resource && l.kind == kind && ctx.allows(l.entity))
            .map(|l| (l.entity, l.uid.clone()))
            .collect())
    }
}

// =============================================================================
// In-memory connector
// =============================================================================

#[derive(Default)]
struct ConnectorState {
    records: BTreeMap<String, BTreeMap<String, ExternalRecord>>,
    changes: Vec<(u64, String, Delta)>,
    seq: u64,
}

/// In-memory connector with a replayable change log and configurable
/// failure behavior.
#[derive(Default)]
pub struct MemoryConnector {
    state: Mutex<ConnectorState>,
    write_calls: AtomicUsize,
    change_fetches: AtomicUsize,
    fail_write_uids: Mutex<HashSet<String>>,
    fail_fetch_after: Mutex<Option<usize>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without logging a change.
    pub fn seed_record(&self, object_class: &str, record: ExternalRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .records
            .entry(object_class.to_string())
            .or_default()
            .insert(record.uid().to_string(), record);
    }

    /// Record a create, advancing the change log.
    pub fn push_create(&self, object_class: &str, record: ExternalRecord) {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let seq = state.seq;
        state
            .records
            .entry(object_class.to_string())
            .or_default()
            .insert(record.uid().to_string(), record.clone());
        state
            .changes
            .push((seq, object_class.to_string(), Delta::created(record)));
    }

    /// Record an update, advancing the change log.
    pub fn push_update(&self, object_class: &str, record: ExternalRecord) {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let seq = state.seq;
        state
            .records
            .entry(object_class.to_string())
            .or_default()
            .insert(record.uid().to_string(), record.clone());
        state
            .changes
            .push((seq, object_class.to_string(), Delta::updated(record)));
    }

    /// Record a delete, advancing the change log.
    pub fn push_delete(&self, object_class: &str, uid: &str) {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let seq = state.seq;
        if let Some(class) = state.records.get_mut(object_class) {
            class.remove(uid);
        }
        state
            .changes
            .push((seq, object_class.to_string(), Delta::deleted(uid)));
    }

    /// Make writes fail for the given uid.
    pub fn fail_write_for(&self, uid: &str) {
        self.fail_write_uids.lock().unwrap().insert(uid.to_string());
    }

    /// Make `changes_since` fail after N successful fetches.
    pub fn fail_fetch_after(&self, fetches: usize) {
        *self.fail_fetch_after.lock().unwrap() = Some(fetches);
    }

    /// Stop injecting fetch failures.
    pub fn clear_fetch_failure(&self) {
        *self.fail_fetch_after.lock().unwrap() = None;
    }

    pub fn has_record(&self, object_class: &str, uid: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .records
            .get(object_class)
            .is_some_and(|class| class.contains_key(uid))
    }

    pub fn record(&self, object_class: &str, uid: &str) -> Option<ExternalRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(object_class)
            .and_then(|class| class.get(uid).cloned())
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectorFacade for MemoryConnector {
    async fn search(
        &self,
        object_class: &str,
        filter: &Filter,
        _options: &SearchOptions,
    ) -> ConnectorResult<Vec<ExternalRecord>> {
        let state = self.state.lock().unwrap();
        let records = state
            .records
            .get(object_class)
            .map(|class| class.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(match filter {
            Filter::All => records,
            Filter::Equals { attribute, value } => records
                .into_iter()
                .filter(|r| r.get(attribute).is_some_and(|vals| vals.contains(value)))
                .collect(),
            Filter::Present { attribute } => records
                .into_iter()
                .filter(|r| r.first_value(attribute).is_some())
                .collect(),
            _ => records,
        })
    }

    async fn current_cursor(&self, _object_class: &str) -> ConnectorResult<SyncCursor> {
        let state = self.state.lock().unwrap();
        Ok(SyncCursor::new(state.seq.to_string()))
    }

    async fn changes_since(
        &self,
        object_class: &str,
        cursor: Option<&SyncCursor>,
        batch_size: u32,
    ) -> ConnectorResult<ChangeBatch> {
        let fetches = self.change_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_fetch_after.lock().unwrap() {
            if fetches >= limit {
                return Err(ConnectorError::operation_failed("change stream interrupted"));
            }
        }

        let since: u64 = cursor
            .map(|c| c.value().parse().unwrap_or(0))
            .unwrap_or(0);
        let state = self.state.lock().unwrap();
        let pending: Vec<(u64, Delta)> = state
            .changes
            .iter()
            .filter(|(seq, class, _)| *seq > since && class == object_class)
            .map(|(seq, _, delta)| (*seq, delta.clone()))
            .collect();

        let take = batch_size as usize;
        let batch: Vec<(u64, Delta)> = pending.iter().take(take).cloned().collect();
        let has_more = pending.len() > take;
        let resume = batch.last().map(|(seq, _)| SyncCursor::new(seq.to_string()));

        let mut result = ChangeBatch::with_deltas(batch.into_iter().map(|(_, d)| d).collect());
        if let Some(resume) = resume {
            result = result.with_resume(resume);
        }
        if has_more {
            result = result.with_more();
        }
        Ok(result)
    }

    async fn list_all(
        &self,
        object_class: &str,
        page: &PageRequest,
    ) -> ConnectorResult<RecordPage> {
        let state = self.state.lock().unwrap();
        let all: Vec<ExternalRecord> = state
            .records
            .get(object_class)
            .map(|class| class.values().cloned().collect())
            .unwrap_or_default();
        let offset = page.offset as usize;
        let records: Vec<ExternalRecord> = all
            .iter()
            .skip(offset)
            .take(page.size as usize)
            .cloned()
            .collect();
        let has_more = all.len() > offset + records.len();
        Ok(RecordPage { records, has_more })
    }

    async fn fetch_by_id(
        &self,
        object_class: &str,
        uid: &str,
    ) -> ConnectorResult<Option<ExternalRecord>> {
        Ok(self.record(object_class, uid))
    }

    async fn write(&self, object_class: &str, op: WriteOperation) -> ConnectorResult<String> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_write_uids.lock().unwrap().contains(op.uid()) {
            return Err(ConnectorError::operation_failed(format!(
                "write rejected for '{}'",
                op.uid()
            )));
        }
        let mut state = self.state.lock().unwrap();
        let class = state.records.entry(object_class.to_string()).or_default();
        match op {
            WriteOperation::Create(record) | WriteOperation::Update(record) => {
                let uid = record.uid().to_string();
                class.insert(uid.clone(), record);
                Ok(uid)
            }
            WriteOperation::Delete { uid } => {
                class.remove(&uid);
                Ok(uid)
            }
        }
    }
}

// =============================================================================
// In-memory cursor store and static provider
// =============================================================================

/// In-memory cursor store with a save counter.
#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<(ResourceId, EntityKind), SyncCursor>>,
    save_calls: AtomicUsize,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: ResourceId, kind: EntityKind) -> Option<SyncCursor> {
        self.cursors.lock().unwrap().get(&(resource, kind)).cloned()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(
        &self,
        resource: ResourceId,
        kind: EntityKind,
    ) -> CursorResult<Option<SyncCursor>> {
        Ok(self.cursors.lock().unwrap().get(&(resource, kind)).cloned())
    }

    async fn save(
        &self,
        resource: ResourceId,
        kind: EntityKind,
        cursor: &SyncCursor,
    ) -> CursorResult<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.cursors
            .lock()
            .unwrap()
            .insert((resource, kind), cursor.clone());
        Ok(())
    }
}

/// Static provider keyed by entity kind.
#[derive(Default)]
pub struct StaticProvider {
    entries: HashMap<EntityKind, (Arc<Mapping>, Arc<SyncPolicy>)>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: EntityKind, mapping: Mapping, policy: SyncPolicy) -> Self {
        self.entries
            .insert(kind, (Arc::new(mapping), Arc::new(policy)));
        self
    }
}

impl PolicyProvider for StaticProvider {
    fn mapping(
        &self,
        resource: ResourceId,
        kind: EntityKind,
    ) -> Result<Arc<Mapping>, ProviderError> {
        self.entries
            .get(&kind)
            .map(|(mapping, _)| mapping.clone())
            .ok_or(ProviderError::MappingNotFound { resource, kind })
    }

    fn policy(
        &self,
        resource: ResourceId,
        kind: EntityKind,
    ) -> Result<Arc<SyncPolicy>, ProviderError> {
        self.entries
            .get(&kind)
            .map(|(_, policy)| policy.clone())
            .ok_or(ProviderError::PolicyNotFound { resource, kind })
    }
}
