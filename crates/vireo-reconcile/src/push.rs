//! Push orchestrator: internal to external propagation.
//!
//! Pages the internal population at a fixed size instead of loading it
//! wholesale; pages are fetched sequentially to stay friendly to
//! external rate quotas. Per-entity failures are recorded and the page
//! loop continues.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use vireo_connector::{ConnectorFacade, ExternalRecord, ResourceId, WriteOperation};

use crate::entity::{Entity, EntityId, KindProfile};
use crate::error::{EngineResult, RecordError};
use crate::mapping::Mapping;
use crate::matrix::{decide_push, Decision, Operation};
use crate::policy::{PolicyProvider, SyncPolicy};
use crate::report::{Direction, Outcome, RunMode, RunReport, RunReportBuilder, TraceLevel};
use crate::store::{AuthorizationContext, InternalStore, PopulationQuery};

/// Fixed page size for the internal population scan.
pub const PUSH_PAGE_SIZE: usize = 1000;

/// Options for one push run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PushOptions {
    /// Report-only: decisions are made, dispatch is skipped.
    #[serde(default)]
    pub dry_run: bool,
    /// Rendering detail of the resulting report.
    #[serde(default)]
    pub trace_level: TraceLevel,
}

impl PushOptions {
    /// Enable dry-run mode (builder style).
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the trace level (builder style).
    #[must_use]
    pub fn trace_level(mut self, level: TraceLevel) -> Self {
        self.trace_level = level;
        self
    }
}

/// The push orchestrator.
pub struct PushOrchestrator {
    connector: Arc<dyn ConnectorFacade>,
    store: Arc<dyn InternalStore>,
    provider: Arc<dyn PolicyProvider>,
}

impl PushOrchestrator {
    /// Create a push orchestrator.
    pub fn new(
        connector: Arc<dyn ConnectorFacade>,
        store: Arc<dyn InternalStore>,
        provider: Arc<dyn PolicyProvider>,
    ) -> Self {
        Self {
            connector,
            store,
            provider,
        }
    }

    /// Execute one push run over a population.
    ///
    /// An empty query pushes the full population of the kind. Entities
    /// filtered out of a scoped population are left untouched unless
    /// the policy's deprovision flag says otherwise.
    #[instrument(skip(self, ctx, profile, query, options), fields(resource = %resource, kind = %profile.kind, dry_run = options.dry_run))]
    pub async fn run(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        profile: &KindProfile,
        query: &PopulationQuery,
        options: &PushOptions,
    ) -> EngineResult<RunReport> {
        let mapping = self.provider.mapping(resource, profile.kind)?;
        let policy = self.provider.policy(resource, profile.kind)?;
        info!("push run initialized");

        let mut report = RunReportBuilder::new(
            resource,
            Direction::Push,
            RunMode::Full,
            options.dry_run,
            options.trace_level,
        );
        let mut seen: HashSet<EntityId> = HashSet::new();

        // Sequential fixed-size pages; run-level store failures abort.
        let mut offset = 0u64;
        loop {
            let page = self
                .store
                .list(ctx, profile.kind, query, offset, PUSH_PAGE_SIZE)
                .await?;
            let page_len = page.len();
            for entity in page {
                seen.insert(entity.id);
                let outcome = self
                    .process_entity(ctx, resource, profile, &mapping, &policy, entity, options)
                    .await;
                report.record(outcome);
            }
            if page_len < PUSH_PAGE_SIZE {
                break;
            }
            offset += PUSH_PAGE_SIZE as u64;
        }

        // Linked entities that left the population scope.
        if policy.deprovision_out_of_scope && !query.is_full() {
            let links = self
                .store
                .links_for_resource(ctx, resource, profile.kind)
                .await?;
            for (id, uid) in links {
                if seen.contains(&id) {
                    continue;
                }
                let decision = decide_push(true, false, &policy, options.dry_run);
                let outcome = self
                    .dispatch_out_of_scope(ctx, resource, profile, id, &uid, &decision)
                    .await;
                report.record(outcome);
            }
        }

        let report = report.finalize();
        info!(
            processed = report.summary.processed,
            failed = report.summary.failed,
            "push run finished"
        );
        Ok(report)
    }

    /// Process one in-scope entity; failures become failed outcomes.
    #[allow(clippy::too_many_arguments)]
    async fn process_entity(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        profile: &KindProfile,
        mapping: &Mapping,
        policy: &SyncPolicy,
        entity: Entity,
        options: &PushOptions,
    ) -> Outcome {
        let id = entity.id;
        match self
            .try_process(ctx, resource, profile, mapping, policy, entity, options)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(entity = %id, error = %err, "entity push failed");
                Outcome::failed(Operation::None, profile.kind, None, err.to_string())
                    .dry_run(options.dry_run)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_process(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        profile: &KindProfile,
        mapping: &Mapping,
        policy: &SyncPolicy,
        entity: Entity,
        options: &PushOptions,
    ) -> Result<Outcome, RecordError> {
        let linked = self.store.link_for(ctx, entity.id, resource).await?;
        let decision = decide_push(linked.is_some(), true, policy, options.dry_run);

        if decision.dry_run {
            debug!(entity = %entity.id, operation = %decision.operation, "dry-run: dispatch skipped");
            return Ok(
                Outcome::succeeded(decision.operation, profile.kind, linked, Some(entity.id))
                    .dry_run(true),
            );
        }

        let dispatched = self
            .dispatch_in_scope(ctx, resource, profile, mapping, &entity, &decision, linked)
            .await;
        Ok(match dispatched {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(entity = %entity.id, operation = %decision.operation, error = %err, "dispatch failed");
                Outcome::failed(decision.operation, profile.kind, None, err.to_string())
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_in_scope(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        profile: &KindProfile,
        mapping: &Mapping,
        entity: &Entity,
        decision: &Decision,
        linked: Option<String>,
    ) -> Result<Outcome, RecordError> {
        let outcome = match (decision.operation, linked) {
            (Operation::Update, Some(uid)) => {
                let record = outbound_record(&uid, mapping, entity);
                self.connector
                    .write(&profile.object_class, WriteOperation::Update(record))
                    .await?;
                Outcome::succeeded(Operation::Update, profile.kind, Some(uid), Some(entity.id))
            }
            (Operation::Provision, _) => {
                let attributes = mapping.project_outbound(entity);
                // Seed the uid from the projected account-id value,
                // falling back to the entity name; the connector owns
                // the final identifier.
                let account_attr = &mapping.account_id_item().external_attribute;
                let seed = attributes
                    .get(account_attr)
                    .and_then(|values| values.first())
                    .map(|v| v.to_text())
                    .unwrap_or_else(|| entity.name.clone());
                let mut record = ExternalRecord::new(seed);
                for (attr, values) in attributes {
                    record = record.with_values(attr, values);
                }
                let uid = self
                    .connector
                    .write(&profile.object_class, WriteOperation::Create(record))
                    .await?;
                self.store.link(ctx, entity.id, resource, &uid).await?;
                Outcome::succeeded(Operation::Provision, profile.kind, Some(uid), Some(entity.id))
            }
            (operation, uid) => Outcome::succeeded(operation, profile.kind, uid, Some(entity.id)),
        };
        Ok(outcome)
    }

    /// Deprovision one linked-but-out-of-scope entity.
    async fn dispatch_out_of_scope(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        profile: &KindProfile,
        id: EntityId,
        uid: &str,
        decision: &Decision,
    ) -> Outcome {
        if decision.operation != Operation::Deprovision {
            return Outcome::succeeded(
                Operation::None,
                profile.kind,
                Some(uid.to_string()),
                Some(id),
            );
        }
        if decision.dry_run {
            debug!(entity = %id, uid = %uid, "dry-run: would deprovision");
            return Outcome::succeeded(
                Operation::Deprovision,
                profile.kind,
                Some(uid.to_string()),
                Some(id),
            )
            .dry_run(true);
        }

        let result: Result<(), RecordError> = async {
            self.connector
                .write(
                    &profile.object_class,
                    WriteOperation::Delete {
                        uid: uid.to_string(),
                    },
                )
                .await?;
            self.store.unlink(ctx, id, resource).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => Outcome::succeeded(
                Operation::Deprovision,
                profile.kind,
                Some(uid.to_string()),
                Some(id),
            ),
            Err(err) => {
                warn!(entity = %id, uid = %uid, error = %err, "deprovision failed");
                Outcome::failed(
                    Operation::Deprovision,
                    profile.kind,
                    Some(uid.to_string()),
                    err.to_string(),
                )
            }
        }
    }
}

/// Build the outbound record for an update.
fn outbound_record(uid: &str, mapping: &Mapping, entity: &Entity) -> ExternalRecord {
    let mut record = ExternalRecord::new(uid);
    for (attr, values) in mapping.project_outbound(entity) {
        record = record.with_values(attr, values);
    }
    record
}
