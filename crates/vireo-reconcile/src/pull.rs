//! Pull orchestrator: external to internal reconciliation.
//!
//! Drives a full or incremental external scan through the per-delta
//! pipeline: correlate, decide, dispatch, record. A single delta
//! failure is caught and recorded; only stream-level and finalization
//! failures abort the run. Cursors are captured from the connector
//! before streaming begins and persisted only after a clean
//! incremental scan, so a crash mid-run reprocesses from the last
//! checkpoint rather than skipping changes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use vireo_connector::{
    AttributeValue, ConnectorFacade, Delta, ExternalRecord, PageRequest, ResourceId,
    WriteOperation,
};

use crate::context::KindContext;
use crate::correlation::{CorrelationEngine, CorrelationRuleRegistry};
use crate::cursor::CursorStore;
use crate::entity::{Entity, EntityId, EntityKind, KindProfile};
use crate::error::{EngineError, EngineResult, RecordError};
use crate::matrix::{decide_pull, Decision, MatchState, Operation};
use crate::policy::PolicyProvider;
use crate::report::{Direction, Outcome, RunMode, RunReport, RunReportBuilder, TraceLevel};
use crate::store::{AttributeUpdate, AuthorizationContext, InternalStore};

/// Internal attribute carrying a group's owner reference.
const OWNER_ATTRIBUTE: &str = "owner";

/// Default number of deltas or records fetched per connector call.
const DEFAULT_BATCH_SIZE: u32 = 500;

/// Options for one pull run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunOptions {
    /// Full reconciliation or incremental sync.
    pub mode: RunMode,
    /// Report-only: decisions are made, dispatch is skipped.
    #[serde(default)]
    pub dry_run: bool,
    /// Rendering detail of the resulting report.
    #[serde(default)]
    pub trace_level: TraceLevel,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Incremental,
            dry_run: false,
            trace_level: TraceLevel::default(),
        }
    }
}

impl RunOptions {
    /// Options for a full reconciliation.
    #[must_use]
    pub fn full() -> Self {
        Self {
            mode: RunMode::Full,
            ..Self::default()
        }
    }

    /// Options for an incremental sync.
    #[must_use]
    pub fn incremental() -> Self {
        Self::default()
    }

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

/// An owner reference collected during the group pass, resolved
/// best-effort after scanning.
struct OwnerRef {
    group: EntityId,
    value: String,
}

/// The pull orchestrator.
///
/// One instance may serve many runs; each run is strictly sequential
/// and the scheduler guarantees at most one concurrent run per
/// (resource, direction).
pub struct PullOrchestrator {
    connector: Arc<dyn ConnectorFacade>,
    store: Arc<dyn InternalStore>,
    provider: Arc<dyn PolicyProvider>,
    cursors: Arc<dyn CursorStore>,
    correlation: CorrelationEngine,
    batch_size: u32,
}

impl PullOrchestrator {
    /// Create a pull orchestrator.
    pub fn new(
        connector: Arc<dyn ConnectorFacade>,
        store: Arc<dyn InternalStore>,
        provider: Arc<dyn PolicyProvider>,
        cursors: Arc<dyn CursorStore>,
        registry: Arc<CorrelationRuleRegistry>,
    ) -> Self {
        let correlation = CorrelationEngine::new(store.clone(), registry);
        Self {
            connector,
            store,
            provider,
            cursors,
            correlation,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the connector batch size (builder style).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Execute one pull run over the given kind profiles.
    ///
    /// Group-like kinds are scanned in a dedicated pass after the
    /// others, followed by best-effort owner resolution.
    #[instrument(skip(self, ctx, profiles, options), fields(resource = %resource, mode = %options.mode, dry_run = options.dry_run))]
    pub async fn run(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        profiles: &[KindProfile],
        options: &RunOptions,
    ) -> EngineResult<RunReport> {
        // INIT: resolve configuration and cursors before touching any
        // record; configuration defects surface here.
        let mut kinds = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let mapping = self.provider.mapping(resource, profile.kind)?;
            let policy = self.provider.policy(resource, profile.kind)?;
            self.correlation.validate_policy(&policy, &mapping)?;
            let mut kctx = KindContext::new(profile.clone(), mapping, policy);
            if options.mode == RunMode::Incremental {
                kctx.stored_cursor = self.cursors.load(resource, profile.kind).await?;
            }
            kinds.push(kctx);
        }
        info!(kinds = kinds.len(), "pull run initialized");

        let mut report = RunReportBuilder::new(
            resource,
            Direction::Pull,
            options.mode,
            options.dry_run,
            options.trace_level,
        );
        let mut owner_refs = Vec::new();

        // SCANNING: primary kinds first, group kinds in their own pass.
        let order: Vec<usize> = (0..kinds.len())
            .filter(|&i| !kinds[i].profile.kind.is_group_like())
            .chain((0..kinds.len()).filter(|&i| kinds[i].profile.kind.is_group_like()))
            .collect();
        for idx in order {
            self.scan_kind(
                ctx,
                resource,
                &mut kinds[idx],
                options,
                &mut report,
                &mut owner_refs,
            )
            .await?;
        }

        // Owner resolution: same run, best effort, never fatal.
        self.resolve_owners(ctx, &kinds, owner_refs, options).await;

        // FINALIZING: advance cursors only on clean, live, incremental
        // runs. The captured value predates the scan, so changes that
        // arrived mid-scan are re-delivered next run instead of lost.
        if !options.dry_run && options.mode == RunMode::Incremental {
            for kctx in &kinds {
                if let Some(cursor) = &kctx.captured_cursor {
                    self.cursors
                        .save(resource, kctx.profile.kind, cursor)
                        .await?;
                }
            }
        }

        let report = report.finalize();
        info!(
            processed = report.summary.processed,
            failed = report.summary.failed,
            "pull run finished"
        );
        Ok(report)
    }

    /// Scan one kind, streaming deltas through the per-delta pipeline.
    async fn scan_kind(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        kctx: &mut KindContext,
        options: &RunOptions,
        report: &mut RunReportBuilder,
        owner_refs: &mut Vec<OwnerRef>,
    ) -> EngineResult<()> {
        let object_class = kctx.profile.object_class.clone();
        match options.mode {
            RunMode::Full => {
                let mut page = PageRequest::first(self.batch_size);
                let mut first = true;
                loop {
                    let result = self
                        .connector
                        .list_all(&object_class, &page)
                        .await
                        .map_err(|source| {
                            if first {
                                EngineError::StreamStart { source }
                            } else {
                                EngineError::Scan { source }
                            }
                        })?;
                    first = false;
                    for record in result.records {
                        // Full scans cannot distinguish creates from
                        // updates; correlate-then-decide resolves it.
                        let delta = Delta::updated(record);
                        let outcome = self
                            .process_delta(ctx, resource, kctx, delta, options, owner_refs)
                            .await;
                        report.record(outcome);
                    }
                    if !result.has_more {
                        break;
                    }
                    page = page.next();
                }
            }
            RunMode::Incremental => {
                // Capture the watermark before streaming begins.
                let captured = self
                    .connector
                    .current_cursor(&object_class)
                    .await
                    .map_err(|source| EngineError::StreamStart { source })?;
                let mut cursor = kctx.stored_cursor.clone();
                loop {
                    let batch = self
                        .connector
                        .changes_since(&object_class, cursor.as_ref(), self.batch_size)
                        .await
                        .map_err(|source| EngineError::Scan { source })?;
                    for delta in batch.deltas {
                        let outcome = self
                            .process_delta(ctx, resource, kctx, delta, options, owner_refs)
                            .await;
                        report.record(outcome);
                    }
                    match (batch.has_more, batch.resume) {
                        (true, Some(next)) => cursor = Some(next),
                        _ => break,
                    }
                }
                kctx.captured_cursor = Some(captured);
            }
        }
        Ok(())
    }

    /// Process one delta; failures become failed outcomes, never
    /// errors.
    async fn process_delta(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        kctx: &KindContext,
        delta: Delta,
        options: &RunOptions,
        owner_refs: &mut Vec<OwnerRef>,
    ) -> Outcome {
        match self
            .try_process(ctx, resource, kctx, &delta, options, owner_refs)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(uid = %delta.uid, error = %err, "delta processing failed");
                Outcome::failed(
                    Operation::None,
                    kctx.profile.kind,
                    Some(delta.uid.clone()),
                    err.to_string(),
                )
                .dry_run(options.dry_run)
            }
        }
    }

    /// Correlate, decide, dispatch.
    async fn try_process(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        kctx: &KindContext,
        delta: &Delta,
        options: &RunOptions,
        owner_refs: &mut Vec<OwnerRef>,
    ) -> Result<Outcome, RecordError> {
        let kind = kctx.profile.kind;

        // CORRELATE: read-only on both sides.
        let (matched, state, candidates) = match &delta.record {
            Some(record) => {
                let result = self
                    .correlation
                    .correlate(ctx, record, &kctx.mapping, &kctx.policy, &kctx.profile)
                    .await?;
                match result.primary() {
                    Some(id) => {
                        let linked = self.store.link_for(ctx, id, resource).await?.is_some();
                        let state = if result.is_ambiguous() {
                            MatchState::Many { linked }
                        } else {
                            MatchState::One { linked }
                        };
                        (Some(id), state, result.candidates().len())
                    }
                    None => (None, MatchState::None, 0),
                }
            }
            // Deletes carry only the uid; the link table is the sole
            // way back to the entity.
            None => match self
                .store
                .find_by_link(ctx, resource, kind, &delta.uid)
                .await?
            {
                Some(id) => (Some(id), MatchState::One { linked: true }, 1),
                None => (None, MatchState::None, 0),
            },
        };

        // DECIDE
        let decision = decide_pull(delta.is_present(), state, &kctx.policy, options.dry_run);

        // DISPATCH: a failure here keeps the decided operation on the
        // outcome.
        let dispatched = match &delta.record {
            Some(record) => {
                self.dispatch_present(ctx, resource, kctx, delta, record, &decision, matched, owner_refs)
                    .await
            }
            None => {
                self.dispatch_absent(ctx, resource, kctx, delta, &decision, matched)
                    .await
            }
        };
        let outcome = match dispatched {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(uid = %delta.uid, operation = %decision.operation, error = %err, "dispatch failed");
                Outcome::failed(
                    decision.operation,
                    kind,
                    Some(delta.uid.clone()),
                    err.to_string(),
                )
            }
        };

        if decision.ambiguous {
            return Ok(outcome.with_warning(format!(
                "ambiguous correlation: {candidates} candidates, took first in stable order"
            )));
        }
        Ok(outcome)
    }

    /// Dispatch for a record present in the external system.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_present(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        kctx: &KindContext,
        delta: &Delta,
        record: &ExternalRecord,
        decision: &Decision,
        matched: Option<EntityId>,
        owner_refs: &mut Vec<OwnerRef>,
    ) -> Result<Outcome, RecordError> {
        let kind = kctx.profile.kind;
        let uid = Some(delta.uid.clone());

        if decision.dry_run {
            debug!(uid = %delta.uid, operation = %decision.operation, "dry-run: dispatch skipped");
            return Ok(Outcome::succeeded(decision.operation, kind, uid, matched).dry_run(true));
        }

        let outcome = match (decision.operation, matched) {
            (Operation::Provision, _) => {
                let projection = kctx.mapping.project_inbound(record);
                let name = match projection.name {
                    Some(name) => name,
                    None => kctx.mapping.resolve_account_id(record)?.to_text(),
                };
                let mut entity = Entity::new(kind, name);
                entity.attributes = projection.update.set;
                let id = self.store.create(ctx, entity).await?;
                self.store.link(ctx, id, resource, &delta.uid).await?;
                self.collect_owner_ref(kctx, record, id, owner_refs);
                Outcome::succeeded(Operation::Provision, kind, uid, Some(id))
            }
            (Operation::Assign, _) => {
                let name = kctx.mapping.resolve_account_id(record)?.to_text();
                let id = self.store.create(ctx, Entity::new(kind, name)).await?;
                self.store.link(ctx, id, resource, &delta.uid).await?;
                Outcome::succeeded(Operation::Assign, kind, uid, Some(id))
            }
            (Operation::Update, Some(id)) => {
                if decision.link {
                    self.store.link(ctx, id, resource, &delta.uid).await?;
                }
                let projection = kctx.mapping.project_inbound(record);
                self.store.update(ctx, id, projection.update).await?;
                self.collect_owner_ref(kctx, record, id, owner_refs);
                Outcome::succeeded(Operation::Update, kind, uid, Some(id))
            }
            (Operation::Link, Some(id)) => {
                self.store.link(ctx, id, resource, &delta.uid).await?;
                Outcome::succeeded(Operation::Link, kind, uid, Some(id))
            }
            (Operation::Deprovision, _) => {
                self.connector
                    .write(
                        &kctx.profile.object_class,
                        WriteOperation::Delete {
                            uid: delta.uid.clone(),
                        },
                    )
                    .await?;
                Outcome::succeeded(Operation::Deprovision, kind, uid, matched)
            }
            (Operation::Unassign | Operation::None, _) => {
                Outcome::succeeded(decision.operation, kind, uid, matched)
            }
            (operation, _) => Outcome::failed(
                operation,
                kind,
                uid,
                "operation not dispatchable for a present record",
            ),
        };
        Ok(outcome)
    }

    /// Dispatch for a record deleted in the external system.
    async fn dispatch_absent(
        &self,
        ctx: &AuthorizationContext,
        resource: ResourceId,
        kctx: &KindContext,
        delta: &Delta,
        decision: &Decision,
        matched: Option<EntityId>,
    ) -> Result<Outcome, RecordError> {
        let kind = kctx.profile.kind;
        let uid = Some(delta.uid.clone());

        if decision.dry_run {
            debug!(uid = %delta.uid, operation = %decision.operation, "dry-run: dispatch skipped");
            return Ok(Outcome::succeeded(decision.operation, kind, uid, matched).dry_run(true));
        }

        let outcome = match (decision.operation, matched) {
            (Operation::Delete, Some(id)) => {
                self.store.unlink(ctx, id, resource).await?;
                self.store.delete(ctx, id).await?;
                Outcome::succeeded(Operation::Delete, kind, uid, Some(id))
            }
            (Operation::Unlink, Some(id)) => {
                self.store.unlink(ctx, id, resource).await?;
                Outcome::succeeded(Operation::Unlink, kind, uid, Some(id))
            }
            _ => Outcome::succeeded(Operation::None, kind, uid, matched),
        };
        Ok(outcome)
    }

    /// Remember a group's owner reference for the post-scan pass.
    fn collect_owner_ref(
        &self,
        kctx: &KindContext,
        record: &ExternalRecord,
        group: EntityId,
        owner_refs: &mut Vec<OwnerRef>,
    ) {
        if !kctx.profile.kind.is_group_like() {
            return;
        }
        let Some(item) = kctx.mapping.inbound_item_for_attribute(OWNER_ATTRIBUTE) else {
            return;
        };
        if let Some(value) = record.first_value(&item.external_attribute) {
            owner_refs.push(OwnerRef {
                group,
                value: value.to_text(),
            });
        }
    }

    /// Resolve collected owner references against the already-processed
    /// user population. Failures are logged, never fatal.
    async fn resolve_owners(
        &self,
        ctx: &AuthorizationContext,
        kinds: &[KindContext],
        owner_refs: Vec<OwnerRef>,
        options: &RunOptions,
    ) {
        if owner_refs.is_empty() {
            return;
        }
        let Some(user_ctx) = kinds.iter().find(|k| k.profile.kind == EntityKind::User) else {
            warn!("owner references collected but no user kind in this run");
            return;
        };
        let account_attr = user_ctx.mapping.account_id_item().external_attribute.clone();

        for owner_ref in owner_refs {
            let synthetic = ExternalRecord::new(owner_ref.value.clone())
                .with_attribute(account_attr.clone(), owner_ref.value.clone());
            let result = self
                .correlation
                .correlate(
                    ctx,
                    &synthetic,
                    &user_ctx.mapping,
                    &user_ctx.policy,
                    &user_ctx.profile,
                )
                .await;
            match result {
                Ok(result) => match result.primary() {
                    Some(owner_id) => {
                        if options.dry_run {
                            debug!(group = %owner_ref.group, owner = %owner_id, "dry-run: would set owner");
                            continue;
                        }
                        let mut update = AttributeUpdate::default();
                        update.set.insert(
                            OWNER_ATTRIBUTE.to_string(),
                            vec![AttributeValue::String(owner_id.to_string())],
                        );
                        if let Err(err) = self.store.update(ctx, owner_ref.group, update).await {
                            warn!(group = %owner_ref.group, error = %err, "owner update failed");
                        }
                    }
                    None => {
                        warn!(
                            group = %owner_ref.group,
                            owner = %owner_ref.value,
                            "owner reference did not correlate"
                        );
                    }
                },
                Err(err) => {
                    warn!(group = %owner_ref.group, error = %err, "owner correlation failed");
                }
            }
        }
    }
}
