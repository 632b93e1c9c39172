//! Run reports: per-record outcomes and their aggregation.
//!
//! The builder owns every outcome for the run's lifetime; the trace
//! level filters presentation only, never collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use vireo_connector::ResourceId;

use crate::entity::{EntityId, EntityKind};
use crate::matrix::Operation;

/// Reconciliation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// External to internal.
    Pull,
    /// Internal to external.
    Push,
}

impl Direction {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Pull => "pull",
            Direction::Push => "push",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pull scan mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Stream every external record; cursors are ignored.
    Full,
    /// Stream only the deltas since the stored cursor.
    Incremental,
}

impl RunMode {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much detail the rendered report carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    /// Every outcome.
    All,
    /// Failed outcomes plus the summary.
    #[default]
    Failures,
    /// Summary only.
    Summary,
    /// Nothing.
    None,
}

impl TraceLevel {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceLevel::All => "all",
            TraceLevel::Failures => "failures",
            TraceLevel::Summary => "summary",
            TraceLevel::None => "none",
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The result of processing one record. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    operation: Operation,
    kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_id: Option<EntityId>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    dry_run: bool,
}

impl Outcome {
    /// A successful outcome.
    #[must_use]
    pub fn succeeded(
        operation: Operation,
        kind: EntityKind,
        uid: Option<String>,
        entity_id: Option<EntityId>,
    ) -> Self {
        Self {
            operation,
            kind,
            uid,
            entity_id,
            success: true,
            error: None,
            warning: None,
            dry_run: false,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failed(
        operation: Operation,
        kind: EntityKind,
        uid: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            uid,
            entity_id: None,
            success: false,
            error: Some(error.into()),
            warning: None,
            dry_run: false,
        }
    }

    /// Annotate with a warning (builder style, pre-insertion).
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    /// Mark as produced by a dry run (builder style, pre-insertion).
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The chosen operation.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The entity kind processed.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The external uid, if the record had one.
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// The resulting internal identifier, if any.
    pub fn entity_id(&self) -> Option<EntityId> {
        self.entity_id
    }

    /// Whether processing succeeded.
    pub fn success(&self) -> bool {
        self.success
    }

    /// The error detail, if processing failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The warning annotation, if any.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Whether this outcome was produced without dispatching.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Aggregated counts over a run's outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Records processed.
    pub processed: usize,
    /// Successful outcomes.
    pub succeeded: usize,
    /// Failed outcomes.
    pub failed: usize,
    /// Outcomes carrying a warning annotation.
    pub warnings: usize,
    /// Outcome count per operation.
    pub by_operation: BTreeMap<String, usize>,
}

impl RunSummary {
    fn add(&mut self, outcome: &Outcome) {
        self.processed += 1;
        if outcome.success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if outcome.warning().is_some() {
            self.warnings += 1;
        }
        *self
            .by_operation
            .entry(outcome.operation().as_str().to_string())
            .or_insert(0) += 1;
    }
}

/// A finalized run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The resource reconciled.
    pub resource: ResourceId,
    /// Pull or push.
    pub direction: Direction,
    /// Scan mode (pull only semantics; push runs report `Full`).
    pub mode: RunMode,
    /// Whether dispatch was skipped.
    pub dry_run: bool,
    /// Rendering detail level.
    pub trace_level: TraceLevel,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Aggregated counts.
    pub summary: RunSummary,
    outcomes: Vec<Outcome>,
}

impl RunReport {
    /// Every outcome, in processing order. Retained regardless of
    /// trace level.
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Render the report as human-readable text, honoring the trace
    /// level.
    pub fn render(&self) -> String {
        if self.trace_level == TraceLevel::None {
            return String::new();
        }

        let mut text = format!(
            "{} {} of resource {}{}: {} processed, {} succeeded, {} failed, {} warnings\n",
            self.mode,
            self.direction,
            self.resource,
            if self.dry_run { " (dry run)" } else { "" },
            self.summary.processed,
            self.summary.succeeded,
            self.summary.failed,
            self.summary.warnings,
        );
        for (operation, count) in &self.summary.by_operation {
            text.push_str(&format!("  {operation}: {count}\n"));
        }

        if self.trace_level == TraceLevel::Summary {
            return text;
        }

        for outcome in &self.outcomes {
            if self.trace_level == TraceLevel::Failures && outcome.success() {
                continue;
            }
            let status = if outcome.success() { "ok" } else { "failed" };
            text.push_str(&format!(
                "  [{status}] {} {} {}",
                outcome.kind(),
                outcome.operation(),
                outcome.uid().unwrap_or("-"),
            ));
            if let Some(id) = outcome.entity_id() {
                text.push_str(&format!(" -> {id}"));
            }
            if let Some(error) = outcome.error() {
                text.push_str(&format!(": {error}"));
            }
            if let Some(warning) = outcome.warning() {
                text.push_str(&format!(" (warning: {warning})"));
            }
            text.push('\n');
        }
        text
    }
}

/// Collects outcomes during a run and finalizes them into a report.
#[derive(Debug)]
pub struct RunReportBuilder {
    resource: ResourceId,
    direction: Direction,
    mode: RunMode,
    dry_run: bool,
    trace_level: TraceLevel,
    started_at: DateTime<Utc>,
    summary: RunSummary,
    outcomes: Vec<Outcome>,
}

impl RunReportBuilder {
    /// Start a report at run start.
    #[must_use]
    pub fn new(
        resource: ResourceId,
        direction: Direction,
        mode: RunMode,
        dry_run: bool,
        trace_level: TraceLevel,
    ) -> Self {
        Self {
            resource,
            direction,
            mode,
            dry_run,
            trace_level,
            started_at: Utc::now(),
            summary: RunSummary::default(),
            outcomes: Vec::new(),
        }
    }

    /// Record one outcome. All outcomes are retained in memory; the
    /// trace level affects rendering only.
    pub fn record(&mut self, outcome: Outcome) {
        self.summary.add(&outcome);
        self.outcomes.push(outcome);
    }

    /// Number of outcomes recorded so far.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether no outcome has been recorded.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Finalize into a report at run end.
    #[must_use]
    pub fn finalize(self) -> RunReport {
        RunReport {
            resource: self.resource,
            direction: self.direction,
            mode: self.mode,
            dry_run: self.dry_run,
            trace_level: self.trace_level,
            started_at: self.started_at,
            finished_at: Utc::now(),
            summary: self.summary,
            outcomes: self.outcomes,
        }
    }
}
