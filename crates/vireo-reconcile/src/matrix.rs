//! Conflict resolution matrix.
//!
//! A total decision function: every combination of external presence,
//! match count, and link state yields a concrete operation. Decisions
//! carry the dry-run flag; dry-run short-circuits dispatch but still
//! produces a full outcome.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::policy::{DeleteAction, MatchedAction, SyncPolicy, UnmatchedAction};

/// The concrete operation a decision resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create a record on the target side.
    Create,
    /// Update a record on the target side.
    Update,
    /// Delete a record on the target side.
    Delete,
    /// Establish a link without other changes.
    Link,
    /// Remove a link without other changes.
    Unlink,
    /// Create a minimal internal entity and link it.
    Assign,
    /// Record that the account is not owned internally.
    Unassign,
    /// Create and link (full projection).
    Provision,
    /// Remove the external account.
    Deprovision,
    /// Nothing to do.
    None,
}

impl Operation {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Link => "link",
            Operation::Unlink => "unlink",
            Operation::Assign => "assign",
            Operation::Unassign => "unassign",
            Operation::Provision => "provision",
            Operation::Deprovision => "deprovision",
            Operation::None => "none",
        }
    }

    /// Whether dispatching this operation mutates anything.
    #[must_use]
    pub fn mutates(&self) -> bool {
        !matches!(self, Operation::None | Operation::Unassign)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Correlation outcome as the matrix sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// No internal entity matched.
    None,
    /// Exactly one matched; `linked` tells whether it is already linked
    /// to the resource under sync.
    One { linked: bool },
    /// Multiple matched; the first in stable order is taken and treated
    /// as exactly one.
    Many { linked: bool },
}

/// A matrix decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The operation to dispatch.
    pub operation: Operation,
    /// Whether a link is established as part of dispatch.
    pub link: bool,
    /// Report-only: dispatch is skipped, the outcome is still recorded.
    pub dry_run: bool,
    /// The match was ambiguous and resolved by tie-break.
    pub ambiguous: bool,
}

impl Decision {
    fn new(operation: Operation, link: bool, dry_run: bool) -> Self {
        Self {
            operation,
            link,
            dry_run,
            ambiguous: false,
        }
    }

    #[must_use]
    fn flagged_ambiguous(mut self, ambiguous: bool) -> Self {
        self.ambiguous = ambiguous;
        self
    }
}

/// Decide the pull-direction operation for one delta.
///
/// `present` is the external state after the delta (false for
/// deletes); `matches` is the correlation outcome plus link state.
pub fn decide_pull(
    present: bool,
    matches: MatchState,
    policy: &SyncPolicy,
    dry_run: bool,
) -> Decision {
    // Many collapses onto One via the stable tie-break; only the
    // ambiguity flag survives.
    let (matches, ambiguous) = match matches {
        MatchState::Many { linked } => (MatchState::One { linked }, true),
        other => (other, false),
    };

    let decision = match (present, matches) {
        (true, MatchState::None) => match policy.unmatched_action {
            UnmatchedAction::Provision => Decision::new(Operation::Provision, true, dry_run),
            UnmatchedAction::Assign => Decision::new(Operation::Assign, true, dry_run),
            UnmatchedAction::Ignore => Decision::new(Operation::None, false, dry_run),
        },
        (true, MatchState::One { linked: true }) => {
            Decision::new(Operation::Update, false, dry_run)
        }
        (true, MatchState::One { linked: false }) => match policy.matched_action {
            MatchedAction::UpdateAndLink => Decision::new(Operation::Update, true, dry_run),
            MatchedAction::LinkOnly => Decision::new(Operation::Link, true, dry_run),
            MatchedAction::Unassign => Decision::new(Operation::Unassign, false, dry_run),
            MatchedAction::Deprovision => Decision::new(Operation::Deprovision, false, dry_run),
        },
        (false, MatchState::One { linked: true }) => match policy.delete_action {
            DeleteAction::Delete => Decision::new(Operation::Delete, false, dry_run),
            DeleteAction::Unlink => Decision::new(Operation::Unlink, false, dry_run),
        },
        // A deleted account that was never linked leaves nothing to do.
        (false, MatchState::One { linked: false }) | (false, MatchState::None) => {
            Decision::new(Operation::None, false, dry_run)
        }
        (_, MatchState::Many { .. }) => unreachable!("collapsed above"),
    };

    decision.flagged_ambiguous(ambiguous)
}

/// Decide the push-direction operation for one internal entity.
///
/// Internal state drives, external presence is the target: an entity
/// not yet present externally is provisioned, a linked one updated, and
/// one that left the population scope is untouched unless the policy
/// says to deprovision.
pub fn decide_push(linked: bool, in_scope: bool, policy: &SyncPolicy, dry_run: bool) -> Decision {
    match (in_scope, linked) {
        (true, true) => Decision::new(Operation::Update, false, dry_run),
        (true, false) => Decision::new(Operation::Provision, true, dry_run),
        (false, true) if policy.deprovision_out_of_scope => {
            Decision::new(Operation::Deprovision, false, dry_run)
        }
        (false, _) => Decision::new(Operation::None, false, dry_run),
    }
}
