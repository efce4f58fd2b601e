//! Action gate
//!
//! Every invocation passes through [`authorize`] exactly once. The only way
//! to obtain a [`Clearance`] is a `Proceed` decision, and the lifecycle
//! driver's mutating entry points take one by reference.

use crate::action::{ActionRequest, ActionType, Mode};
use serde::Serialize;
use tracing::{info, warn};

/// Proof that the gate approved a live run
///
/// Not constructible outside this module.
#[derive(Debug)]
pub struct Clearance {
    action: ActionType,
    approved: usize,
}

impl Clearance {
    pub fn action(&self) -> ActionType {
        self.action
    }

    /// Candidate count the gate approved
    pub fn approved(&self) -> usize {
        self.approved
    }
}

/// Gate decision for one invocation
#[derive(Debug)]
pub enum GateDecision {
    Proceed(Clearance),
    BlockedDryRun,
    BlockedBulkCapExceeded { cap: usize, requested: usize },
}

impl GateDecision {
    /// Serializable form for structured output
    pub fn kind(&self) -> GateKind {
        match self {
            GateDecision::Proceed(_) => GateKind::Proceed,
            GateDecision::BlockedDryRun => GateKind::BlockedDryRun,
            GateDecision::BlockedBulkCapExceeded { .. } => GateKind::BlockedBulkCapExceeded,
        }
    }

    /// Process exit code when the run halts at the gate
    pub fn exit_code(&self) -> u8 {
        match self {
            GateDecision::Proceed(_) | GateDecision::BlockedDryRun => 0,
            GateDecision::BlockedBulkCapExceeded { .. } => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Proceed,
    BlockedDryRun,
    BlockedBulkCapExceeded,
}

/// Decide whether `request` may mutate `candidate_count` resources
///
/// Dry runs are blocked regardless of the candidate count; an oversized dry
/// run only logs that the apply pass would be refused.
pub fn authorize(request: &ActionRequest, candidate_count: usize) -> GateDecision {
    let cap = request.bulk_cap();

    if request.mode() == Mode::DryRun {
        if candidate_count > cap {
            warn!(
                action = %request.action(),
                cap,
                requested = candidate_count,
                "Candidate count exceeds bulk cap; apply would be refused"
            );
        }
        info!(
            action = %request.action(),
            candidates = candidate_count,
            "Dry run, no changes made"
        );
        return GateDecision::BlockedDryRun;
    }

    if candidate_count > cap {
        warn!(
            action = %request.action(),
            cap,
            requested = candidate_count,
            "Bulk cap exceeded, refusing to proceed"
        );
        return GateDecision::BlockedBulkCapExceeded {
            cap,
            requested: candidate_count,
        };
    }

    GateDecision::Proceed(Clearance {
        action: request.action(),
        approved: candidate_count,
    })
}
