//! Per-resource outcomes and run summaries

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Result of driving one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeResult {
    Success,
    SkippedAlreadyInTargetState,
    FailedTransient,
    FailedPermanent,
}

impl OutcomeResult {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OutcomeResult::FailedTransient | OutcomeResult::FailedPermanent
        )
    }
}

impl std::fmt::Display for OutcomeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeResult::Success => write!(f, "success"),
            OutcomeResult::SkippedAlreadyInTargetState => write!(f, "skipped"),
            OutcomeResult::FailedTransient => write!(f, "failed (transient)"),
            OutcomeResult::FailedPermanent => write!(f, "failed"),
        }
    }
}

/// Outcome of one targeted resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Resource identifier
    pub id: String,

    pub result: OutcomeResult,

    /// Error detail or last observed state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Time spent waiting for completion
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,

    /// Provider operation id (e.g. the new snapshot id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl OperationOutcome {
    fn with_result(id: impl Into<String>, result: OutcomeResult) -> Self {
        Self {
            id: id.into(),
            result,
            detail: None,
            elapsed: Duration::ZERO,
            operation_id: None,
        }
    }

    pub fn success(id: impl Into<String>) -> Self {
        Self::with_result(id, OutcomeResult::Success)
    }

    pub fn skipped(id: impl Into<String>, state: impl Into<String>) -> Self {
        Self::with_result(id, OutcomeResult::SkippedAlreadyInTargetState).with_detail(state)
    }

    pub fn failed_transient(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_result(id, OutcomeResult::FailedTransient).with_detail(detail)
    }

    pub fn failed_permanent(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_result(id, OutcomeResult::FailedPermanent).with_detail(detail)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn with_operation_id(mut self, operation_id: Option<String>) -> Self {
        self.operation_id = operation_id;
        self
    }
}

/// Overall run disposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Success,
    PartialFailure,
    TotalFailure,
}

impl Disposition {
    pub fn exit_code(&self) -> u8 {
        match self {
            Disposition::Success => 0,
            Disposition::PartialFailure => 1,
            Disposition::TotalFailure => 2,
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::Success => write!(f, "success"),
            Disposition::PartialFailure => write!(f, "partial failure"),
            Disposition::TotalFailure => write!(f, "total failure"),
        }
    }
}

/// Outcome counts by result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed_transient: usize,
    pub failed_permanent: usize,
}

impl Totals {
    fn count(&mut self, result: OutcomeResult) {
        match result {
            OutcomeResult::Success => self.succeeded += 1,
            OutcomeResult::SkippedAlreadyInTargetState => self.skipped += 1,
            OutcomeResult::FailedTransient => self.failed_transient += 1,
            OutcomeResult::FailedPermanent => self.failed_permanent += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.failed_transient + self.failed_permanent
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed()
    }
}

/// Summary of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Outcomes in candidate order
    pub outcomes: Vec<OperationOutcome>,

    pub totals: Totals,

    pub disposition: Disposition,

    /// Run was cancelled before every candidate was processed
    pub interrupted: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.disposition == Disposition::Success
    }

    pub fn exit_code(&self) -> u8 {
        self.disposition.exit_code()
    }
}

/// Fold outcomes into a summary
///
/// An empty outcome set is a success.
pub fn aggregate(outcomes: Vec<OperationOutcome>) -> RunSummary {
    let mut totals = Totals::default();
    for outcome in &outcomes {
        totals.count(outcome.result);
    }

    let disposition = if totals.failed() == 0 {
        Disposition::Success
    } else if totals.failed() == totals.total() {
        Disposition::TotalFailure
    } else {
        Disposition::PartialFailure
    };

    RunSummary {
        outcomes,
        totals,
        disposition,
        interrupted: false,
        duration_ms: 0,
    }
}

/// Incremental collector used by the run loop
#[derive(Debug)]
pub struct OutcomeCollector {
    outcomes: Vec<OperationOutcome>,
    started: Instant,
    interrupted: bool,
}

impl OutcomeCollector {
    pub fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            started: Instant::now(),
            interrupted: false,
        }
    }

    pub fn record(&mut self, outcome: OperationOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn mark_interrupted(&mut self) {
        self.interrupted = true;
    }

    /// Build the summary
    ///
    /// An interrupted run left candidates unprocessed and is never a success:
    /// it is a partial failure, or a total failure when nothing was processed.
    pub fn finish(self) -> RunSummary {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let mut summary = aggregate(self.outcomes);
        if self.interrupted {
            summary.interrupted = true;
            summary.disposition = match summary.disposition {
                _ if summary.outcomes.is_empty() => Disposition::TotalFailure,
                Disposition::Success => Disposition::PartialFailure,
                other => other,
            };
        }
        summary.duration_ms = duration_ms;
        summary
    }
}

impl Default for OutcomeCollector {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
