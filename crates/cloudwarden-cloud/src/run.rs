//! End-to-end run: resolve → list → rank → gate → drive → aggregate

use crate::action::{ActionRequest, ActionRequestBuilder};
use crate::audit::rank_by_age;
use crate::driver::LifecycleDriver;
use crate::error::Result;
use crate::filter::{resolve_with_clock, SelectionCriteria};
use crate::gate::{authorize, Clearance, GateDecision};
use crate::lister::ResourceLister;
use crate::model::{Clock, ResourceDescriptor, ResourceKind, SystemClock};
use crate::outcome::{OperationOutcome, OutcomeCollector, RunSummary};
use crate::provider::ProviderApi;
use crate::retry::{PollPolicy, RetryPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Order in which candidates are handed to the gate and driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateOrder {
    /// As the provider returned them
    #[default]
    Provider,
    /// Oldest first, ties broken by identifier
    OldestFirst,
}

/// Tunables for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub order: CandidateOrder,
    pub listing: RetryPolicy,
    pub mutation: RetryPolicy,
    pub poll: PollPolicy,
}

impl RunOptions {
    pub fn new() -> Self {
        Self {
            order: CandidateOrder::Provider,
            listing: RetryPolicy::listing(),
            mutation: RetryPolicy::mutation(),
            poll: PollPolicy::default(),
        }
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = CandidateOrder::OldestFirst;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// What a run produced
#[derive(Debug)]
pub enum RunReport {
    /// The gate halted the run; nothing was mutated
    Halted {
        request: ActionRequest,
        decision: GateDecision,
        candidates: Vec<ResourceDescriptor>,
    },
    /// Candidates were driven through the action
    Completed {
        request: ActionRequest,
        candidates: Vec<ResourceDescriptor>,
        summary: RunSummary,
    },
}

impl RunReport {
    pub fn candidates(&self) -> &[ResourceDescriptor] {
        match self {
            RunReport::Halted { candidates, .. } | RunReport::Completed { candidates, .. } => {
                candidates
            }
        }
    }

    pub fn request(&self) -> &ActionRequest {
        match self {
            RunReport::Halted { request, .. } | RunReport::Completed { request, .. } => request,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            RunReport::Halted { decision, .. } => decision.exit_code(),
            RunReport::Completed { summary, .. } => summary.exit_code(),
        }
    }
}

/// Runs actions against one provider
pub struct Orchestrator<'a> {
    provider: &'a dyn ProviderApi,
    clock: Arc<dyn Clock>,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(provider: &'a dyn ProviderApi) -> Self {
        Self {
            provider,
            clock: Arc::new(SystemClock),
            options: RunOptions::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Resolve criteria and list matching resources of `kind`
    ///
    /// Setup failures (bad criteria, listing exhausted) surface here, before
    /// anything is gated.
    pub async fn candidates(
        &self,
        kind: ResourceKind,
        criteria: &SelectionCriteria,
    ) -> Result<Vec<ResourceDescriptor>> {
        let predicate = resolve_with_clock(criteria, self.clock.clone())?;
        let lister = ResourceLister::new(self.provider, self.options.listing.clone());
        let candidates = lister.list(kind, predicate).collect_all().await?;

        Ok(match self.options.order {
            CandidateOrder::Provider => candidates,
            CandidateOrder::OldestFirst => rank_by_age(candidates, self.clock.now()),
        })
    }

    /// Full pipeline for an action over resources selected by `criteria`
    pub async fn run(
        &self,
        builder: ActionRequestBuilder,
        criteria: &SelectionCriteria,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let candidates = self.candidates(builder.action().target_kind(), criteria).await?;
        Ok(self.run_candidates(builder, candidates, cancel).await)
    }

    /// Gate and drive an already-assembled candidate list
    ///
    /// Used directly for creation actions whose candidates are planned
    /// descriptors rather than listed resources.
    pub async fn run_candidates(
        &self,
        builder: ActionRequestBuilder,
        candidates: Vec<ResourceDescriptor>,
        cancel: &CancellationToken,
    ) -> RunReport {
        let request = builder
            .targets(candidates.iter().map(|c| c.id().to_string()))
            .build();

        match authorize(&request, candidates.len()) {
            GateDecision::Proceed(clearance) => {
                let summary = self.execute(&clearance, &request, &candidates, cancel).await;
                RunReport::Completed {
                    request,
                    candidates,
                    summary,
                }
            }
            decision => RunReport::Halted {
                request,
                decision,
                candidates,
            },
        }
    }

    /// Drive each candidate in order, checking `cancel` between resources
    ///
    /// Candidates past the count the clearance approved are recorded as
    /// permanent failures without any provider call.
    pub async fn execute(
        &self,
        clearance: &Clearance,
        request: &ActionRequest,
        candidates: &[ResourceDescriptor],
        cancel: &CancellationToken,
    ) -> RunSummary {
        let driver = LifecycleDriver::new(self.provider)
            .with_mutation_policy(self.options.mutation.clone())
            .with_poll_policy(self.options.poll.clone());

        let mut collector = OutcomeCollector::new();
        for (index, target) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    processed = index,
                    remaining = candidates.len() - index,
                    "Run interrupted"
                );
                collector.mark_interrupted();
                break;
            }
            if index >= clearance.approved() {
                warn!(
                    id = target.id(),
                    approved = clearance.approved(),
                    "Candidate beyond the approved count, not processed"
                );
                collector.record(OperationOutcome::failed_permanent(
                    target.id(),
                    format!(
                        "gate approved {} {}(s); candidate not covered",
                        clearance.approved(),
                        request.kind()
                    ),
                ));
                continue;
            }
            let outcome = driver.apply(clearance, request, target).await;
            info!(
                action = %request.action(),
                id = %outcome.id,
                result = %outcome.result,
                n = index + 1,
                total = candidates.len(),
                "Processed"
            );
            collector.record(outcome);
        }

        let summary = collector.finish();
        info!(
            action = %request.action(),
            disposition = %summary.disposition,
            succeeded = summary.totals.succeeded,
            skipped = summary.totals.skipped,
            failed = summary.totals.failed(),
            "Run finished"
        );
        summary
    }
}
