//! Lifecycle driver
//!
//! Applies one action to one target:
//!
//! 1. Re-describe the target and skip it if it already sits in the action's
//!    converged state
//! 2. Issue the mutating call, retrying throttling only
//! 3. Optionally poll the completion subject until a terminal state or the
//!    poll budget runs out
//!
//! Every path produces exactly one [`OperationOutcome`].

use crate::action::{ActionRequest, Observation};
use crate::error::ProviderError;
use crate::gate::Clearance;
use crate::model::{ResourceDescriptor, ResourceKind};
use crate::outcome::OperationOutcome;
use crate::provider::ProviderApi;
use crate::retry::{retry_call, PollPolicy, RetryPolicy};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How a completion poll ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEnd {
    Complete(Observation),
    Failed(Observation),
    Rejected(ProviderError),
    TimedOut(Option<Observation>),
}

pub struct LifecycleDriver<'a> {
    provider: &'a dyn ProviderApi,
    mutation: RetryPolicy,
    poll: PollPolicy,
}

impl<'a> LifecycleDriver<'a> {
    pub fn new(provider: &'a dyn ProviderApi) -> Self {
        Self {
            provider,
            mutation: RetryPolicy::mutation(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_mutation_policy(mut self, policy: RetryPolicy) -> Self {
        self.mutation = policy;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll = policy;
        self
    }

    /// Drive `target` through `request`'s action
    pub async fn apply(
        &self,
        clearance: &Clearance,
        request: &ActionRequest,
        target: &ResourceDescriptor,
    ) -> OperationOutcome {
        let action = request.action();
        let id = target.id();

        if clearance.action() != action {
            return OperationOutcome::failed_permanent(
                id,
                format!("clearance covers {}, not {}", clearance.action(), action),
            );
        }

        if action.checks_convergence() {
            match self.observe(target.kind(), id).await {
                Ok(observed) if action.is_converged(&observed) => {
                    info!(%action, id, state = %observed, "Already in target state, skipping");
                    return OperationOutcome::skipped(id, observed.to_string());
                }
                Ok(observed) => {
                    debug!(%action, id, state = %observed, "Pre-check passed");
                }
                Err(e) if e.is_transient() => {
                    return OperationOutcome::failed_transient(id, e.to_string());
                }
                Err(e) => return OperationOutcome::failed_permanent(id, e.to_string()),
            }
        }

        let operation = format!("{} {}", action, id);
        let provider = self.provider;
        let params = request.params();
        let mutated = retry_call(&self.mutation, &operation, ProviderError::is_throttled, || {
            provider.mutate(action, target, params)
        })
        .await;

        let operation_id = match mutated {
            Ok(op) => {
                info!(%action, id, operation_id = %op, "Mutation accepted");
                op
            }
            Err(exhausted) if action.creates() && exhausted.error.is_already_exists() => {
                info!(%action, id, "Already exists, skipping");
                return OperationOutcome::skipped(id, "already exists");
            }
            Err(exhausted) if exhausted.error.is_transient() => {
                warn!(
                    %action,
                    id,
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "Mutation failed"
                );
                return OperationOutcome::failed_transient(
                    id,
                    format!("{} (after {} attempts)", exhausted.error, exhausted.attempts),
                );
            }
            Err(exhausted) => {
                warn!(%action, id, error = %exhausted.error, "Mutation rejected");
                return OperationOutcome::failed_permanent(id, exhausted.error.to_string());
            }
        };

        if !request.wait() {
            return OperationOutcome::success(id).with_operation_id(Some(operation_id.0));
        }

        let (kind, subject) = action.completion_subject(target, Some(operation_id.as_str()));
        let started = Instant::now();
        let end = self
            .poll_until(
                kind,
                &subject,
                |o| action.is_complete(o),
                |o| action.is_failed(o),
            )
            .await;
        let elapsed = started.elapsed();

        outcome_for_poll(id, end, elapsed).with_operation_id(Some(operation_id.0))
    }

    /// Poll a resource until it reaches `state`; no mutation involved
    ///
    /// `terminated` and `deleted` are also satisfied once the provider stops
    /// returning the resource. A resource that vanishes while waiting for any
    /// other state fails the wait.
    pub async fn wait_for_state(
        &self,
        kind: ResourceKind,
        id: &str,
        state: &str,
    ) -> OperationOutcome {
        let accepts_absent = matches!(state, "terminated" | "deleted");
        let started = Instant::now();
        let end = self
            .poll_until(
                kind,
                id,
                |o| match o {
                    Observation::Present(s) => s == state,
                    Observation::Absent => accepts_absent,
                },
                |o| matches!(o, Observation::Absent) && !accepts_absent,
            )
            .await;
        outcome_for_poll(id, end, started.elapsed())
    }

    /// Single describe, mapping not-found to [`Observation::Absent`]
    ///
    /// Transient describe failures are retried with the mutation policy.
    async fn observe(&self, kind: ResourceKind, id: &str) -> Result<Observation, ProviderError> {
        let provider = self.provider;
        let operation = format!("describe {} {}", kind, id);
        match retry_call(&self.mutation, &operation, ProviderError::is_transient, || {
            provider.describe_resource(kind, id)
        })
        .await
        {
            Ok(descriptor) => Ok(Observation::Present(descriptor.state().to_string())),
            Err(exhausted) if exhausted.error.is_not_found() => Ok(Observation::Absent),
            Err(exhausted) => Err(exhausted.error),
        }
    }

    async fn poll_until<C, F>(
        &self,
        kind: ResourceKind,
        id: &str,
        is_complete: C,
        is_failed: F,
    ) -> PollEnd
    where
        C: Fn(&Observation) -> bool,
        F: Fn(&Observation) -> bool,
    {
        let started = Instant::now();
        let mut last: Option<Observation> = None;
        let mut poll = 0u32;

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.poll.max_wait {
                warn!(%kind, id, last = ?last, "Gave up waiting");
                return PollEnd::TimedOut(last);
            }
            let interval = self.poll.interval_for(poll).min(self.poll.max_wait - elapsed);
            tokio::time::sleep(interval).await;
            poll += 1;

            let observed = match self.provider.describe_resource(kind, id).await {
                Ok(descriptor) => Observation::Present(descriptor.state().to_string()),
                Err(e) if e.is_not_found() => Observation::Absent,
                Err(e) if e.is_transient() => {
                    debug!(%kind, id, poll, error = %e, "Transient describe failure while polling");
                    continue;
                }
                Err(e) => return PollEnd::Rejected(e),
            };

            debug!(%kind, id, poll, state = %observed, "Polled");
            if is_complete(&observed) {
                return PollEnd::Complete(observed);
            }
            if is_failed(&observed) {
                return PollEnd::Failed(observed);
            }
            last = Some(observed);
        }
    }
}

fn outcome_for_poll(id: &str, end: PollEnd, elapsed: Duration) -> OperationOutcome {
    let outcome = match end {
        PollEnd::Complete(_) => OperationOutcome::success(id),
        PollEnd::Failed(observed) => {
            OperationOutcome::failed_permanent(id, format!("entered state {}", observed))
        }
        PollEnd::Rejected(e) => OperationOutcome::failed_permanent(id, e.to_string()),
        PollEnd::TimedOut(Some(observed)) => OperationOutcome::failed_transient(
            id,
            format!("timed out waiting; last observed state {}", observed),
        ),
        PollEnd::TimedOut(None) => {
            OperationOutcome::failed_transient(id, "timed out waiting; state never observed")
        }
    };
    outcome.with_elapsed(elapsed)
}
