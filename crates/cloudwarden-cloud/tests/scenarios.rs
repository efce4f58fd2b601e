mod common;

use chrono::Utc;
use cloudwarden_cloud::{
    ActionParams, ActionRequest, ActionType, AgeThreshold, CloudError, DEFAULT_POLICY_ARN,
    Disposition, FixedClock, GateDecision, LifecycleDriver, Mode, OnboardPlan, Orchestrator,
    OutcomeResult, PollPolicy, ProviderError, ResourceDescriptor, ResourceKind, RetryPolicy,
    RunOptions, RunReport, SelectionCriteria, UserManager, authorize,
};
use common::{FakeProvider, access_key, instance};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        multiplier: 2.0,
        jitter: 0.0,
    }
}

fn fast_options() -> RunOptions {
    RunOptions {
        listing: fast_retry(),
        mutation: fast_retry(),
        ..RunOptions::new()
    }
}

fn mixed_fleet() -> Vec<ResourceDescriptor> {
    vec![
        instance("i-1", "running").with_tag("Prod", "backup"),
        instance("i-2", "stopped").with_tag("Prod", "backup"),
        instance("i-3", "running").with_tag("Prod", "backup"),
        instance("i-4", "running").with_tag("Prod", "other"),
        instance("i-5", "running").with_tag("Prod", "backup"),
    ]
}

fn ids(descriptors: &[ResourceDescriptor]) -> Vec<&str> {
    descriptors.iter().map(|d| d.id()).collect()
}

#[tokio::test(start_paused = true)]
async fn scenario_tag_and_state_selection() {
    let provider = FakeProvider::new().with_resources(ResourceKind::Instance, mixed_fleet(), 2);
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());

    let criteria = SelectionCriteria::new()
        .with_tag("Prod", "backup")
        .with_state("running");
    let candidates = orchestrator
        .candidates(ResourceKind::Instance, &criteria)
        .await
        .unwrap();

    assert_eq!(ids(&candidates), ["i-1", "i-3", "i-5"]);
    // three pages of two, two, one
    assert_eq!(provider.list_calls.lock().unwrap().len(), 3);
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn scenario_aged_key_audit() {
    let now = Utc::now();
    let keys = vec![
        access_key("AKIA120", 120, now),
        access_key("AKIA045", 45, now),
        access_key("AKIA200", 200, now),
    ];
    let provider = FakeProvider::new().with_resources(ResourceKind::Credential, keys, 10);
    let orchestrator = Orchestrator::new(&provider)
        .with_clock(Arc::new(FixedClock(now)))
        .with_options(fast_options().oldest_first());
    let criteria = SelectionCriteria::new().with_age(AgeThreshold::older_than_days(90));
    let cancel = CancellationToken::new();

    let report = orchestrator
        .run(ActionRequest::builder(ActionType::DeactivateKey), &criteria, &cancel)
        .await
        .unwrap();
    assert_eq!(ids(report.candidates()), ["AKIA200", "AKIA120"]);
    assert!(matches!(
        report,
        RunReport::Halted {
            decision: GateDecision::BlockedDryRun,
            ..
        }
    ));
    assert_eq!(provider.mutation_count(), 0);

    let report = orchestrator
        .run(
            ActionRequest::builder(ActionType::DeactivateKey).mode(Mode::Apply),
            &criteria,
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(provider.mutated_ids(), ["AKIA200", "AKIA120"]);
    match report {
        RunReport::Completed { summary, .. } => {
            assert_eq!(summary.disposition, Disposition::Success);
            assert_eq!(summary.totals.succeeded, 2);
        }
        other => panic!("expected completed run, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_bulk_user_creation_over_cap() {
    let provider = FakeProvider::new();
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());
    let planned: Vec<_> = (1..=150)
        .map(|n| ResourceDescriptor::planned(ResourceKind::User, format!("demo-user-{}", n)))
        .collect();

    let report = orchestrator
        .run_candidates(
            ActionRequest::builder(ActionType::CreateUser).mode(Mode::Apply),
            planned,
            &CancellationToken::new(),
        )
        .await;

    match &report {
        RunReport::Halted {
            decision: GateDecision::BlockedBulkCapExceeded { cap, requested },
            ..
        } => {
            assert_eq!(*cap, 120);
            assert_eq!(*requested, 150);
        }
        other => panic!("expected bulk cap refusal, got {:?}", other),
    }
    assert_eq!(report.exit_code(), 2);
    assert_eq!(provider.mutation_count(), 0);
    assert!(provider.describe_calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scenario_snapshot_wait_for_completion() {
    let volume = ResourceDescriptor::new(ResourceKind::Volume, "vol-1", "in-use", Utc::now());
    let provider = FakeProvider::new()
        .script_mutate("vol-1", vec![Ok("snap-1")])
        .script_describe(
            "snap-1",
            vec![Ok("pending"), Ok("pending"), Ok("completed")],
        );
    let poll = PollPolicy {
        initial_interval: Duration::from_secs(2),
        max_interval: Duration::from_secs(15),
        multiplier: 1.5,
        max_wait: Duration::from_secs(600),
    };
    let driver = LifecycleDriver::new(&provider)
        .with_mutation_policy(fast_retry())
        .with_poll_policy(poll.clone());

    let request = ActionRequest::builder(ActionType::CreateSnapshot)
        .mode(Mode::Apply)
        .wait(true)
        .params(ActionParams::new().with_value("description", "nightly"))
        .targets(["vol-1"])
        .build();
    let GateDecision::Proceed(clearance) = authorize(&request, 1) else {
        panic!("expected clearance");
    };

    let outcome = driver.apply(&clearance, &request, &volume).await;

    assert_eq!(outcome.result, OutcomeResult::Success);
    assert_eq!(outcome.operation_id.as_deref(), Some("snap-1"));
    let expected = poll.interval_for(0) + poll.interval_for(1) + poll.interval_for(2);
    assert_eq!(expected, Duration::from_millis(9500));
    assert_eq!(outcome.elapsed, expected);
    assert_eq!(provider.describe_calls.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn dry_run_never_mutates() {
    let provider = FakeProvider::new().with_resources(ResourceKind::Instance, mixed_fleet(), 2);
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());
    let cancel = CancellationToken::new();

    for action in [ActionType::Stop, ActionType::Terminate, ActionType::Reboot] {
        let report = orchestrator
            .run(ActionRequest::builder(action), &SelectionCriteria::new(), &cancel)
            .await
            .unwrap();
        assert_eq!(report.candidates().len(), 5);
        assert_eq!(report.exit_code(), 0);
    }
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn converged_target_is_skipped() {
    let provider = FakeProvider::new().with_resources(ResourceKind::Instance, mixed_fleet(), 5);
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());

    let report = orchestrator
        .run(
            ActionRequest::builder(ActionType::Stop).mode(Mode::Apply),
            &SelectionCriteria::new().with_ids(["i-1", "i-2"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let RunReport::Completed { summary, .. } = report else {
        panic!("expected completed run");
    };
    assert_eq!(summary.outcomes[0].result, OutcomeResult::Success);
    assert_eq!(
        summary.outcomes[1].result,
        OutcomeResult::SkippedAlreadyInTargetState
    );
    assert_eq!(provider.mutated_ids(), ["i-1"]);
    assert!(summary.is_success());
}

#[tokio::test(start_paused = true)]
async fn explicit_ids_bypass_filters() {
    let provider = FakeProvider::new().with_resources(ResourceKind::Instance, mixed_fleet(), 2);
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());

    let criteria = SelectionCriteria::new()
        .with_tag("Prod", "backup")
        .with_state("running")
        .with_ids(["i-4"]);
    let candidates = orchestrator
        .candidates(ResourceKind::Instance, &criteria)
        .await
        .unwrap();
    assert_eq!(ids(&candidates), ["i-4"]);
}

#[tokio::test(start_paused = true)]
async fn listing_retries_transient_failures() {
    let provider = FakeProvider::new()
        .with_resources(ResourceKind::Instance, mixed_fleet(), 5)
        .fail_listing(vec![
            ProviderError::Throttled("Rate exceeded".into()),
            ProviderError::Unavailable("connection reset".into()),
        ]);
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());

    let candidates = orchestrator
        .candidates(ResourceKind::Instance, &SelectionCriteria::new())
        .await
        .unwrap();
    assert_eq!(candidates.len(), 5);
    assert_eq!(provider.list_calls.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn listing_exhaustion_is_listing_unavailable() {
    let provider = FakeProvider::new()
        .with_resources(ResourceKind::Volume, Vec::new(), 5)
        .fail_listing(vec![ProviderError::Throttled("Rate exceeded".into()); 5]);
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());

    let err = orchestrator
        .candidates(ResourceKind::Volume, &SelectionCriteria::new())
        .await
        .unwrap_err();
    match err {
        CloudError::ListingUnavailable { kind, attempts, .. } => {
            assert_eq!(kind, ResourceKind::Volume);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected ListingUnavailable, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn listing_permanent_failure_is_not_retried() {
    let provider = FakeProvider::new()
        .fail_listing(vec![ProviderError::Unauthorized("AccessDenied".into())]);
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());

    let err = orchestrator
        .candidates(ResourceKind::User, &SelectionCriteria::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CloudError::Provider(ProviderError::Unauthorized(_))
    ));
    assert_eq!(provider.list_calls.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_criteria_aborts_before_listing() {
    let provider = FakeProvider::new();
    let orchestrator = Orchestrator::new(&provider);

    let err = orchestrator
        .candidates(ResourceKind::Instance, &SelectionCriteria::new().with_tag("Prod", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::InvalidCriteria(_)));
    assert!(provider.list_calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failures_are_captured_per_resource() {
    let provider = FakeProvider::new()
        .with_resources(ResourceKind::Instance, mixed_fleet(), 5)
        .script_mutate(
            "i-3",
            vec![Err(ProviderError::Unauthorized("UnauthorizedOperation".into()))],
        )
        .script_mutate(
            "i-5",
            vec![Err(ProviderError::Throttled("RequestLimitExceeded".into()))],
        );
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());

    let report = orchestrator
        .run(
            ActionRequest::builder(ActionType::Reboot).mode(Mode::Apply),
            &SelectionCriteria::new().with_state("running"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let RunReport::Completed { summary, .. } = report else {
        panic!("expected completed run");
    };
    let results: Vec<_> = summary.outcomes.iter().map(|o| o.result).collect();
    assert_eq!(
        results,
        [
            OutcomeResult::Success,
            OutcomeResult::FailedPermanent,
            OutcomeResult::Success,
            OutcomeResult::FailedTransient,
        ]
    );
    assert_eq!(summary.disposition, Disposition::PartialFailure);
    assert_eq!(summary.exit_code(), 1);

    // i-1, i-3 once, i-4, i-5 three times
    let mutated = provider.mutated_ids();
    assert_eq!(mutated.iter().filter(|id| *id == "i-3").count(), 1);
    assert_eq!(mutated.iter().filter(|id| *id == "i-5").count(), 3);
}

#[tokio::test(start_paused = true)]
async fn existing_user_is_skipped() {
    let provider = FakeProvider::new().script_mutate(
        "demo-user-2",
        vec![Err(ProviderError::AlreadyExists("EntityAlreadyExists".into()))],
    );
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());
    let planned = vec![
        ResourceDescriptor::planned(ResourceKind::User, "demo-user-1"),
        ResourceDescriptor::planned(ResourceKind::User, "demo-user-2"),
    ];

    let report = orchestrator
        .run_candidates(
            ActionRequest::builder(ActionType::CreateUser).mode(Mode::Apply),
            planned,
            &CancellationToken::new(),
        )
        .await;

    let RunReport::Completed { summary, .. } = report else {
        panic!("expected completed run");
    };
    assert_eq!(summary.totals.succeeded, 1);
    assert_eq!(summary.totals.skipped, 1);
    assert!(summary.is_success());
}

#[tokio::test(start_paused = true)]
async fn wait_timeout_reports_last_state() {
    let provider = FakeProvider::new()
        .with_resources(
            ResourceKind::Instance,
            vec![instance("i-1", "running")],
            5,
        )
        .script_describe("i-1", vec![Ok("running"), Ok("stopping")]);
    let driver = LifecycleDriver::new(&provider)
        .with_mutation_policy(fast_retry())
        .with_poll_policy(PollPolicy {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(2),
            multiplier: 2.0,
            max_wait: Duration::from_secs(5),
        });
    let request = ActionRequest::builder(ActionType::Stop)
        .mode(Mode::Apply)
        .wait(true)
        .build();
    let GateDecision::Proceed(clearance) = authorize(&request, 1) else {
        panic!("expected clearance");
    };

    let outcome = driver
        .apply(&clearance, &request, &instance("i-1", "running"))
        .await;

    assert_eq!(outcome.result, OutcomeResult::FailedTransient);
    assert!(outcome.detail.unwrap().contains("stopping"));
    assert_eq!(outcome.elapsed, Duration::from_secs(5));
    assert_eq!(provider.mutation_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_describe_does_not_abort_polling() {
    let provider = FakeProvider::new().script_describe(
        "i-9",
        vec![
            Err(ProviderError::Unavailable("timeout".into())),
            Ok("pending"),
            Ok("running"),
        ],
    );
    let driver = LifecycleDriver::new(&provider).with_poll_policy(PollPolicy {
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(1),
        multiplier: 1.0,
        max_wait: Duration::from_secs(30),
    });

    let outcome = driver
        .wait_for_state(ResourceKind::Instance, "i-9", "running")
        .await;
    assert_eq!(outcome.result, OutcomeResult::Success);
    assert_eq!(outcome.elapsed, Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn terminated_wait_accepts_disappearance() {
    let provider = FakeProvider::new().script_describe(
        "i-7",
        vec![
            Ok("shutting-down"),
            Err(ProviderError::NotFound("InvalidInstanceID.NotFound".into())),
        ],
    );
    let driver = LifecycleDriver::new(&provider);

    let outcome = driver
        .wait_for_state(ResourceKind::Instance, "i-7", "terminated")
        .await;
    assert_eq!(outcome.result, OutcomeResult::Success);

    let outcome = driver
        .wait_for_state(ResourceKind::Instance, "i-7", "running")
        .await;
    assert_eq!(outcome.result, OutcomeResult::FailedPermanent);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_keeps_partial_summary() {
    let provider = FakeProvider::new().with_resources(ResourceKind::Instance, mixed_fleet(), 5);
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator
        .run(
            ActionRequest::builder(ActionType::Start).mode(Mode::Apply),
            &SelectionCriteria::new(),
            &cancel,
        )
        .await
        .unwrap();

    let RunReport::Completed { summary, .. } = report else {
        panic!("expected completed run");
    };
    assert!(summary.interrupted);
    assert!(summary.outcomes.is_empty());
    assert_eq!(summary.disposition, Disposition::TotalFailure);
    assert_eq!(summary.exit_code(), 2);
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn candidates_beyond_the_clearance_are_not_touched() {
    let provider = FakeProvider::new().with_resources(ResourceKind::Instance, mixed_fleet(), 5);
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());
    let request = ActionRequest::builder(ActionType::Stop)
        .mode(Mode::Apply)
        .build();
    let GateDecision::Proceed(clearance) = authorize(&request, 1) else {
        panic!("expected clearance");
    };

    let candidates = [instance("i-1", "running"), instance("i-3", "running")];
    let summary = orchestrator
        .execute(&clearance, &request, &candidates, &CancellationToken::new())
        .await;

    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.outcomes[0].result, OutcomeResult::Success);
    assert_eq!(summary.outcomes[1].result, OutcomeResult::FailedPermanent);
    assert_eq!(summary.disposition, Disposition::PartialFailure);
    assert_eq!(provider.mutated_ids(), ["i-1"]);
}

fn user(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(ResourceKind::User, name, "active", Utc::now())
        .with_metadata("arn", serde_json::json!(format!("arn:aws:iam::123:user/{name}")))
}

fn onboard_clearance(plan: &OnboardPlan) -> cloudwarden_cloud::Clearance {
    match authorize(&plan.request(Mode::Apply), 1) {
        GateDecision::Proceed(clearance) => clearance,
        other => panic!("expected clearance, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn onboarding_creates_user_and_credentials() {
    let provider = FakeProvider::new().script_describe(
        "alice",
        vec![Err(ProviderError::NotFound("alice".into())), Ok("active")],
    );
    let mut plan = OnboardPlan::new("alice").with_policies(vec![
        DEFAULT_POLICY_ARN.to_string(),
        "arn:aws:iam::aws:policy/IAMUserChangePassword".to_string(),
    ]);
    plan.console_login = true;
    plan.password_reset_required = true;
    plan.access_key = true;

    let users = UserManager::new(&provider).with_retry(fast_retry(), fast_retry());
    let report = users
        .onboard(&onboard_clearance(&plan), &plan)
        .await
        .unwrap();

    assert!(report.created);
    assert_eq!(report.user.id(), "alice");
    assert_eq!(provider.mutated_ids(), ["alice"]);
    assert_eq!(report.policies.len(), 2);
    assert!(report.password_reset_required);
    assert_eq!(report.password.as_ref().map(String::len), Some(20));
    assert_eq!(
        report.access_key.as_ref().map(|k| k.access_key_id.as_str()),
        Some("AKIAALICE")
    );
    assert_eq!(
        provider.identity_calls(),
        [
            format!("attach alice {}", DEFAULT_POLICY_ARN),
            "attach alice arn:aws:iam::aws:policy/IAMUserChangePassword".to_string(),
            "login alice reset=true".to_string(),
            "key alice".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn onboarding_existing_user_only_attaches_policies() {
    let provider =
        FakeProvider::new().with_resources(ResourceKind::User, vec![user("bob")], 10);
    let plan = OnboardPlan::new("bob");

    let report = UserManager::new(&provider)
        .with_retry(fast_retry(), fast_retry())
        .onboard(&onboard_clearance(&plan), &plan)
        .await
        .unwrap();

    assert!(!report.created);
    assert_eq!(provider.mutation_count(), 0);
    assert!(report.password.is_none());
    assert!(report.access_key.is_none());
    assert_eq!(
        provider.identity_calls(),
        [format!("attach bob {}", DEFAULT_POLICY_ARN)]
    );
}

#[tokio::test(start_paused = true)]
async fn onboarding_stops_at_first_permanent_failure() {
    let provider = FakeProvider::new()
        .with_resources(ResourceKind::User, vec![user("carol")], 10)
        .fail_identity(
            "attach",
            vec![
                ProviderError::Throttled("Rate exceeded".into()),
                ProviderError::Unauthorized("iam:AttachUserPolicy".into()),
            ],
        );
    let mut plan = OnboardPlan::new("carol");
    plan.access_key = true;

    let err = UserManager::new(&provider)
        .with_retry(fast_retry(), fast_retry())
        .onboard(&onboard_clearance(&plan), &plan)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CloudError::Provider(ProviderError::Unauthorized(_))
    ));
    // throttled attempt retried once, then no access key call
    assert_eq!(provider.identity_calls().len(), 2);
    assert!(!provider.identity_calls().iter().any(|c| c.starts_with("key")));
}

#[tokio::test(start_paused = true)]
async fn onboarding_requires_a_user_creation_clearance() {
    let provider = FakeProvider::new();
    let request = ActionRequest::builder(ActionType::Stop)
        .mode(Mode::Apply)
        .build();
    let GateDecision::Proceed(clearance) = authorize(&request, 1) else {
        panic!("expected clearance");
    };

    let err = UserManager::new(&provider)
        .onboard(&clearance, &OnboardPlan::new("dave"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::ClearanceMismatch(ActionType::Stop)));
    assert!(provider.describe_calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn user_details_with_groups() {
    let provider = FakeProvider::new()
        .with_resources(ResourceKind::User, vec![user("erin")], 10)
        .with_groups("erin", &["admins", "oncall"]);
    let users = UserManager::new(&provider).with_retry(fast_retry(), fast_retry());

    let details = users.user_details("erin", true).await.unwrap();
    assert_eq!(details.user.id(), "erin");
    assert_eq!(
        details.groups,
        Some(vec!["admins".to_string(), "oncall".to_string()])
    );

    let details = users.user_details("erin", false).await.unwrap();
    assert!(details.groups.is_none());

    let err = users.user_details("nobody", false).await.unwrap_err();
    assert!(matches!(err, CloudError::Provider(ProviderError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn instance_status_pages_and_filters() {
    let status = |id: &str, state: &str| {
        ResourceDescriptor::new(ResourceKind::InstanceStatus, id, state, Utc::now())
            .with_metadata("system_status", serde_json::json!("ok"))
    };
    let provider = FakeProvider::new().with_resources(
        ResourceKind::InstanceStatus,
        vec![
            status("i-1", "running"),
            status("i-2", "stopped"),
            status("i-3", "running"),
        ],
        2,
    );
    let orchestrator = Orchestrator::new(&provider).with_options(fast_options());

    let running = orchestrator
        .candidates(
            ResourceKind::InstanceStatus,
            &SelectionCriteria::new().with_state("running"),
        )
        .await
        .unwrap();
    assert_eq!(ids(&running), ["i-1", "i-3"]);
    assert_eq!(provider.list_calls.lock().unwrap().len(), 2);

    let picked = orchestrator
        .candidates(
            ResourceKind::InstanceStatus,
            &SelectionCriteria::new().with_ids(["i-2"]),
        )
        .await
        .unwrap();
    assert_eq!(ids(&picked), ["i-2"]);
}
