//! Per-invocation context: merged settings, output format and cancellation

use crate::render::OutputFormat;
use anyhow::Context as _;
use cloudwarden_cloud::{ActionType, PollPolicy, RetryPolicy, RunOptions};
use cloudwarden_cloud_aws::{AwsSession, GLOBAL_SERVICE_REGION};
use cloudwarden_config::{PollSettings, RetrySettings, Settings};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Context {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub output: OutputFormat,
    pub settings: Settings,
    pub cancel: CancellationToken,
}

impl Context {
    /// Flags win over the config file
    pub fn new(
        profile: Option<String>,
        region: Option<String>,
        output: OutputFormat,
        settings: Settings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            profile: profile.or_else(|| settings.profile.clone()),
            region: region.or_else(|| settings.region.clone()),
            output,
            settings,
            cancel,
        }
    }

    /// Session for regional services (EC2)
    pub async fn session(&self) -> anyhow::Result<AwsSession> {
        AwsSession::resolve(self.profile.as_deref(), self.region.as_deref(), None)
            .await
            .context("Failed to resolve AWS session")
    }

    /// Session for IAM, STS and S3 bucket listing; falls back to the global region
    pub async fn global_session(&self) -> anyhow::Result<AwsSession> {
        AwsSession::resolve(
            self.profile.as_deref(),
            self.region.as_deref(),
            Some(GLOBAL_SERVICE_REGION),
        )
        .await
        .context("Failed to resolve AWS session")
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            listing: retry_policy(RetryPolicy::listing(), &self.settings.listing),
            mutation: retry_policy(RetryPolicy::mutation(), &self.settings.mutation),
            poll: poll_policy(PollPolicy::default(), &self.settings.polling),
            ..RunOptions::new()
        }
    }

    /// `--bulk-cap`, then the config file, then the action default
    pub fn bulk_cap(&self, action: ActionType, flag: Option<usize>) -> usize {
        flag.or_else(|| self.settings.bulk_cap(action))
            .unwrap_or_else(|| action.default_bulk_cap())
    }
}

fn retry_policy(base: RetryPolicy, settings: &RetrySettings) -> RetryPolicy {
    RetryPolicy {
        max_attempts: settings.max_attempts.unwrap_or(base.max_attempts),
        initial_delay: settings
            .initial_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(base.initial_delay),
        max_delay: settings
            .max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(base.max_delay),
        multiplier: settings.multiplier.unwrap_or(base.multiplier),
        jitter: settings.jitter.unwrap_or(base.jitter),
    }
}

fn poll_policy(base: PollPolicy, settings: &PollSettings) -> PollPolicy {
    PollPolicy {
        initial_interval: settings
            .initial_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(base.initial_interval),
        max_interval: settings
            .max_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(base.max_interval),
        multiplier: settings.multiplier.unwrap_or(base.multiplier),
        max_wait: settings
            .max_wait_secs
            .map(Duration::from_secs)
            .unwrap_or(base.max_wait),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudwarden_cloud::{authorize, ActionRequest, GateDecision, Mode};
    use std::collections::BTreeMap;

    fn context(settings: Settings) -> Context {
        Context::new(
            None,
            None,
            OutputFormat::Table,
            settings,
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_flags_override_config() {
        let settings = Settings {
            profile: Some("from-config".to_string()),
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        };
        let ctx = Context::new(
            Some("from-flag".to_string()),
            None,
            OutputFormat::Json,
            settings,
            CancellationToken::new(),
        );
        assert_eq!(ctx.profile.as_deref(), Some("from-flag"));
        assert_eq!(ctx.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_unset_settings_keep_presets() {
        let options = context(Settings::default()).run_options();
        assert_eq!(options.listing, RetryPolicy::listing());
        assert_eq!(options.mutation, RetryPolicy::mutation());
        assert_eq!(options.poll, PollPolicy::default());
    }

    #[test]
    fn test_partial_overrides() {
        let settings = Settings {
            mutation: RetrySettings {
                max_attempts: Some(7),
                ..Default::default()
            },
            polling: PollSettings {
                max_wait_secs: Some(60),
                ..Default::default()
            },
            ..Default::default()
        };
        let options = context(settings).run_options();
        assert_eq!(options.mutation.max_attempts, 7);
        assert_eq!(
            options.mutation.initial_delay,
            RetryPolicy::mutation().initial_delay
        );
        assert_eq!(options.poll.max_wait, Duration::from_secs(60));
        assert_eq!(
            options.poll.initial_interval,
            PollPolicy::default().initial_interval
        );
    }

    #[test]
    fn test_bulk_cap_precedence() {
        let mut caps = BTreeMap::new();
        caps.insert("create-user".to_string(), 200);
        let ctx = context(Settings {
            bulk_caps: caps,
            ..Default::default()
        });

        assert_eq!(ctx.bulk_cap(ActionType::CreateUser, Some(5)), 5);
        assert_eq!(ctx.bulk_cap(ActionType::CreateUser, None), 200);
        assert_eq!(
            ctx.bulk_cap(ActionType::Terminate, None),
            ActionType::Terminate.default_bulk_cap()
        );
    }

    #[test]
    fn test_configured_cap_blocks_at_the_gate() {
        let ctx = context(Settings {
            bulk_caps: BTreeMap::from([("terminate".to_string(), 2)]),
            ..Default::default()
        });
        let cap = ctx.bulk_cap(ActionType::Terminate, None);
        assert_eq!(cap, 2);

        let request = ActionRequest::builder(ActionType::Terminate)
            .mode(Mode::Apply)
            .bulk_cap(cap)
            .build();
        match authorize(&request, 3) {
            GateDecision::BlockedBulkCapExceeded { cap, requested } => {
                assert_eq!((cap, requested), (2, 3));
            }
            other => panic!("expected bulk cap block, got {:?}", other),
        }
        assert!(matches!(
            authorize(&request, 2),
            GateDecision::Proceed(_)
        ));
    }
}
