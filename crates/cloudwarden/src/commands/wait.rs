use crate::context::Context;
use crate::render;
use clap::{Args, ValueEnum};
use cloudwarden_cloud::{LifecycleDriver, OutcomeCollector, ResourceKind};
use cloudwarden_cloud_aws::AwsProvider;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetState {
    Running,
    Stopped,
    Terminated,
}

impl TargetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetState::Running => "running",
            TargetState::Stopped => "stopped",
            TargetState::Terminated => "terminated",
        }
    }
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Instance id to wait for (repeatable)
    #[arg(long = "id", value_name = "ID", required = true)]
    pub ids: Vec<String>,

    /// State to wait for
    #[arg(long, value_enum)]
    pub state: TargetState,

    /// Give up on an instance after this many seconds
    #[arg(long, value_name = "SECS")]
    pub max_wait_secs: Option<u64>,
}

/// Block until every instance reaches `--state`; no mutation is issued
pub async fn handle(ctx: &Context, args: &WaitArgs) -> anyhow::Result<u8> {
    let session = ctx.session().await?;
    let provider = AwsProvider::new(&session);

    let options = ctx.run_options();
    let mut poll = options.poll;
    if let Some(secs) = args.max_wait_secs {
        poll.max_wait = Duration::from_secs(secs);
    }
    let driver = LifecycleDriver::new(&provider)
        .with_mutation_policy(options.mutation)
        .with_poll_policy(poll);

    let mut collector = OutcomeCollector::new();
    for (index, id) in args.ids.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            warn!(remaining = args.ids.len() - index, "Wait interrupted");
            collector.mark_interrupted();
            break;
        }
        let outcome = driver
            .wait_for_state(ResourceKind::Instance, id, args.state.as_str())
            .await;
        collector.record(outcome);
    }

    let summary = collector.finish();
    render::print_summary(ctx.output, &summary)?;
    Ok(summary.exit_code())
}
