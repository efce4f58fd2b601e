//! Access key age audit
//!
//! Keys older than `--max-age-days` are listed oldest first and can be
//! deactivated or deleted in that order.

use crate::args::ApplyArgs;
use crate::context::Context;
use crate::render::{self, Table};
use chrono::Utc;
use clap::{Args, ValueEnum};
use cloudwarden_cloud::{
    AgeThreshold, ActionRequest, ActionType, Orchestrator, ResourceDescriptor, ResourceKind,
    SelectionCriteria,
};
use cloudwarden_cloud_aws::AwsProvider;

const ACTIVE: &str = "Active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyAction {
    /// Only list the aged keys
    Report,
    Deactivate,
    Delete,
}

#[derive(Args, Debug)]
pub struct AccessKeysArgs {
    /// Explicit access key id (repeatable); the age and status filters are ignored
    #[arg(long = "id", value_name = "KEY_ID")]
    pub ids: Vec<String>,

    /// Keys older than this many days are reported
    #[arg(long, value_name = "DAYS", default_value_t = 90)]
    pub max_age_days: i64,

    /// Include keys that are already inactive
    #[arg(long)]
    pub include_disabled: bool,

    #[arg(long, value_enum, default_value_t = KeyAction::Report)]
    pub action: KeyAction,

    #[command(flatten)]
    pub apply: ApplyArgs,
}

impl AccessKeysArgs {
    fn criteria(&self) -> SelectionCriteria {
        let mut criteria =
            SelectionCriteria::new().with_age(AgeThreshold::older_than_days(self.max_age_days));
        if !self.include_disabled {
            criteria = criteria.with_state(ACTIVE);
        }
        criteria.with_ids(self.ids.iter().cloned())
    }
}

pub async fn handle(ctx: &Context, args: &AccessKeysArgs) -> anyhow::Result<u8> {
    let criteria = args.criteria();
    let session = ctx.global_session().await?;
    let provider = AwsProvider::new(&session);
    let orchestrator =
        Orchestrator::new(&provider).with_options(ctx.run_options().oldest_first());

    let action = match args.action {
        KeyAction::Report => {
            let keys = orchestrator
                .candidates(ResourceKind::Credential, &criteria)
                .await?;
            render::emit(ctx.output, &keys, &table(&keys))?;
            return Ok(0);
        }
        KeyAction::Deactivate => ActionType::DeactivateKey,
        KeyAction::Delete => ActionType::DeleteKey,
    };

    let builder = ActionRequest::builder(action)
        .mode(args.apply.mode())
        .bulk_cap(ctx.bulk_cap(action, args.apply.bulk_cap));

    let report = orchestrator.run(builder, &criteria, &ctx.cancel).await?;
    render::report(ctx.output, &report, table)?;
    Ok(report.exit_code())
}

fn table(keys: &[ResourceDescriptor]) -> Table {
    let now = Utc::now();
    let mut table = Table::new(&[
        "USER",
        "KEY",
        "STATUS",
        "CREATED",
        "LAST USED",
        "AGE (DAYS)",
    ]);
    for key in keys {
        let last_used = key
            .metadata_field::<chrono::DateTime<Utc>>("last_used")
            .map(render::timestamp)
            .unwrap_or_else(|| "never".to_string());
        table.row(vec![
            render::meta(key, "user_name"),
            key.id().to_string(),
            key.state().to_string(),
            render::timestamp(key.created_at()),
            last_used,
            render::age_days(key, now),
        ]);
    }
    table
}
