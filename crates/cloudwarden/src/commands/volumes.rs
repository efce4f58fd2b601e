use crate::args::{ApplyArgs, FilterArgs};
use crate::context::Context;
use crate::render::{self, Table};
use anyhow::bail;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, ValueEnum};
use cloudwarden_cloud::{
    ActionParams, ActionRequest, ActionType, Orchestrator, ResourceDescriptor, ResourceKind,
};
use cloudwarden_cloud_aws::{param_keys, AwsProvider};

/// Volumes snapshotted when no state filter is given
const SNAPSHOT_DEFAULT_STATE: &str = "in-use";

/// Only detached volumes are ever deleted
const DELETABLE_STATE: &str = "available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VolumeAction {
    /// Create a snapshot of each volume
    Snapshot,
    /// Delete unused, untagged volumes
    Delete,
}

#[derive(Args, Debug)]
pub struct VolumesArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Action to run on the selected volumes; omit to list them
    #[arg(long, value_enum)]
    pub action: Option<VolumeAction>,

    /// Snapshot description
    #[arg(long)]
    pub description: Option<String>,

    /// Days to keep snapshots, recorded in the Delete-on tag
    #[arg(long, value_name = "DAYS", default_value_t = 90)]
    pub retention_days: i64,

    #[command(flatten)]
    pub apply: ApplyArgs,

    /// Wait for each snapshot or deletion to complete
    #[arg(long, requires = "action")]
    pub wait: bool,
}

pub async fn handle(ctx: &Context, args: &VolumesArgs) -> anyhow::Result<u8> {
    let mut criteria = args.filter.criteria()?;
    let (action, params) = match args.action {
        None => (None, ActionParams::new()),
        Some(VolumeAction::Snapshot) => {
            if !args.filter.has_state_filter() {
                criteria = criteria.with_state(SNAPSHOT_DEFAULT_STATE);
            }
            (
                Some(ActionType::CreateSnapshot),
                snapshot_params(args, Utc::now())?,
            )
        }
        Some(VolumeAction::Delete) => {
            if !args.filter.untagged && args.filter.ids.is_empty() {
                bail!("delete only targets untagged volumes; pass --untagged or explicit --id");
            }
            if !args.filter.has_state_filter() {
                criteria = criteria.with_state(DELETABLE_STATE);
            }
            (Some(ActionType::DeleteVolume), ActionParams::new())
        }
    };

    let session = ctx.session().await?;
    let provider = AwsProvider::new(&session);
    let orchestrator = Orchestrator::new(&provider).with_options(ctx.run_options());

    let Some(action) = action else {
        let volumes = orchestrator.candidates(ResourceKind::Volume, &criteria).await?;
        render::emit(ctx.output, &volumes, &table(&volumes))?;
        return Ok(0);
    };

    let builder = ActionRequest::builder(action)
        .mode(args.apply.mode())
        .bulk_cap(ctx.bulk_cap(action, args.apply.bulk_cap))
        .wait(args.wait)
        .params(params);

    let report = orchestrator.run(builder, &criteria, &ctx.cancel).await?;
    render::report(ctx.output, &report, table)?;
    Ok(report.exit_code())
}

fn snapshot_params(args: &VolumesArgs, now: DateTime<Utc>) -> anyhow::Result<ActionParams> {
    if args.retention_days <= 0 {
        bail!("--retention-days must be positive");
    }
    let delete_on = (now + Duration::days(args.retention_days))
        .format("%Y-%m-%d")
        .to_string();

    let mut params = ActionParams::new().with_value(param_keys::DELETE_ON, delete_on);
    if let Some(description) = &args.description {
        params = params.with_value(param_keys::DESCRIPTION, description);
    }
    Ok(params)
}

fn table(volumes: &[ResourceDescriptor]) -> Table {
    let mut table = Table::new(&[
        "ID",
        "NAME",
        "STATE",
        "SIZE (GiB)",
        "TYPE",
        "ZONE",
        "ATTACHED TO",
        "CREATED",
    ]);
    for volume in volumes {
        table.row(vec![
            volume.id().to_string(),
            volume.tag("Name").unwrap_or("-").to_string(),
            volume.state().to_string(),
            render::meta(volume, "size_gib"),
            render::meta(volume, "volume_type"),
            render::meta(volume, "availability_zone"),
            render::meta(volume, "attached_to"),
            render::timestamp(volume.created_at()),
        ]);
    }
    table
}
