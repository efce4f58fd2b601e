use crate::args::FilterArgs;
use crate::context::Context;
use crate::render::{self, Table};
use clap::Args;
use cloudwarden_cloud::{Orchestrator, ResourceDescriptor, ResourceKind};
use cloudwarden_cloud_aws::{AwsProvider, DELETE_ON_TAG};

#[derive(Args, Debug)]
pub struct SnapshotsArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
}

/// List snapshots owned by the caller's account
pub async fn handle(ctx: &Context, args: &SnapshotsArgs) -> anyhow::Result<u8> {
    let criteria = args.filter.criteria()?;
    let session = ctx.session().await?;
    let provider = AwsProvider::new(&session);
    let orchestrator = Orchestrator::new(&provider).with_options(ctx.run_options());

    let snapshots = orchestrator
        .candidates(ResourceKind::Snapshot, &criteria)
        .await?;
    render::emit(ctx.output, &snapshots, &table(&snapshots))?;
    Ok(0)
}

fn table(snapshots: &[ResourceDescriptor]) -> Table {
    let mut table = Table::new(&[
        "ID",
        "VOLUME",
        "STATE",
        "PROGRESS",
        "SIZE (GiB)",
        "STARTED",
        "DELETE-ON",
        "DESCRIPTION",
    ]);
    for snapshot in snapshots {
        table.row(vec![
            snapshot.id().to_string(),
            render::meta(snapshot, "volume_id"),
            snapshot.state().to_string(),
            render::meta(snapshot, "progress"),
            render::meta(snapshot, "size_gib"),
            render::timestamp(snapshot.created_at()),
            snapshot.tag(DELETE_ON_TAG).unwrap_or("-").to_string(),
            render::meta(snapshot, "description"),
        ]);
    }
    table
}
