use crate::args::{ApplyArgs, FilterArgs};
use crate::context::Context;
use crate::render::{self, Table};
use clap::{Args, Subcommand, ValueEnum};
use cloudwarden_cloud::{
    ActionRequest, ActionType, Orchestrator, ResourceDescriptor, ResourceKind, SelectionCriteria,
};
use cloudwarden_cloud_aws::AwsProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InstanceAction {
    Start,
    Stop,
    Reboot,
    Terminate,
}

impl From<InstanceAction> for ActionType {
    fn from(action: InstanceAction) -> Self {
        match action {
            InstanceAction::Start => ActionType::Start,
            InstanceAction::Stop => ActionType::Stop,
            InstanceAction::Reboot => ActionType::Reboot,
            InstanceAction::Terminate => ActionType::Terminate,
        }
    }
}

#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct InstancesArgs {
    #[command(subcommand)]
    pub command: Option<InstancesCommands>,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Lifecycle action to run on the selected instances; omit to list them
    #[arg(long, value_enum)]
    pub action: Option<InstanceAction>,

    #[command(flatten)]
    pub apply: ApplyArgs,

    /// Wait for each instance to reach the action's target state
    #[arg(long, requires = "action")]
    pub wait: bool,
}

#[derive(Subcommand, Debug)]
pub enum InstancesCommands {
    /// Show system and instance status checks
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Instance id (repeatable)
    #[arg(long = "id", visible_alias = "instance-id", value_name = "ID")]
    pub ids: Vec<String>,

    /// Include instances that are not running
    #[arg(long)]
    pub include_stopped: bool,
}

impl StatusArgs {
    /// Running instances only, unless ids are named or stopped ones are wanted
    fn criteria(&self) -> SelectionCriteria {
        let criteria = SelectionCriteria::new().with_ids(self.ids.iter().cloned());
        if self.ids.is_empty() && !self.include_stopped {
            criteria.with_state("running")
        } else {
            criteria
        }
    }
}

pub async fn handle(ctx: &Context, args: &InstancesArgs) -> anyhow::Result<u8> {
    if let Some(InstancesCommands::Status(status)) = &args.command {
        return show_status(ctx, status).await;
    }

    let criteria = args.filter.criteria()?;
    let session = ctx.session().await?;
    let provider = AwsProvider::new(&session);
    let orchestrator = Orchestrator::new(&provider).with_options(ctx.run_options());

    let Some(action) = args.action else {
        let instances = orchestrator
            .candidates(ResourceKind::Instance, &criteria)
            .await?;
        render::emit(ctx.output, &instances, &table(&instances))?;
        return Ok(0);
    };

    let action = ActionType::from(action);
    let builder = ActionRequest::builder(action)
        .mode(args.apply.mode())
        .bulk_cap(ctx.bulk_cap(action, args.apply.bulk_cap))
        .wait(args.wait);

    let report = orchestrator.run(builder, &criteria, &ctx.cancel).await?;
    render::report(ctx.output, &report, table)?;
    Ok(report.exit_code())
}

async fn show_status(ctx: &Context, args: &StatusArgs) -> anyhow::Result<u8> {
    let session = ctx.session().await?;
    let provider = AwsProvider::new(&session);
    let orchestrator = Orchestrator::new(&provider).with_options(ctx.run_options());

    let statuses = orchestrator
        .candidates(ResourceKind::InstanceStatus, &args.criteria())
        .await?;
    render::emit(ctx.output, &statuses, &status_table(&statuses))?;
    Ok(0)
}

fn status_table(statuses: &[ResourceDescriptor]) -> Table {
    let mut table = Table::new(&["ID", "STATE", "SYSTEM CHECK", "INSTANCE CHECK", "ZONE"]);
    for status in statuses {
        table.row(vec![
            status.id().to_string(),
            status.state().to_string(),
            render::meta(status, "system_status"),
            render::meta(status, "instance_status"),
            render::meta(status, "availability_zone"),
        ]);
    }
    table
}

fn table(instances: &[ResourceDescriptor]) -> Table {
    let mut table = Table::new(&[
        "ID", "NAME", "STATE", "TYPE", "ZONE", "PRIVATE IP", "LAUNCHED",
    ]);
    for instance in instances {
        table.row(vec![
            instance.id().to_string(),
            instance.tag("Name").unwrap_or("-").to_string(),
            instance.state().to_string(),
            render::meta(instance, "instance_type"),
            render::meta(instance, "availability_zone"),
            render::meta(instance, "private_ip"),
            render::timestamp(instance.created_at()),
        ]);
    }
    table
}
