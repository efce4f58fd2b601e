//! IAM users: listing, inspection, onboarding and bounded bulk creation
//!
//! Creation is gated before any AWS session is resolved, so a dry run or a
//! bulk-cap refusal never needs credentials.

use crate::args::ApplyArgs;
use crate::context::Context;
use crate::render::{self, Table};
use anyhow::{anyhow, bail};
use clap::{Args, Subcommand};
use cloudwarden_cloud::{
    authorize, ActionParams, ActionRequest, ActionType, GateDecision, OnboardPlan, Orchestrator,
    ResourceDescriptor, ResourceKind, RunReport, SelectionCriteria, TagFilter, UserManager,
};
use cloudwarden_cloud_aws::{param_keys, AwsProvider};
use std::ops::Range;
use tracing::info;

/// Default IAM quota of users per account
const MAX_BATCH: u64 = 5000;

#[derive(Subcommand, Debug)]
pub enum UsersCommands {
    /// List users
    List {
        /// Tag equality filter KEY=VALUE (repeatable)
        #[arg(long = "tag", value_name = "KEY=VALUE")]
        tags: Vec<String>,

        /// Show each user's path
        #[arg(long)]
        with_path: bool,
    },
    /// Show one user
    Show {
        /// IAM user name
        user_name: String,

        /// Also list the groups the user belongs to
        #[arg(long)]
        include_groups: bool,
    },
    /// Create a numbered batch of users
    Create(CreateUsersArgs),
    /// Create a user if needed, attach policies and optionally issue credentials
    Onboard(OnboardArgs),
}

#[derive(Args, Debug)]
pub struct CreateUsersArgs {
    /// Name prefix; users are named <PREFIX><N>
    #[arg(long)]
    pub prefix: String,

    /// First sequence number
    #[arg(long, default_value_t = 1)]
    pub start: u64,

    /// Number of users to create
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_BATCH))]
    pub count: u64,

    /// IAM path for the new users
    #[arg(long, default_value = "/")]
    pub path: String,

    /// Tag applied to every new user KEY=VALUE (repeatable)
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub tags: Vec<String>,

    #[command(flatten)]
    pub apply: ApplyArgs,
}

#[derive(Args, Debug)]
pub struct OnboardArgs {
    /// IAM user name
    pub user_name: String,

    /// Managed policy to attach (repeatable); defaults to ReadOnlyAccess
    #[arg(long = "policy-arn", value_name = "ARN")]
    pub policy_arns: Vec<String>,

    /// Create a console login with a generated password
    #[arg(long)]
    pub create_login: bool,

    /// Require a new password at first sign-in
    #[arg(long, requires = "create_login")]
    pub password_reset_required: bool,

    /// Issue an access key; the secret is printed once
    #[arg(long)]
    pub create_access_key: bool,

    /// IAM path when the user has to be created
    #[arg(long, default_value = "/")]
    pub path: String,

    /// Tag applied when the user has to be created KEY=VALUE (repeatable)
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub tags: Vec<String>,

    #[command(flatten)]
    pub apply: ApplyArgs,
}

impl OnboardArgs {
    fn plan(&self) -> anyhow::Result<OnboardPlan> {
        if self.user_name.is_empty() {
            bail!("user name must not be empty");
        }
        let mut plan = OnboardPlan::new(&self.user_name).with_policies(self.policy_arns.clone());
        plan.console_login = self.create_login;
        plan.password_reset_required = self.password_reset_required;
        plan.access_key = self.create_access_key;
        plan.params = creation_params(&self.path, &self.tags)?;
        Ok(plan)
    }
}

impl CreateUsersArgs {
    /// Sequence numbers of the batch; fails instead of wrapping past `u64::MAX`
    fn numbers(&self) -> anyhow::Result<Range<u64>> {
        let end = self.start.checked_add(self.count).ok_or_else(|| {
            anyhow!(
                "--start {} with --count {} overflows the user number range",
                self.start,
                self.count
            )
        })?;
        Ok(self.start..end)
    }

    fn user_names(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .numbers()?
            .map(|n| format!("{}{}", self.prefix, n))
            .collect())
    }
}

fn creation_params(path: &str, tags: &[String]) -> anyhow::Result<ActionParams> {
    if !path.starts_with('/') || !path.ends_with('/') {
        bail!("--path must begin and end with '/', got {:?}", path);
    }
    let mut params = ActionParams::new().with_value(param_keys::PATH, path);
    for arg in tags {
        let tag: TagFilter = arg.parse()?;
        params = params.with_tag(tag.key, tag.value);
    }
    Ok(params)
}

pub async fn handle(ctx: &Context, command: &UsersCommands) -> anyhow::Result<u8> {
    match command {
        UsersCommands::List { tags, with_path } => list(ctx, tags, *with_path).await,
        UsersCommands::Show {
            user_name,
            include_groups,
        } => show(ctx, user_name, *include_groups).await,
        UsersCommands::Create(args) => create(ctx, args).await,
        UsersCommands::Onboard(args) => onboard(ctx, args).await,
    }
}

async fn list(ctx: &Context, tags: &[String], with_path: bool) -> anyhow::Result<u8> {
    let criteria = SelectionCriteria::new().with_tag_args(tags)?;
    let session = ctx.global_session().await?;
    let provider = AwsProvider::new(&session);
    let orchestrator = Orchestrator::new(&provider).with_options(ctx.run_options());

    let users = orchestrator.candidates(ResourceKind::User, &criteria).await?;
    render::emit(ctx.output, &users, &list_table(&users, with_path))?;
    Ok(0)
}

async fn create(ctx: &Context, args: &CreateUsersArgs) -> anyhow::Result<u8> {
    if args.prefix.is_empty() {
        bail!("--prefix must not be empty");
    }
    let action = ActionType::CreateUser;
    // Overflow is a setup error even when the gate would refuse the batch
    args.numbers()?;
    let count = usize::try_from(args.count)?;
    let builder = ActionRequest::builder(action)
        .mode(args.apply.mode())
        .bulk_cap(ctx.bulk_cap(action, args.apply.bulk_cap))
        .params(creation_params(&args.path, &args.tags)?);

    // Gate on the count so a refused batch never builds its names
    let decision = authorize(&builder.clone().build(), count);
    if let GateDecision::BlockedBulkCapExceeded { .. } = decision {
        let report = RunReport::Halted {
            request: builder.build(),
            decision,
            candidates: Vec::new(),
        };
        render::report(ctx.output, &report, plan_table)?;
        return Ok(report.exit_code());
    }

    let names = args.user_names()?;
    let candidates: Vec<ResourceDescriptor> = names
        .iter()
        .map(|name| ResourceDescriptor::planned(ResourceKind::User, name))
        .collect();
    let request = builder.targets(names).build();

    let report = match decision {
        GateDecision::Proceed(clearance) => {
            let session = ctx.global_session().await?;
            info!(count = candidates.len(), region = %session.region(), "Creating users");
            let provider = AwsProvider::new(&session);
            let orchestrator = Orchestrator::new(&provider).with_options(ctx.run_options());
            let summary = orchestrator
                .execute(&clearance, &request, &candidates, &ctx.cancel)
                .await;
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
    };

    render::report(ctx.output, &report, plan_table)?;
    Ok(report.exit_code())
}

async fn show(ctx: &Context, user_name: &str, include_groups: bool) -> anyhow::Result<u8> {
    let session = ctx.global_session().await?;
    let provider = AwsProvider::new(&session);
    let options = ctx.run_options();
    let details = UserManager::new(&provider)
        .with_retry(options.listing, options.mutation)
        .user_details(user_name, include_groups)
        .await?;

    let user = &details.user;
    let mut headers = vec!["USER", "USER ID", "ARN", "PATH", "CREATED", "PASSWORD LAST USED"];
    if details.groups.is_some() {
        headers.push("GROUPS");
    }
    let mut row = vec![
        user.id().to_string(),
        render::meta(user, "user_id"),
        render::meta(user, "arn"),
        render::meta(user, "path"),
        render::timestamp(user.created_at()),
        password_last_used(user),
    ];
    if let Some(groups) = &details.groups {
        row.push(if groups.is_empty() {
            "-".to_string()
        } else {
            groups.join(",")
        });
    }
    let mut table = Table::new(&headers);
    table.row(row);
    render::emit(ctx.output, &details, &table)?;
    Ok(0)
}

async fn onboard(ctx: &Context, args: &OnboardArgs) -> anyhow::Result<u8> {
    let plan = args.plan()?;
    let request = plan.request(args.apply.mode());

    match authorize(&request, 1) {
        GateDecision::Proceed(clearance) => {
            let session = ctx.global_session().await?;
            info!(user = %plan.user_name, account = session.account(), "Onboarding user");
            let provider = AwsProvider::new(&session);
            let options = ctx.run_options();
            let report = UserManager::new(&provider)
                .with_retry(options.listing, options.mutation)
                .onboard(&clearance, &plan)
                .await?;
            render::onboard_report(ctx.output, &report)?;
            Ok(0)
        }
        decision => {
            let mut table = Table::new(&["STEP"]);
            for step in plan.steps() {
                table.row(vec![step]);
            }
            render::emit(ctx.output, &plan, &table)?;
            render::dry_run_note(
                ctx.output,
                &format!(
                    "Dry run: nothing changed. Re-run with --apply to onboard {}.",
                    plan.user_name
                ),
            );
            Ok(decision.exit_code())
        }
    }
}

fn password_last_used(user: &ResourceDescriptor) -> String {
    user.metadata_field::<chrono::DateTime<chrono::Utc>>("password_last_used")
        .map(render::timestamp)
        .unwrap_or_else(|| "never".to_string())
}

fn list_table(users: &[ResourceDescriptor], with_path: bool) -> Table {
    let mut headers = vec!["USER"];
    if with_path {
        headers.push("PATH");
    }
    headers.extend(["CREATED", "PASSWORD LAST USED", "TAGS"]);

    let mut table = Table::new(&headers);
    for user in users {
        let mut row = vec![user.id().to_string()];
        if with_path {
            row.push(render::meta(user, "path"));
        }
        row.push(render::timestamp(user.created_at()));
        row.push(password_last_used(user));
        row.push(render::tags(user));
        table.row(row);
    }
    table
}

fn plan_table(users: &[ResourceDescriptor]) -> Table {
    let mut table = Table::new(&["USER", "STATE"]);
    for user in users {
        table.row(vec![user.id().to_string(), user.state().to_string()]);
    }
    table
}
