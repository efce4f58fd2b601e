mod args;
mod commands;
mod context;
mod logging;
mod render;

use clap::{ArgAction, Parser, Subcommand};
use cloudwarden_config::Settings;
use colored::Colorize;
use context::Context;
use render::OutputFormat;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exit code for setup failures (bad flags, config, credentials, listing)
const SETUP_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "warden")]
#[command(
    about = "Select AWS resources by tag, state and age; preview, then apply lifecycle actions",
    long_about = None
)]
struct Cli {
    /// AWS named profile
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Log verbosity (-v info, -vv debug, -vvv everything)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List EC2 instances, start/stop/reboot/terminate them, or show status checks
    Instances(commands::instances::InstancesArgs),
    /// List EBS volumes, snapshot them, or delete unused ones
    Volumes(commands::volumes::VolumesArgs),
    /// List snapshots owned by this account
    Snapshots(commands::snapshots::SnapshotsArgs),
    /// Audit access key age; optionally deactivate or delete aged keys
    AccessKeys(commands::access_keys::AccessKeysArgs),
    /// List, show, onboard or bulk-create IAM users
    #[command(subcommand)]
    Users(commands::users::UsersCommands),
    /// List S3 buckets or object keys
    S3(commands::s3::S3Args),
    /// List EC2 regions
    Regions,
    /// Show the account the credentials belong to
    Account,
    /// Wait for instances to reach a state
    Wait(commands::wait::WaitArgs),
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(SETUP_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    // Version needs neither config nor credentials
    if matches!(cli.command, Commands::Version) {
        println!("warden {}", env!("CARGO_PKG_VERSION"));
        return Ok(0);
    }

    let (settings, config_path) = Settings::load()?;
    if let Some(path) = &config_path {
        debug!(path = %path.display(), "Using config file");
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current resource");
            interrupt.cancel();
        }
    });

    let ctx = Context::new(cli.profile, cli.region, cli.output, settings, cancel);

    match &cli.command {
        Commands::Instances(args) => commands::instances::handle(&ctx, args).await,
        Commands::Volumes(args) => commands::volumes::handle(&ctx, args).await,
        Commands::Snapshots(args) => commands::snapshots::handle(&ctx, args).await,
        Commands::AccessKeys(args) => commands::access_keys::handle(&ctx, args).await,
        Commands::Users(command) => commands::users::handle(&ctx, command).await,
        Commands::S3(args) => commands::s3::handle(&ctx, args).await,
        Commands::Regions => commands::regions::handle(&ctx).await,
        Commands::Account => commands::account::handle(&ctx).await,
        Commands::Wait(args) => commands::wait::handle(&ctx, args).await,
        Commands::Version => unreachable!("Version is handled before config loading"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "warden", "instances", "--tag", "Prod=backup", "--output", "json", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Instances(args) => assert_eq!(args.filter.tags, vec!["Prod=backup"]),
            _ => panic!("expected instances"),
        }
    }

    #[test]
    fn test_age_filters_conflict() {
        let result = Cli::try_parse_from([
            "warden",
            "snapshots",
            "--max-age-days",
            "30",
            "--newer-than-days",
            "7",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_instances_status_subcommand() {
        let cli = Cli::try_parse_from([
            "warden",
            "instances",
            "status",
            "--id",
            "i-1",
            "--include-stopped",
        ])
        .unwrap();
        let Commands::Instances(args) = cli.command else {
            panic!("expected instances");
        };
        match args.command {
            Some(commands::instances::InstancesCommands::Status(status)) => {
                assert_eq!(status.ids, vec!["i-1"]);
                assert!(status.include_stopped);
            }
            None => panic!("expected status subcommand"),
        }
    }

    #[test]
    fn test_onboard_reset_requires_login() {
        let result = Cli::try_parse_from([
            "warden",
            "users",
            "onboard",
            "alice",
            "--password-reset-required",
        ]);
        assert!(result.is_err());
        assert!(Cli::try_parse_from([
            "warden",
            "users",
            "onboard",
            "alice",
            "--create-login",
            "--password-reset-required",
            "--policy-arn",
            "arn:aws:iam::aws:policy/PowerUserAccess",
        ])
        .is_ok());
    }

    #[test]
    fn test_wait_requires_id() {
        assert!(Cli::try_parse_from(["warden", "wait", "--state", "running"]).is_err());
    }
}
