//! drover CLI - Rolling deployments for Nix-managed fleets
//!
//! This CLI gives operators a terminal interface to:
//! - Plan which hosts a run touches and in what order
//! - Build host closures in one batch
//! - Push closures to hosts
//! - Activate them host by host within label-group unavailability budgets

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;

use commands::{plan, rollout, DeployArgs, RolloutArgs, TargetArgs};
use config::DroverConfig;
use drover_types::{ActivationAction, RolloutGoal};
use error::CliResult;
use output::{print_error, print_warning, OutputFormat};

/// drover CLI application
#[derive(Parser)]
#[command(name = "drover")]
#[command(about = "drover - Rolling deployments for NixOS fleets", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DROVER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable JSON logging
    #[arg(long, env = "DROVER_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Show the hosts a run would touch, in execution order
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Build the selected hosts' closures
    Build {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        rollout: RolloutArgs,
    },

    /// Build and copy closures to the selected hosts
    Push {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        rollout: RolloutArgs,
    },

    /// Build, push and activate on the selected hosts
    Deploy {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        deploy: DeployArgs,

        #[command(flatten)]
        rollout: RolloutArgs,
    },

    /// Show the effective configuration
    Config,
}

fn init_tracing(config: &DroverConfig, verbose: bool, json: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Cancel the run on the first Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warning("Interrupted, cancelling hosts in flight");
            token.cancel();
        }
    });
    cancel
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = DroverConfig::load(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose, cli.log_json);

    match cli.command {
        Commands::Plan { target } => {
            plan::execute(
                target,
                &config,
                RolloutGoal::Deploy(ActivationAction::Switch),
                cli.output,
            )
            .await
        }
        Commands::Build { target, rollout: args } => {
            rollout::execute(
                target,
                args,
                config,
                RolloutGoal::Build,
                false,
                cli.output,
                cancel_on_interrupt(),
            )
            .await
        }
        Commands::Push { target, rollout: args } => {
            rollout::execute(
                target,
                args,
                config,
                RolloutGoal::Push,
                false,
                cli.output,
                cancel_on_interrupt(),
            )
            .await
        }
        Commands::Deploy {
            target,
            deploy,
            rollout: args,
        } => {
            let mut config = config;
            deploy.apply(&mut config);
            rollout::execute(
                target,
                args,
                config,
                RolloutGoal::Deploy(deploy.action),
                deploy.reboot,
                cli.output,
                cancel_on_interrupt(),
            )
            .await
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
