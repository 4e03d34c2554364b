//! CLI command implementations

pub mod plan;
pub mod rollout;

use crate::config::DroverConfig;
use crate::error::{CliError, CliResult};
use clap::Args;
use drover_deployment::collaborators::nix::NixEvaluator;
use drover_deployment::HostFilter;
use drover_types::{ActivationAction, Deployment};
use std::path::{Path, PathBuf};

/// Which deployment to use and which of its hosts to touch
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Deployment file
    pub deployment: PathBuf,

    /// Only these hosts (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub on: Vec<String>,

    /// Only hosts carrying one of these tags (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub tagged: Vec<String>,

    /// Read the evaluated deployment from a JSON file instead of evaluating
    #[arg(long, value_name = "FILE")]
    pub deployment_json: Option<PathBuf>,
}

impl TargetArgs {
    pub fn filter(&self) -> HostFilter {
        HostFilter::on(self.on.iter().cloned()).tagged(self.tagged.iter().cloned())
    }

    /// Evaluate the deployment, or read a pre-evaluated one
    pub async fn load_deployment(&self, config: &DroverConfig) -> CliResult<Deployment> {
        match &self.deployment_json {
            Some(path) => read_deployment_json(path).await,
            None => {
                let evaluator = NixEvaluator::new(config.nix.clone(), self.deployment.clone());
                Ok(evaluator.deployment().await?)
            }
        }
    }
}

async fn read_deployment_json(path: &Path) -> CliResult<Deployment> {
    let json = tokio::fs::read_to_string(path).await?;
    let deployment = Deployment::from_json(&json)?;
    deployment.validate()?;
    Ok(deployment)
}

/// Concurrency and failure handling
#[derive(Debug, Clone, Default, Args)]
pub struct RolloutArgs {
    /// Maximum hosts in flight at once
    #[arg(long, value_name = "N", conflicts_with = "sequential")]
    pub parallel: Option<usize>,

    /// One host at a time, in plan order
    #[arg(long)]
    pub sequential: bool,

    /// Stop the run at the first host failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Report host failures without failing the run
    #[arg(long)]
    pub no_strict: bool,
}

impl RolloutArgs {
    /// Fold the flags into the configured rollout defaults
    pub fn apply(&self, config: &mut DroverConfig) -> CliResult<()> {
        if let Some(n) = self.parallel {
            if n == 0 {
                return Err(CliError::InvalidInput(
                    "--parallel must be at least 1".to_string(),
                ));
            }
            config.rollout.parallelism = Some(n);
        }
        if self.sequential {
            config.rollout.parallelism = Some(1);
        }
        if self.fail_fast {
            config.rollout.fail_fast = true;
        }
        if self.no_strict {
            config.rollout.strict = false;
        }
        Ok(())
    }
}

/// Options that only apply when activating
#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// switch, boot, dry-activate or test
    #[arg(value_parser = parse_action)]
    pub action: ActivationAction,

    /// Reboot each host after activation and wait for it to come back
    #[arg(long)]
    pub reboot: bool,

    /// Give up on a rebooting host after this many seconds
    #[arg(long, value_name = "SECS", requires = "reboot")]
    pub reboot_timeout: Option<u64>,

    #[arg(long)]
    pub skip_pre_deploy_checks: bool,

    #[arg(long)]
    pub skip_health_checks: bool,
}

impl DeployArgs {
    pub fn apply(&self, config: &mut DroverConfig) {
        if let Some(secs) = self.reboot_timeout {
            config.rollout.reboot_timeout_secs = Some(secs);
        }
        if self.skip_pre_deploy_checks {
            config.rollout.pre_deploy_checks = false;
        }
        if self.skip_health_checks {
            config.rollout.health_checks = false;
        }
    }
}

fn parse_action(s: &str) -> Result<ActivationAction, String> {
    s.parse()
}
