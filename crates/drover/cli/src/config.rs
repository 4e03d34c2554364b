//! Configuration for the drover CLI
//!
//! Layers, lowest precedence first: built-in defaults, the TOML file
//! (`--config`, else `~/.config/drover/config.toml` if present), then
//! `DROVER_<SECTION>__<KEY>` environment variables. The nix commands also
//! honour `DROVER_NIX_EVAL_CMD`, `DROVER_NIX_BUILD_CMD`,
//! `DROVER_NIX_SHELL_CMD` and `DROVER_NIX_EVAL_MACHINES`.

use drover_deployment::collaborators::nix::NixSettings;
use drover_deployment::collaborators::ssh::SshSettings;
use drover_deployment::{ExecutorConfig, Parallelism, RebootSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DroverConfig {
    #[serde(default)]
    pub nix: NixSettings,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub rollout: RolloutConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rollout defaults, overridable per command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Maximum concurrent host pipelines; unset means unlimited
    #[serde(default)]
    pub parallelism: Option<usize>,

    #[serde(default)]
    pub fail_fast: bool,

    #[serde(default = "default_true")]
    pub strict: bool,

    #[serde(default = "default_true")]
    pub pre_deploy_checks: bool,

    #[serde(default = "default_true")]
    pub health_checks: bool,

    #[serde(default = "default_reboot_poll_interval")]
    pub reboot_poll_interval_secs: u64,

    /// Give up waiting for a rebooted host after this long; unset waits forever
    #[serde(default)]
    pub reboot_timeout_secs: Option<u64>,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            parallelism: None,
            fail_fast: false,
            strict: true,
            pre_deploy_checks: true,
            health_checks: true,
            reboot_poll_interval_secs: default_reboot_poll_interval(),
            reboot_timeout_secs: None,
        }
    }
}

impl RolloutConfig {
    pub fn parallelism(&self) -> Parallelism {
        match self.parallelism {
            Some(1) => Parallelism::Sequential,
            Some(n) => Parallelism::Bounded(n),
            None => Parallelism::Unlimited,
        }
    }

    pub fn reboot_settings(&self) -> RebootSettings {
        RebootSettings {
            poll_interval: Duration::from_secs(self.reboot_poll_interval_secs.max(1)),
            max_wait: self.reboot_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn executor_config(&self, reboot: bool) -> ExecutorConfig {
        ExecutorConfig {
            parallelism: self.parallelism(),
            fail_fast: self.fail_fast,
            strict: self.strict,
            reboot: reboot.then(|| self.reboot_settings()),
            ..Default::default()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_reboot_poll_interval() -> u64 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `~/.config/drover/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("drover").join("config.toml"))
}

impl DroverConfig {
    /// Load configuration from defaults, file and environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DroverConfig::default())?);

        // An explicit file must exist; the default one is optional
        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        // Add environment variables with DROVER_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("DROVER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: DroverConfig = builder.build()?.try_deserialize()?;
        config.nix = config.nix.with_env_overrides();
        Ok(config)
    }
}
