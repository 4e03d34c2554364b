//! SSH-backed remote execution, activation and closure transfer.

use super::process::run_logged;
use super::{Activator, RemoteExec, RemoteOutput, Transfer};
use crate::error::{DeployError, Result};
use async_trait::async_trait;
use drover_types::{ActivationAction, Host};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, instrument};

/// Profile that `switch` and `boot` point at the new closure
pub const SYSTEM_PROFILE: &str = "/nix/var/nix/profiles/system";

/// SSH connection settings shared by every host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// Used when a host declares no target user
    pub default_user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub skip_host_key_check: bool,
    /// Prefix privileged commands with sudo unless connecting as root
    pub sudo: bool,
    pub connect_timeout_secs: Option<u64>,
    /// Drop sessions to hosts that stop answering, e.g. mid-reboot
    pub server_alive_interval_secs: Option<u64>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            default_user: None,
            identity_file: None,
            config_file: None,
            skip_host_key_check: false,
            sudo: true,
            connect_timeout_secs: Some(10),
            server_alive_interval_secs: Some(5),
        }
    }
}

impl SshSettings {
    fn user<'a>(&'a self, host: &'a Host) -> Option<&'a str> {
        host.target_user
            .as_deref()
            .or(self.default_user.as_deref())
            .filter(|u| !u.is_empty())
    }

    fn destination(&self, host: &Host) -> String {
        match self.user(host) {
            Some(user) => format!("{}@{}", user, host.target()),
            None => host.target().to_string(),
        }
    }

    fn host_key_options(&self) -> Vec<String> {
        if self.skip_host_key_check {
            vec![
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ]
        } else {
            Vec::new()
        }
    }
}

/// Runs commands on hosts over `ssh`
#[derive(Debug, Clone, Default)]
pub struct SshContext {
    settings: SshSettings,
}

impl SshContext {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    /// Full `ssh` argument list for running `argv` on `host`
    pub fn ssh_args(&self, host: &Host, argv: &[String]) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        args.extend(self.settings.host_key_options());
        if let Some(secs) = self.settings.connect_timeout_secs {
            args.extend(["-o".to_string(), format!("ConnectTimeout={}", secs)]);
        }
        if let Some(secs) = self.settings.server_alive_interval_secs {
            args.extend([
                "-o".to_string(),
                format!("ServerAliveInterval={}", secs),
                "-o".to_string(),
                "ServerAliveCountMax=3".to_string(),
            ]);
        }
        if let Some(identity) = &self.settings.identity_file {
            args.extend(["-i".to_string(), identity.display().to_string()]);
        }
        if let Some(config) = &self.settings.config_file {
            args.extend(["-F".to_string(), config.display().to_string()]);
        }
        if let Some(port) = host.target_port {
            args.extend(["-p".to_string(), port.to_string()]);
        }
        args.push(self.settings.destination(host));
        args.push("--".to_string());
        args.extend(argv.iter().cloned());
        args
    }

    fn privileged(&self, host: &Host, argv: Vec<String>) -> Vec<String> {
        if !self.settings.sudo || self.settings.user(host) == Some("root") {
            return argv;
        }
        let mut elevated = vec!["sudo".to_string()];
        elevated.extend(argv);
        elevated
    }

    /// Commands run on the host to activate `path` with `action`
    pub fn activation_commands(
        &self,
        host: &Host,
        path: &Path,
        action: ActivationAction,
    ) -> Vec<Vec<String>> {
        let closure = path.display().to_string();
        let mut commands = Vec::new();
        if action.sets_profile() {
            commands.push(self.privileged(
                host,
                vec![
                    "nix-env".to_string(),
                    "--profile".to_string(),
                    SYSTEM_PROFILE.to_string(),
                    "--set".to_string(),
                    closure.clone(),
                ],
            ));
        }
        commands.push(self.privileged(
            host,
            vec![
                format!("{}/bin/switch-to-configuration", closure),
                action.as_str().to_string(),
            ],
        ));
        commands
    }
}

#[async_trait]
impl RemoteExec for SshContext {
    async fn run(&self, host: &Host, argv: &[String]) -> Result<RemoteOutput> {
        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh_args(host, argv));

        let output = run_logged(cmd, &host.name)
            .await
            .map_err(|e| DeployError::Connectivity {
                host: host.name.clone(),
                reason: format!("cannot run ssh: {}", e),
            })?;
        Ok(RemoteOutput {
            stdout: output.stdout,
            status: output.status,
        })
    }
}

#[async_trait]
impl Activator for SshContext {
    #[instrument(skip(self, host, path), fields(host = %host.name, action = %action))]
    async fn activate(&self, host: &Host, path: &Path, action: ActivationAction) -> Result<()> {
        for argv in self.activation_commands(host, path, action) {
            let output = self.run(host, &argv).await?;
            if !output.success() {
                return Err(DeployError::Activation {
                    host: host.name.clone(),
                    reason: format!("`{}` exited with {:?}", argv.join(" "), output.status),
                });
            }
        }
        info!("configuration activated");
        Ok(())
    }
}

/// Pushes closures with `nix-copy-closure`
#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    settings: SshSettings,
}

impl SshTransport {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    /// `NIX_SSHOPTS` for the host, if any options are needed
    pub fn ssh_opts(&self, host: &Host) -> Option<String> {
        let mut opts = self.settings.host_key_options();
        if let Some(port) = host.target_port {
            opts.extend(["-p".to_string(), port.to_string()]);
        }
        if let Some(config) = &self.settings.config_file {
            opts.extend(["-F".to_string(), config.display().to_string()]);
        }
        if opts.is_empty() {
            None
        } else {
            Some(opts.join(" "))
        }
    }

    pub fn copy_args(&self, host: &Host, path: &Path) -> Vec<String> {
        let mut to = self.settings.destination(host);
        if let Some(identity) = &self.settings.identity_file {
            to.push_str(&format!("?ssh-key={}", identity.display()));
        }

        let mut args = vec!["--to".to_string(), to, path.display().to_string()];
        for (key, value) in &host.nix_config {
            args.extend(["--option".to_string(), key.clone(), value.clone()]);
        }
        if host.substitute_on_destination {
            args.push("--use-substitutes".to_string());
        }
        args
    }
}

#[async_trait]
impl Transfer for SshTransport {
    #[instrument(skip(self, host, paths), fields(host = %host.name, paths = paths.len()))]
    async fn push(&self, host: &Host, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            let mut cmd = Command::new("nix-copy-closure");
            cmd.args(self.copy_args(host, path));
            if let Some(opts) = self.ssh_opts(host) {
                cmd.env("NIX_SSHOPTS", opts);
            }

            info!(path = %path.display(), target = host.target(), "pushing");
            let output = run_logged(cmd, &host.name)
                .await
                .map_err(|e| DeployError::Transfer {
                    host: host.name.clone(),
                    reason: format!("cannot run nix-copy-closure: {}", e),
                })?;
            if !output.success() {
                return Err(DeployError::Transfer {
                    host: host.name.clone(),
                    reason: format!("nix-copy-closure exited with {:?}", output.status),
                });
            }
        }
        Ok(())
    }
}
