//! External collaborators
//!
//! Everything that touches the outside world (the build tool, the transfer
//! channel, the remote shell) is reached through the traits in this module.
//! The process-backed implementations live in [`nix`] and [`ssh`]; tests
//! substitute in-memory fakes.

pub mod nix;
mod process;
pub mod ssh;

use crate::error::Result;
use async_trait::async_trait;
use drover_health::{CheckFactory, CommandRunner, DeclaredChecks};
use drover_types::{ActivationAction, Host};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builds the configurations of a batch of hosts in one call.
///
/// Returns the root directory holding one entry per host name.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, hosts: &[Host]) -> Result<PathBuf>;
}

/// Copies build results to a host.
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn push(&self, host: &Host, paths: &[PathBuf]) -> Result<()>;
}

/// Switches a host to a pushed configuration.
#[async_trait]
pub trait Activator: Send + Sync {
    async fn activate(&self, host: &Host, path: &Path, action: ActivationAction) -> Result<()>;
}

/// Output of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    /// Exit status, `None` when the command was killed by a signal
    pub status: Option<i32>,
}

impl RemoteOutput {
    pub fn new(stdout: impl Into<String>, status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            status: Some(status),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs commands on a host.
///
/// A non-zero exit status is reported in [`RemoteOutput`], not as an error.
/// `Err` means the command could not be run at all.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn run(&self, host: &Host, argv: &[String]) -> Result<RemoteOutput>;
}

/// Lets command health checks run through a [`RemoteExec`].
pub struct RemoteCommandRunner {
    remote: Arc<dyn RemoteExec>,
}

impl RemoteCommandRunner {
    pub fn new(remote: Arc<dyn RemoteExec>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl CommandRunner for RemoteCommandRunner {
    async fn run_command(
        &self,
        host: &Host,
        argv: &[String],
    ) -> std::result::Result<Option<i32>, String> {
        self.remote
            .run(host, argv)
            .await
            .map(|output| output.status)
            .map_err(|e| e.to_string())
    }
}

/// The set of collaborators a rollout runs against
#[derive(Clone)]
pub struct Collaborators {
    pub builder: Arc<dyn Builder>,
    pub transfer: Arc<dyn Transfer>,
    pub activator: Arc<dyn Activator>,
    pub remote: Arc<dyn RemoteExec>,
    pub checks: Arc<dyn CheckFactory>,
}

impl Collaborators {
    /// Health checks default to the ones declared on each host, with command
    /// checks run through `remote`.
    pub fn new(
        builder: Arc<dyn Builder>,
        transfer: Arc<dyn Transfer>,
        activator: Arc<dyn Activator>,
        remote: Arc<dyn RemoteExec>,
    ) -> Self {
        let runner = Arc::new(RemoteCommandRunner::new(remote.clone()));
        Self {
            builder,
            transfer,
            activator,
            remote,
            checks: Arc::new(DeclaredChecks::new(runner)),
        }
    }

    pub fn with_checks(mut self, checks: Arc<dyn CheckFactory>) -> Self {
        self.checks = checks;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
