//! Nix-backed evaluation and builds.
//!
//! Both the evaluator and the builder drive the deployment's
//! `eval-machines.nix` expression: `nix-instantiate --eval` for the
//! deployment description and `nix-build --attr machines` for the host
//! closures. The invocation is also handed to the expression as JSON, through
//! `DROVER_ARGS` and an args file.

use super::process::run_logged;
use super::Builder;
use crate::error::{DeployError, Result};
use async_trait::async_trait;
use drover_types::{Deployment, Host};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// Nix tool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NixSettings {
    pub eval_cmd: String,
    pub build_cmd: String,
    pub shell_cmd: String,
    /// Defaults to `eval-machines.nix` next to the deployment file
    pub eval_machines: Option<PathBuf>,
    pub show_trace: bool,
    /// Keep the result link in `.gcroots/` next to the deployment file
    pub keep_gc_root: bool,
    /// Run the build inside the deployment's declared build shell
    pub allow_build_shell: bool,
    /// Passed verbatim to the build command
    pub extra_args: Vec<String>,
    /// Nix expression restricting what gets built
    pub build_targets: Option<String>,
}

impl Default for NixSettings {
    fn default() -> Self {
        Self {
            eval_cmd: "nix-instantiate".to_string(),
            build_cmd: "nix-build".to_string(),
            shell_cmd: "nix-shell".to_string(),
            eval_machines: None,
            show_trace: false,
            keep_gc_root: true,
            allow_build_shell: false,
            extra_args: Vec::new(),
            build_targets: None,
        }
    }
}

impl NixSettings {
    /// Apply `DROVER_NIX_EVAL_CMD`, `DROVER_NIX_BUILD_CMD`,
    /// `DROVER_NIX_SHELL_CMD` and `DROVER_NIX_EVAL_MACHINES`
    pub fn with_env_overrides(mut self) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        if let Some(cmd) = var("DROVER_NIX_EVAL_CMD") {
            self.eval_cmd = cmd;
        }
        if let Some(cmd) = var("DROVER_NIX_BUILD_CMD") {
            self.build_cmd = cmd;
        }
        if let Some(cmd) = var("DROVER_NIX_SHELL_CMD") {
            self.shell_cmd = cmd;
        }
        if let Some(path) = var("DROVER_NIX_EVAL_MACHINES") {
            self.eval_machines = Some(PathBuf::from(path));
        }
        self
    }

    pub fn eval_machines_for(&self, deployment_path: &Path) -> PathBuf {
        match &self.eval_machines {
            Some(path) => path.clone(),
            None => deployment_dir(deployment_path).join("eval-machines.nix"),
        }
    }
}

fn deployment_dir(deployment_path: &Path) -> &Path {
    deployment_path.parent().unwrap_or_else(|| Path::new("."))
}

fn option_args(nix_config: &BTreeMap<String, String>) -> Vec<String> {
    nix_config
        .iter()
        .flat_map(|(k, v)| ["--option".to_string(), k.clone(), v.clone()])
        .collect()
}

/// An `eval-machines.nix` evaluation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalInvocation {
    pub attr: String,
    pub deployment_path: PathBuf,
    pub eval_machines: PathBuf,
    pub args_file: String,
    pub as_json: bool,
    pub strict: bool,
    pub show_trace: bool,
}

impl EvalInvocation {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--eval".to_string(),
            self.eval_machines.display().to_string(),
            "--arg".to_string(),
            "networkExpr".to_string(),
            self.deployment_path.display().to_string(),
            "--argstr".to_string(),
            "argsFile".to_string(),
            self.args_file.clone(),
            "--attr".to_string(),
            self.attr.clone(),
        ];
        if self.show_trace {
            args.push("--show-trace".to_string());
        }
        if self.as_json {
            args.push("--json".to_string());
        }
        if self.strict {
            args.push("--strict".to_string());
        }
        args
    }
}

/// An `eval-machines.nix` build
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInvocation {
    pub args_file: PathBuf,
    pub attr: String,
    pub deployment_path: PathBuf,
    pub eval_machines: PathBuf,
    pub names: Vec<String>,
    pub nix_args: Vec<String>,
    pub nix_build_targets: Option<String>,
    pub nix_config: BTreeMap<String, String>,
    pub result_link_path: PathBuf,
    pub show_trace: bool,
}

impl BuildInvocation {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.eval_machines.display().to_string(),
            "--arg".to_string(),
            "networkExpr".to_string(),
            self.deployment_path.display().to_string(),
            "--argstr".to_string(),
            "argsFile".to_string(),
            self.args_file.display().to_string(),
            "--out-link".to_string(),
            self.result_link_path.display().to_string(),
            "--attr".to_string(),
            self.attr.clone(),
        ];
        args.extend(option_args(&self.nix_config));
        args.extend(self.nix_args.iter().cloned());
        if self.show_trace {
            args.push("--show-trace".to_string());
        }
        if let Some(targets) = &self.nix_build_targets {
            args.extend(["--arg".to_string(), "buildTargets".to_string(), targets.clone()]);
        }
        args
    }
}

/// Evaluates the deployment description
#[derive(Debug, Clone)]
pub struct NixEvaluator {
    settings: NixSettings,
    deployment_path: PathBuf,
}

impl NixEvaluator {
    pub fn new(settings: NixSettings, deployment_path: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            deployment_path: deployment_path.into(),
        }
    }

    fn invocation(&self, attr: &str) -> EvalInvocation {
        EvalInvocation {
            attr: attr.to_string(),
            deployment_path: self.deployment_path.clone(),
            eval_machines: self.settings.eval_machines_for(&self.deployment_path),
            args_file: String::new(),
            as_json: true,
            strict: true,
            show_trace: self.settings.show_trace,
        }
    }

    async fn eval_json(&self, attr: &str) -> Result<String> {
        let invocation = self.invocation(attr);
        let json_args =
            serde_json::to_string(&invocation).map_err(|e| DeployError::Evaluation(e.to_string()))?;

        let mut cmd = Command::new(&self.settings.eval_cmd);
        cmd.args(invocation.to_args()).env("DROVER_ARGS", json_args);

        let output = run_logged(cmd, "localhost").await.map_err(|e| {
            DeployError::Evaluation(format!("cannot run {}: {}", self.settings.eval_cmd, e))
        })?;
        if !output.success() {
            return Err(DeployError::Evaluation(format!(
                "{} --attr {} exited with {:?}",
                self.settings.eval_cmd, attr, output.status
            )));
        }
        Ok(output.stdout)
    }

    /// Evaluate `info.deployment` into a validated [`Deployment`]
    #[instrument(skip(self), fields(deployment = %self.deployment_path.display()))]
    pub async fn deployment(&self) -> Result<Deployment> {
        let json = self.eval_json("info.deployment").await?;
        let deployment = Deployment::from_json(&json)?;
        deployment.validate()?;
        info!(hosts = deployment.hosts.len(), "deployment evaluated");
        Ok(deployment)
    }

    /// Evaluate `info.buildShell`, the optional shell derivation for builds
    pub async fn build_shell(&self) -> Result<Option<String>> {
        let json = self.eval_json("info.buildShell").await?;
        serde_json::from_str(&json).map_err(|e| DeployError::Evaluation(e.to_string()))
    }
}

/// Builds host closures with `nix-build`
#[derive(Debug, Clone)]
pub struct NixBuilder {
    settings: NixSettings,
    deployment_path: PathBuf,
    evaluator: NixEvaluator,
    /// Scratch dirs of finished builds. Their result links are the only gc
    /// roots when `keep_gc_root` is off, so they live as long as the builder.
    scratch: Arc<Mutex<Vec<TempDir>>>,
}

impl NixBuilder {
    pub fn new(settings: NixSettings, deployment_path: impl Into<PathBuf>) -> Self {
        let deployment_path = deployment_path.into();
        Self {
            evaluator: NixEvaluator::new(settings.clone(), deployment_path.clone()),
            settings,
            deployment_path,
            scratch: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn retain(&self, scratch: TempDir) {
        self.scratch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(scratch);
    }

    /// Where the result link goes: the gc root if it can be created,
    /// otherwise the scratch dir
    async fn result_link_path(&self, scratch: &Path) -> PathBuf {
        if self.settings.keep_gc_root {
            let gcroots = deployment_dir(&self.deployment_path).join(".gcroots");
            let name = self
                .deployment_path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "deployment".into());
            match tokio::fs::create_dir_all(&gcroots).await {
                Ok(()) => return gcroots.join(name),
                Err(e) => warn!(path = %gcroots.display(), error = %e, "unable to create gc root, skipping"),
            }
        }
        scratch.join("result")
    }

    pub fn invocation(&self, hosts: &[Host], scratch: &Path, result_link: PathBuf) -> BuildInvocation {
        BuildInvocation {
            args_file: scratch.join("drover-args.json"),
            attr: "machines".to_string(),
            deployment_path: self.deployment_path.clone(),
            eval_machines: self.settings.eval_machines_for(&self.deployment_path),
            names: hosts.iter().map(|h| h.name.clone()).collect(),
            nix_args: self.settings.extra_args.clone(),
            nix_build_targets: self.settings.build_targets.clone(),
            nix_config: hosts.first().map(|h| h.nix_config.clone()).unwrap_or_default(),
            result_link_path: result_link,
            show_trace: self.settings.show_trace,
        }
    }

    fn command(&self, invocation: &BuildInvocation, build_shell: Option<String>) -> Command {
        match build_shell {
            Some(shell) if self.settings.allow_build_shell => {
                let mut line = vec![self.settings.build_cmd.clone()];
                line.extend(invocation.to_args());
                let mut cmd = Command::new(&self.settings.shell_cmd);
                cmd.args([shell, "--pure".to_string(), "--run".to_string(), line.join(" ")]);
                cmd
            }
            _ => {
                let mut cmd = Command::new(&self.settings.build_cmd);
                cmd.args(invocation.to_args());
                cmd
            }
        }
    }
}

#[async_trait]
impl Builder for NixBuilder {
    #[instrument(skip(self, hosts), fields(hosts = hosts.len()))]
    async fn build(&self, hosts: &[Host]) -> Result<PathBuf> {
        if hosts.is_empty() {
            return Err(DeployError::Build("no hosts to build".to_string()));
        }

        let scratch = tempfile::Builder::new()
            .prefix("drover-")
            .tempdir()
            .map_err(|e| DeployError::Build(format!("cannot create scratch dir: {}", e)))?;

        let result_link = self.result_link_path(scratch.path()).await;
        let build_shell = if self.settings.allow_build_shell {
            self.evaluator.build_shell().await?
        } else {
            None
        };

        let invocation = self.invocation(hosts, scratch.path(), result_link.clone());
        let json_args =
            serde_json::to_string(&invocation).map_err(|e| DeployError::Build(e.to_string()))?;
        tokio::fs::write(&invocation.args_file, &json_args)
            .await
            .map_err(|e| DeployError::Build(format!("cannot write args file: {}", e)))?;

        let mut cmd = self.command(&invocation, build_shell);
        cmd.env("DROVER_ARGS", &json_args)
            .env("DROVER_ARGS_FILE", &invocation.args_file);

        info!(names = ?invocation.names, "building");
        let output = run_logged(cmd, "localhost")
            .await
            .map_err(|e| DeployError::Build(format!("cannot run {}: {}", self.settings.build_cmd, e)))?;
        if !output.success() {
            return Err(DeployError::Build(format!(
                "{} exited with {:?}, see the log above",
                self.settings.build_cmd, output.status
            )));
        }

        let root = tokio::fs::read_link(&result_link)
            .await
            .map_err(|e| DeployError::Build(format!("no result link at {}: {}", result_link.display(), e)))?;
        info!(root = %root.display(), "build finished");
        self.retain(scratch);
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> NixSettings {
        NixSettings {
            eval_machines: Some(PathBuf::from("/share/eval-machines.nix")),
            show_trace: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_eval_machines_defaults_next_to_deployment() {
        let settings = NixSettings::default();
        assert_eq!(
            settings.eval_machines_for(Path::new("/srv/fleet/network.nix")),
            PathBuf::from("/srv/fleet/eval-machines.nix")
        );
    }

    #[test]
    fn test_build_args() {
        let builder = NixBuilder::new(settings(), "/srv/fleet/network.nix");
        let host = Host {
            nix_config: BTreeMap::from([("cores".to_string(), "4".to_string())]),
            ..Host::new("web1")
        };
        let invocation = builder.invocation(
            &[host, Host::new("web2")],
            Path::new("/tmp/drover-x"),
            PathBuf::from("/tmp/drover-x/result"),
        );

        assert_eq!(invocation.names, vec!["web1", "web2"]);
        assert_eq!(
            invocation.to_args(),
            vec![
                "/share/eval-machines.nix",
                "--arg",
                "networkExpr",
                "/srv/fleet/network.nix",
                "--argstr",
                "argsFile",
                "/tmp/drover-x/drover-args.json",
                "--out-link",
                "/tmp/drover-x/result",
                "--attr",
                "machines",
                "--option",
                "cores",
                "4",
                "--show-trace",
            ]
        );

        let json = serde_json::to_value(&invocation).unwrap();
        assert_eq!(json["attr"], "machines");
        assert_eq!(json["resultLinkPath"], "/tmp/drover-x/result");
    }

    #[test]
    fn test_eval_args() {
        let evaluator = NixEvaluator::new(settings(), "/srv/fleet/network.nix");
        let args = evaluator.invocation("info.deployment").to_args();
        assert_eq!(args[0], "--eval");
        assert!(args.ends_with(&[
            "info.deployment".to_string(),
            "--show-trace".to_string(),
            "--json".to_string(),
            "--strict".to_string(),
        ]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scratch_result_link_outlives_build() {
        use std::os::unix::fs::PermissionsExt;

        let workdir = tempfile::tempdir().unwrap();
        let closure = workdir.path().join("closure");
        std::fs::create_dir(&closure).unwrap();

        let script = workdir.path().join("fake-nix-build");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = --out-link ]; then ln -s {} \"$2\"; fi\n  shift\ndone\n",
                closure.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let settings = NixSettings {
            build_cmd: script.display().to_string(),
            keep_gc_root: false,
            ..settings()
        };
        let builder = NixBuilder::new(settings, workdir.path().join("network.nix"));
        let root = builder.build(&[Host::new("web1")]).await.unwrap();
        assert_eq!(root, closure);

        let scratch = builder.scratch.lock().unwrap();
        assert_eq!(scratch.len(), 1);
        let link = scratch[0].path().join("result");
        assert!(std::fs::symlink_metadata(&link).is_ok(), "result link gone after build");
        assert_eq!(std::fs::read_link(&link).unwrap(), closure);
    }

    #[tokio::test]
    async fn test_build_failure_is_reported() {
        let settings = NixSettings {
            build_cmd: "false".to_string(),
            keep_gc_root: false,
            ..settings()
        };
        let builder = NixBuilder::new(settings, "/srv/fleet/network.nix");
        let err = builder.build(&[Host::new("web1")]).await.unwrap_err();
        assert!(matches!(err, DeployError::Build(_)));
    }
}
