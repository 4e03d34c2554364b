//! Builds the check set for each host and phase.

use std::sync::Arc;

use drover_types::{HealthChecks, Host};

use crate::checks::{CheckSet, CommandCheck, CommandRunner, HttpCheck};
use crate::error::HealthResult;

/// When a check set is evaluated in a host's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckPhase {
    /// Before the host takes any constraint slots
    PreDeploy,
    /// After the host is back online, inside its window
    PostDeploy,
}

impl CheckPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckPhase::PreDeploy => "pre-deploy",
            CheckPhase::PostDeploy => "post-deploy",
        }
    }
}

impl std::fmt::Display for CheckPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of check sets.
pub trait CheckFactory: Send + Sync {
    fn checks_for(&self, host: &Host, phase: CheckPhase) -> HealthResult<CheckSet>;
}

/// Checks declared on each host in the deployment.
pub struct DeclaredChecks {
    runner: Arc<dyn CommandRunner>,
}

impl DeclaredChecks {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn build(&self, declared: &HealthChecks) -> HealthResult<CheckSet> {
        let mut set = CheckSet::new();
        for spec in &declared.cmd {
            set.add(Box::new(CommandCheck::new(spec.clone(), self.runner.clone())?));
        }
        for spec in &declared.http {
            set.add(Box::new(HttpCheck::new(spec.clone())?));
        }
        Ok(set)
    }
}

impl CheckFactory for DeclaredChecks {
    fn checks_for(&self, host: &Host, phase: CheckPhase) -> HealthResult<CheckSet> {
        match phase {
            CheckPhase::PreDeploy => self.build(&host.pre_deploy_checks),
            CheckPhase::PostDeploy => self.build(&host.health_checks),
        }
    }
}

/// Never checks anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChecks;

impl CheckFactory for NoChecks {
    fn checks_for(&self, _host: &Host, _phase: CheckPhase) -> HealthResult<CheckSet> {
        Ok(CheckSet::new())
    }
}

/// Wraps another factory and drops the phases that were switched off.
pub struct PhaseFilter<F> {
    inner: F,
    pre_deploy: bool,
    post_deploy: bool,
}

impl<F: CheckFactory> PhaseFilter<F> {
    pub fn new(inner: F, pre_deploy: bool, post_deploy: bool) -> Self {
        Self {
            inner,
            pre_deploy,
            post_deploy,
        }
    }
}

impl<F: CheckFactory> CheckFactory for PhaseFilter<F> {
    fn checks_for(&self, host: &Host, phase: CheckPhase) -> HealthResult<CheckSet> {
        let enabled = match phase {
            CheckPhase::PreDeploy => self.pre_deploy,
            CheckPhase::PostDeploy => self.post_deploy,
        };
        if enabled {
            self.inner.checks_for(host, phase)
        } else {
            Ok(CheckSet::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use drover_types::{CommandCheckSpec, HttpCheckSpec};
    use std::collections::BTreeMap;

    struct AlwaysZero;

    #[async_trait]
    impl CommandRunner for AlwaysZero {
        async fn run_command(&self, _host: &Host, _argv: &[String]) -> Result<Option<i32>, String> {
            Ok(Some(0))
        }
    }

    fn host() -> Host {
        let cmd = CommandCheckSpec {
            description: "nginx up".to_string(),
            cmd: vec!["true".to_string()],
            period: 1,
            timeout: 2,
        };
        let http = HttpCheckSpec {
            description: "frontpage".to_string(),
            scheme: "http".to_string(),
            host: None,
            port: 80,
            path: "/".to_string(),
            headers: BTreeMap::new(),
            period: 1,
            timeout: 2,
            insecure_ssl: false,
        };
        Host::new("web1")
            .with_pre_deploy_checks(HealthChecks {
                cmd: vec![cmd.clone()],
                http: vec![],
            })
            .with_health_checks(HealthChecks {
                cmd: vec![cmd],
                http: vec![http],
            })
    }

    #[test]
    fn test_declared_checks_per_phase() {
        let factory = DeclaredChecks::new(Arc::new(AlwaysZero));
        let host = host();

        assert_eq!(factory.checks_for(&host, CheckPhase::PreDeploy).unwrap().len(), 1);
        assert_eq!(factory.checks_for(&host, CheckPhase::PostDeploy).unwrap().len(), 2);
    }

    #[test]
    fn test_phase_filter_skips_disabled_phase() {
        let factory = PhaseFilter::new(DeclaredChecks::new(Arc::new(AlwaysZero)), false, true);
        let host = host();

        assert!(factory.checks_for(&host, CheckPhase::PreDeploy).unwrap().is_empty());
        assert_eq!(factory.checks_for(&host, CheckPhase::PostDeploy).unwrap().len(), 2);
        assert!(NoChecks.checks_for(&host, CheckPhase::PostDeploy).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declared_command_checks_evaluate() {
        let factory = DeclaredChecks::new(Arc::new(AlwaysZero));
        let set = factory.checks_for(&host(), CheckPhase::PreDeploy).unwrap();
        assert_eq!(set.evaluate(&host()).await.unwrap(), 1);
    }
}
