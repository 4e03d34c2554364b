//! Run results

use crate::error::{DeployError, HostFailure};
use crate::reboot::RebootOutcome;
use chrono::{DateTime, Utc};
use drover_types::{HostStage, RolloutGoal};
use serde::Serialize;

/// What happened to one host
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostReport {
    pub host: String,
    /// Last stage the host reached
    pub stage: HostStage,
    /// Constraint slot keys the host held while unavailable
    pub slots: Vec<String>,
    pub rebooted: bool,
    pub reboot_verified: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<HostFailure>,
}

impl HostReport {
    pub(crate) fn new(host: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            host: host.into(),
            stage: HostStage::Pending,
            slots: Vec::new(),
            rebooted: false,
            reboot_verified: false,
            started_at,
            finished_at: started_at,
            error: None,
            failure: None,
        }
    }

    pub(crate) fn record_reboot(&mut self, outcome: RebootOutcome) {
        self.rebooted = true;
        self.reboot_verified = matches!(outcome, RebootOutcome::Confirmed { .. });
    }

    pub(crate) fn fail(&mut self, source: DeployError) {
        let failure = HostFailure::new(self.host.clone(), self.stage, source);
        self.error = Some(failure.source.to_string());
        self.failure = Some(failure);
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn cancelled(&self) -> bool {
        self.failure.as_ref().is_some_and(|f| f.is_cancelled())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// What happened to the whole run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub goal: RolloutGoal,
    pub strict: bool,
    /// One entry per planned host, in plan order
    pub hosts: Vec<HostReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded_count(&self) -> usize {
        self.hosts.iter().filter(|h| h.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.hosts.len() - self.succeeded_count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &HostFailure> {
        self.hosts.iter().filter_map(|h| h.failure.as_ref())
    }

    pub fn host(&self, name: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|h| h.host == name)
    }

    /// Strict runs fail on any host failure; otherwise failures are warnings
    pub fn is_success(&self) -> bool {
        !self.strict || self.failed_count() == 0
    }

    pub fn into_result(self) -> Result<Self, DeployError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DeployError::RunFailed {
                failed: self.failed_count(),
                total: self.hosts.len(),
            })
        }
    }
}
