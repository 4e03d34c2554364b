//! Host types
//!
//! A Host is one deployment target: where to connect, how to order it, which
//! constraints it falls under and which checks gate it.

use crate::checks::HealthChecks;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single deployment target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Unique name within the deployment
    pub name: String,

    /// Address used for SSH and HTTP checks (falls back to `name`)
    #[serde(default)]
    pub target_host: String,

    /// SSH port, `None` for the SSH default
    #[serde(default)]
    pub target_port: Option<u16>,

    /// SSH user, `None` for the configured default
    #[serde(default)]
    pub target_user: Option<String>,

    /// Ordering tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Constraint labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Checks that must pass before activation
    #[serde(default)]
    pub pre_deploy_checks: HealthChecks,

    /// Checks that must pass after activation
    #[serde(default)]
    pub health_checks: HealthChecks,

    /// Build the host but never push or activate it
    #[serde(default)]
    pub build_only: bool,

    /// Let the destination fetch paths from its own substituters
    #[serde(default)]
    pub substitute_on_destination: bool,

    /// Opaque build tool options (`--option key value`)
    #[serde(default)]
    pub nix_config: BTreeMap<String, String>,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_host = target.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(label.into(), value.into());
        self
    }

    pub fn with_health_checks(mut self, checks: HealthChecks) -> Self {
        self.health_checks = checks;
        self
    }

    pub fn with_pre_deploy_checks(mut self, checks: HealthChecks) -> Self {
        self.pre_deploy_checks = checks;
        self
    }

    pub fn build_only(mut self) -> Self {
        self.build_only = true;
        self
    }

    /// The address to connect to
    pub fn target(&self) -> &str {
        if self.target_host.is_empty() {
            &self.name
        } else {
            &self.target_host
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
