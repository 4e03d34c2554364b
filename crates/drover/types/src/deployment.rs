//! Deployment types
//!
//! A Deployment is parsed once from the evaluated configuration at the start
//! of a run and is immutable afterwards.

use crate::constraint::Constraint;
use crate::error::{ConfigurationError, Result};
use crate::host::Host;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The full set of hosts plus rollout metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Hosts in declaration order
    pub hosts: Vec<Host>,

    #[serde(default)]
    pub meta: DeploymentMetadata,
}

/// Rollout metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentMetadata {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub ordering: HostOrdering,

    /// Constraints in declaration order, which is also slot acquisition order
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

/// Tag dimension used to re-sort hosts before deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostOrdering {
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Deployment {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self {
            hosts,
            meta: DeploymentMetadata::default(),
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.meta.constraints.push(constraint);
        self
    }

    pub fn with_ordering(mut self, tags: Vec<String>) -> Self {
        self.meta.ordering.tags = tags;
        self
    }

    /// Parse the evaluator's JSON output
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::InvalidDeployment(e.to_string()))
    }

    /// Check host-name uniqueness and constraint capacities
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.hosts.len());
        for host in &self.hosts {
            if host.name.is_empty() {
                return Err(ConfigurationError::InvalidDeployment(
                    "host with empty name".into(),
                ));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(ConfigurationError::DuplicateHost(host.name.clone()));
            }
        }

        for constraint in &self.meta.constraints {
            constraint.validate()?;
        }

        Ok(())
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn host_names(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(|h| h.name.as_str())
    }
}
