//! Host selection and ordering

use drover_types::{ConfigurationError, Constraint, Deployment, Host, RolloutGoal};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Which hosts a run touches. Empty fields select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFilter {
    /// Exact host names; every one must exist in the deployment
    pub names: Vec<String>,
    /// Hosts carrying at least one of these tags
    pub tags: Vec<String>,
}

impl HostFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn on<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            tags: Vec::new(),
        }
    }

    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// The validated, ordered work for one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub goal: RolloutGoal,
    /// Selected hosts in execution order
    pub hosts: Vec<Host>,
    pub constraints: Vec<Constraint>,
}

impl Plan {
    pub fn host_names(&self) -> Vec<&str> {
        self.hosts.iter().map(|h| h.name.as_str()).collect()
    }

    /// Slot keys a host will take, in acquisition order
    pub fn slot_keys(&self, host: &Host) -> Vec<String> {
        self.constraints
            .iter()
            .filter_map(|c| c.slot_key(&host.labels))
            .collect()
    }
}

/// Validate the deployment, then select and order hosts.
///
/// Nothing is built or contacted here, so every configuration error surfaces
/// before any host pipeline starts.
#[instrument(skip(deployment, filter), fields(goal = %goal))]
pub fn plan(
    deployment: &Deployment,
    filter: &HostFilter,
    goal: RolloutGoal,
) -> Result<Plan, ConfigurationError> {
    deployment.validate()?;

    for name in &filter.names {
        if deployment.host(name).is_none() {
            return Err(ConfigurationError::UnknownHost(name.clone()));
        }
    }

    let names: HashSet<&str> = filter.names.iter().map(String::as_str).collect();
    let selected: Vec<Host> = deployment
        .hosts
        .iter()
        .filter(|h| names.is_empty() || names.contains(h.name.as_str()))
        .filter(|h| filter.tags.is_empty() || filter.tags.iter().any(|t| h.has_tag(t)))
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(ConfigurationError::NoHostsSelected);
    }

    let hosts = order_hosts(selected, &deployment.meta.ordering.tags);
    debug!(hosts = ?hosts.iter().map(|h| &h.name).collect::<Vec<_>>(), "hosts planned");

    Ok(Plan {
        goal,
        hosts,
        constraints: deployment.meta.constraints.clone(),
    })
}

/// Hosts with the first ordering tag go first, then the second, and so on.
/// Hosts with none of the tags go last. Ties keep declaration order.
pub fn order_hosts(mut hosts: Vec<Host>, ordering: &[String]) -> Vec<Host> {
    if ordering.is_empty() {
        return hosts;
    }
    hosts.sort_by_key(|host| {
        ordering
            .iter()
            .position(|tag| host.has_tag(tag))
            .unwrap_or(usize::MAX)
    });
    hosts
}
