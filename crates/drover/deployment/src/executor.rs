//! Rollout Executor - Fans the host pipelines out over a plan
//!
//! Pipelines are started in plan order, each on its own task, with at most
//! `parallelism` of them in flight. A permit is taken before a pipeline is
//! spawned, so a sequential run visits hosts exactly in plan order.

use crate::artifacts::{ArtifactCache, BuildBatch};
use crate::collaborators::Collaborators;
use crate::context::{PipelineOptions, RolloutContext};
use crate::error::Result;
use crate::pipeline::HostPipeline;
use crate::planner::Plan;
use crate::reboot::RebootSettings;
use crate::report::{HostReport, RunReport};
use chrono::Utc;
use drover_registry::{ConstraintRegistry, StoreIdSequence};
use drover_types::{RolloutEvent, RolloutEventEnvelope};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// How many host pipelines may run at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Bounded(usize),
    Unlimited,
}

impl Parallelism {
    /// Hosts allowed to run at once for a plan of `hosts` hosts
    pub fn limit(&self, hosts: usize) -> usize {
        match self {
            Parallelism::Sequential => 1,
            Parallelism::Bounded(n) => (*n).max(1),
            Parallelism::Unlimited => hosts.max(1),
        }
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Parallelism::Unlimited
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub parallelism: Parallelism,
    /// Cancel in-flight siblings on the first host failure
    pub fail_fast: bool,
    /// Any host failure fails the run
    pub strict: bool,
    /// Reboot each host after activation
    pub reboot: Option<RebootSettings>,
    pub event_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::default(),
            fail_fast: false,
            strict: true,
            reboot: None,
            event_capacity: 4096,
        }
    }
}

pub struct RolloutExecutor {
    collaborators: Collaborators,
    config: ExecutorConfig,
    events: broadcast::Sender<RolloutEventEnvelope>,
}

impl RolloutExecutor {
    pub fn new(collaborators: Collaborators, config: ExecutorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            collaborators,
            config,
            events,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<RolloutEventEnvelope> {
        self.events.subscribe()
    }

    fn emit(&self, event: RolloutEvent) {
        let _ = self.events.send(RolloutEventEnvelope::new(event));
    }

    /// Run every host of the plan and report on each.
    ///
    /// Only configuration problems are returned as `Err`; host failures are
    /// in the report. Use [`RunReport::into_result`] to apply strictness.
    #[instrument(skip(self, plan, cancel), fields(goal = %plan.goal, hosts = plan.hosts.len()))]
    pub async fn execute(&self, plan: &Plan, cancel: CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();

        let mut ids = StoreIdSequence::new("store");
        let constraints = ConstraintRegistry::new(&plan.constraints, &mut ids)?;
        let cache = ArtifactCache::new(&mut ids);
        let ctx = RolloutContext::new(
            self.collaborators.clone(),
            cache,
            BuildBatch::new(plan.hosts.clone()),
            constraints,
            PipelineOptions {
                goal: plan.goal,
                reboot: self.config.reboot,
            },
            self.events.clone(),
        );

        let names: Vec<String> = plan.hosts.iter().map(|h| h.name.clone()).collect();
        self.emit(RolloutEvent::RunStarted {
            hosts: names.clone(),
        });
        self.emit(RolloutEvent::BuildStarted {
            hosts: names.clone(),
        });

        let run_cancel = cancel.child_token();
        let limit = self.config.parallelism.limit(plan.hosts.len());
        let slots = Arc::new(Semaphore::new(limit));
        info!(parallelism = limit, "starting rollout");

        let mut reports: Vec<Option<HostReport>> = vec![None; plan.hosts.len()];
        let mut tasks = JoinSet::new();

        for (index, host) in plan.hosts.iter().cloned().enumerate() {
            let permit = match slots.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    if let Some(joined) = tasks.join_next().await {
                        self.collect(joined, &mut reports, &run_cancel);
                    }
                    match slots.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    }
                }
            };

            let pipeline = HostPipeline::new(host, ctx.clone());
            let cancel = run_cancel.clone();
            tasks.spawn(async move {
                let report = pipeline.run(cancel).await;
                drop(permit);
                (index, report)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            self.collect(joined, &mut reports, &run_cancel);
        }

        let now = Utc::now();
        let hosts: Vec<HostReport> = reports
            .into_iter()
            .zip(names)
            .map(|(report, name)| {
                report.unwrap_or_else(|| {
                    let mut lost = HostReport::new(name, now);
                    lost.fail(crate::error::DeployError::Cancelled);
                    lost
                })
            })
            .collect();

        let report = RunReport {
            goal: plan.goal,
            strict: self.config.strict,
            hosts,
            started_at,
            finished_at: Utc::now(),
        };

        self.emit(RolloutEvent::RunFinished {
            succeeded: report.succeeded_count(),
            failed: report.failed_count(),
        });

        if report.failed_count() == 0 {
            info!(succeeded = report.succeeded_count(), "rollout finished");
        } else if report.is_success() {
            for failure in report.failures() {
                warn!(host = %failure.host, stage = %failure.stage, error = %failure.source, "host failed (non-strict)");
            }
        } else {
            error!(
                succeeded = report.succeeded_count(),
                failed = report.failed_count(),
                "rollout failed"
            );
        }

        Ok(report)
    }

    fn collect(
        &self,
        joined: std::result::Result<(usize, HostReport), tokio::task::JoinError>,
        reports: &mut [Option<HostReport>],
        run_cancel: &CancellationToken,
    ) {
        match joined {
            Ok((index, report)) => {
                if self.config.fail_fast && !report.succeeded() && !report.cancelled() {
                    warn!(host = %report.host, "host failed, cancelling the rest of the run");
                    run_cancel.cancel();
                }
                reports[index] = Some(report);
            }
            Err(e) => {
                error!(error = %e, "host pipeline task panicked");
                if self.config.fail_fast {
                    run_cancel.cancel();
                }
            }
        }
    }
}
