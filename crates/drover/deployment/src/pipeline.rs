//! Per-host pipeline
//!
//! `Pending -> Built -> Pushed -> PreChecked -> Activated ->
//! [Rebooting -> Online] -> PostChecked -> Done`
//!
//! The host counts as unavailable from activation until its post-deploy
//! checks finish. That window is bracketed by its constraint slots: they are
//! taken right before activation and given back exactly once on every exit
//! path. Pre-deploy checks run before the window, so an already unhealthy
//! host never consumes budget.

use crate::context::RolloutContext;
use crate::error::{DeployError, Result};
use crate::reboot::{reboot_and_wait, RebootSettings};
use crate::report::HostReport;
use chrono::Utc;
use drover_health::CheckPhase;
use drover_types::{ActivationAction, Host, HostStage, RolloutEvent};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Run `fut` unless the token fires first
async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeployError::Cancelled),
        result = fut => result,
    }
}

pub struct HostPipeline {
    host: Host,
    ctx: Arc<RolloutContext>,
    report: HostReport,
}

impl HostPipeline {
    pub fn new(host: Host, ctx: Arc<RolloutContext>) -> Self {
        let report = HostReport::new(host.name.clone(), Utc::now());
        Self { host, ctx, report }
    }

    pub fn stage(&self) -> HostStage {
        self.report.stage
    }

    /// Drive the host as far as the run's goal asks
    #[instrument(skip(self, cancel), fields(host = %self.host.name))]
    pub async fn run(mut self, cancel: CancellationToken) -> HostReport {
        let result = self.drive(&cancel).await;
        self.report.finished_at = Utc::now();

        match result {
            Ok(()) => info!(stage = %self.stage(), "host finished"),
            Err(e) => {
                warn!(stage = %self.stage(), error = %e, "host failed");
                self.report.fail(e);
            }
        }

        self.ctx.emit(RolloutEvent::HostFinished {
            host: self.host.name.clone(),
            stage: self.report.stage,
            error: self.report.error.clone(),
        });
        self.report
    }

    fn advance(&mut self, stage: HostStage) {
        self.report.stage = stage;
        self.ctx.emit(RolloutEvent::StageReached {
            host: self.host.name.clone(),
            stage,
        });
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<()> {
        let ctx = self.ctx.clone();
        let collaborators = &ctx.collaborators;

        let artifact = cancellable(
            cancel,
            ctx.batch
                .artifact_for(&self.host, collaborators.builder.as_ref(), &ctx.cache),
        )
        .await?;
        self.advance(HostStage::Built);

        if !ctx.options.goal.pushes() || self.host.build_only {
            return Ok(());
        }

        cancellable(
            cancel,
            collaborators
                .transfer
                .push(&self.host, std::slice::from_ref(&artifact)),
        )
        .await?;
        self.advance(HostStage::Pushed);

        let Some(action) = ctx.options.goal.action() else {
            return Ok(());
        };

        cancellable(cancel, self.checks(CheckPhase::PreDeploy)).await?;
        self.advance(HostStage::PreChecked);

        self.ctx.emit(RolloutEvent::WaitingForSlots {
            host: self.host.name.clone(),
            keys: ctx.constraints.matching_keys(&self.host),
        });
        let mut guard = cancellable(cancel, async {
            ctx.constraints
                .acquire_all(&self.host)
                .await
                .map_err(DeployError::from)
        })
        .await?;
        self.report.slots = guard.keys();
        self.ctx.emit(RolloutEvent::WindowOpened {
            host: self.host.name.clone(),
            keys: guard.keys(),
        });

        let result = self.window(&artifact, action, cancel).await;

        self.ctx.emit(RolloutEvent::WindowClosed {
            host: self.host.name.clone(),
        });
        guard.release();

        result?;
        self.advance(HostStage::Done);
        Ok(())
    }

    /// Everything that happens while the host holds its slots
    async fn window(
        &mut self,
        artifact: &Path,
        action: ActivationAction,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ctx = self.ctx.clone();

        cancellable(
            cancel,
            ctx.collaborators
                .activator
                .activate(&self.host, artifact, action),
        )
        .await?;
        self.advance(HostStage::Activated);

        if let Some(settings) = ctx.options.reboot {
            self.reboot(&settings, cancel).await?;
        }

        cancellable(cancel, self.checks(CheckPhase::PostDeploy)).await?;
        self.advance(HostStage::PostChecked);
        Ok(())
    }

    async fn reboot(&mut self, settings: &RebootSettings, cancel: &CancellationToken) -> Result<()> {
        self.advance(HostStage::Rebooting);
        let remote = self.ctx.collaborators.remote.clone();
        let outcome = cancellable(
            cancel,
            reboot_and_wait(remote.as_ref(), &self.host, settings, cancel),
        )
        .await?;
        self.report.record_reboot(outcome);
        self.advance(HostStage::Online);
        Ok(())
    }

    async fn checks(&self, phase: CheckPhase) -> Result<()> {
        let health_error = |source| DeployError::HealthCheck {
            host: self.host.name.clone(),
            phase,
            source,
        };

        let checks = self
            .ctx
            .collaborators
            .checks
            .checks_for(&self.host, phase)
            .map_err(health_error)?;
        if checks.is_empty() {
            return Ok(());
        }

        info!(host = %self.host.name, phase = %phase, checks = checks.len(), "running checks");
        checks.evaluate(&self.host).await.map_err(health_error)?;
        Ok(())
    }
}
