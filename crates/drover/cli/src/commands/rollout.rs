//! `drover build`, `drover push` and `drover deploy`

use super::{RolloutArgs, TargetArgs};
use crate::config::DroverConfig;
use crate::error::CliResult;
use crate::output::{self, join_or_dash, print_info, print_success, print_warning, OutputFormat};
use colored::*;
use drover_deployment::collaborators::nix::NixBuilder;
use drover_deployment::collaborators::ssh::{SshContext, SshTransport};
use drover_deployment::{plan, Collaborators, RemoteCommandRunner, RolloutExecutor, RunReport};
use drover_health::{DeclaredChecks, PhaseFilter};
use drover_types::{RolloutEvent, RolloutEventEnvelope, RolloutGoal};
use std::sync::Arc;
use tabled::Tabled;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Tabled)]
pub struct ReportRow {
    #[tabled(rename = "HOST")]
    pub host: String,
    #[tabled(rename = "STAGE")]
    pub stage: String,
    #[tabled(rename = "SLOTS")]
    pub slots: String,
    #[tabled(rename = "REBOOT")]
    pub reboot: String,
    #[tabled(rename = "TIME")]
    pub time: String,
    #[tabled(rename = "RESULT")]
    pub result: String,
}

pub fn rows(report: &RunReport) -> Vec<ReportRow> {
    report
        .hosts
        .iter()
        .map(|host| ReportRow {
            host: host.host.clone(),
            stage: host.stage.to_string(),
            slots: join_or_dash(&host.slots),
            reboot: match (host.rebooted, host.reboot_verified) {
                (false, _) => "-".to_string(),
                (true, true) => "verified".to_string(),
                (true, false) => "unverified".to_string(),
            },
            time: format!("{}s", host.duration().num_seconds()),
            result: match &host.error {
                None => "ok".green().to_string(),
                Some(_) if host.cancelled() => "cancelled".yellow().to_string(),
                Some(e) => e.red().to_string(),
            },
        })
        .collect()
}

fn collaborators(target: &TargetArgs, config: &DroverConfig) -> Collaborators {
    let ssh = Arc::new(SshContext::new(config.ssh.clone()));
    let checks = PhaseFilter::new(
        DeclaredChecks::new(Arc::new(RemoteCommandRunner::new(ssh.clone()))),
        config.rollout.pre_deploy_checks,
        config.rollout.health_checks,
    );

    Collaborators::new(
        Arc::new(NixBuilder::new(config.nix.clone(), target.deployment.clone())),
        Arc::new(SshTransport::new(config.ssh.clone())),
        ssh.clone(),
        ssh,
    )
    .with_checks(Arc::new(checks))
}

/// One progress line per event, or `None` for events not worth showing
fn describe(event: &RolloutEvent) -> Option<String> {
    match event {
        RolloutEvent::RunStarted { hosts } => Some(format!("Rolling out to {} host(s)", hosts.len())),
        RolloutEvent::BuildStarted { hosts } => Some(format!("Building {}", hosts.join(", "))),
        RolloutEvent::StageReached { host, stage } => Some(format!("{}: {}", host, stage)),
        RolloutEvent::WaitingForSlots { host, keys } if !keys.is_empty() => {
            Some(format!("{}: waiting for {}", host, keys.join(", ")))
        }
        RolloutEvent::HostFinished {
            host,
            error: Some(error),
            ..
        } => Some(format!("{}: {}", host, error)),
        _ => None,
    }
}

async fn show_progress(mut events: broadcast::Receiver<RolloutEventEnvelope>) {
    loop {
        match events.recv().await {
            Ok(envelope) => {
                if let Some(line) = describe(&envelope.event) {
                    print_info(&line);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                print_warning(&format!("{} progress events dropped", skipped));
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub async fn execute(
    target: TargetArgs,
    rollout: RolloutArgs,
    mut config: DroverConfig,
    goal: RolloutGoal,
    reboot: bool,
    format: OutputFormat,
    cancel: CancellationToken,
) -> CliResult<()> {
    rollout.apply(&mut config)?;

    let deployment = target.load_deployment(&config).await?;
    let plan = plan(&deployment, &target.filter(), goal)?;

    let executor = RolloutExecutor::new(
        collaborators(&target, &config),
        config.rollout.executor_config(reboot),
    );
    let settings = executor.config();
    print_info(&format!(
        "{} {} host(s), parallelism {}{}",
        goal,
        plan.hosts.len(),
        settings.parallelism.limit(plan.hosts.len()),
        if settings.fail_fast { ", stopping at the first failure" } else { "" }
    ));
    let progress = tokio::spawn(show_progress(executor.subscribe()));

    let result = executor.execute(&plan, cancel).await;
    drop(executor);
    let _ = progress.await;
    let report = result?;

    output::print_output(rows(&report), &report, format)?;

    for failure in report.failures() {
        if !report.strict {
            print_warning(&format!("{} failed at {}: {}", failure.host, failure.stage, failure.source));
        }
    }

    let report = report.into_result()?;
    print_success(&format!("{} on {} host(s)", goal, report.succeeded_count()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_types::HostStage;

    #[test]
    fn test_describe_skips_window_bookkeeping() {
        assert!(describe(&RolloutEvent::WindowClosed {
            host: "web1".to_string()
        })
        .is_none());
        assert!(describe(&RolloutEvent::WaitingForSlots {
            host: "web1".to_string(),
            keys: Vec::new(),
        })
        .is_none());
        assert_eq!(
            describe(&RolloutEvent::StageReached {
                host: "web1".to_string(),
                stage: HostStage::Pushed,
            })
            .as_deref(),
            Some("web1: pushed")
        );
    }

    #[test]
    fn test_describe_reports_host_errors() {
        let line = describe(&RolloutEvent::HostFinished {
            host: "db1".to_string(),
            stage: HostStage::PreChecked,
            error: Some("boom".to_string()),
        });
        assert_eq!(line.as_deref(), Some("db1: boom"));
        assert!(describe(&RolloutEvent::HostFinished {
            host: "db1".to_string(),
            stage: HostStage::Done,
            error: None,
        })
        .is_none());
    }
}
