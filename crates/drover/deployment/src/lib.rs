//! drover Deployment - Rolling fleet deployments
//!
//! Takes a [`Deployment`](drover_types::Deployment), selects and orders hosts,
//! then drives every selected host through its pipeline while keeping each
//! label group within its unavailability budget.
//!
//! ## Architectural Boundaries
//!
//! - `drover-registry` owns: keyed stores and constraint slots
//! - `drover-health` owns: check evaluation
//! - `drover-deployment` owns: planning, per-host pipelines, batch builds,
//!   reboot synchronisation and run reports
//!
//! The build tool, transfer channel and remote shell are only reached through
//! the traits in [`collaborators`].
//!
//! ## Usage
//!
//! ```no_run
//! use drover_deployment::collaborators::nix::{NixBuilder, NixEvaluator, NixSettings};
//! use drover_deployment::collaborators::ssh::{SshContext, SshSettings, SshTransport};
//! use drover_deployment::{plan, Collaborators, ExecutorConfig, HostFilter, RolloutExecutor};
//! use drover_types::{ActivationAction, RolloutGoal};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> drover_deployment::Result<()> {
//! let nix = NixSettings::default();
//! let deployment = NixEvaluator::new(nix.clone(), "network.nix").deployment().await?;
//! let plan = plan(
//!     &deployment,
//!     &HostFilter::all(),
//!     RolloutGoal::Deploy(ActivationAction::Switch),
//! )?;
//!
//! let ssh = Arc::new(SshContext::new(SshSettings::default()));
//! let collaborators = Collaborators::new(
//!     Arc::new(NixBuilder::new(nix, "network.nix")),
//!     Arc::new(SshTransport::new(SshSettings::default())),
//!     ssh.clone(),
//!     ssh,
//! );
//!
//! let executor = RolloutExecutor::new(collaborators, ExecutorConfig::default());
//! let report = executor.execute(&plan, CancellationToken::new()).await?;
//! report.into_result()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod artifacts;
pub mod collaborators;
pub mod context;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod planner;
pub mod reboot;
pub mod report;

// Re-exports
pub use artifacts::{closure_key, ArtifactCache, BuildBatch};
pub use collaborators::{
    Activator, Builder, Collaborators, RemoteCommandRunner, RemoteExec, RemoteOutput, Transfer,
};
pub use context::{PipelineOptions, RolloutContext};
pub use error::{DeployError, HostFailure, Result};
pub use executor::{ExecutorConfig, Parallelism, RolloutExecutor};
pub use pipeline::HostPipeline;
pub use planner::{order_hosts, plan, HostFilter, Plan};
pub use reboot::{reboot_and_wait, RebootOutcome, RebootSettings};
pub use report::{HostReport, RunReport};
