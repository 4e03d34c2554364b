//! drover Types - Core types for rolling fleet deployments
//!
//! drover deploys a declared set of machine configurations to a fleet of
//! remote hosts while bounding how many hosts of any label group may be
//! unavailable at the same time.
//!
//! ## Key Concepts
//!
//! - **Host**: a deployment target with connection identity, ordering tags,
//!   constraint labels and health checks
//! - **Deployment**: the ordered host list plus ordering and constraint metadata
//! - **Constraint**: "at most N unavailable" for hosts matching a label selector
//! - **HostStage**: how far a host's pipeline got
//! - **Events**: the run's observability stream

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod action;
pub mod checks;
pub mod constraint;
pub mod deployment;
pub mod error;
pub mod events;
pub mod host;
pub mod stage;

// Re-export main types
pub use action::{ActivationAction, RolloutGoal};
pub use checks::{CommandCheckSpec, HealthChecks, HttpCheckSpec};
pub use constraint::{Constraint, LabelSelector, WILDCARD};
pub use deployment::{Deployment, DeploymentMetadata, HostOrdering};
pub use error::{ConfigurationError, Result};
pub use events::{RolloutEvent, RolloutEventEnvelope};
pub use host::Host;
pub use stage::HostStage;
