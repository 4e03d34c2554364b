//! # drover Health - Pre-deploy and post-deploy health checks
//!
//! Health checks gate a host's pipeline twice: before its unavailability
//! window opens (a host that is already unhealthy must not consume budget)
//! and after activation (the window only closes once the host is healthy or
//! has failed).
//!
//! ## Key Components
//!
//! - [`HealthCheck`]: a single `check(host) -> ok` evaluator
//! - [`CheckSet`]: a group of checks, each retried every `period` until it
//!   passes or its `timeout` runs out
//! - [`CommandCheck`]: a command that must exit 0 on the target host
//! - [`HttpCheck`]: an HTTP endpoint that must answer 2xx
//! - [`CheckFactory`]: builds the check sets for a host
//!
//! ## Example
//!
//! ```rust,no_run
//! use drover_health::{CheckSet, FnCheck};
//! use drover_types::Host;
//! use std::time::Duration;
//!
//! # async fn example() -> drover_health::HealthResult<()> {
//! let mut checks = CheckSet::new();
//! checks.add(Box::new(FnCheck::new("always-up", |_host| async { Ok(true) })));
//!
//! let host = Host::new("web1");
//! checks.evaluate(&host).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod checks;
pub mod error;
pub mod factory;

// Re-export main types
pub use checks::{
    wait_until_healthy, CheckSet, CommandCheck, CommandRunner, FnCheck, HealthCheck, HttpCheck,
    RetryPolicy,
};
pub use error::{HealthError, HealthResult};
pub use factory::{CheckFactory, CheckPhase, DeclaredChecks, NoChecks, PhaseFilter};
