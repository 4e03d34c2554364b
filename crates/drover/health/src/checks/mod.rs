//! Health check evaluators.
//!
//! A check answers one question about one host: is it healthy right now?
//! [`CheckSet`] turns that into "did it become healthy in time?" by retrying
//! each check on its own period until its timeout runs out.

mod command;
mod custom;
mod http;

pub use command::{CommandCheck, CommandRunner};
pub use custom::FnCheck;
pub use http::HttpCheck;

use std::time::Duration;

use async_trait::async_trait;
use drover_types::Host;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{HealthError, HealthResult};

/// How often a check is attempted and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub period: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(period: Duration, timeout: Duration) -> Self {
        Self { period, timeout }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Trait for health checks.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Retry behaviour for this check.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Run one attempt. `Ok(false)` means reachable but unhealthy.
    async fn check(&self, host: &Host) -> HealthResult<bool>;
}

/// Retry `check` until it passes or its timeout runs out.
pub async fn wait_until_healthy(check: &dyn HealthCheck, host: &Host) -> HealthResult<()> {
    let policy = check.retry_policy();
    let deadline = Instant::now() + policy.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_secs(1));

        let last = match tokio::time::timeout(budget, check.check(host)).await {
            Ok(Ok(true)) => {
                debug!(host = %host.name, check = check.name(), attempts, "check passed");
                return Ok(());
            }
            Ok(Ok(false)) => "reported unhealthy".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "attempt timed out".to_string(),
        };

        if Instant::now() + policy.period >= deadline {
            return Err(HealthError::Timeout {
                check: check.name().to_string(),
                timeout_secs: policy.timeout.as_secs(),
                attempts,
                last,
            });
        }

        debug!(host = %host.name, check = check.name(), attempts, reason = %last, "check not passing yet");
        tokio::time::sleep(policy.period).await;
    }
}

/// Collection of checks evaluated together for a host.
#[derive(Default)]
pub struct CheckSet {
    checks: Vec<Box<dyn HealthCheck>>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn add(&mut self, check: Box<dyn HealthCheck>) {
        self.checks.push(check);
    }

    pub fn with(mut self, check: Box<dyn HealthCheck>) -> Self {
        self.add(check);
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Evaluate every check concurrently; all of them must pass.
    ///
    /// Returns the number of checks that passed.
    #[instrument(skip(self, host), fields(host = %host.name, checks = self.checks.len()))]
    pub async fn evaluate(&self, host: &Host) -> HealthResult<usize> {
        if self.checks.is_empty() {
            return Ok(0);
        }

        let results = join_all(
            self.checks
                .iter()
                .map(|check| wait_until_healthy(check.as_ref(), host)),
        )
        .await;

        let mut first_error = None;
        let mut passed = 0;
        for result in results {
            match result {
                Ok(()) => passed += 1,
                Err(e) => {
                    warn!(host = %host.name, error = %e, "health check failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(host = %host.name, passed, "all health checks passed");
                Ok(passed)
            }
        }
    }
}

impl std::fmt::Debug for CheckSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.checks.iter().map(|c| c.name()))
            .finish()
    }
}
