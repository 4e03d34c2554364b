//! Closure-backed checks.

use std::future::Future;

use async_trait::async_trait;
use drover_types::Host;

use super::{HealthCheck, RetryPolicy};
use crate::error::HealthResult;

/// A check backed by a closure.
///
/// Useful for wiring application-specific probes and for tests.
pub struct FnCheck<F> {
    name: String,
    policy: RetryPolicy,
    check_fn: F,
}

impl<F, Fut> FnCheck<F>
where
    F: Fn(Host) -> Fut + Send + Sync,
    Fut: Future<Output = HealthResult<bool>> + Send,
{
    pub fn new(name: impl Into<String>, check_fn: F) -> Self {
        Self {
            name: name.into(),
            policy: RetryPolicy::default(),
            check_fn,
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl<F, Fut> HealthCheck for FnCheck<F>
where
    F: Fn(Host) -> Fut + Send + Sync,
    Fut: Future<Output = HealthResult<bool>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn check(&self, host: &Host) -> HealthResult<bool> {
        (self.check_fn)(host.clone()).await
    }
}
