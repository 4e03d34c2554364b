//! Command checks run on the target host.

use std::sync::Arc;

use async_trait::async_trait;
use drover_types::{CommandCheckSpec, Host};

use super::{HealthCheck, RetryPolicy};
use crate::error::{HealthError, HealthResult};

/// Runs an argv on a host and reports its exit status.
///
/// `Ok(None)` means the command ran but no status was available (for example
/// it was killed by a signal). `Err` means it could not be started at all.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run_command(&self, host: &Host, argv: &[String]) -> Result<Option<i32>, String>;
}

/// A command that must exit 0.
pub struct CommandCheck {
    name: String,
    spec: CommandCheckSpec,
    runner: Arc<dyn CommandRunner>,
}

impl CommandCheck {
    pub fn new(spec: CommandCheckSpec, runner: Arc<dyn CommandRunner>) -> HealthResult<Self> {
        let name = if spec.description.is_empty() {
            format!("cmd: {}", spec.cmd.join(" "))
        } else {
            spec.description.clone()
        };
        if spec.cmd.is_empty() {
            return Err(HealthError::Invalid {
                check: name,
                reason: "empty command".to_string(),
            });
        }
        Ok(Self { name, spec, runner })
    }
}

#[async_trait]
impl HealthCheck for CommandCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.spec.period(), self.spec.timeout())
    }

    async fn check(&self, host: &Host) -> HealthResult<bool> {
        let status = self
            .runner
            .run_command(host, &self.spec.cmd)
            .await
            .map_err(|e| HealthError::attempt(&self.name, e))?;
        Ok(status == Some(0))
    }
}
