//! Reboot synchronisation
//!
//! A host has no reliable "I'm back" signal, so completion is detected from
//! the kernel boot id: read it before the reboot, then poll until a
//! non-empty id different from the old one shows up. Poll failures are
//! expected while the host is down and are ignored.

use crate::collaborators::RemoteExec;
use crate::error::{DeployError, Result};
use drover_types::Host;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";

/// Exit status ssh reports when the connection dropped
const SSH_DISCONNECTED: i32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootSettings {
    pub poll_interval: Duration,
    /// `None` waits until cancelled
    pub max_wait: Option<Duration>,
}

impl Default for RebootSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_wait: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootOutcome {
    /// A new boot id was observed
    Confirmed { polls: u32 },
    /// The boot id could not be read before rebooting, so completion was
    /// not verified
    Unsupported,
}

pub async fn read_boot_id(remote: &dyn RemoteExec, host: &Host) -> Result<String> {
    let argv = vec!["cat".to_string(), BOOT_ID_PATH.to_string()];
    let output = remote.run(host, &argv).await?;
    if !output.success() {
        return Err(DeployError::Connectivity {
            host: host.name.clone(),
            reason: format!("reading boot id exited with {:?}", output.status),
        });
    }
    Ok(output.stdout.trim().to_string())
}

/// Ask the host to reboot; a dropped connection counts as success
pub async fn request_reboot(remote: &dyn RemoteExec, host: &Host) -> Result<()> {
    let argv = vec!["sudo".to_string(), "reboot".to_string()];
    let output = remote.run(host, &argv).await?;
    match output.status {
        Some(0) => Ok(()),
        Some(SSH_DISCONNECTED) => {
            debug!(host = %host.name, "remote host disconnected");
            Ok(())
        }
        status => Err(DeployError::Connectivity {
            host: host.name.clone(),
            reason: format!("reboot request exited with {:?}", status),
        }),
    }
}

/// Resolves once `deadline` has passed; never, without one
async fn deadline_passed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn timed_out(host: &Host, started: Instant) -> DeployError {
    DeployError::RebootTimeout {
        host: host.name.clone(),
        waited_secs: started.elapsed().as_secs(),
    }
}

/// Poll until the host reports a boot id other than `old`
pub async fn wait_for_new_boot(
    remote: &dyn RemoteExec,
    host: &Host,
    old: &str,
    settings: &RebootSettings,
    cancel: &CancellationToken,
) -> Result<RebootOutcome> {
    let started = Instant::now();
    poll_boot_id(remote, host, old, settings, cancel, started).await
}

/// Polls race the deadline too, so a hung connection cannot outlast it
async fn poll_boot_id(
    remote: &dyn RemoteExec,
    host: &Host,
    old: &str,
    settings: &RebootSettings,
    cancel: &CancellationToken,
    started: Instant,
) -> Result<RebootOutcome> {
    let deadline = settings.max_wait.map(|max_wait| started + max_wait);
    let mut polls = 0u32;

    loop {
        polls += 1;
        let current = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            _ = deadline_passed(deadline) => return Err(timed_out(host, started)),
            id = read_boot_id(remote, host) => id.unwrap_or_default(),
        };

        if !current.is_empty() && current != old {
            info!(host = %host.name, polls, "host is back online");
            return Ok(RebootOutcome::Confirmed { polls });
        }
        debug!(host = %host.name, polls, "waiting for host to come online");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            _ = deadline_passed(deadline) => return Err(timed_out(host, started)),
            _ = tokio::time::sleep(settings.poll_interval) => {}
        }
    }
}

/// Reboot the host and wait until it has actually rebooted.
///
/// `max_wait` bounds the whole sequence, including the boot id read and the
/// reboot request.
#[instrument(skip(remote, host, settings, cancel), fields(host = %host.name))]
pub async fn reboot_and_wait(
    remote: &dyn RemoteExec,
    host: &Host,
    settings: &RebootSettings,
    cancel: &CancellationToken,
) -> Result<RebootOutcome> {
    let started = Instant::now();
    let deadline = settings.max_wait.map(|max_wait| started + max_wait);

    let old = tokio::select! {
        biased;
        _ = deadline_passed(deadline) => return Err(timed_out(host, started)),
        id = read_boot_id(remote, host) => match id {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(
                    error = %e,
                    "cannot read boot id; reboot completion will not be verified and health checks may run before the host went down"
                );
                None
            }
        },
    };

    info!("asking host to reboot");
    tokio::select! {
        biased;
        _ = deadline_passed(deadline) => return Err(timed_out(host, started)),
        requested = request_reboot(remote, host) => requested?,
    }

    match old {
        Some(old) => poll_boot_id(remote, host, &old, settings, cancel, started).await,
        None => Ok(RebootOutcome::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::RemoteOutput;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves boot ids from a script; the last one repeats
    struct BootIds {
        ids: Mutex<VecDeque<Result<String>>>,
        reboot_status: i32,
        reads: Mutex<u32>,
    }

    impl BootIds {
        fn new(ids: Vec<Result<String>>, reboot_status: i32) -> Self {
            Self {
                ids: Mutex::new(ids.into()),
                reboot_status,
                reads: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteExec for BootIds {
        async fn run(&self, host: &Host, argv: &[String]) -> Result<RemoteOutput> {
            if argv[0] == "sudo" {
                return Ok(RemoteOutput::new("", self.reboot_status));
            }
            *self.reads.lock().unwrap() += 1;
            let mut ids = self.ids.lock().unwrap();
            let next = if ids.len() > 1 {
                ids.pop_front().unwrap()
            } else {
                ids.front().cloned().unwrap()
            };
            match next {
                Ok(id) => Ok(RemoteOutput::new(format!("{}\n", id), 0)),
                Err(_) => Err(DeployError::Connectivity {
                    host: host.name.clone(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    fn ok(id: &str) -> Result<String> {
        Ok(id.to_string())
    }

    fn down() -> Result<String> {
        Err(DeployError::Cancelled)
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_a_new_boot_id() {
        let remote = BootIds::new(vec![ok("a"), ok(""), ok(""), ok("a"), ok("b")], 0);

        let outcome = reboot_and_wait(
            &remote,
            &Host::new("web1"),
            &RebootSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, RebootOutcome::Confirmed { polls: 4 });
        assert_eq!(*remote.reads.lock().unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_ignored_and_disconnect_is_success() {
        let remote = BootIds::new(vec![ok("a"), down(), down(), ok("c")], 255);

        let outcome = reboot_and_wait(
            &remote,
            &Host::new("web1"),
            &RebootSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, RebootOutcome::Confirmed { polls: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_boot_id_skips_the_wait() {
        let remote = BootIds::new(vec![down(), ok("b")], 0);

        let outcome = reboot_and_wait(
            &remote,
            &Host::new("web1"),
            &RebootSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, RebootOutcome::Unsupported);
    }

    #[tokio::test]
    async fn test_failed_reboot_request() {
        let remote = BootIds::new(vec![ok("a")], 1);
        let err = reboot_and_wait(
            &remote,
            &Host::new("web1"),
            &RebootSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeployError::Connectivity { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_surfaces_timeout() {
        let remote = BootIds::new(vec![ok("a")], 0);
        let settings = RebootSettings {
            poll_interval: Duration::from_secs(2),
            max_wait: Some(Duration::from_secs(10)),
        };

        let err = reboot_and_wait(&remote, &Host::new("web1"), &settings, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::RebootTimeout { waited_secs, .. } if waited_secs >= 10));
    }

    /// Answers the first boot id read, then never answers again
    struct GoesSilent {
        answered: Mutex<bool>,
    }

    #[async_trait]
    impl RemoteExec for GoesSilent {
        async fn run(&self, _host: &Host, argv: &[String]) -> Result<RemoteOutput> {
            if argv[0] == "sudo" {
                return Ok(RemoteOutput::new("", 255));
            }
            let first = {
                let mut answered = self.answered.lock().unwrap();
                !std::mem::replace(&mut *answered, true)
            };
            if first {
                return Ok(RemoteOutput::new("a\n", 0));
            }
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_bounds_a_hung_poll() {
        let remote = GoesSilent {
            answered: Mutex::new(false),
        };
        let settings = RebootSettings {
            poll_interval: Duration::from_secs(2),
            max_wait: Some(Duration::from_secs(10)),
        };

        let err = tokio::time::timeout(
            Duration::from_secs(3600),
            reboot_and_wait(&remote, &Host::new("web1"), &settings, &CancellationToken::new()),
        )
        .await
        .expect("hung poll outlived max_wait")
        .unwrap_err();
        assert!(matches!(err, DeployError::RebootTimeout { waited_secs: 10, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_bounds_a_hung_boot_id_read() {
        let remote = GoesSilent {
            answered: Mutex::new(true),
        };
        let settings = RebootSettings {
            poll_interval: Duration::from_secs(2),
            max_wait: Some(Duration::from_secs(10)),
        };

        let err = tokio::time::timeout(
            Duration::from_secs(3600),
            reboot_and_wait(&remote, &Host::new("web1"), &settings, &CancellationToken::new()),
        )
        .await
        .expect("hung read outlived max_wait")
        .unwrap_err();
        assert!(matches!(err, DeployError::RebootTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_the_wait() {
        let remote = BootIds::new(vec![ok("a")], 0);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let err = reboot_and_wait(&remote, &Host::new("web1"), &RebootSettings::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Cancelled));
    }
}
