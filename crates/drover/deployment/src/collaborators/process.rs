//! Child process plumbing shared by the process-backed collaborators.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

pub(crate) struct ProcessOutput {
    pub stdout: String,
    pub status: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Run `cmd` to completion, forwarding its stderr to the log line by line.
///
/// The child is killed if the returned future is dropped.
pub(crate) async fn run_logged(mut cmd: Command, host: &str) -> std::io::Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(host = %host, command = ?cmd.as_std(), "spawning");
    let mut child = cmd.spawn()?;

    let stderr = child.stderr.take();
    let tag = host.to_string();
    let stderr_task = tokio::spawn(async move {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(host = %tag, "{}", line);
            }
        }
    });

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout).await?;
    }

    let status = child.wait().await?;
    stderr_task.await.ok();

    Ok(ProcessOutput {
        stdout,
        status: status.code(),
    })
}
