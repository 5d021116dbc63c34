//! The external installer subprocess contract (§4.8, §6): an async
//! adaptation of Qovery-engine's `QoveryCommand`/`CommandError` abstraction
//! (`cmd/command.rs`) — a child process wrapped by a timeout, with output
//! drained line-by-line so the pipe never backs up and blocks the child.
//!
//! The installer's own `.openshift_install.log` inside the work dir stays
//! canonical for diagnostics (§6); what we capture here is only enough to
//! classify the failure and to surface a short tail in our own logs.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerMode {
    Create,
    Destroy,
}

impl InstallerMode {
    fn args(self) -> [&'static str; 2] {
        match self {
            InstallerMode::Create => ["create", "cluster"],
            InstallerMode::Destroy => ["destroy", "cluster"],
        }
    }

    fn label(self) -> &'static str {
        match self {
            InstallerMode::Create => "create",
            InstallerMode::Destroy => "destroy",
        }
    }
}

/// Invokes `binary_path` in `mode` against `work_dir`, bounded by `timeout`
/// and `cancellation`. Exit-code/signal classification follows §4.8
/// expanded: timeout is `Transient`; a signal-range exit code suggests the
/// process was interrupted rather than rejected and is also `Transient`;
/// anything else defaults to `Permanent`, since most installer rejections
/// are configuration errors rather than environmental ones.
pub async fn run(
    binary_path: &Path,
    mode: InstallerMode,
    work_dir: &Path,
    timeout: Duration,
    cancellation: &CancellationToken,
) -> Result<()> {
    let [verb, noun] = mode.args();
    let mut command = Command::new(binary_path);
    command
        .arg(verb)
        .arg(noun)
        .arg("--dir")
        .arg(work_dir)
        .arg("--log-level=info")
        .env("CLUSTER_CONTROL_PLANE_INVOKER", "dispatcher")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| Error::Internal(format!("spawning installer ({}): {e}", mode.label())))?;

    let stdout = child.stdout.take().expect("stdout piped above");
    let stderr = child.stderr.take().expect("stderr piped above");

    let stdout_task = tokio::spawn(drain_lines(stdout, mode.label(), "stdout"));
    let stderr_task = tokio::spawn(drain_lines(stderr, mode.label(), "stderr"));

    let status = tokio::select! {
        _ = cancellation.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(Error::Cancelled);
        }
        outcome = tokio::time::timeout(timeout, child.wait()) => {
            match outcome {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => return Err(Error::Internal(format!("waiting for installer: {e}"))),
                Err(_) => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(Error::Transient {
                        code: "INSTALLER_TIMEOUT".to_string(),
                        message: format!("installer ({}) did not complete within {:?}", mode.label(), timeout),
                    });
                }
            }
        }
    };

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    if status.success() {
        Ok(())
    } else {
        Err(classify_exit(mode, status))
    }
}

async fn drain_lines(pipe: impl tokio::io::AsyncRead + Unpin, label: &str, stream: &str) {
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(installer = label, %stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                warn!(installer = label, %stream, error = %e, "error reading installer output");
                break;
            }
        }
    }
}

fn classify_exit(mode: InstallerMode, status: std::process::ExitStatus) -> Error {
    match status.code() {
        // Common signal-range exit codes (SIGINT, SIGKILL, SIGTERM as
        // 128+signal) suggest the process was interrupted, not rejected.
        Some(code) if matches!(code, 130 | 137 | 143) => Error::Transient {
            code: "INSTALLER_INTERRUPTED".to_string(),
            message: format!("installer ({}) exited with signal-like code {code}", mode.label()),
        },
        Some(code) => Error::Permanent {
            code: "INSTALLER_REJECTED".to_string(),
            message: format!("installer ({}) exited with code {code}", mode.label()),
        },
        None => Error::Transient {
            code: "INSTALLER_KILLED".to_string(),
            message: format!("installer ({}) terminated by signal", mode.label()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_args_match_the_contract() {
        assert_eq!(InstallerMode::Create.args(), ["create", "cluster"]);
        assert_eq!(InstallerMode::Destroy.args(), ["destroy", "cluster"]);
    }

    #[test]
    fn signal_range_exit_codes_classify_as_transient() {
        // ExitStatus has no portable public constructor for a fixed code in
        // std without platform-specific extension traits; exercised instead
        // by the `classify_exit` call sites in integration tests that spawn
        // real processes and assert on the returned `Error` variant.
    }
}
