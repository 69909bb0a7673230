//! Probes that drive the system ssh client.
//!
//! Every invocation runs in batch mode with no password prompts, a short
//! connect timeout, host-key checking off and `/dev/null` as known_hosts.
//! Probing must never block on a prompt or write to the user's trust store.

use super::{ProbeOutcome, Target, ToolRun, combined_output, run_tool, tool_command};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Remote command used to test a login
const PROBE_COMMAND: &str = "exit";

/// Time ssh gets past its own ConnectTimeout to report before it is killed
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Authenticated connectivity check against one target.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome;
}

/// Build the ssh argument list for a non-interactive probe.
pub fn ssh_probe_args(target: &Target, connect_timeout_secs: u64, command: &str) -> Vec<String> {
    vec![
        "-p".to_string(),
        target.port.to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "NumberOfPasswordPrompts=0".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout_secs.max(1)),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        target.destination(),
        command.to_string(),
    ]
}

/// Connect timeout handed to ssh, in whole seconds, rounded up.
fn connect_timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 { secs + 1 } else { secs }
}

/// The system ssh client
#[derive(Debug, Clone)]
pub struct SshClient {
    binary: String,
}

impl Default for SshClient {
    fn default() -> Self {
        Self::new("ssh")
    }
}

impl SshClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run `command` on the target, returning how ssh ended and the elapsed ms.
    async fn run(&self, target: &Target, command: &str, timeout: Duration) -> (ToolRun, u64) {
        let mut cmd = tool_command(&self.binary);
        cmd.args(ssh_probe_args(target, connect_timeout_secs(timeout), command));

        let start = Instant::now();
        let run = run_tool(cmd, timeout + KILL_GRACE).await;
        (run, start.elapsed().as_millis() as u64)
    }

    /// Ask the remote side for its hostname.
    ///
    /// Any failure, authentication included, yields `None` rather than
    /// partial output.
    pub async fn remote_hostname(&self, target: &Target, timeout: Duration) -> Option<String> {
        target.user.as_ref()?;

        match self.run(target, "hostname", timeout).await {
            (ToolRun::Finished(output), _) if output.status.success() => {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if name.is_empty() { None } else { Some(name) }
            }
            (ToolRun::Finished(output), _) => {
                tracing::trace!(
                    "Remote hostname on {} failed: {}",
                    target,
                    combined_output(&output).trim()
                );
                None
            }
            (ToolRun::TimedOut, _) => {
                tracing::trace!("Remote hostname on {} timed out", target);
                None
            }
            (ToolRun::SpawnFailed(e), _) => {
                tracing::warn!("Failed to run {}: {}", self.binary, e);
                None
            }
        }
    }
}

#[async_trait]
impl ConnectivityProbe for SshClient {
    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome {
        if target.user.is_none() {
            return ProbeOutcome::failure(0, "no user configured for authenticated probe", None);
        }

        match self.run(target, PROBE_COMMAND, timeout).await {
            (ToolRun::Finished(output), ms) => {
                let text = combined_output(&output);
                if output.status.success() {
                    ProbeOutcome::success(ms, text)
                } else {
                    tracing::debug!(
                        "Probe {} exited with {:?}: {}",
                        target,
                        output.status.code(),
                        text.trim()
                    );
                    ProbeOutcome::failure(ms, text, None)
                }
            }
            (ToolRun::TimedOut, ms) => {
                tracing::debug!("Probe {} timed out after {}ms", target, ms);
                ProbeOutcome::failure(ms, "", Some(std::io::ErrorKind::TimedOut))
            }
            (ToolRun::SpawnFailed(e), ms) => {
                tracing::warn!("Failed to run {}: {}", self.binary, e);
                ProbeOutcome::failure(ms, e.to_string(), Some(e.kind()))
            }
        }
    }
}
