//! Host probing module.
//!
//! Provides the building blocks used by discovery and reassociation:
//! - IPv4 subnet enumeration
//! - Bounded fan-out of probes over many addresses
//! - TCP banner, reverse DNS, ssh client and ssh-keyscan probes
//! - Classification of probe outcomes into reachability classes

mod banner;
mod classify;
mod health;
mod hostkey;
mod pool;
mod resolve;
mod ssh;
mod subnet;
mod sweep;

pub use banner::{extract_hostname, read_banner, ssh_banner};
pub use classify::{classify, classify_health};
pub use health::{HealthProbe, HealthReport, IpChange, check_all, check_health, check_ip_change};
pub use hostkey::{
    fingerprint_from_keyscan, host_key_fingerprint, keyscan_digest, keyscan_digest_hex,
    short_digest,
};
pub use pool::run_bounded;
pub use resolve::{pick_one_ip, resolve_host, reverse_lookup};
pub use ssh::{ConnectivityProbe, SshClient, ssh_probe_args};
pub use subnet::enumerate_hosts;
pub use sweep::{ScanHit, UNKNOWN_HOSTNAME, sweep_subnet};

use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use std::process::{Output, Stdio};
use std::str::FromStr;
use std::time::Duration;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Default ssh port for configured hosts
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Create a Command for an external probe tool.
///
/// The child never inherits stdin, is killed when its handle is dropped and
/// hides the console window on Windows.
pub(crate) fn tool_command(program: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// How an external tool invocation ended
#[derive(Debug)]
pub(crate) enum ToolRun {
    Finished(Output),
    TimedOut,
    SpawnFailed(std::io::Error),
}

/// Run a tool to completion, killing it once `timeout` elapses.
pub(crate) async fn run_tool(mut cmd: tokio::process::Command, timeout: Duration) -> ToolRun {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => ToolRun::Finished(output),
        Ok(Err(e)) => ToolRun::SpawnFailed(e),
        Err(_) => ToolRun::TimedOut,
    }
}

/// Stdout followed by stderr, lossily decoded.
pub(crate) fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// One host to probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub address: String,
    pub port: u16,
    /// Required for authenticated probes
    pub user: Option<String>,
}

impl Target {
    pub fn new(
        address: impl Into<String>,
        port: u32,
        user: Option<String>,
    ) -> Result<Self, ProbeError> {
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(ProbeError::InvalidPort(port))?;
        Ok(Self {
            address: address.into(),
            port,
            user: user.filter(|u| !u.is_empty()),
        })
    }

    /// `user@address` form used on the ssh command line
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.address),
            None => self.address.clone(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Parses `[user@]host[:port]`, defaulting to port 22.
///
/// IPv6 addresses take a port only in brackets (`[fd00::5]:2222`); a bare
/// IPv6 address is used whole.
impl FromStr for Target {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: &str| ProbeError::InvalidTarget {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (user, rest) = match s.rsplit_once('@') {
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, s),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("missing ']' after IPv6 address"))?;
            match after {
                "" => (host, None),
                _ => match after.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(invalid("expected ':port' after ']'")),
                },
            }
        } else {
            match rest.split_once(':') {
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                _ => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = match port {
            Some(port) => port
                .parse::<u32>()
                .map_err(|_| invalid(&format!("port '{}' is not a number", port)))?,
            None => u32::from(DEFAULT_SSH_PORT),
        };

        Target::new(host, port, user)
    }
}

/// Raw result of one check, consumed only by the classifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub succeeded: bool,
    pub latency_ms: u64,
    pub raw_text: String,
    pub os_error: Option<std::io::ErrorKind>,
}

impl ProbeOutcome {
    pub fn success(latency_ms: u64, raw_text: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            latency_ms,
            raw_text: raw_text.into(),
            os_error: None,
        }
    }

    pub fn failure(
        latency_ms: u64,
        raw_text: impl Into<String>,
        os_error: Option<std::io::ErrorKind>,
    ) -> Self {
        Self {
            succeeded: false,
            latency_ms,
            raw_text: raw_text.into(),
            os_error,
        }
    }
}

/// Flat reachability classification; there is no ordering between classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReachabilityStatus {
    Ok,
    /// Reachable and the user is admitted, but the credential was refused
    Auth,
    /// Reachable but server policy rejects the user
    Deny,
    Down,
    /// Name resolution failed before any connection attempt
    Resolve,
    Err,
}

impl ReachabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReachabilityStatus::Ok => "OK",
            ReachabilityStatus::Auth => "AUTH",
            ReachabilityStatus::Deny => "DENY",
            ReachabilityStatus::Down => "DOWN",
            ReachabilityStatus::Resolve => "RESOLVE",
            ReachabilityStatus::Err => "ERR",
        }
    }

    /// OK or AUTH: the host accepts this user given the right secret
    pub fn is_connectable(&self) -> bool {
        matches!(self, ReachabilityStatus::Ok | ReachabilityStatus::Auth)
    }

    /// Turn anything but OK into the matching engine error.
    pub fn ensure_reachable(&self, target: &Target) -> Result<(), ProbeError> {
        let name = target.to_string();
        match self {
            ReachabilityStatus::Ok => Ok(()),
            ReachabilityStatus::Auth => Err(ProbeError::AuthFailure { target: name }),
            ReachabilityStatus::Deny => Err(ProbeError::DenyFailure { target: name }),
            ReachabilityStatus::Down => Err(ProbeError::ConnectFailure {
                address: name,
                source: std::io::Error::other("host is down"),
            }),
            ReachabilityStatus::Resolve => Err(ProbeError::ResolutionFailure {
                host: target.address.clone(),
                reason: "no address".to_string(),
            }),
            ReachabilityStatus::Err => Err(ProbeError::tool("ssh", "unclassified failure")),
        }
    }
}

impl std::fmt::Display for ReachabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ReachabilityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, <Self as FromStr>::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ok" => Ok(ReachabilityStatus::Ok),
            "auth" => Ok(ReachabilityStatus::Auth),
            "deny" => Ok(ReachabilityStatus::Deny),
            "down" => Ok(ReachabilityStatus::Down),
            "resolve" => Ok(ReachabilityStatus::Resolve),
            "err" => Ok(ReachabilityStatus::Err),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}
