//! Service browsing through the `dns-sd` command line tool.
//!
//! `dns-sd -B` never exits on its own; it is left running for the browse
//! window and then killed. `dns-sd -L` is killed as soon as it prints the
//! SRV answer or the lookup timeout passes.

use super::{ServiceBrowser, ServiceInstance};
use crate::scanner::tool_command;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Bonjour service type for ssh, as passed to the tool
pub const SSH_SERVICE: &str = "_ssh._tcp";

/// Service type column of browse output
const SSH_SERVICE_FIELD: &str = "_ssh._tcp.";

fn reached_at() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"can be reached at\s+([^\s:]+):([0-9]+)").expect("static regex is valid")
    })
}

/// Parse one `dns-sd -B` output line.
///
/// Lines look like
/// `12:00:00.000  Add  3  4  local.  _ssh._tcp.  Steven's Mac mini`;
/// anything else (headers, `Rmv` events, other service types) is `None`.
pub fn parse_browse_line(line: &str) -> Option<ServiceInstance> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 7 || fields[1] != "Add" || fields[5] != SSH_SERVICE_FIELD {
        return None;
    }
    Some(ServiceInstance {
        instance: fields[6..].join(" "),
        domain: fields[4].to_string(),
    })
}

/// Pull `host:port` out of `dns-sd -L` output.
///
/// The trailing dot of the host is dropped; an empty host or port 0 is
/// rejected.
pub fn parse_lookup(output: &str) -> Option<(String, u16)> {
    let caps = reached_at().captures(output)?;
    let host = caps[1].trim_end_matches('.').to_string();
    let port: u16 = caps[2].parse().ok()?;
    if host.is_empty() || port == 0 {
        return None;
    }
    Some((host, port))
}

/// `dns-sd` backed [`ServiceBrowser`]
#[derive(Debug, Clone)]
pub struct DnsSd {
    binary: String,
}

impl Default for DnsSd {
    fn default() -> Self {
        Self::new("dns-sd")
    }
}

impl DnsSd {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ServiceBrowser for DnsSd {
    async fn browse(&self, domain: &str, window: Duration) -> Vec<ServiceInstance> {
        let mut cmd = tool_command(&self.binary);
        cmd.args(["-B", SSH_SERVICE, domain])
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to run {}: {}", self.binary, e);
                return Vec::new();
            }
        };
        let Some(stdout) = child.stdout.take() else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut lines = BufReader::new(stdout).lines();
        let collect = async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(item) = parse_browse_line(&line) {
                    if seen.insert(item.key()) {
                        tracing::debug!("Browse: {} in {}", item.instance, item.domain);
                        found.push(item);
                    }
                }
            }
        };
        // The browse only ends early if the tool itself exits
        let _ = tokio::time::timeout(window, collect).await;

        if let Err(e) = child.kill().await {
            tracing::trace!("{} already exited: {}", self.binary, e);
        }
        found
    }

    async fn lookup(&self, item: &ServiceInstance, timeout: Duration) -> Option<(String, u16)> {
        let mut cmd = tool_command(&self.binary);
        cmd.args(["-L", &item.instance, SSH_SERVICE, &item.domain]);

        let mut child = match cmd.stdout(Stdio::piped()).stderr(Stdio::null()).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to run {}: {}", self.binary, e);
                return None;
            }
        };
        let stdout = child.stdout.take()?;

        let mut lines = BufReader::new(stdout).lines();
        let answer = async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(found) = parse_lookup(&line) {
                    return Some(found);
                }
            }
            None
        };
        let result = tokio::time::timeout(timeout, answer).await.ok().flatten();
        let _ = child.kill().await;

        if result.is_none() {
            tracing::debug!("No SRV answer for {}", item.instance);
        }
        result
    }
}
