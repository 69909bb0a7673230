//! Forward and reverse name resolution through the system resolver

#[cfg(any(unix, target_os = "windows"))]
use super::{ToolRun, run_tool, tool_command};
use crate::error::ProbeError;
use std::net::IpAddr;
use std::time::Duration;

/// Choose the most useful address from a resolver answer.
///
/// Preference: routable IPv4, any IPv4, routable IPv6, then whatever came
/// first.
pub fn pick_one_ip(addrs: &[IpAddr]) -> Option<IpAddr> {
    let routable_v4 = addrs.iter().find(|ip| match ip {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local(),
        IpAddr::V6(_) => false,
    });
    if let Some(ip) = routable_v4 {
        return Some(*ip);
    }

    if let Some(ip) = addrs.iter().find(|ip| ip.is_ipv4()) {
        return Some(*ip);
    }

    let routable_v6 = addrs.iter().find(|ip| match ip {
        IpAddr::V6(v6) => !v6.is_loopback() && (v6.segments()[0] & 0xffc0) != 0xfe80,
        IpAddr::V4(_) => false,
    });
    if let Some(ip) = routable_v6 {
        return Some(*ip);
    }

    addrs.first().copied()
}

/// Resolve `host` to a single address.
pub async fn resolve_host(host: &str, timeout: Duration) -> Result<IpAddr, ProbeError> {
    let failure = |reason: String| ProbeError::ResolutionFailure {
        host: host.to_string(),
        reason,
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let lookup = tokio::net::lookup_host((host, 0));
    let addrs: Vec<IpAddr> = match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(addrs)) => addrs.map(|a| a.ip()).collect(),
        Ok(Err(e)) => return Err(failure(e.to_string())),
        Err(_) => return Err(failure("lookup timed out".to_string())),
    };

    pick_one_ip(&addrs).ok_or_else(|| failure("no addresses".to_string()))
}

/// Best-effort reverse lookup of `ip`.
///
/// Returns the first name with any trailing dot removed, or `None` when the
/// resolver has nothing. `timeout` bounds the whole lookup, however many
/// methods are tried.
pub async fn reverse_lookup(ip: &str, timeout: Duration) -> Option<String> {
    let name = tokio::time::timeout(timeout, reverse_lookup_methods(ip, timeout))
        .await
        .ok()
        .flatten();
    if name.is_none() {
        tracing::trace!("No reverse name for {}", ip);
    }
    name
}

/// Run a resolver tool and parse its stdout on success.
#[cfg(any(unix, target_os = "windows"))]
async fn tool_answer(
    program: &str,
    args: &[&str],
    timeout: Duration,
    parse: fn(&str) -> Option<String>,
) -> Option<String> {
    let mut cmd = tool_command(program);
    cmd.args(args);
    match run_tool(cmd, timeout).await {
        ToolRun::Finished(output) if output.status.success() => {
            parse(&String::from_utf8_lossy(&output.stdout))
        }
        _ => None,
    }
}

#[cfg(unix)]
async fn reverse_lookup_methods(ip: &str, timeout: Duration) -> Option<String> {
    // Method 1: getent hosts (nsswitch, covers /etc/hosts and mDNS)
    if let Some(name) = tool_answer("getent", &["hosts", ip], timeout, parse_getent).await {
        return Some(name);
    }

    // Method 2: host command
    tool_answer("host", &[ip], timeout, parse_host_pointer).await
}

#[cfg(target_os = "windows")]
async fn reverse_lookup_methods(ip: &str, timeout: Duration) -> Option<String> {
    // Method 1: PowerShell PTR lookup
    let script = format!(
        "try {{ (Resolve-DnsName -Name '{}' -Type PTR -ErrorAction Stop).NameHost }} catch {{ }}",
        ip
    );
    let args = ["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", script.as_str()];
    if let Some(name) = tool_answer("powershell", &args, timeout, parse_ptr_name).await {
        if name != ip {
            return Some(name);
        }
    }

    // Method 2: NetBIOS name table, for hosts without DNS
    let mut cmd = tool_command("nbtstat");
    cmd.args(["-A", ip]);
    match run_tool(cmd, timeout).await {
        ToolRun::Finished(output) => parse_nbtstat(&String::from_utf8_lossy(&output.stdout)),
        _ => None,
    }
}

#[cfg(not(any(unix, target_os = "windows")))]
async fn reverse_lookup_methods(_ip: &str, _timeout: Duration) -> Option<String> {
    None
}

/// `10.0.0.5   mini.lan mini` -> `mini.lan`
#[cfg(unix)]
fn parse_getent(out: &str) -> Option<String> {
    out.lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(|name| name.trim_end_matches('.').to_string())
        .filter(|name| !name.is_empty())
}

/// `5.0.0.10.in-addr.arpa domain name pointer mini.lan.` -> `mini.lan`
#[cfg(unix)]
fn parse_host_pointer(out: &str) -> Option<String> {
    out.lines()
        .find_map(|line| line.split("pointer").nth(1))
        .map(|name| name.trim().trim_end_matches('.').to_string())
        .filter(|name| !name.is_empty())
}

/// First line of a `Resolve-DnsName` answer, trailing dot removed
#[cfg(target_os = "windows")]
fn parse_ptr_name(out: &str) -> Option<String> {
    out.lines()
        .next()
        .map(|name| name.trim().trim_end_matches('.').to_string())
        .filter(|name| !name.is_empty() && !name.contains("error"))
}

/// `MINI-PC   <00>  UNIQUE   Registered` -> `MINI-PC`
#[cfg(target_os = "windows")]
fn parse_nbtstat(out: &str) -> Option<String> {
    out.lines()
        .map(str::trim)
        .find(|line| line.contains("<00>") && line.contains("UNIQUE"))
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}
