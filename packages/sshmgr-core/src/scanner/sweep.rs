//! Raw subnet sweep for ssh servers.
//!
//! Every usable address gets a port 22 banner grab. Hosts that answer are
//! named from the banner, then reverse DNS, then (with a user) the remote
//! `hostname` command, and tagged with a short host-key digest.

use super::{
    DEFAULT_SSH_PORT, SshClient, Target, enumerate_hosts, extract_hostname, keyscan_digest,
    reverse_lookup, run_bounded, short_digest, ssh_banner,
};
use crate::config::EngineConfig;
use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

/// Placeholder shown for hosts with no discoverable name
pub const UNKNOWN_HOSTNAME: &str = "(unknown)";

/// An address that answered with an ssh banner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHit {
    pub ip: String,
    pub hostname: Option<String>,
    /// First characters of the whole-output keyscan digest
    pub fingerprint: Option<String>,
    /// First banner line, e.g. `SSH-2.0-OpenSSH_9.6`
    pub banner: String,
}

impl ScanHit {
    pub fn display_name(&self) -> &str {
        self.hostname.as_deref().unwrap_or(UNKNOWN_HOSTNAME)
    }
}

/// Sweep `subnet` and return the hosts running ssh, ordered by address.
///
/// Only an unparseable subnet is an error; unreachable or silent hosts are
/// simply absent from the result.
pub async fn sweep_subnet(
    subnet: &str,
    user: Option<String>,
    config: &EngineConfig,
) -> Result<Vec<ScanHit>, ProbeError> {
    let hosts = enumerate_hosts(subnet)?;
    tracing::info!(
        "Sweeping {} ({} addresses, concurrency {})",
        subnet,
        hosts.len(),
        config.scan.concurrency
    );

    let started = Instant::now();
    let config = Arc::new(config.clone());
    let user = user.filter(|u| !u.is_empty());
    let results = run_bounded(hosts, config.scan.concurrency, move |ip| {
        let config = config.clone();
        let user = user.clone();
        async move { identify_host(ip, user, &config).await }
    })
    .await;

    let hits: Vec<ScanHit> = results.into_iter().flatten().collect();
    tracing::info!(
        "Sweep complete: {} ssh host(s) in {:.1}s",
        hits.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(hits)
}

async fn identify_host(
    ip: Ipv4Addr,
    user: Option<String>,
    config: &EngineConfig,
) -> Option<ScanHit> {
    let ip = ip.to_string();
    let banner = ssh_banner(&ip, config.scan.timeout()).await;
    if !banner.succeeded || banner.raw_text.trim().is_empty() {
        return None;
    }

    let lookup_timeout = config.scan.lookup_timeout();
    let mut hostname = extract_hostname(&banner.raw_text);
    if hostname.is_none() {
        hostname = reverse_lookup(&ip, lookup_timeout).await;
    }
    let login = Target::new(ip.clone(), u32::from(DEFAULT_SSH_PORT), user)
        .ok()
        .filter(|t| t.user.is_some() && hostname.is_none());
    if let Some(target) = login {
        hostname = SshClient::new(config.tools.ssh.clone())
            .remote_hostname(&target, lookup_timeout)
            .await;
    }

    let fingerprint = match keyscan_digest(&config.tools.ssh_keyscan, &ip, lookup_timeout).await {
        Ok(digest) => Some(short_digest(&digest).to_string()),
        Err(e) => {
            tracing::debug!("No host key for {}: {}", ip, e);
            None
        }
    };

    tracing::debug!("ssh on {} ({:?})", ip, hostname);
    Some(ScanHit {
        ip,
        hostname,
        fingerprint,
        banner: banner.raw_text.lines().next().unwrap_or_default().trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_subnet_is_an_error() {
        let result = sweep_subnet("10.0.0.300/24", None, &EngineConfig::default()).await;
        assert!(matches!(result, Err(ProbeError::InvalidSubnet { .. })));
    }

    #[tokio::test]
    async fn test_empty_range_sweeps_nothing() {
        let hits = sweep_subnet("10.0.0.0/31", None, &EngineConfig::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_display_name_placeholder() {
        let mut hit = ScanHit {
            ip: "10.0.0.5".to_string(),
            hostname: None,
            fingerprint: None,
            banner: "SSH-2.0-OpenSSH_9.6".to_string(),
        };
        assert_eq!(hit.display_name(), "(unknown)");
        hit.hostname = Some("mini.local".to_string());
        assert_eq!(hit.display_name(), "mini.local");
    }
}
