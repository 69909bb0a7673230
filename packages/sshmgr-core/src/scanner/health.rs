//! TCP health checks for configured hosts

use super::{ProbeOutcome, ReachabilityStatus, Target, classify_health, resolve_host, run_bounded};
use crate::config::PingSettings;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Raw result of a health check, input to [`classify_health`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthProbe {
    /// The host name did not resolve
    Unresolved,
    /// Resolution worked; this is the TCP connect attempt
    Connected(ProbeOutcome),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub host: String,
    pub ip: Option<String>,
    pub port: u16,
    pub latency_ms: u64,
    pub status: ReachabilityStatus,
}

/// Resolve `target` and open (then close) a TCP connection to its port.
///
/// Resolution and connect are each bounded by `timeout`.
pub async fn check_health(target: &Target, timeout: Duration) -> HealthReport {
    let ip = match resolve_host(&target.address, timeout).await {
        Ok(ip) => ip,
        Err(e) => {
            tracing::debug!("Health check: {}", e);
            return HealthReport {
                host: target.address.clone(),
                ip: None,
                port: target.port,
                latency_ms: 0,
                status: classify_health(&HealthProbe::Unresolved),
            };
        }
    };

    let start = Instant::now();
    let connect = tokio::time::timeout(timeout, TcpStream::connect((ip, target.port))).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let outcome = match connect {
        Ok(Ok(_stream)) => ProbeOutcome::success(latency_ms, ""),
        Ok(Err(e)) => ProbeOutcome::failure(latency_ms, e.to_string(), Some(e.kind())),
        Err(_) => ProbeOutcome::failure(
            latency_ms,
            "connect timed out",
            Some(std::io::ErrorKind::TimedOut),
        ),
    };

    HealthReport {
        host: target.address.clone(),
        ip: Some(ip.to_string()),
        port: target.port,
        latency_ms,
        status: classify_health(&HealthProbe::Connected(outcome)),
    }
}

/// Health-check many targets, results in input order.
pub async fn check_all(targets: Vec<Target>, settings: &PingSettings) -> Vec<HealthReport> {
    let timeout = settings.timeout();
    tracing::info!(
        "Checking {} host(s), concurrency {}",
        targets.len(),
        settings.concurrency
    );
    run_bounded(targets, settings.concurrency, move |target| async move {
        check_health(&target, timeout).await
    })
    .await
}

/// How a freshly resolved address compares with the last known one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IpChange {
    FirstSeen { ip: String },
    Unchanged { ip: String },
    Changed { from: String, to: String },
}

pub fn check_ip_change(previous: Option<&str>, current: &str) -> IpChange {
    match previous.map(str::trim).filter(|p| !p.is_empty()) {
        None => IpChange::FirstSeen {
            ip: current.to_string(),
        },
        Some(prev) if prev == current => IpChange::Unchanged {
            ip: current.to_string(),
        },
        Some(prev) => IpChange::Changed {
            from: prev.to_string(),
            to: current.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port_is_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = Target::new("127.0.0.1", port as u32, None).unwrap();

        let report = check_health(&target, Duration::from_secs(2)).await;
        assert_eq!(report.status, ReachabilityStatus::Ok);
        assert_eq!(report.ip.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_closed_port_is_down() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let target = Target::new("127.0.0.1", port as u32, None).unwrap();

        let report = check_health(&target, Duration::from_secs(2)).await;
        assert_eq!(report.status, ReachabilityStatus::Down);
        assert!(report.ip.is_some());
    }

    #[tokio::test]
    async fn test_unresolvable_name_is_resolve() {
        let target = Target::new("no-such-host.invalid", 22, None).unwrap();
        let report = check_health(&target, Duration::from_secs(2)).await;
        assert_eq!(report.status, ReachabilityStatus::Resolve);
        assert_eq!(report.ip, None);
    }

    #[tokio::test]
    async fn test_check_all_keeps_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let targets = vec![
            Target::new("no-such-host.invalid", 22, None).unwrap(),
            Target::new("127.0.0.1", open as u32, None).unwrap(),
        ];

        let reports = check_all(targets, &PingSettings::default()).await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].status, ReachabilityStatus::Resolve);
        assert_eq!(reports[1].status, ReachabilityStatus::Ok);
    }

    #[test]
    fn test_ip_change() {
        assert_eq!(
            check_ip_change(None, "10.0.0.5"),
            IpChange::FirstSeen { ip: "10.0.0.5".to_string() }
        );
        assert_eq!(
            check_ip_change(Some(""), "10.0.0.5"),
            IpChange::FirstSeen { ip: "10.0.0.5".to_string() }
        );
        assert_eq!(
            check_ip_change(Some("10.0.0.5"), "10.0.0.5"),
            IpChange::Unchanged { ip: "10.0.0.5".to_string() }
        );
        assert_eq!(
            check_ip_change(Some("10.0.0.5"), "10.0.0.9"),
            IpChange::Changed {
                from: "10.0.0.5".to_string(),
                to: "10.0.0.9".to_string()
            }
        );
    }
}
