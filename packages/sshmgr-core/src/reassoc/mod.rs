//! Reassociation: find a known host again after its address changed.
//!
//! Every address in the subnet is checked concurrently: a banner grab on
//! port 22 gates the authoritative check, which runs `hostname` over ssh and
//! compares it with the stored identity. The first address that matches is
//! returned straight away. Checks already running when the winner arrives
//! are left to finish on their own; no new ones are started.

mod table;

pub use table::{FingerprintEntry, FingerprintTable, default_table_path};

use crate::config::EngineConfig;
use crate::error::ProbeError;
use crate::scanner::{DEFAULT_SSH_PORT, SshClient, Target, enumerate_hosts, ssh_banner};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassociationResult {
    pub matched_ip: String,
}

/// Run `check` over `candidates`, at most `concurrency` at a time, and return
/// the first candidate whose check passes.
///
/// Later matches are dropped. `None` is only returned once every check has
/// finished. Which of several matches wins depends on completion order.
pub async fn race_first_match<T, F, Fut>(
    candidates: Vec<T>,
    concurrency: usize,
    check: F,
) -> Option<T>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    // One slot: the first match fills it, try_send drops the rest
    let (tx, mut rx) = mpsc::channel::<T>(1);
    let limit = Arc::new(Semaphore::new(concurrency.max(1)));
    let check = Arc::new(check);

    tokio::spawn(async move {
        for candidate in candidates {
            let Ok(permit) = limit.clone().acquire_owned().await else {
                break;
            };
            // The receiver is gone once a winner has been taken
            if tx.is_closed() {
                break;
            }
            let tx = tx.clone();
            let check = check.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if check(candidate.clone()).await {
                    let _ = tx.try_send(candidate);
                }
            });
        }
    });

    // Every task holds a sender, so this resolves to None only after the
    // driver and all checks are done
    rx.recv().await
}

/// Relocate the host whose `hostname` is `expected_hostname` within `subnet`.
///
/// An unparseable subnet or a missing user is an error; finding nothing is
/// `Ok(None)`.
pub async fn reassociate(
    user: &str,
    expected_hostname: &str,
    subnet: &str,
    config: &EngineConfig,
) -> Result<Option<ReassociationResult>, ProbeError> {
    let hosts = enumerate_hosts(subnet)?;
    if user.trim().is_empty() {
        return Err(ProbeError::Config(
            "reassociation needs a user for the remote hostname check".to_string(),
        ));
    }

    let settings = &config.reassociate;
    tracing::info!(
        "Looking for {} in {} ({} addresses, concurrency {})",
        expected_hostname,
        subnet,
        hosts.len(),
        settings.concurrency
    );

    let gate_timeout = settings.timeout();
    let check_timeout = config.probe.timeout();
    let ssh = Arc::new(SshClient::new(config.tools.ssh.clone()));
    let user = user.to_string();
    let expected = expected_hostname.to_string();

    let candidates: Vec<String> = hosts.into_iter().map(|ip| ip.to_string()).collect();
    let winner = race_first_match(candidates, settings.concurrency, move |ip| {
        let ssh = ssh.clone();
        let user = user.clone();
        let expected = expected.clone();
        async move {
            let banner = ssh_banner(&ip, gate_timeout).await;
            if !banner.succeeded {
                return false;
            }
            let Ok(target) = Target::new(ip.clone(), u32::from(DEFAULT_SSH_PORT), Some(user))
            else {
                return false;
            };
            match ssh.remote_hostname(&target, check_timeout).await {
                Some(name) => {
                    tracing::debug!("{} reports hostname {}", ip, name);
                    name == expected
                }
                None => false,
            }
        }
    })
    .await;

    match &winner {
        Some(ip) => tracing::info!("Reassociated {} -> {}", expected_hostname, ip),
        None => tracing::info!("No host in {} reports {}", subnet, expected_hostname),
    }
    Ok(winner.map(|matched_ip| ReassociationResult { matched_ip }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, sleep};

    #[tokio::test]
    async fn test_single_match_is_found() {
        let candidates: Vec<u32> = (0..50).collect();
        let winner = race_first_match(candidates, 8, |n| async move {
            sleep(Duration::from_millis(5)).await;
            n == 37
        })
        .await;
        assert_eq!(winner, Some(37));
    }

    #[tokio::test]
    async fn test_no_match_waits_for_every_check() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        let winner = race_first_match((0..20).collect::<Vec<u32>>(), 4, move |n| {
            let counter = counter.clone();
            async move {
                sleep(Duration::from_millis(u64::from(n % 5) * 5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                false
            }
        })
        .await;

        assert_eq!(winner, None);
        assert_eq!(finished.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_slowest_check_can_still_win() {
        let winner = race_first_match((0..10).collect::<Vec<u32>>(), 10, |n| async move {
            if n == 3 {
                sleep(Duration::from_millis(200)).await;
                true
            } else {
                sleep(Duration::from_millis(5)).await;
                false
            }
        })
        .await;
        assert_eq!(winner, Some(3));
    }

    #[tokio::test]
    async fn test_multiple_matches_yield_one_winner() {
        let winner = race_first_match((0..30).collect::<Vec<u32>>(), 30, |n| async move {
            sleep(Duration::from_millis(u64::from(n))).await;
            n % 10 == 0
        })
        .await;
        assert!(matches!(winner, Some(0) | Some(10) | Some(20)));
    }

    #[tokio::test]
    async fn test_match_returns_before_slow_checks_finish() {
        let started = std::time::Instant::now();
        let winner = race_first_match((0..4).collect::<Vec<u32>>(), 4, |n| async move {
            if n == 0 {
                true
            } else {
                sleep(Duration::from_secs(5)).await;
                false
            }
        })
        .await;
        assert_eq!(winner, Some(0));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_no_match() {
        let winner = race_first_match(Vec::<u32>::new(), 4, |_| async { true }).await;
        assert_eq!(winner, None);
    }

    #[tokio::test]
    async fn test_reassociate_rejects_bad_input() {
        let config = EngineConfig::default();
        assert!(matches!(
            reassociate("steven", "mini", "not-a-subnet", &config).await,
            Err(ProbeError::InvalidSubnet { .. })
        ));
        assert!(matches!(
            reassociate("", "mini", "10.0.0.0/30", &config).await,
            Err(ProbeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_reassociate_empty_range_is_no_match() {
        let config = EngineConfig::default();
        let result = reassociate("steven", "mini", "10.0.0.0/32", &config).await;
        assert_eq!(result.unwrap(), None);
    }
}
