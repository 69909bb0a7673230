//! Service discovery pipeline.
//!
//! Browse for `_ssh._tcp` advertisements, resolve each to host and port,
//! optionally attach a display IP and an authenticated reachability status,
//! filter, and hand back candidates for the caller to persist.

mod dns_sd;
mod naming;

pub use dns_sd::{DnsSd, SSH_SERVICE, parse_browse_line, parse_lookup};
pub use naming::{HostEntry, NameRegistry, preferred_name, slugify, unique_name};

use crate::config::EngineConfig;
use crate::error::ProbeError;
use crate::scanner::{
    ConnectivityProbe, ReachabilityStatus, Target, classify, resolve_host, run_bounded,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// A service advertisement before address resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub instance: String,
    pub domain: String,
}

impl ServiceInstance {
    /// Deduplication key
    pub fn key(&self) -> String {
        format!("{}|{}", self.instance, self.domain)
    }
}

/// External browse/lookup collaborator.
#[async_trait]
pub trait ServiceBrowser: Send + Sync {
    /// Collect advertisements for `window`, deduplicated by instance and domain.
    async fn browse(&self, domain: &str, window: Duration) -> Vec<ServiceInstance>;

    /// Resolve one advertisement to `(host, port)`.
    async fn lookup(&self, item: &ServiceInstance, timeout: Duration) -> Option<(String, u16)>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRecord {
    pub instance_name: String,
    pub host: String,
    pub port: u16,
    /// Empty when the display lookup failed or was skipped
    pub resolved_ip: String,
    pub domain: String,
    /// Only set when probing was requested
    pub status: Option<ReachabilityStatus>,
}

/// Which records survive the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    /// OK or AUTH
    Connectable,
    Exact(ReachabilityStatus),
}

impl StatusFilter {
    /// Records without a status only pass `All`.
    pub fn accepts(&self, status: Option<ReachabilityStatus>) -> bool {
        match (self, status) {
            (StatusFilter::All, _) => true,
            (StatusFilter::Connectable, Some(status)) => status.is_connectable(),
            (StatusFilter::Exact(wanted), Some(status)) => *wanted == status,
            (_, None) => false,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "connectable" => Ok(StatusFilter::Connectable),
            other => other
                .parse::<ReachabilityStatus>()
                .map(StatusFilter::Exact)
                .map_err(|_| {
                    format!(
                        "unknown filter '{}' \
                         (expected all|connectable|ok|auth|deny|down|err|resolve)",
                        s
                    )
                }),
        }
    }
}

impl std::fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusFilter::All => f.write_str("all"),
            StatusFilter::Connectable => f.write_str("connectable"),
            StatusFilter::Exact(status) => f.write_str(&status.as_str().to_ascii_lowercase()),
        }
    }
}

/// Per-run choices layered over [`EngineConfig`]
#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    /// Run the authenticated probe over every resolved record; needs `user`
    pub probe: bool,
    /// Login used by the probe and for persistence candidates
    pub user: Option<String>,
    pub filter: StatusFilter,
    /// Look up a display IP for every record
    pub resolve_ips: bool,
}

/// Run the full discovery pipeline.
///
/// Zero advertisements is a normal, empty result. Records that fail to
/// resolve are dropped; every other per-record failure is folded into the
/// record itself. Asking for a probe without a user is an error.
pub async fn discover(
    browser: &dyn ServiceBrowser,
    probe: Arc<dyn ConnectivityProbe>,
    config: &EngineConfig,
    options: &DiscoverOptions,
) -> Result<Vec<DiscoveryRecord>, ProbeError> {
    if options.probe && options.user.as_deref().is_none_or(|u| u.trim().is_empty()) {
        return Err(ProbeError::Config(
            "probing discovered hosts needs a user".to_string(),
        ));
    }

    let settings = &config.discover;
    let items = browser
        .browse(&settings.domain, settings.browse_window())
        .await;
    tracing::info!("Browse found {} _ssh._tcp advertisement(s)", items.len());
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = lookup_all(browser, items, settings.lookup_timeout()).await;
    tracing::info!("Resolved {} record(s)", records.len());

    if options.resolve_ips {
        attach_display_ips(&mut records, settings.resolve_timeout()).await;
    }

    if options.probe {
        attach_statuses(
            &mut records,
            probe,
            options.user.clone(),
            config.probe.timeout(),
            config.probe.concurrency,
        )
        .await;
    }

    Ok(filter_records(records, options.filter))
}

/// Resolve every advertisement, dropping the ones without an answer.
pub async fn lookup_all(
    browser: &dyn ServiceBrowser,
    items: Vec<ServiceInstance>,
    timeout: Duration,
) -> Vec<DiscoveryRecord> {
    let lookups = items.iter().map(|item| browser.lookup(item, timeout));
    let answers = futures::future::join_all(lookups).await;

    items
        .into_iter()
        .zip(answers)
        .filter_map(|(item, answer)| {
            let (host, port) = answer?;
            Some(DiscoveryRecord {
                instance_name: item.instance,
                host,
                port,
                resolved_ip: String::new(),
                domain: item.domain,
                status: None,
            })
        })
        .collect()
}

async fn attach_display_ips(records: &mut [DiscoveryRecord], timeout: Duration) {
    let lookups = records.iter().map(|r| resolve_host(&r.host, timeout));
    let ips = futures::future::join_all(lookups).await;
    for (record, ip) in records.iter_mut().zip(ips) {
        match ip {
            Ok(ip) => record.resolved_ip = ip.to_string(),
            Err(e) => tracing::debug!("Display IP: {}", e),
        }
    }
}

/// Probe every record and attach its classification.
pub async fn attach_statuses(
    records: &mut [DiscoveryRecord],
    probe: Arc<dyn ConnectivityProbe>,
    user: Option<String>,
    timeout: Duration,
    concurrency: usize,
) {
    let targets: Vec<Option<Target>> = records
        .iter()
        .map(|r| Target::new(r.host.clone(), u32::from(r.port), user.clone()).ok())
        .collect();

    let statuses = run_bounded(targets, concurrency, move |target| {
        let probe = probe.clone();
        async move {
            match target {
                Some(target) => classify(&probe.probe(&target, timeout).await),
                None => ReachabilityStatus::Err,
            }
        }
    })
    .await;

    for (record, status) in records.iter_mut().zip(statuses) {
        record.status = Some(status);
    }
}

pub fn filter_records(records: Vec<DiscoveryRecord>, filter: StatusFilter) -> Vec<DiscoveryRecord> {
    records
        .into_iter()
        .filter(|r| filter.accepts(r.status))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ProbeOutcome;
    use std::collections::HashMap;

    struct FakeBrowser {
        items: Vec<ServiceInstance>,
        answers: HashMap<String, (String, u16)>,
    }

    #[async_trait]
    impl ServiceBrowser for FakeBrowser {
        async fn browse(&self, _domain: &str, _window: Duration) -> Vec<ServiceInstance> {
            self.items.clone()
        }

        async fn lookup(
            &self,
            item: &ServiceInstance,
            _timeout: Duration,
        ) -> Option<(String, u16)> {
            self.answers.get(&item.instance).cloned()
        }
    }

    /// Answers by host name: `ok-*` succeed, `auth-*` refuse the key, the
    /// rest are refused at TCP level.
    struct FakeProbe;

    #[async_trait]
    impl ConnectivityProbe for FakeProbe {
        async fn probe(&self, target: &Target, _timeout: Duration) -> ProbeOutcome {
            if target.address.starts_with("ok-") {
                ProbeOutcome::success(3, "")
            } else if target.address.starts_with("auth-") {
                ProbeOutcome::failure(3, "Permission denied (publickey,password).", None)
            } else {
                ProbeOutcome::failure(
                    3,
                    "ssh: connect to host x port 22: Connection refused",
                    None,
                )
            }
        }
    }

    fn item(name: &str) -> ServiceInstance {
        ServiceInstance {
            instance: name.to_string(),
            domain: "local.".to_string(),
        }
    }

    fn browser() -> FakeBrowser {
        let mut answers = HashMap::new();
        answers.insert("alpha".to_string(), ("ok-alpha.local".to_string(), 22));
        answers.insert("beta".to_string(), ("auth-beta.local".to_string(), 2222));
        answers.insert("gamma".to_string(), ("down-gamma.local".to_string(), 22));
        FakeBrowser {
            items: vec![item("alpha"), item("beta"), item("ghost"), item("gamma")],
            answers,
        }
    }

    fn options(probe: bool, filter: StatusFilter) -> DiscoverOptions {
        DiscoverOptions {
            probe,
            user: Some("steven".to_string()),
            filter,
            resolve_ips: false,
        }
    }

    #[tokio::test]
    async fn test_unresolved_records_are_dropped() {
        let records = discover(
            &browser(),
            Arc::new(FakeProbe),
            &EngineConfig::default(),
            &options(false, StatusFilter::All),
        )
        .await
        .unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.instance_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert!(records.iter().all(|r| r.status.is_none()));
        assert_eq!(records[1].port, 2222);
    }

    #[tokio::test]
    async fn test_probe_attaches_status() {
        let records = discover(
            &browser(),
            Arc::new(FakeProbe),
            &EngineConfig::default(),
            &options(true, StatusFilter::All),
        )
        .await
        .unwrap();

        let statuses: Vec<_> = records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                Some(ReachabilityStatus::Ok),
                Some(ReachabilityStatus::Auth),
                Some(ReachabilityStatus::Down),
            ]
        );
    }

    #[tokio::test]
    async fn test_connectable_filter() {
        let records = discover(
            &browser(),
            Arc::new(FakeProbe),
            &EngineConfig::default(),
            &options(true, StatusFilter::Connectable),
        )
        .await
        .unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.instance_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        let records = discover(
            &browser(),
            Arc::new(FakeProbe),
            &EngineConfig::default(),
            &options(true, StatusFilter::Exact(ReachabilityStatus::Down)),
        )
        .await
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].instance_name, "gamma");
    }

    #[tokio::test]
    async fn test_no_advertisements_is_empty() {
        let empty = FakeBrowser {
            items: Vec::new(),
            answers: HashMap::new(),
        };
        let records = discover(
            &empty,
            Arc::new(FakeProbe),
            &EngineConfig::default(),
            &options(true, StatusFilter::All),
        )
        .await
        .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_display_ip_is_best_effort() {
        let mut answers = HashMap::new();
        answers.insert("loop".to_string(), ("127.0.0.1".to_string(), 22));
        answers.insert("nowhere".to_string(), ("nowhere.invalid".to_string(), 22));
        let browser = FakeBrowser {
            items: vec![item("loop"), item("nowhere")],
            answers,
        };
        let mut opts = options(false, StatusFilter::All);
        opts.resolve_ips = true;

        let records = discover(&browser, Arc::new(FakeProbe), &EngineConfig::default(), &opts)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].resolved_ip, "127.0.0.1");
        assert_eq!(records[1].resolved_ip, "");
    }

    #[tokio::test]
    async fn test_probe_without_user_is_rejected() {
        let config = EngineConfig::default();
        let mut opts = options(true, StatusFilter::All);
        opts.user = None;
        let result = discover(&browser(), Arc::new(FakeProbe), &config, &opts).await;
        assert!(matches!(result, Err(ProbeError::Config(_))));

        opts.user = Some("  ".to_string());
        let result = discover(&browser(), Arc::new(FakeProbe), &config, &opts).await;
        assert!(matches!(result, Err(ProbeError::Config(_))));

        // Without a probe the user is only needed for persistence
        opts.probe = false;
        opts.user = None;
        let result = discover(&browser(), Arc::new(FakeProbe), &config, &opts).await;
        assert_eq!(result.unwrap().len(), 3);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("all".parse::<StatusFilter>(), Ok(StatusFilter::All));
        assert_eq!("Connectable".parse::<StatusFilter>(), Ok(StatusFilter::Connectable));
        assert_eq!(
            "deny".parse::<StatusFilter>(),
            Ok(StatusFilter::Exact(ReachabilityStatus::Deny))
        );
        assert!("everything".parse::<StatusFilter>().is_err());
        assert_eq!(StatusFilter::Exact(ReachabilityStatus::Auth).to_string(), "auth");
    }

    #[test]
    fn test_records_without_status_only_pass_all() {
        assert!(StatusFilter::All.accepts(None));
        assert!(!StatusFilter::Connectable.accepts(None));
        assert!(!StatusFilter::Exact(ReachabilityStatus::Ok).accepts(None));
        assert!(StatusFilter::Connectable.accepts(Some(ReachabilityStatus::Auth)));
        assert!(!StatusFilter::Connectable.accepts(Some(ReachabilityStatus::Deny)));
    }
}
