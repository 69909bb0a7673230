//! Canonical, collision-free names for discovered hosts.

use super::{DiscoveryRecord, StatusFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Used when a label has no alphanumeric characters at all
const PLACEHOLDER_NAME: &str = "host";

/// Names already taken in the caller's store.
pub trait NameRegistry {
    fn contains_name(&self, name: &str) -> bool;
}

impl NameRegistry for HashSet<String> {
    fn contains_name(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// Prefer the host label (minus `.local` and any trailing dot), falling back
/// to the advertised instance name.
pub fn preferred_name(host: &str, instance: &str) -> String {
    let label = host.strip_suffix(".local").unwrap_or(host);
    let label = label.strip_suffix('.').unwrap_or(label);
    if label.is_empty() {
        instance.to_string()
    } else {
        label.to_string()
    }
}

/// Lower-case, collapse every run of non-alphanumerics to one `-`, trim
/// dashes from both ends.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_dash = false;
    for ch in label.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        slug
    }
}

/// `base`, or the first of `base-2`, `base-3`, ... not in `registry`.
pub fn unique_name(base: &str, registry: &dyn NameRegistry) -> String {
    if !registry.contains_name(base) {
        return base.to_string();
    }
    (2u64..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !registry.contains_name(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// A host the caller may add to its inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub name: String,
    pub user: String,
    pub host: String,
    pub port: u16,
}

/// Registry view over the caller's names plus the ones handed out so far
struct Combined<'a> {
    existing: &'a dyn NameRegistry,
    assigned: &'a HashSet<String>,
}

impl NameRegistry for Combined<'_> {
    fn contains_name(&self, name: &str) -> bool {
        self.assigned.contains(name) || self.existing.contains_name(name)
    }
}

impl HostEntry {
    /// Turn filtered discovery records into persistence candidates.
    ///
    /// With probing on and the default `all` filter only connectable
    /// records qualify; an explicit filter has already done the choosing.
    pub fn candidates(
        records: &[DiscoveryRecord],
        user: &str,
        probed: bool,
        filter: StatusFilter,
        registry: &dyn NameRegistry,
    ) -> Vec<HostEntry> {
        let mut assigned = HashSet::new();
        let mut entries = Vec::new();

        for record in records {
            if probed
                && filter == StatusFilter::All
                && !record.status.is_some_and(|s| s.is_connectable())
            {
                continue;
            }

            let base = slugify(&preferred_name(&record.host, &record.instance_name));
            let name = unique_name(
                &base,
                &Combined {
                    existing: registry,
                    assigned: &assigned,
                },
            );
            assigned.insert(name.clone());

            entries.push(HostEntry {
                name,
                user: user.to_string(),
                host: record.host.clone(),
                port: record.port,
            });
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ReachabilityStatus;

    fn record(instance: &str, host: &str, status: Option<ReachabilityStatus>) -> DiscoveryRecord {
        DiscoveryRecord {
            instance_name: instance.to_string(),
            host: host.to_string(),
            port: 22,
            resolved_ip: String::new(),
            domain: "local.".to_string(),
            status,
        }
    }

    #[test]
    fn test_preferred_name() {
        assert_eq!(preferred_name("Mac-mini.local", "Steven's Mac mini"), "Mac-mini");
        assert_eq!(preferred_name("build.example.", "x"), "build.example");
        assert_eq!(preferred_name(".local", "Steven's Mac mini"), "Steven's Mac mini");
        assert_eq!(preferred_name("", "fallback"), "fallback");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Steven's Mac mini"), "steven-s-mac-mini");
        assert_eq!(slugify("  Build__Box--01 "), "build-box-01");
        assert_eq!(slugify("--edge--"), "edge");
        assert_eq!(slugify("***"), "host");
        assert_eq!(slugify(""), "host");
    }

    #[test]
    fn test_unique_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("mini", &taken), "mini");
        taken.insert("mini".to_string());
        taken.insert("mini-2".to_string());
        assert_eq!(unique_name("mini", &taken), "mini-3");
    }

    #[test]
    fn test_candidates_unique_within_batch() {
        let records = vec![
            record("a", "mini.local", None),
            record("b", "mini.local", None),
            record("c", "Studio.local", None),
        ];
        let mut existing = HashSet::new();
        existing.insert("studio".to_string());

        let entries =
            HostEntry::candidates(&records, "steven", false, StatusFilter::All, &existing);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["mini", "mini-2", "studio-2"]);
        assert!(entries.iter().all(|e| e.user == "steven"));
    }

    #[test]
    fn test_probed_all_keeps_only_connectable() {
        let records = vec![
            record("a", "ok.local", Some(ReachabilityStatus::Ok)),
            record("b", "auth.local", Some(ReachabilityStatus::Auth)),
            record("c", "deny.local", Some(ReachabilityStatus::Deny)),
            record("d", "down.local", Some(ReachabilityStatus::Down)),
        ];
        let none = HashSet::new();

        let entries = HostEntry::candidates(&records, "steven", true, StatusFilter::All, &none);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["ok", "auth"]);

        // An explicit filter has already narrowed the records
        let denied = vec![records[2].clone()];
        let entries = HostEntry::candidates(
            &denied,
            "steven",
            true,
            StatusFilter::Exact(ReachabilityStatus::Deny),
            &none,
        );
        assert_eq!(entries.len(), 1);
    }
}
