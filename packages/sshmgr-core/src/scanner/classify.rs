//! Outcome classification.
//!
//! Two separate classifiers:
//! - [`classify`] reads ssh client output and knows about authorization.
//! - [`classify_health`] only knows whether a name resolved and a TCP
//!   connection opened.
//!
//! Both are pure functions of their input.

use super::health::HealthProbe;
use super::{ProbeOutcome, ReachabilityStatus};

const DENY_MARKERS: &[&str] = &["not allowed", "allowusers"];
const AUTH_MARKERS: &[&str] = &["permission denied"];
const DOWN_MARKERS: &[&str] = &[
    "connection timed out",
    "operation timed out",
    "no route to host",
    "connection refused",
];

/// Classify an authenticated ssh probe. First matching rule wins:
///
/// 1. exit status success -> OK
/// 2. "not allowed" / "allowusers" -> DENY
/// 3. "permission denied" -> AUTH
/// 4. timeouts, no route, refused -> DOWN
/// 5. ssh's own resolver failures -> ERR
/// 6. anything else -> ERR
///
/// Matching is a case-insensitive substring search over the combined output.
pub fn classify(outcome: &ProbeOutcome) -> ReachabilityStatus {
    if outcome.succeeded {
        return ReachabilityStatus::Ok;
    }

    let text = outcome.raw_text.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    if contains_any(DENY_MARKERS) {
        ReachabilityStatus::Deny
    } else if contains_any(AUTH_MARKERS) {
        ReachabilityStatus::Auth
    } else if contains_any(DOWN_MARKERS) {
        ReachabilityStatus::Down
    } else {
        // Includes the ssh client's own "could not resolve hostname" and
        // "name or service not known": those stay ERR, not RESOLVE.
        ReachabilityStatus::Err
    }
}

/// Classify a plain TCP health check.
pub fn classify_health(probe: &HealthProbe) -> ReachabilityStatus {
    match probe {
        HealthProbe::Unresolved => ReachabilityStatus::Resolve,
        HealthProbe::Connected(outcome) if outcome.succeeded => ReachabilityStatus::Ok,
        HealthProbe::Connected(outcome) if outcome.os_error.is_some() => ReachabilityStatus::Down,
        HealthProbe::Connected(_) => ReachabilityStatus::Err,
    }
}
