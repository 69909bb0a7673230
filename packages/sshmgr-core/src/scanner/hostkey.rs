//! Host-key fingerprints via ssh-keyscan.
//!
//! Two strategies, kept apart because callers depend on their formats:
//! - [`host_key_fingerprint`]: SHA-256 over the first decodable key blob,
//!   rendered `SHA256:<base64>`. Stable across keyscan output ordering and
//!   used as an identity key.
//! - [`keyscan_digest`]: SHA-256 over the whole keyscan stdout, rendered as
//!   hex. Only used for display, shortened by [`short_digest`].

use super::{ToolRun, run_tool, tool_command};
use crate::error::ProbeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::time::Duration;

const KEY_TYPES: &str = "ed25519,ecdsa,rsa";

/// Characters of the whole-output digest shown to users
const SHORT_DIGEST_LEN: usize = 12;

/// ssh-keyscan's own per-host timeout, whole seconds
fn keyscan_timeout_arg(timeout: Duration) -> String {
    timeout.as_secs().max(1).to_string()
}

async fn keyscan(binary: &str, args: &[&str], timeout: Duration) -> Result<Vec<u8>, ProbeError> {
    let mut cmd = tool_command(binary);
    cmd.args(args);

    // Leave ssh-keyscan room to honour -T before killing it
    match run_tool(cmd, timeout + Duration::from_secs(1)).await {
        ToolRun::Finished(output) if output.status.success() => Ok(output.stdout),
        ToolRun::Finished(output) => Err(ProbeError::tool(
            binary,
            format!("exited with {:?}", output.status.code()),
        )),
        ToolRun::TimedOut => Err(ProbeError::tool(binary, "timed out")),
        ToolRun::SpawnFailed(e) => Err(ProbeError::tool(binary, e)),
    }
}

/// Structured fingerprint of the host's first ed25519/ecdsa/rsa key.
pub async fn host_key_fingerprint(
    binary: &str,
    ip: &str,
    timeout: Duration,
) -> Result<String, ProbeError> {
    let timeout_arg = keyscan_timeout_arg(timeout);
    let stdout = keyscan(binary, &["-T", &timeout_arg, "-t", KEY_TYPES, ip], timeout).await?;

    fingerprint_from_keyscan(&String::from_utf8_lossy(&stdout))
        .ok_or_else(|| ProbeError::NoHostKey(ip.to_string()))
}

/// Parse keyscan lines (`host keytype base64`) and fingerprint the first key
/// that decodes. Comment and malformed lines are skipped.
pub fn fingerprint_from_keyscan(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| line.split_whitespace().nth(2))
        .find_map(|blob| STANDARD.decode(blob).ok())
        .map(|raw_key| format!("SHA256:{}", STANDARD.encode(Sha256::digest(&raw_key))))
}

/// Hex SHA-256 of everything ssh-keyscan printed for `ip`.
pub async fn keyscan_digest(
    binary: &str,
    ip: &str,
    timeout: Duration,
) -> Result<String, ProbeError> {
    let timeout_arg = keyscan_timeout_arg(timeout);
    let stdout = keyscan(binary, &["-T", &timeout_arg, ip], timeout).await?;
    if stdout.is_empty() {
        return Err(ProbeError::NoHostKey(ip.to_string()));
    }
    Ok(keyscan_digest_hex(&stdout))
}

pub fn keyscan_digest_hex(output: &[u8]) -> String {
    format!("{:x}", Sha256::digest(output))
}

/// Display form of a whole-output digest
pub fn short_digest(digest: &str) -> &str {
    digest.get(..SHORT_DIGEST_LEN).unwrap_or(digest)
}
