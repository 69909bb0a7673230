//! Error taxonomy for the probing engine.
//!
//! Only input validation (subnets, ports) and operations that require an
//! answer (forward resolution, host-key lookup) surface these errors. Probes
//! documented as best-effort fold their failures into a
//! [`ReachabilityStatus`](crate::scanner::ReachabilityStatus) or an empty value.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Input could not be parsed as an IPv4 CIDR.
    #[error("invalid subnet '{input}': {reason}")]
    InvalidSubnet { input: String, reason: String },

    #[error("invalid port {0}: must be in 1..=65535")]
    InvalidPort(u32),

    /// A `[user@]host[:port]` string that does not parse.
    #[error("invalid target '{input}': {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error("could not resolve '{host}': {reason}")]
    ResolutionFailure { host: String, reason: String },

    #[error("could not connect to {address}: {source}")]
    ConnectFailure {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The host answered but rejected the credential.
    #[error("{target}: permission denied")]
    AuthFailure { target: String },

    /// The host answered but its policy does not admit the user.
    #[error("{target}: user not allowed")]
    DenyFailure { target: String },

    #[error("{tool} failed: {reason}")]
    ToolInvocationFailure { tool: String, reason: String },

    #[error("no ssh host key found for {0}")]
    NoHostKey(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProbeError {
    pub(crate) fn tool(tool: &str, reason: impl std::fmt::Display) -> Self {
        ProbeError::ToolInvocationFailure {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
