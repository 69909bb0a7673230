//! sshmgr Core Library
//!
//! This crate provides the engine behind the `sshmgr` tool:
//! - Subnet sweeps for ssh servers (banner grab, reverse DNS, host keys)
//! - Bonjour discovery of `_ssh._tcp` services with optional probing
//! - Reachability classification of authenticated ssh probes
//! - Reassociation of known hosts after their address changed
//!
//! Every entry point takes an explicit [`EngineConfig`]; nothing is global.
//!
//! # Example
//!
//! ```no_run
//! use sshmgr_core::{config, reassoc, scanner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let loaded = config::load_config();
//!
//!     // Which hosts on the subnet run ssh?
//!     let hits = scanner::sweep_subnet("192.168.1.0/24", None, &loaded.config).await?;
//!     println!("Found {} ssh hosts", hits.len());
//!
//!     // Where did "mini" go?
//!     if let Some(found) =
//!         reassoc::reassociate("steven", "mini", "192.168.1.0/24", &loaded.config).await?
//!     {
//!         println!("mini is now at {}", found.matched_ip);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod reassoc;
pub mod scanner;

// Re-export commonly used types
pub use config::{ConfigSource, EngineConfig, LoadedConfig};
pub use discovery::{DiscoverOptions, DiscoveryRecord, HostEntry, StatusFilter};
pub use error::ProbeError;
pub use reassoc::{FingerprintTable, ReassociationResult};
pub use scanner::{ProbeOutcome, ReachabilityStatus, ScanHit, Target};
