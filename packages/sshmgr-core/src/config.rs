use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
const ENV_CONFIG_PATH: &str = "SSHMGR_CONFIG";

/// Engine configuration.
///
/// Passed by value or reference into every component call; nothing here is
/// global.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub tools: ToolsConfig,
    pub probe: ProbeSettings,
    pub scan: ScanSettings,
    pub discover: DiscoverSettings,
    pub reassociate: ReassociateSettings,
    pub ping: PingSettings,
}

/// External binaries invoked by the probes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub ssh: String,
    pub ssh_keyscan: String,
    pub dns_sd: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ssh: "ssh".to_string(),
            ssh_keyscan: "ssh-keyscan".to_string(),
            dns_sd: "dns-sd".to_string(),
        }
    }
}

/// Authenticated connectivity probing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeSettings {
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 2,
            concurrency: 20,
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Raw subnet sweeps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanSettings {
    /// Banner connect/read timeout
    pub timeout_ms: u64,
    /// Reverse DNS, remote hostname and keyscan on hosts that answered
    pub lookup_timeout_ms: u64,
    pub concurrency: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 500,
            lookup_timeout_ms: 2000,
            concurrency: 64,
        }
    }
}

impl ScanSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Service discovery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoverSettings {
    /// How long the browse tool is left running
    pub browse_secs: u64,
    pub lookup_timeout_ms: u64,
    pub resolve_timeout_ms: u64,
    pub domain: String,
}

impl Default for DiscoverSettings {
    fn default() -> Self {
        Self {
            browse_secs: 3,
            lookup_timeout_ms: 2000,
            resolve_timeout_ms: 1500,
            domain: "local.".to_string(),
        }
    }
}

impl DiscoverSettings {
    pub fn browse_window(&self) -> Duration {
        Duration::from_secs(self.browse_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReassociateSettings {
    pub timeout_ms: u64,
    pub concurrency: usize,
}

impl Default for ReassociateSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 800,
            concurrency: 32,
        }
    }
}

impl ReassociateSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// TCP health checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PingSettings {
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 2,
            concurrency: 30,
        }
    }
}

impl PingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ProbeError> {
        let concurrency = [
            ("probe", self.probe.concurrency),
            ("scan", self.scan.concurrency),
            ("reassociate", self.reassociate.concurrency),
            ("ping", self.ping.concurrency),
        ];
        for (section, value) in concurrency {
            if value == 0 {
                return Err(ProbeError::Config(format!(
                    "[{}] concurrency must be at least 1",
                    section
                )));
            }
        }

        let timeouts = [
            ("probe", self.probe.timeout_secs),
            ("scan", self.scan.timeout_ms),
            ("discover", self.discover.browse_secs),
            ("reassociate", self.reassociate.timeout_ms),
            ("ping", self.ping.timeout_secs),
        ];
        for (section, value) in timeouts {
            if value == 0 {
                return Err(ProbeError::Config(format!(
                    "[{}] timeout must be greater than zero",
                    section
                )));
            }
        }

        if self.tools.ssh.trim().is_empty() {
            return Err(ProbeError::Config("[tools] ssh must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// File named by the SSHMGR_CONFIG environment variable
    Environment,
    /// Loaded from the standard config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub source: ConfigSource,
}

/// Get the path to the standard configuration file
pub fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("sshmgr").join("config.toml"))
}

/// Parse a config file, returning `None` when it is missing or unusable.
pub fn load_config_from(path: &Path) -> Option<EngineConfig> {
    if !path.exists() {
        return None;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            return None;
        }
    };

    let config: EngineConfig = match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to parse config file {:?}: {}", path, e);
            return None;
        }
    };

    if let Err(e) = config.validate() {
        tracing::warn!("Ignoring config file {:?}: {}", path, e);
        return None;
    }

    tracing::debug!("Loaded config from {:?}", path);
    Some(config)
}

/// Load engine configuration with priority:
/// 1. File named by SSHMGR_CONFIG
/// 2. Config file (~/.config/sshmgr/config.toml)
/// 3. Default values
pub fn load_config() -> LoadedConfig {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        let path = path.trim();
        if !path.is_empty() {
            if let Some(config) = load_config_from(Path::new(path)) {
                tracing::info!("Using config from {}: {}", ENV_CONFIG_PATH, path);
                return LoadedConfig {
                    config,
                    source: ConfigSource::Environment,
                };
            }
        }
    }

    if let Some(config) = get_config_file_path().and_then(|p| load_config_from(&p)) {
        return LoadedConfig {
            config,
            source: ConfigSource::ConfigFile,
        };
    }

    tracing::debug!("Using default engine configuration");
    LoadedConfig {
        config: EngineConfig::default(),
        source: ConfigSource::Default,
    }
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/sshmgr/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# sshmgr configuration
# Place this file at: ~/.config/sshmgr/config.toml
# (or point SSHMGR_CONFIG at another file)

[tools]
# ssh = "ssh"
# ssh_keyscan = "ssh-keyscan"
# dns_sd = "dns-sd"

[probe]
# Per-host timeout for authenticated probes
# timeout_secs = 2
# concurrency = 20

[scan]
# Banner read timeout for subnet sweeps
# timeout_ms = 500
# lookup_timeout_ms = 2000
# concurrency = 64

[discover]
# browse_secs = 3
# lookup_timeout_ms = 2000
# resolve_timeout_ms = 1500
# domain = "local."

[reassociate]
# timeout_ms = 800
# concurrency = 32

[ping]
# timeout_secs = 2
# concurrency = 30
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.probe.concurrency, 20);
        assert_eq!(config.scan.concurrency, 64);
        assert_eq!(config.reassociate.timeout(), Duration::from_millis(800));
    }

    #[test]
    fn test_partial_file_is_filled_from_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
[scan]
concurrency = 128

[tools]
ssh = "/usr/local/bin/ssh"
"#,
        )
        .unwrap();

        assert_eq!(config.scan.concurrency, 128);
        assert_eq!(config.scan.timeout_ms, 500);
        assert_eq!(config.tools.ssh, "/usr/local/bin/ssh");
        assert_eq!(config.tools.ssh_keyscan, "ssh-keyscan");
        assert_eq!(config.discover.domain, "local.");
    }

    #[test]
    fn test_example_config_parses_to_defaults() {
        let config: EngineConfig = toml::from_str(&generate_example_config()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = EngineConfig::default();
        config.ping.concurrency = 0;
        assert!(matches!(config.validate(), Err(ProbeError::Config(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(load_config_from(&path).is_none());

        fs::write(&path, "[reassociate]\nconcurrency = 8\n").unwrap();
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.reassociate.concurrency, 8);

        fs::write(&path, "[probe]\nconcurrency = 0\n").unwrap();
        assert!(load_config_from(&path).is_none());

        fs::write(&path, "not = [valid").unwrap();
        assert!(load_config_from(&path).is_none());
    }
}
