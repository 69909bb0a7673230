//! Host-key fingerprint association table.
//!
//! Maps a structured host-key fingerprint (`SHA256:...`) to the inventory
//! name and last address it was seen at, so a host can be recognised by its
//! key after its address changes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const TABLE_FILE: &str = "reassoc.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub name: String,
    pub ip: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintTable {
    path: PathBuf,
    entries: BTreeMap<String, FingerprintEntry>,
}

/// Default location: `<config_dir>/sshmgr/reassoc.json`
pub fn default_table_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Could not find config directory")?;
    Ok(config_dir.join("sshmgr").join(TABLE_FILE))
}

impl FingerprintTable {
    /// Load the table at the default location.
    pub fn load() -> Result<Self> {
        Ok(Self::load_from(default_table_path()?))
    }

    /// Load the table stored at `path`.
    ///
    /// A missing or unreadable file gives an empty table bound to `path`.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Ignoring corrupt fingerprint table {:?}: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No fingerprint table at {:?}", path);
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!("Failed to read fingerprint table {:?}: {}", path, e);
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, fingerprint: &str) -> Option<&FingerprintEntry> {
        self.entries.get(fingerprint)
    }

    /// Record where the host with `fingerprint` now lives.
    pub fn update(&mut self, fingerprint: &str, name: &str, ip: &str) {
        self.entries.insert(
            fingerprint.to_string(),
            FingerprintEntry {
                name: name.to_string(),
                ip: ip.to_string(),
                updated_at: Utc::now(),
            },
        );
    }

    /// Write the table back to its file, creating the directory if needed.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(&self.entries).context("Failed to serialize table")?;
        std::fs::write(&self.path, content).context("Failed to write fingerprint table")?;

        tracing::debug!("Saved {} fingerprint(s) to {:?}", self.entries.len(), self.path);
        Ok(())
    }
}
