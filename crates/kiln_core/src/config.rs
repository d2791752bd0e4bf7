//! Game configuration
//!
//! Kiln reads an optional `kiln.toml`:
//!
//! ```toml
//! [storage]
//! local_dir = "saves"       # file-backed local tier; in-memory when omitted
//! local_quota = 5242880     # bytes, in-memory local tier only
//! session_quota = 5242880   # bytes
//!
//! [state]
//! debug = false             # trace every state handle
//! max_history = 50          # default undo depth
//! debounce_ms = 300         # default debounce window
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level game configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GameConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub state: StateDefaults,
}

/// Durable storage configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory for the local tier. In-memory when unset.
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
    /// Byte quota for the in-memory local tier
    #[serde(default)]
    pub local_quota: Option<usize>,
    /// Byte quota for the session tier
    #[serde(default)]
    pub session_quota: Option<usize>,
}

/// Defaults applied to state handles created through a scene
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StateDefaults {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_max_history() -> usize {
    50
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for StateDefaults {
    fn default() -> Self {
        Self {
            debug: false,
            max_history: default_max_history(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl StateDefaults {
    /// Default debounce window as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl GameConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse game configuration")
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Load a configuration file, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
