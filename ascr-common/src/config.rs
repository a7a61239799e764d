//! Configuration loading and root folder resolution
//!
//! Settings are loaded once at startup and handed to each component's
//! constructor. Nothing in the library crates reads configuration on its own.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable consulted by [`resolve_root_folder`]
pub const ROOT_ENV_VAR: &str = "ASCR_ROOT";

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AscrConfig {
    /// Data root; `None` means "resolve at startup"
    pub root_folder: Option<PathBuf>,
    pub store: StoreSettings,
    pub tasks: TaskSettings,
    pub curation: CurationSettings,
}

/// Record naming and validation rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Suffix marking a draft name, stripped when deriving the base name
    pub draft_suffix: String,
    /// Text placed between base name and version number
    pub version_marker: String,
    /// Document sections searched, in order, for the identifying field
    pub identity_sections: Vec<String>,
    /// Identifying field inside the first entry of an identity section
    pub identity_field: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            draft_suffix: "_working".to_string(),
            version_marker: "_v".to_string(),
            identity_sections: vec!["cell_line".to_string(), "basic_data".to_string()],
            identity_field: "hpscreg_name".to_string(),
        }
    }
}

/// Task tracker retention and broadcast settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    /// Retention of task metadata and stage lists
    pub retention_secs: u64,
    /// Retention of retained input payloads (kept shorter than metadata)
    pub payload_retention_secs: u64,
    /// EventBus channel capacity
    pub event_capacity: usize,
    /// How long tracker writes keep retrying while SQLite reports a lock
    pub max_lock_wait_ms: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            retention_secs: 7 * 24 * 60 * 60,
            payload_retention_secs: 2 * 24 * 60 * 60,
            event_capacity: 1000,
            max_lock_wait_ms: 5000,
        }
    }
}

impl TaskSettings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn payload_retention(&self) -> Duration {
        Duration::from_secs(self.payload_retention_secs)
    }
}

/// Curation worker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationSettings {
    /// Curation pipeline endpoint
    pub endpoint: String,
    /// Instruction file sent with every request; built-in text when absent
    pub instructions_path: Option<PathBuf>,
    /// Optional URL that receives every published event as JSON
    pub relay_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for CurationSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8002/single_article_curate".to_string(),
            instructions_path: None,
            relay_url: None,
            request_timeout_secs: 300,
        }
    }
}

impl AscrConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing or invalid
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `root_folder` key in the TOML config file
/// 4. OS-dependent default
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_file: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = config_file {
        if let Ok(content) = std::fs::read_to_string(config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&content) {
                if let Some(root) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root);
                }
            }
        }
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ascr"))
        .unwrap_or_else(|| PathBuf::from("./ascr_data"))
}
