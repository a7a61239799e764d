//! Record name conventions
//!
//! A published record is named `<base><marker><version>` (`TestCell001_v2`).
//! A draft may carry a suffix (`TestCell001_working`). Both decorations are
//! stripped to recover the base name that groups a record's versions.

use ascr_common::config::StoreSettings;
use ascr_common::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    draft_suffix: String,
    version_marker: String,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self {
            draft_suffix: "_working".to_string(),
            version_marker: "_v".to_string(),
        }
    }
}

impl NamingScheme {
    pub fn new(draft_suffix: impl Into<String>, version_marker: impl Into<String>) -> Result<Self> {
        let scheme = Self {
            draft_suffix: draft_suffix.into(),
            version_marker: version_marker.into(),
        };
        if scheme.version_marker.is_empty() {
            return Err(Error::Config("version marker must not be empty".to_string()));
        }
        if scheme.draft_suffix.is_empty() {
            return Err(Error::Config("draft suffix must not be empty".to_string()));
        }
        Ok(scheme)
    }

    pub fn from_settings(settings: &StoreSettings) -> Result<Self> {
        Self::new(settings.draft_suffix.clone(), settings.version_marker.clone())
    }

    pub fn draft_suffix(&self) -> &str {
        &self.draft_suffix
    }

    pub fn version_marker(&self) -> &str {
        &self.version_marker
    }

    /// Version number carried by `name`, if it ends in `<marker><digits>`
    ///
    /// Anything else (no marker, empty or non-numeric suffix, overflow) is
    /// simply unversioned.
    pub fn parse_version(&self, name: &str) -> Option<u64> {
        let (_, digits) = name.rsplit_once(self.version_marker.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn build_versioned_name(&self, base_name: &str, version: u64) -> String {
        format!("{}{}{}", base_name, self.version_marker, version)
    }

    /// Strip the draft suffix if present, otherwise a valid version suffix
    pub fn extract_base_name(&self, name: &str) -> String {
        if let Some(base) = name.strip_suffix(self.draft_suffix.as_str()) {
            if !base.is_empty() {
                return base.to_string();
            }
        }
        if self.parse_version(name).is_some() {
            if let Some((base, _)) = name.rsplit_once(self.version_marker.as_str()) {
                return base.to_string();
            }
        }
        name.to_string()
    }
}
