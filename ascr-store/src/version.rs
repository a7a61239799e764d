//! Versioning policy over record names
//!
//! Everything here except [`VersionController::all_versions`] and
//! [`VersionController::latest_version_data`] is a pure function of the names
//! handed in. Those two read the "ready" bucket through a [`RecordStore`].

use crate::naming::NamingScheme;
use crate::record::Location;
use crate::store::RecordStore;
use ascr_common::config::StoreSettings;
use ascr_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Newest published version of a base name, with its body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestVersion {
    pub base_name: String,
    pub version: u64,
    pub name: String,
    pub data: Value,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct VersionController {
    naming: NamingScheme,
}

impl VersionController {
    pub fn new(naming: NamingScheme) -> Self {
        Self { naming }
    }

    pub fn from_settings(settings: &StoreSettings) -> Result<Self> {
        Ok(Self::new(NamingScheme::from_settings(settings)?))
    }

    pub fn naming(&self) -> &NamingScheme {
        &self.naming
    }

    pub fn parse_version(&self, name: &str) -> Option<u64> {
        self.naming.parse_version(name)
    }

    pub fn build_versioned_name(&self, base_name: &str, version: u64) -> String {
        self.naming.build_versioned_name(base_name, version)
    }

    pub fn extract_base_name(&self, name: &str) -> String {
        self.naming.extract_base_name(name)
    }

    /// 0 when nothing parses, else one past the highest parsed version
    pub fn next_version<S: AsRef<str>>(&self, existing: &[S]) -> u64 {
        existing
            .iter()
            .filter_map(|name| self.parse_version(name.as_ref()))
            .max()
            .map_or(0, |max| max.saturating_add(1))
    }

    /// Name carrying the highest version; on equal versions the earliest wins
    pub fn latest_version<S: AsRef<str>>(&self, names: &[S]) -> Option<String> {
        let mut best: Option<(u64, &str)> = None;
        for name in names {
            let name = name.as_ref();
            if let Some(version) = self.parse_version(name) {
                if best.map_or(true, |(current, _)| version > current) {
                    best = Some((version, name));
                }
            }
        }
        best.map(|(_, name)| name.to_string())
    }

    /// Every published name for `base_name`, in the order they were created
    pub async fn all_versions(&self, store: &dyn RecordStore, base_name: &str) -> Result<Vec<String>> {
        store.files_for_base_name(base_name, Location::Ready).await
    }

    pub async fn latest_version_data(
        &self,
        store: &dyn RecordStore,
        base_name: &str,
    ) -> Result<LatestVersion> {
        let names = self.all_versions(store, base_name).await?;
        let name = self
            .latest_version(&names)
            .ok_or_else(|| Error::NotFound(format!("no published versions of '{}'", base_name)))?;

        let record = store
            .get(&name, Location::Ready)
            .await?
            .ok_or_else(|| Error::NotFound(format!("'{}' could not be read from ready", name)))?;
        debug!(base_name = %base_name, record = %name, "Resolved latest version");

        Ok(LatestVersion {
            base_name: base_name.to_string(),
            version: self.parse_version(&name).unwrap_or_default(),
            name,
            data: record.data,
            last_modified: record.last_modified,
        })
    }
}
