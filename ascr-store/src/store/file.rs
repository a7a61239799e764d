//! Filesystem record store
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/<location>/index.json           base name -> [record names]
//! <root>/<location>/records/<name>.json  record body
//! ```

use super::{LocationIndex, RecordStore};
use crate::naming::NamingScheme;
use crate::record::{validate_name, IdentityRule, Location, StoredRecord, WriteOutcome};
use ascr_common::config::StoreSettings;
use ascr_common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const INDEX_FILE: &str = "index.json";
const RECORDS_DIR: &str = "records";

pub struct FileRecordStore {
    root: PathBuf,
    naming: NamingScheme,
    identity: IdentityRule,
    /// Serializes index read-modify-write within this process
    index_lock: Mutex<()>,
}

impl FileRecordStore {
    pub fn new(root: impl Into<PathBuf>, naming: NamingScheme, identity: IdentityRule) -> Self {
        Self {
            root: root.into(),
            naming,
            identity,
            index_lock: Mutex::new(()),
        }
    }

    pub fn from_settings(root: impl Into<PathBuf>, settings: &StoreSettings) -> Result<Self> {
        Ok(Self::new(
            root,
            NamingScheme::from_settings(settings)?,
            IdentityRule::from_settings(settings),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn location_dir(&self, location: Location) -> PathBuf {
        self.root.join(location.as_str())
    }

    fn record_path(&self, name: &str, location: Location) -> PathBuf {
        self.location_dir(location)
            .join(RECORDS_DIR)
            .join(format!("{}.json", name))
    }

    fn index_path(&self, location: Location) -> PathBuf {
        self.location_dir(location).join(INDEX_FILE)
    }

    /// Missing or unreadable index content reads as empty
    async fn load_index(&self, location: Location) -> Result<LocationIndex> {
        let path = self.index_path(location);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(LocationIndex::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!(location = %location, "Invalid {} ({}), treating as empty", path.display(), e);
                Ok(LocationIndex::new())
            }
        }
    }

    async fn save_index(&self, location: Location, index: &LocationIndex) -> Result<()> {
        let dir = self.location_dir(location);
        tokio::fs::create_dir_all(&dir).await?;

        let path = self.index_path(location);
        let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(index)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_record(&self, name: &str, data: &Value, location: Location) -> Result<()> {
        let path = self.record_path(name, location);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec_pretty(data)?).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn create(&self, name: &str, data: &Value, location: Location) -> Result<()> {
        validate_name(name)?;
        self.identity.identify(data)?;

        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index(location).await?;
        if index.contains(name) {
            return Err(Error::AlreadyExists(format!(
                "'{}' already exists in {}",
                name, location
            )));
        }

        self.write_record(name, data, location).await?;
        let base_name = self.naming.extract_base_name(name);
        index.insert(&base_name, name);
        self.save_index(location, &index).await?;

        info!(record = %name, location = %location, base_name = %base_name, "Created record");
        Ok(())
    }

    async fn get(&self, name: &str, location: Location) -> Result<Option<StoredRecord>> {
        if !self.load_index(location).await?.contains(name) {
            return Ok(None);
        }

        let path = self.record_path(name, location);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                error!(record = %name, location = %location, "Record is indexed but missing on disk");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let data: Value = serde_json::from_slice(&bytes)?;
        let modified = tokio::fs::metadata(&path).await?.modified()?;

        Ok(Some(StoredRecord {
            name: name.to_string(),
            location,
            data,
            last_modified: DateTime::<Utc>::from(modified),
        }))
    }

    async fn update(&self, name: &str, data: &Value, location: Location) -> Result<WriteOutcome> {
        validate_name(name)?;
        self.identity.identify(data)?;

        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index(location).await?;
        let existed = index.contains(name);

        self.write_record(name, data, location).await?;
        if !existed {
            index.insert(&self.naming.extract_base_name(name), name);
            self.save_index(location, &index).await?;
        }

        let outcome = if existed {
            WriteOutcome::Updated
        } else {
            WriteOutcome::Created
        };
        info!(record = %name, location = %location, ?outcome, "Updated record");
        Ok(outcome)
    }

    async fn delete(&self, name: &str, location: Location) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index(location).await?;
        if !index.contains(name) {
            return Err(Error::NotFound(format!("'{}' not found in {}", name, location)));
        }

        match tokio::fs::remove_file(self.record_path(name, location)).await {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                warn!(record = %name, location = %location, "Record body already gone, dropping index entry");
            }
            Err(e) => return Err(e.into()),
        }

        index.remove(name);
        self.save_index(location, &index).await?;

        info!(record = %name, location = %location, "Deleted record");
        Ok(())
    }

    async fn list(&self, location: Location) -> Result<Vec<String>> {
        Ok(self.load_index(location).await?.names())
    }

    async fn exists(&self, name: &str, location: Location) -> Result<bool> {
        Ok(self.load_index(location).await?.contains(name))
    }

    async fn files_for_base_name(&self, base_name: &str, location: Location) -> Result<Vec<String>> {
        let names = self.load_index(location).await?.bucket(base_name).to_vec();
        debug!(base_name = %base_name, location = %location, count = names.len(), "Resolved base name bucket");
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascr_common::ErrorKind;
    use serde_json::json;

    fn store(dir: &tempfile::TempDir) -> FileRecordStore {
        FileRecordStore::new(dir.path(), NamingScheme::default(), IdentityRule::default())
    }

    fn sample(name: &str) -> Value {
        json!({"cell_line": [{"hpscreg_name": name}], "content": "test content"})
    }

    #[tokio::test]
    async fn test_create_writes_body_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.create("TestCell001_v0", &sample("TestCell001"), Location::Ready).await.unwrap();

        assert!(dir.path().join("ready/records/TestCell001_v0.json").exists());
        let index: Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("ready/index.json")).unwrap())
                .unwrap();
        assert_eq!(index, json!({"TestCell001": ["TestCell001_v0"]}));
    }

    #[tokio::test]
    async fn test_index_is_authoritative_for_presence() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        // A body on disk without an index entry is invisible
        let stray = dir.path().join("working/records");
        std::fs::create_dir_all(&stray).unwrap();
        std::fs::write(stray.join("Stray.json"), b"{}").unwrap();

        assert!(!store.exists("Stray", Location::Working).await.unwrap());
        assert!(store.get("Stray", Location::Working).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_indexed_but_missing_body_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.create("Cell", &sample("Cell"), Location::Working).await.unwrap();
        std::fs::remove_file(dir.path().join("working/records/Cell.json")).unwrap();

        assert!(store.get("Cell", Location::Working).await.unwrap().is_none());
        // Delete still clears the dangling index entry
        store.delete("Cell", Location::Working).await.unwrap();
        assert!(!store.exists("Cell", Location::Working).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_index_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        std::fs::create_dir_all(dir.path().join("ready")).unwrap();
        std::fs::write(dir.path().join("ready/index.json"), b"[not json").unwrap();

        assert!(store.list(Location::Ready).await.unwrap().is_empty());
        store.create("Cell_v0", &sample("Cell"), Location::Ready).await.unwrap();
        assert_eq!(store.list(Location::Ready).await.unwrap(), vec!["Cell_v0"]);
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let err = store
            .create("../escape", &sample("Cell"), Location::Working)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
