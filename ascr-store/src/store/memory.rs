//! In-process record store
//!
//! Same semantics as the filesystem store, without a filesystem. Failures can
//! be injected per operation and location to exercise multi-step transfers.

use super::{LocationIndex, RecordStore};
use crate::naming::NamingScheme;
use crate::record::{validate_name, IdentityRule, Location, StoredRecord, WriteOutcome};
use ascr_common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailingOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct LocationState {
    index: LocationIndex,
    bodies: HashMap<String, (Value, DateTime<Utc>)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    locations: HashMap<Location, LocationState>,
    failures: HashSet<(FailingOperation, Location)>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
    naming: NamingScheme,
    identity: IdentityRule,
}

impl MemoryRecordStore {
    pub fn new(naming: NamingScheme, identity: IdentityRule) -> Self {
        Self {
            state: Arc::default(),
            naming,
            identity,
        }
    }

    /// Make every `operation` against `location` fail with an I/O error
    pub fn inject_failure(&self, operation: FailingOperation, location: Location) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert((operation, location));
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.clear();
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    fn check_failure(state: &MemoryState, operation: FailingOperation, location: Location) -> Result<()> {
        if state.failures.contains(&(operation, location)) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected {:?} failure in {}", operation, location),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, name: &str, data: &Value, location: Location) -> Result<()> {
        validate_name(name)?;
        self.identity.identify(data)?;

        let mut state = self.lock()?;
        Self::check_failure(&state, FailingOperation::Create, location)?;
        let slot = state.locations.entry(location).or_default();
        if slot.index.contains(name) {
            return Err(Error::AlreadyExists(format!(
                "'{}' already exists in {}",
                name, location
            )));
        }
        slot.bodies.insert(name.to_string(), (data.clone(), Utc::now()));
        slot.index.insert(&self.naming.extract_base_name(name), name);
        Ok(())
    }

    async fn get(&self, name: &str, location: Location) -> Result<Option<StoredRecord>> {
        let state = self.lock()?;
        let Some(slot) = state.locations.get(&location) else {
            return Ok(None);
        };
        if !slot.index.contains(name) {
            return Ok(None);
        }
        Ok(slot.bodies.get(name).map(|(data, modified)| StoredRecord {
            name: name.to_string(),
            location,
            data: data.clone(),
            last_modified: *modified,
        }))
    }

    async fn update(&self, name: &str, data: &Value, location: Location) -> Result<WriteOutcome> {
        validate_name(name)?;
        self.identity.identify(data)?;

        let mut state = self.lock()?;
        Self::check_failure(&state, FailingOperation::Update, location)?;
        let slot = state.locations.entry(location).or_default();
        let existed = slot.index.contains(name);
        slot.bodies.insert(name.to_string(), (data.clone(), Utc::now()));
        if existed {
            Ok(WriteOutcome::Updated)
        } else {
            slot.index.insert(&self.naming.extract_base_name(name), name);
            Ok(WriteOutcome::Created)
        }
    }

    async fn delete(&self, name: &str, location: Location) -> Result<()> {
        let mut state = self.lock()?;
        Self::check_failure(&state, FailingOperation::Delete, location)?;
        let removed = state
            .locations
            .get_mut(&location)
            .map(|slot| {
                slot.bodies.remove(name);
                slot.index.remove(name)
            })
            .unwrap_or(false);
        if !removed {
            return Err(Error::NotFound(format!("'{}' not found in {}", name, location)));
        }
        Ok(())
    }

    async fn list(&self, location: Location) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .locations
            .get(&location)
            .map(|slot| slot.index.names())
            .unwrap_or_default())
    }

    async fn exists(&self, name: &str, location: Location) -> Result<bool> {
        let state = self.lock()?;
        Ok(state
            .locations
            .get(&location)
            .is_some_and(|slot| slot.index.contains(name)))
    }

    async fn files_for_base_name(&self, base_name: &str, location: Location) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .locations
            .get(&location)
            .map(|slot| slot.index.bucket(base_name).to_vec())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascr_common::ErrorKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_injected_failure_and_clear() {
        let store = MemoryRecordStore::default();
        let doc = json!({"cell_line": [{"hpscreg_name": "Cell"}]});
        store.create("Cell", &doc, Location::Working).await.unwrap();

        store.inject_failure(FailingOperation::Delete, Location::Working);
        let err = store.delete("Cell", Location::Working).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(store.exists("Cell", Location::Working).await.unwrap());

        store.clear_failures();
        store.delete("Cell", Location::Working).await.unwrap();
        assert!(!store.exists("Cell", Location::Working).await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryRecordStore::default();
        let other = store.clone();
        let doc = json!({"cell_line": [{"hpscreg_name": "Cell"}]});
        store.create("Cell_v0", &doc, Location::Ready).await.unwrap();
        assert_eq!(other.files_for_base_name("Cell", Location::Ready).await.unwrap(), vec!["Cell_v0"]);
    }
}
