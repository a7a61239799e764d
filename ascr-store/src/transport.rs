//! Cross-location transfers: promote a draft, revert a published record
//!
//! Each transfer is create-then-delete. Once the create has landed the
//! transfer is committed; a failing delete leaves both copies in place and is
//! reported as [`Error::PartialCommit`]. Nothing is rolled back.

use crate::record::Location;
use crate::store::RecordStore;
use crate::version::VersionController;
use ascr_common::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of promoting a draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Promotion {
    pub base_name: String,
    pub version: u64,
    /// Name of the new record in "ready"
    pub name: String,
}

/// Outcome of reverting a published record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reversion {
    /// Name of the restored draft in "working"
    pub name: String,
}

pub struct TransportOrchestrator {
    store: Arc<dyn RecordStore>,
    versions: VersionController,
}

impl TransportOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, versions: VersionController) -> Self {
        Self { store, versions }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn versions(&self) -> &VersionController {
        &self.versions
    }

    /// Move `working_name` to "ready" under the next free version of its base
    ///
    /// Concurrent promotions of one base name may pick the same version.
    /// The later create then fails with `AlreadyExists` and its draft stays
    /// in "working"; a published version is never overwritten. Serialize
    /// promotions per base name if every draft must land in one pass.
    pub async fn promote(&self, working_name: &str) -> Result<Promotion> {
        if !self.store.exists(working_name, Location::Working).await? {
            return Err(Error::NotFound(format!(
                "'{}' not found in {}",
                working_name,
                Location::Working
            )));
        }

        let base_name = self.versions.extract_base_name(working_name);
        let existing = self.versions.all_versions(self.store.as_ref(), &base_name).await?;
        let version = self.versions.next_version(&existing);
        let versioned_name = self.versions.build_versioned_name(&base_name, version);

        let record = self
            .store
            .get(working_name, Location::Working)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("'{}' could not be read from {}", working_name, Location::Working))
            })?;

        if let Err(e) = self
            .store
            .create(&versioned_name, &record.data, Location::Ready)
            .await
        {
            error!(record = %working_name, promoted_as = %versioned_name, "Promotion failed: {}", e);
            return Err(e);
        }

        if let Err(e) = self.store.delete(working_name, Location::Working).await {
            error!(
                record = %working_name,
                promoted_as = %versioned_name,
                "Promoted but draft could not be removed: {}", e
            );
            return Err(Error::partial_commit(
                format!("{} -> {}/{}", working_name, Location::Ready, versioned_name),
                e,
            ));
        }

        info!(record = %working_name, promoted_as = %versioned_name, version, "Promoted draft");
        Ok(Promotion {
            base_name,
            version,
            name: versioned_name,
        })
    }

    /// Move `ready_name` back to "working" under the same name
    pub async fn revert(&self, ready_name: &str) -> Result<Reversion> {
        if !self.store.exists(ready_name, Location::Ready).await? {
            return Err(Error::NotFound(format!(
                "'{}' not found in {}",
                ready_name,
                Location::Ready
            )));
        }
        if self.store.exists(ready_name, Location::Working).await? {
            return Err(Error::Conflict(format!(
                "'{}' already exists in {}",
                ready_name,
                Location::Working
            )));
        }

        let record = self
            .store
            .get(ready_name, Location::Ready)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("'{}' could not be read from {}", ready_name, Location::Ready))
            })?;

        if let Err(e) = self
            .store
            .create(ready_name, &record.data, Location::Working)
            .await
        {
            error!(record = %ready_name, "Revert failed: {}", e);
            return Err(e);
        }

        if let Err(e) = self.store.delete(ready_name, Location::Ready).await {
            error!(record = %ready_name, "Reverted but published copy could not be removed: {}", e);
            return Err(Error::partial_commit(
                format!("{} -> {}/{}", ready_name, Location::Working, ready_name),
                e,
            ));
        }

        info!(record = %ready_name, "Reverted published record to draft");
        Ok(Reversion {
            name: ready_name.to_string(),
        })
    }
}
