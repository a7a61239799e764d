//! Storage capability interface and backends
//!
//! Every backend offers the same operations; the version controller and the
//! transport orchestrator only ever see `dyn RecordStore`.

mod file;
mod index;
mod memory;

pub use file::FileRecordStore;
pub use index::LocationIndex;
pub use memory::{FailingOperation, MemoryRecordStore};

use crate::record::{Location, StoredRecord, WriteOutcome};
use ascr_common::Result;
use async_trait::async_trait;
use serde_json::Value;

/// CRUD over a location-partitioned key space with a per-location index
///
/// Presence is decided by the index, never by probing record bodies.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record; `AlreadyExists` if `name` is indexed in `location`,
    /// `Validation` if the document has no identifying field
    async fn create(&self, name: &str, data: &Value, location: Location) -> Result<()>;

    /// Record body and modification time, `None` if not indexed
    async fn get(&self, name: &str, location: Location) -> Result<Option<StoredRecord>>;

    /// Create or overwrite
    async fn update(&self, name: &str, data: &Value, location: Location) -> Result<WriteOutcome>;

    /// Remove body and index entry; `NotFound` if not indexed
    async fn delete(&self, name: &str, location: Location) -> Result<()>;

    /// Every concrete name in `location`
    async fn list(&self, location: Location) -> Result<Vec<String>>;

    async fn exists(&self, name: &str, location: Location) -> Result<bool>;

    /// Names sharing `base_name` in `location`, in insertion order
    async fn files_for_base_name(&self, base_name: &str, location: Location) -> Result<Vec<String>>;
}
