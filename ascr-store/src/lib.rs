//! # ASCR Record Store
//!
//! Versioned lifecycle storage for curated records:
//! - [`RecordStore`]: CRUD over location-partitioned records with a persisted
//!   per-location index ([`FileRecordStore`], [`MemoryRecordStore`])
//! - [`VersionController`]: pure versioning policy over record names
//! - [`TransportOrchestrator`]: promote drafts to versioned published records
//!   and revert published records back to drafts
//!
//! Index updates are serialized within one process only. Concurrent
//! promotions of the same base name, in one process or several, can pick the
//! same version; the losing promotion fails with `AlreadyExists` and keeps its
//! draft. Callers needing every promotion to succeed must serialize
//! promotions per base name themselves.

pub mod naming;
pub mod record;
pub mod store;
pub mod transport;
pub mod version;

pub use naming::NamingScheme;
pub use record::{IdentityRule, Location, StoredRecord, WriteOutcome};
pub use store::{FailingOperation, FileRecordStore, LocationIndex, MemoryRecordStore, RecordStore};
pub use transport::{Promotion, Reversion, TransportOrchestrator};
pub use version::{LatestVersion, VersionController};
