//! # ASCR Task Tracking
//!
//! Persists the state of long-running curation jobs in SQLite and publishes
//! every transition to live subscribers.
//!
//! Retention mirrors an expiring key-value store: task metadata, stage lists
//! and retained payloads each carry their own expiry, and expired rows are
//! invisible to reads until [`TaskProgressTracker::purge_expired`] removes
//! them.

pub mod db;
pub mod models;
pub mod publisher;
pub mod tracker;

pub use models::{PurgeSummary, Stage, Task};
pub use publisher::{ProgressPublisher, PublishError, PublisherSet, RelayPublisher};
pub use tracker::TaskProgressTracker;
