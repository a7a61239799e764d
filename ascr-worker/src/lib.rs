//! # ASCR Curation Worker
//!
//! Runs uploaded articles through the external curation pipeline, tracking
//! each job as a task and saving the curated records as drafts.

pub mod job;
pub mod pipeline;

pub use job::{CurationWorker, SaveStatus, SaveSummary, SavedRecord};
pub use pipeline::{CurationInput, CurationOutcome, CurationPipeline, HttpCurationPipeline};
