//! Curation job runner
//!
//! Drives one task through its stages:
//!
//! 1. `upload`: load the retained input
//! 2. `curation`: hand it to the pipeline
//! 3. `saving`: store every curated document as a draft in "working"
//!
//! Each stage transition goes through the tracker, which persists and
//! publishes it. A pipeline failure fails the task, not the runner.

use crate::pipeline::{CurationInput, CurationOutcome, CurationPipeline};
use ascr_common::events::{StageStatus, TaskStatus};
use ascr_common::uuid_utils::generate_task_id;
use ascr_common::{Error, ErrorKind, Result};
use ascr_store::{IdentityRule, Location, RecordStore};
use ascr_tasks::TaskProgressTracker;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const STAGE_UPLOAD: &str = "upload";
pub const STAGE_CURATION: &str = "curation";
pub const STAGE_SAVING: &str = "saving";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    Created,
    Updated,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedRecord {
    /// Record name, absent when the document had no identifier
    pub name: Option<String>,
    pub status: SaveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub total_saved: usize,
    pub save_errors: usize,
    pub records: Vec<SavedRecord>,
}

impl SaveSummary {
    fn push(&mut self, record: SavedRecord) {
        match record.status {
            SaveStatus::Created | SaveStatus::Updated => self.total_saved += 1,
            SaveStatus::Failed => self.save_errors += 1,
            SaveStatus::Skipped => {}
        }
        self.records.push(record);
    }
}

pub struct CurationWorker {
    tracker: Arc<TaskProgressTracker>,
    store: Arc<dyn RecordStore>,
    pipeline: Arc<dyn CurationPipeline>,
    identity: IdentityRule,
    instructions: String,
}

impl CurationWorker {
    pub fn new(
        tracker: Arc<TaskProgressTracker>,
        store: Arc<dyn RecordStore>,
        pipeline: Arc<dyn CurationPipeline>,
        identity: IdentityRule,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            store,
            pipeline,
            identity,
            instructions: instructions.into(),
        }
    }

    pub fn tracker(&self) -> &Arc<TaskProgressTracker> {
        &self.tracker
    }

    /// Queue a new task for `document`, retaining it for retry
    pub async fn submit(&self, label: &str, document: &[u8]) -> Result<String> {
        let task_id = generate_task_id();
        self.tracker.create_task(&task_id, label, Some(document)).await?;
        Ok(task_id)
    }

    /// Queue a fresh task from the retained input of `task_id`
    ///
    /// `NotFound` if the task or its retained input has expired.
    pub async fn retry(&self, task_id: &str) -> Result<String> {
        let task = self.tracker.require_task(task_id).await?;
        let document = self.tracker.get_payload(task_id).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "original input of task '{}' is no longer available, upload it again",
                task_id
            ))
        })?;

        let new_task_id = self.submit(&task.label, &document).await?;
        info!(task_id = %task_id, new_task_id = %new_task_id, "Retrying task");
        Ok(new_task_id)
    }

    /// Run a queued task to completion and return its result
    ///
    /// Errors are reserved for the tracker itself failing; anything that goes
    /// wrong with the job is recorded on the task.
    pub async fn run(&self, task_id: &str) -> Result<Value> {
        let task = self.tracker.require_task(task_id).await?;
        let label = task.label;
        self.tracker
            .update_status(task_id, TaskStatus::Processing, None, None)
            .await?;

        // upload
        self.tracker
            .update_stage(task_id, STAGE_UPLOAD, StageStatus::Processing, &format!("Reading {}", label), None)
            .await?;
        let Some(document) = self.tracker.get_payload(task_id).await? else {
            return self
                .fail(task_id, &label, STAGE_UPLOAD, "original input is no longer available")
                .await;
        };
        self.tracker
            .update_stage(
                task_id,
                STAGE_UPLOAD,
                StageStatus::Completed,
                &format!("Read {} bytes", document.len()),
                Some(json!({"bytes": document.len()})),
            )
            .await?;

        // curation
        self.tracker
            .update_stage(task_id, STAGE_CURATION, StageStatus::Processing, "Curating document", None)
            .await?;
        let input = CurationInput {
            label: label.clone(),
            document,
            instructions: self.instructions.clone(),
        };
        let documents = match self.pipeline.curate(&input).await {
            Ok(outcome @ CurationOutcome::Success { .. }) => outcome.documents(),
            Ok(CurationOutcome::Failed { errors }) => {
                let message = if errors.is_empty() {
                    "curation failed".to_string()
                } else {
                    errors.join("; ")
                };
                return self.fail(task_id, &label, STAGE_CURATION, &message).await;
            }
            Err(e) => {
                error!(task_id = %task_id, "Curation pipeline error: {}", e);
                return self
                    .fail(task_id, &label, STAGE_CURATION, &format!("curation pipeline error: {}", e))
                    .await;
            }
        };
        self.tracker
            .update_stage(
                task_id,
                STAGE_CURATION,
                StageStatus::Completed,
                &format!("Curated {} record(s)", documents.len()),
                Some(json!({"documents": documents.len()})),
            )
            .await?;

        // saving
        self.tracker
            .update_stage(task_id, STAGE_SAVING, StageStatus::Processing, "Saving drafts", None)
            .await?;
        let summary = self.save_records(&documents).await;
        let summary_json = serde_json::to_value(&summary)?;
        self.tracker
            .update_stage(
                task_id,
                STAGE_SAVING,
                StageStatus::Completed,
                &format!("Saved {} record(s), {} error(s)", summary.total_saved, summary.save_errors),
                Some(summary_json.clone()),
            )
            .await?;

        let result = json!({
            "status": "success",
            "label": label,
            "documents": documents.len(),
            "saved_files": summary_json,
        });
        self.tracker
            .update_status(task_id, TaskStatus::Completed, None, Some(&result))
            .await?;
        self.tracker.announce_completion(task_id, &label, &result);

        info!(task_id = %task_id, saved = summary.total_saved, errors = summary.save_errors, "Curation task completed");
        Ok(result)
    }

    async fn fail(&self, task_id: &str, label: &str, stage: &str, message: &str) -> Result<Value> {
        warn!(task_id = %task_id, stage = %stage, "Curation task failed: {}", message);
        self.tracker
            .update_stage(task_id, stage, StageStatus::Failed, message, None)
            .await?;
        self.tracker
            .update_status(task_id, TaskStatus::Failed, Some(message), None)
            .await?;

        let result = json!({
            "status": "error",
            "label": label,
            "error": message,
        });
        self.tracker.announce_completion(task_id, label, &result);
        Ok(result)
    }

    /// Store each document as a draft named after its identifier
    ///
    /// A name already in "working" is overwritten; documents without an
    /// identifier are skipped.
    pub async fn save_records(&self, documents: &[Value]) -> SaveSummary {
        let mut summary = SaveSummary::default();

        for document in documents {
            let name = match self.identity.identify(document) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Skipping curated document: {}", e);
                    summary.push(SavedRecord {
                        name: None,
                        status: SaveStatus::Skipped,
                        reason: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let status = match self.store.create(&name, document, Location::Working).await {
                Ok(()) => Ok(SaveStatus::Created),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => self
                    .store
                    .update(&name, document, Location::Working)
                    .await
                    .map(|_| SaveStatus::Updated),
                Err(e) => Err(e),
            };

            match status {
                Ok(status) => {
                    info!(record = %name, ?status, "Saved curated draft");
                    summary.push(SavedRecord {
                        name: Some(name),
                        status,
                        reason: None,
                    });
                }
                Err(e) => {
                    error!(record = %name, "Failed to save curated draft: {}", e);
                    summary.push(SavedRecord {
                        name: Some(name),
                        status: SaveStatus::Failed,
                        reason: Some(e.to_string()),
                    });
                }
            }
        }

        summary
    }
}
