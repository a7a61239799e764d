//! Task progress tracker
//!
//! Sole writer of task state. Each mutation is persisted in one transaction
//! and then handed to the publisher; a failed publish is logged, never
//! returned. Updates addressed to an unknown (or expired) task are silent
//! no-ops so a late worker racing with expiry cannot fail.

use crate::db::{self, retry_on_lock};
use crate::models::{PurgeSummary, Stage, Task};
use crate::publisher::ProgressPublisher;
use ascr_common::config::TaskSettings;
use ascr_common::events::{AscrEvent, StageStatus, TaskStatus};
use ascr_common::time::{expiry_millis, now};
use ascr_common::{Error, Result};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct TaskProgressTracker {
    pool: SqlitePool,
    settings: TaskSettings,
    publisher: Arc<dyn ProgressPublisher>,
}

impl TaskProgressTracker {
    /// Wrap `pool`, creating the task tables if needed
    pub async fn open(
        pool: SqlitePool,
        settings: TaskSettings,
        publisher: Arc<dyn ProgressPublisher>,
    ) -> Result<Self> {
        db::create_task_tables(&pool).await?;
        Ok(Self {
            pool,
            settings,
            publisher,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn settings(&self) -> &TaskSettings {
        &self.settings
    }

    fn publish(&self, event: AscrEvent) {
        let task_id = event.task_id().to_string();
        if let Err(e) = self.publisher.publish(event) {
            warn!(task_id = %task_id, "Failed to publish progress event: {}", e);
        }
    }

    /// Register a new task as queued with no stages
    ///
    /// An existing task with the same id is reset. `payload`, when given, is
    /// kept for [`Self::get_payload`] under the shorter payload retention.
    pub async fn create_task(&self, task_id: &str, label: &str, payload: Option<&[u8]>) -> Result<()> {
        retry_on_lock("create_task", self.settings.max_lock_wait_ms, move || {
            self.create_task_once(task_id, label, payload)
        })
        .await?;

        info!(task_id = %task_id, label = %label, retained_payload = payload.is_some(), "Created task");
        Ok(())
    }

    async fn create_task_once(&self, task_id: &str, label: &str, payload: Option<&[u8]>) -> Result<()> {
        let created = now();
        let expires_at = expiry_millis(created, self.settings.retention());

        let mut tx = self.pool.begin().await?;
        db::tasks::insert_task(&mut tx, task_id, label, created, expires_at).await?;
        db::tasks::save_stages(&mut tx, task_id, &[], expires_at).await?;
        match payload {
            Some(bytes) => {
                let payload_expires_at = expiry_millis(created, self.settings.payload_retention());
                db::tasks::save_payload(&mut tx, task_id, bytes, payload_expires_at).await?;
            }
            None => {
                db::tasks::delete_payload(&mut tx, task_id).await?;
            }
        }
        db::tasks::register_recency(&mut tx, task_id, created.timestamp_millis()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Insert or update the stage named `stage`, then publish it
    ///
    /// `data` replaces the stored stage data only when given; a new stage
    /// without data gets `{}`.
    pub async fn update_stage(
        &self,
        task_id: &str,
        stage: &str,
        status: StageStatus,
        message: &str,
        data: Option<Value>,
    ) -> Result<()> {
        let data = data.as_ref();
        let updated = retry_on_lock("update_stage", self.settings.max_lock_wait_ms, move || {
            self.update_stage_once(task_id, stage, status, message, data)
        })
        .await?;

        let Some(stage_entry) = updated else {
            debug!(task_id = %task_id, stage = %stage, "Stage update for unknown task ignored");
            return Ok(());
        };

        info!(task_id = %task_id, stage = %stage, status = %status, "{}", message);
        self.publish(AscrEvent::TaskProgress {
            task_id: task_id.to_string(),
            stage: stage_entry.name,
            status: stage_entry.status,
            message: stage_entry.message,
            data: stage_entry.data,
            timestamp: stage_entry.timestamp,
        });
        Ok(())
    }

    async fn update_stage_once(
        &self,
        task_id: &str,
        stage: &str,
        status: StageStatus,
        message: &str,
        data: Option<&Value>,
    ) -> Result<Option<Stage>> {
        let updated_at = now();
        let now_ms = updated_at.timestamp_millis();
        let expires_at = expiry_millis(updated_at, self.settings.retention());

        let mut tx = self.pool.begin().await?;
        if !db::tasks::touch_task(&mut tx, task_id, updated_at, expires_at).await? {
            return Ok(None);
        }

        let mut stages = db::tasks::load_stages(&mut tx, task_id, now_ms)
            .await?
            .unwrap_or_default();
        let index = match stages.iter().position(|s| s.name == stage) {
            Some(index) => {
                let entry = &mut stages[index];
                entry.status = status;
                entry.message = message.to_string();
                entry.timestamp = updated_at;
                if let Some(data) = data {
                    entry.data = data.clone();
                }
                index
            }
            None => {
                stages.push(Stage {
                    name: stage.to_string(),
                    status,
                    message: message.to_string(),
                    data: data.cloned().unwrap_or_else(|| json!({})),
                    timestamp: updated_at,
                });
                stages.len() - 1
            }
        };
        db::tasks::save_stages(&mut tx, task_id, &stages, expires_at).await?;
        tx.commit().await?;

        Ok(Some(stages.swap_remove(index)))
    }

    /// Set the overall status; `error`/`result` are stored only when given
    pub async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<&str>,
        result: Option<&Value>,
    ) -> Result<()> {
        let updated = retry_on_lock("update_status", self.settings.max_lock_wait_ms, move || {
            self.update_status_once(task_id, status, error, result)
        })
        .await?;

        if !updated {
            debug!(task_id = %task_id, status = %status, "Status update for unknown task ignored");
            return Ok(());
        }

        info!(task_id = %task_id, status = %status, "Task status updated");
        self.publish(AscrEvent::TaskStatusChanged {
            task_id: task_id.to_string(),
            status,
            error: error.map(str::to_string),
            timestamp: now(),
        });
        Ok(())
    }

    async fn update_status_once(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<&str>,
        result: Option<&Value>,
    ) -> Result<bool> {
        let updated_at = now();
        let expires_at = expiry_millis(updated_at, self.settings.retention());

        let mut tx = self.pool.begin().await?;
        let updated =
            db::tasks::set_status(&mut tx, task_id, status, error, result, updated_at, expires_at).await?;
        if updated {
            db::tasks::refresh_stage_expiry(&mut tx, task_id, expires_at).await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// Tell subscribers a worker is done with a task, whatever the outcome
    pub fn announce_completion(&self, task_id: &str, label: &str, result: &Value) {
        self.publish(AscrEvent::TaskCompleted {
            task_id: task_id.to_string(),
            label: label.to_string(),
            result: result.clone(),
            timestamp: now(),
        });
    }

    /// Metadata merged with stages; `None` for unknown or expired ids
    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let now_ms = now().timestamp_millis();
        let mut conn = self.pool.acquire().await?;

        let Some(mut task) = db::tasks::load_task(&mut conn, task_id, now_ms).await? else {
            return Ok(None);
        };
        task.stages = db::tasks::load_stages(&mut conn, task_id, now_ms)
            .await?
            .unwrap_or_default();
        Ok(Some(task))
    }

    /// Like [`Self::get_task`], but an unknown id is `NotFound`
    pub async fn require_task(&self, task_id: &str) -> Result<Task> {
        self.get_task(task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task '{}' not found", task_id)))
    }

    /// Up to `limit` live tasks, most recently created first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Task>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let ids = {
            let mut conn = self.pool.acquire().await?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            db::tasks::recent_task_ids(&mut conn, limit, now().timestamp_millis()).await?
        };

        let mut tasks = Vec::with_capacity(ids.len());
        for task_id in ids {
            match self.get_task(&task_id).await? {
                Some(task) => tasks.push(task),
                None => debug!(task_id = %task_id, "Skipping task that expired while listing"),
            }
        }
        Ok(tasks)
    }

    /// Retained input of a task, if still within its retention
    pub async fn get_payload(&self, task_id: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.pool.acquire().await?;
        db::tasks::load_payload(&mut conn, task_id, now().timestamp_millis()).await
    }

    /// Remove a task and everything stored for it
    ///
    /// Returns whether a live task existed. Leftover rows of an expired task
    /// are removed as well.
    pub async fn delete_task(&self, task_id: &str) -> Result<bool> {
        let existed = retry_on_lock("delete_task", self.settings.max_lock_wait_ms, move || {
            self.delete_task_once(task_id)
        })
        .await?;

        if existed {
            info!(task_id = %task_id, "Deleted task");
        } else {
            debug!(task_id = %task_id, "Delete of unknown task");
        }
        Ok(existed)
    }

    async fn delete_task_once(&self, task_id: &str) -> Result<bool> {
        let now_ms = now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let existed = db::tasks::load_task(&mut tx, task_id, now_ms).await?.is_some();
        db::tasks::delete_task_rows(&mut tx, task_id).await?;
        tx.commit().await?;
        Ok(existed)
    }

    /// Physically remove expired rows
    pub async fn purge_expired(&self) -> Result<PurgeSummary> {
        let summary = retry_on_lock("purge_expired", self.settings.max_lock_wait_ms, move || async move {
            let mut tx = self.pool.begin().await?;
            let summary = db::tasks::purge_expired(&mut tx, now().timestamp_millis()).await?;
            tx.commit().await?;
            Ok(summary)
        })
        .await?;

        if summary.total() > 0 {
            info!(
                metadata = summary.metadata,
                stages = summary.stages,
                payloads = summary.payloads,
                recency = summary.recency,
                "Purged expired task rows"
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascr_common::db::init_memory_database;
    use ascr_common::events::EventBus;
    use ascr_common::ErrorKind;

    async fn tracker(bus: &EventBus) -> TaskProgressTracker {
        let pool = init_memory_database().await.unwrap();
        TaskProgressTracker::open(pool, TaskSettings::default(), Arc::new(bus.clone()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_stage_publishes_progress() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let tracker = tracker(&bus).await;

        tracker.create_task("t1", "f.pdf", None).await.unwrap();
        tracker
            .update_stage("t1", "upload", StageStatus::Processing, "uploading", Some(json!({"bytes": 10})))
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            AscrEvent::TaskProgress { task_id, stage, status, data, .. } => {
                assert_eq!(task_id, "t1");
                assert_eq!(stage, "upload");
                assert_eq!(status, StageStatus::Processing);
                assert_eq!(data, json!({"bytes": 10}));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stage_data_kept_when_update_has_none() {
        let bus = EventBus::new(16);
        let tracker = tracker(&bus).await;
        tracker.create_task("t1", "f.pdf", None).await.unwrap();

        tracker
            .update_stage("t1", "curation", StageStatus::Processing, "curating", Some(json!({"n": 1})))
            .await
            .unwrap();
        tracker
            .update_stage("t1", "curation", StageStatus::Completed, "done", None)
            .await
            .unwrap();
        tracker
            .update_stage("t1", "saving", StageStatus::Pending, "waiting", None)
            .await
            .unwrap();

        let task = tracker.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.stage("curation").unwrap().data, json!({"n": 1}));
        assert_eq!(task.stage("curation").unwrap().status, StageStatus::Completed);
        assert_eq!(task.stage("saving").unwrap().data, json!({}));
    }

    #[tokio::test]
    async fn test_updates_for_unknown_task_are_silent() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let tracker = tracker(&bus).await;

        tracker
            .update_stage("ghost", "upload", StageStatus::Processing, "x", None)
            .await
            .unwrap();
        tracker
            .update_status("ghost", TaskStatus::Failed, Some("late"), None)
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
        assert!(tracker.get_task("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_require_task_not_found() {
        let bus = EventBus::new(16);
        let tracker = tracker(&bus).await;
        let err = tracker.require_task("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
