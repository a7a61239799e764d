//! Integration tests for the task progress tracker

use ascr_common::config::TaskSettings;
use ascr_common::db::{init_database, init_memory_database};
use ascr_common::events::{AscrEvent, EventBus, StageStatus, TaskStatus};
use ascr_tasks::{ProgressPublisher, PublishError, TaskProgressTracker};
use serde_json::json;
use std::sync::Arc;

/// Test helper: tracker over an in-memory database
async fn create_tracker(settings: TaskSettings) -> (TaskProgressTracker, EventBus) {
    let bus = EventBus::new(64);
    let pool = init_memory_database()
        .await
        .expect("Failed to create in-memory database");
    let tracker = TaskProgressTracker::open(pool, settings, Arc::new(bus.clone()))
        .await
        .expect("Failed to open tracker");
    (tracker, bus)
}

#[tokio::test]
async fn test_new_task_is_queued_without_stages() {
    let (tracker, _bus) = create_tracker(TaskSettings::default()).await;

    tracker.create_task("t1", "f.pdf", None).await.unwrap();

    let task = tracker.get_task("t1").await.unwrap().unwrap();
    assert_eq!(task.task_id, "t1");
    assert_eq!(task.label, "f.pdf");
    assert_eq!(task.status, TaskStatus::Queued);
    assert!(task.stages.is_empty());
    assert!(task.result.is_none());
    assert!(task.error.is_none());
}

#[tokio::test]
async fn test_stage_upsert_by_name() {
    let (tracker, _bus) = create_tracker(TaskSettings::default()).await;
    tracker.create_task("t1", "f.pdf", None).await.unwrap();

    tracker
        .update_stage("t1", "upload", StageStatus::Processing, "uploading", None)
        .await
        .unwrap();
    tracker
        .update_stage("t1", "upload", StageStatus::Completed, "done", None)
        .await
        .unwrap();

    let task = tracker.get_task("t1").await.unwrap().unwrap();
    assert_eq!(task.stages.len(), 1);
    assert_eq!(task.stages[0].name, "upload");
    assert_eq!(task.stages[0].status, StageStatus::Completed);
    assert_eq!(task.stages[0].message, "done");
    assert!(task.updated_at >= task.created_at);
}

#[tokio::test]
async fn test_stages_keep_insertion_order() {
    let (tracker, _bus) = create_tracker(TaskSettings::default()).await;
    tracker.create_task("t1", "f.pdf", None).await.unwrap();

    for stage in ["upload", "curation", "saving"] {
        tracker
            .update_stage("t1", stage, StageStatus::Processing, stage, None)
            .await
            .unwrap();
    }
    tracker
        .update_stage("t1", "upload", StageStatus::Completed, "done", None)
        .await
        .unwrap();

    let task = tracker.get_task("t1").await.unwrap().unwrap();
    let names: Vec<&str> = task.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["upload", "curation", "saving"]);
}

#[tokio::test]
async fn test_list_recent_most_recent_first() {
    let (tracker, _bus) = create_tracker(TaskSettings::default()).await;
    for id in ["t1", "t2", "t3", "t4"] {
        tracker.create_task(id, "f.pdf", None).await.unwrap();
    }

    let recent = tracker.list_recent(3).await.unwrap();
    let ids: Vec<&str> = recent.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(ids, vec!["t4", "t3", "t2"]);

    assert_eq!(tracker.list_recent(10).await.unwrap().len(), 4);
    assert!(tracker.list_recent(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recreating_task_resets_it() {
    let (tracker, _bus) = create_tracker(TaskSettings::default()).await;
    tracker.create_task("t1", "first.pdf", Some(b"old".as_slice())).await.unwrap();
    tracker
        .update_stage("t1", "upload", StageStatus::Completed, "done", None)
        .await
        .unwrap();
    tracker.create_task("t2", "other.pdf", None).await.unwrap();

    tracker.create_task("t1", "second.pdf", None).await.unwrap();

    let task = tracker.get_task("t1").await.unwrap().unwrap();
    assert_eq!(task.label, "second.pdf");
    assert!(task.stages.is_empty());
    assert!(tracker.get_payload("t1").await.unwrap().is_none());

    let recent = tracker.list_recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].task_id, "t1");
}

#[tokio::test]
async fn test_status_result_and_error() {
    let (tracker, _bus) = create_tracker(TaskSettings::default()).await;
    tracker.create_task("t1", "f.pdf", None).await.unwrap();

    tracker
        .update_status("t1", TaskStatus::Failed, Some("pipeline unreachable"), None)
        .await
        .unwrap();
    tracker
        .update_status("t1", TaskStatus::Completed, None, Some(&json!({"saved": 2})))
        .await
        .unwrap();

    let task = tracker.get_task("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result, Some(json!({"saved": 2})));
    // An earlier error is kept unless replaced
    assert_eq!(task.error.as_deref(), Some("pipeline unreachable"));
}

#[tokio::test]
async fn test_status_change_is_published() {
    let (tracker, bus) = create_tracker(TaskSettings::default()).await;
    let mut rx = bus.subscribe();
    tracker.create_task("t1", "f.pdf", None).await.unwrap();

    tracker
        .update_status("t1", TaskStatus::Processing, None, None)
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        AscrEvent::TaskStatusChanged { task_id, status, error, .. } => {
            assert_eq!(task_id, "t1");
            assert_eq!(status, TaskStatus::Processing);
            assert!(error.is_none());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_delete_task() {
    let (tracker, _bus) = create_tracker(TaskSettings::default()).await;
    assert!(!tracker.delete_task("unknown").await.unwrap());

    tracker.create_task("t1", "f.pdf", Some(b"%PDF-1.4".as_slice())).await.unwrap();
    tracker
        .update_stage("t1", "upload", StageStatus::Completed, "done", None)
        .await
        .unwrap();

    assert!(tracker.delete_task("t1").await.unwrap());
    assert!(tracker.get_task("t1").await.unwrap().is_none());
    assert!(tracker.get_payload("t1").await.unwrap().is_none());
    assert!(tracker.list_recent(10).await.unwrap().is_empty());
    assert!(!tracker.delete_task("t1").await.unwrap());
}

#[tokio::test]
async fn test_payload_retained_for_retry() {
    let (tracker, _bus) = create_tracker(TaskSettings::default()).await;
    tracker.create_task("t1", "f.pdf", Some(b"%PDF-1.4".as_slice())).await.unwrap();
    tracker.create_task("t2", "g.pdf", None).await.unwrap();

    assert_eq!(tracker.get_payload("t1").await.unwrap(), Some(b"%PDF-1.4".to_vec()));
    assert_eq!(tracker.get_payload("t2").await.unwrap(), None);
}

#[tokio::test]
async fn test_payload_expires_before_metadata() {
    let settings = TaskSettings {
        payload_retention_secs: 0,
        ..TaskSettings::default()
    };
    let (tracker, _bus) = create_tracker(settings).await;
    tracker.create_task("t1", "f.pdf", Some(b"bytes".as_slice())).await.unwrap();

    assert!(tracker.get_task("t1").await.unwrap().is_some());
    assert!(tracker.get_payload("t1").await.unwrap().is_none());

    let summary = tracker.purge_expired().await.unwrap();
    assert_eq!(summary.payloads, 1);
    assert_eq!(summary.metadata, 0);
}

#[tokio::test]
async fn test_expired_tasks_are_invisible_and_purged() {
    let settings = TaskSettings {
        retention_secs: 0,
        ..TaskSettings::default()
    };
    let (tracker, bus) = create_tracker(settings).await;
    let mut rx = bus.subscribe();
    tracker.create_task("t1", "f.pdf", None).await.unwrap();

    assert!(tracker.get_task("t1").await.unwrap().is_none());
    assert!(tracker.list_recent(10).await.unwrap().is_empty());

    // Updates racing with expiry are ignored
    tracker
        .update_stage("t1", "upload", StageStatus::Processing, "late", None)
        .await
        .unwrap();
    assert!(rx.try_recv().is_err());

    let summary = tracker.purge_expired().await.unwrap();
    assert_eq!(summary.metadata, 1);
    assert_eq!(summary.stages, 1);
    assert_eq!(summary.recency, 1);
    assert_eq!(tracker.purge_expired().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_tasks_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tasks.db");

    {
        let pool = init_database(&db_path).await.unwrap();
        let tracker = TaskProgressTracker::open(pool.clone(), TaskSettings::default(), Arc::new(EventBus::new(4)))
            .await
            .unwrap();
        tracker.create_task("t1", "f.pdf", None).await.unwrap();
        tracker
            .update_stage("t1", "upload", StageStatus::Completed, "done", None)
            .await
            .unwrap();
        pool.close().await;
    }

    let pool = init_database(&db_path).await.unwrap();
    let tracker = TaskProgressTracker::open(pool, TaskSettings::default(), Arc::new(EventBus::new(4)))
        .await
        .unwrap();
    let task = tracker.require_task("t1").await.unwrap();
    assert_eq!(task.stages.len(), 1);
}

/// Publisher that refuses every event
struct ClosedPublisher;

impl ProgressPublisher for ClosedPublisher {
    fn publish(&self, _event: AscrEvent) -> Result<(), PublishError> {
        Err(PublishError::Closed)
    }
}

#[tokio::test]
async fn test_publish_failure_does_not_fail_updates() {
    let pool = init_memory_database().await.unwrap();
    let tracker = TaskProgressTracker::open(pool, TaskSettings::default(), Arc::new(ClosedPublisher))
        .await
        .unwrap();
    tracker.create_task("t1", "f.pdf", None).await.unwrap();

    tracker
        .update_stage("t1", "upload", StageStatus::Completed, "done", None)
        .await
        .unwrap();
    tracker
        .update_status("t1", TaskStatus::Completed, None, None)
        .await
        .unwrap();

    let task = tracker.require_task("t1").await.unwrap();
    assert_eq!(task.stages.len(), 1);
    assert_eq!(task.stages[0].status, StageStatus::Completed);
    assert_eq!(task.status, TaskStatus::Completed);
}
