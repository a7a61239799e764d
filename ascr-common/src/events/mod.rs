//! Event types for the ASCR event system
//!
//! Provides shared event definitions and the EventBus used to push task
//! progress to live subscribers.

mod task_types;

pub use task_types::{StageStatus, TaskStatus};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// ASCR event types
///
/// Events are broadcast via EventBus and can be serialized for SSE or relayed
/// as JSON. Delivery is best effort: a subscriber that connects after an event
/// was published never sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AscrEvent {
    /// A stage of a task was inserted or updated
    TaskProgress {
        task_id: String,
        stage: String,
        status: StageStatus,
        message: String,
        /// Stage payload, `{}` when the stage carries none
        data: serde_json::Value,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Overall task status changed
    TaskStatusChanged {
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Worker finished a task (successfully or not)
    TaskCompleted {
        task_id: String,
        /// Label the task was created with (uploaded file name)
        label: String,
        result: serde_json::Value,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl AscrEvent {
    /// Event type name (SSE event field)
    pub fn event_type(&self) -> &str {
        match self {
            AscrEvent::TaskProgress { .. } => "task_progress",
            AscrEvent::TaskStatusChanged { .. } => "task_status_changed",
            AscrEvent::TaskCompleted { .. } => "task_completed",
        }
    }

    /// Task this event refers to
    pub fn task_id(&self) -> &str {
        match self {
            AscrEvent::TaskProgress { task_id, .. }
            | AscrEvent::TaskStatusChanged { task_id, .. }
            | AscrEvent::TaskCompleted { task_id, .. } => task_id,
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use ascr_common::events::{AscrEvent, EventBus, TaskStatus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(AscrEvent::TaskStatusChanged {
///     task_id: "t1".to_string(),
///     status: TaskStatus::Processing,
///     error: None,
///     timestamp: chrono::Utc::now(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "task_status_changed");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AscrEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for that subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AscrEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: AscrEvent) -> Result<usize, broadcast::error::SendError<AscrEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AscrEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
