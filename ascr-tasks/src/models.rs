//! Task tracker data models

use ascr_common::events::{StageStatus, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One named step of a task's progress
///
/// Stages are upserted by name; a task never holds two stages with the same
/// name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(rename = "stage")]
    pub name: String,
    pub status: StageStatus,
    pub message: String,
    /// Stage payload, `{}` when none was supplied
    #[serde(default = "empty_data")]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

fn empty_data() -> Value {
    Value::Object(Default::default())
}

/// Task metadata merged with its stage list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    /// Human-readable label, usually the uploaded file name
    pub label: String,
    pub status: TaskStatus,
    pub stages: Vec<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name == name)
    }
}

/// Rows removed by one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub metadata: u64,
    pub stages: u64,
    pub payloads: u64,
    pub recency: u64,
}

impl PurgeSummary {
    pub fn total(&self) -> u64 {
        self.metadata + self.stages + self.payloads + self.recency
    }
}
