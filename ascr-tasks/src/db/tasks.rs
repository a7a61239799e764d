//! Task table queries
//!
//! Every function takes a bare connection so the tracker can run several of
//! them inside one transaction. Reads take the current time in milliseconds
//! and ignore rows that have expired by then.

use crate::models::{PurgeSummary, Stage, Task};
use ascr_common::events::TaskStatus;
use ascr_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqliteConnection};

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

/// Insert a fresh task, resetting any previous row with the same id
pub async fn insert_task(
    conn: &mut SqliteConnection,
    task_id: &str,
    label: &str,
    now: DateTime<Utc>,
    expires_at: i64,
) -> Result<()> {
    let now = now.to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO task_metadata (
            task_id, label, status, result, error, created_at, updated_at, expires_at
        ) VALUES (?, ?, ?, NULL, NULL, ?, ?, ?)
        ON CONFLICT(task_id) DO UPDATE SET
            label = excluded.label,
            status = excluded.status,
            result = NULL,
            error = NULL,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(task_id)
    .bind(label)
    .bind(TaskStatus::Queued.as_str())
    .bind(&now)
    .bind(&now)
    .bind(expires_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Live task metadata, stages left empty
pub async fn load_task(conn: &mut SqliteConnection, task_id: &str, now_ms: i64) -> Result<Option<Task>> {
    let row = sqlx::query(
        r#"
        SELECT task_id, label, status, result, error, created_at, updated_at
        FROM task_metadata
        WHERE task_id = ? AND expires_at > ?
        "#,
    )
    .bind(task_id)
    .bind(now_ms)
    .fetch_optional(conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.try_get("status")?;
    let status: TaskStatus = status
        .parse()
        .map_err(|e: String| Error::Internal(format!("Failed to parse status: {}", e)))?;

    let result: Option<String> = row.try_get("result")?;
    let result = result
        .map(|text| serde_json::from_str::<Value>(&text))
        .transpose()?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Some(Task {
        task_id: row.try_get("task_id")?,
        label: row.try_get("label")?,
        status,
        stages: Vec::new(),
        result,
        error: row.try_get("error")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    }))
}

/// Refresh `updated_at` and retention of a live task; false if none
pub async fn touch_task(
    conn: &mut SqliteConnection,
    task_id: &str,
    now: DateTime<Utc>,
    expires_at: i64,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE task_metadata SET updated_at = ?, expires_at = ? WHERE task_id = ? AND expires_at > ?",
    )
    .bind(now.to_rfc3339())
    .bind(expires_at)
    .bind(task_id)
    .bind(now.timestamp_millis())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Set the overall status of a live task; false if none
///
/// `error` and `result` only overwrite the stored values when given.
pub async fn set_status(
    conn: &mut SqliteConnection,
    task_id: &str,
    status: TaskStatus,
    error: Option<&str>,
    result: Option<&Value>,
    now: DateTime<Utc>,
    expires_at: i64,
) -> Result<bool> {
    let result = result.map(serde_json::to_string).transpose()?;
    let outcome = sqlx::query(
        r#"
        UPDATE task_metadata SET
            status = ?,
            error = COALESCE(?, error),
            result = COALESCE(?, result),
            updated_at = ?,
            expires_at = ?
        WHERE task_id = ? AND expires_at > ?
        "#,
    )
    .bind(status.as_str())
    .bind(error)
    .bind(result)
    .bind(now.to_rfc3339())
    .bind(expires_at)
    .bind(task_id)
    .bind(now.timestamp_millis())
    .execute(conn)
    .await?;
    Ok(outcome.rows_affected() > 0)
}

pub async fn save_stages(
    conn: &mut SqliteConnection,
    task_id: &str,
    stages: &[Stage],
    expires_at: i64,
) -> Result<()> {
    let stages = serde_json::to_string(stages)?;
    sqlx::query(
        r#"
        INSERT INTO task_stages (task_id, stages, expires_at) VALUES (?, ?, ?)
        ON CONFLICT(task_id) DO UPDATE SET
            stages = excluded.stages,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(task_id)
    .bind(stages)
    .bind(expires_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Live stage list; `None` if absent or expired
pub async fn load_stages(conn: &mut SqliteConnection, task_id: &str, now_ms: i64) -> Result<Option<Vec<Stage>>> {
    let stages: Option<String> =
        sqlx::query_scalar("SELECT stages FROM task_stages WHERE task_id = ? AND expires_at > ?")
            .bind(task_id)
            .bind(now_ms)
            .fetch_optional(conn)
            .await?;

    Ok(stages
        .map(|text| serde_json::from_str(&text))
        .transpose()?)
}

pub async fn refresh_stage_expiry(conn: &mut SqliteConnection, task_id: &str, expires_at: i64) -> Result<()> {
    sqlx::query("UPDATE task_stages SET expires_at = ? WHERE task_id = ?")
        .bind(expires_at)
        .bind(task_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn save_payload(
    conn: &mut SqliteConnection,
    task_id: &str,
    payload: &[u8],
    expires_at: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO task_payloads (task_id, payload, expires_at) VALUES (?, ?, ?)
        ON CONFLICT(task_id) DO UPDATE SET
            payload = excluded.payload,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(task_id)
    .bind(payload)
    .bind(expires_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn load_payload(conn: &mut SqliteConnection, task_id: &str, now_ms: i64) -> Result<Option<Vec<u8>>> {
    let payload: Option<Vec<u8>> =
        sqlx::query_scalar("SELECT payload FROM task_payloads WHERE task_id = ? AND expires_at > ?")
            .bind(task_id)
            .bind(now_ms)
            .fetch_optional(conn)
            .await?;
    Ok(payload)
}

pub async fn delete_payload(conn: &mut SqliteConnection, task_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM task_payloads WHERE task_id = ?")
        .bind(task_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Place `task_id` at the head of the recency index with the given score
pub async fn register_recency(conn: &mut SqliteConnection, task_id: &str, score: i64) -> Result<()> {
    sqlx::query("DELETE FROM task_recency WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO task_recency (task_id, score) VALUES (?, ?)")
        .bind(task_id)
        .bind(score)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Ids of live tasks, most recently created first
pub async fn recent_task_ids(conn: &mut SqliteConnection, limit: i64, now_ms: i64) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT r.task_id
        FROM task_recency r
        JOIN task_metadata m ON m.task_id = r.task_id
        WHERE m.expires_at > ?
        ORDER BY r.score DESC, r.seq DESC
        LIMIT ?
        "#,
    )
    .bind(now_ms)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// Remove every row of `task_id` from all four tables
pub async fn delete_task_rows(conn: &mut SqliteConnection, task_id: &str) -> Result<u64> {
    let mut removed = 0;
    for sql in [
        "DELETE FROM task_metadata WHERE task_id = ?",
        "DELETE FROM task_stages WHERE task_id = ?",
        "DELETE FROM task_payloads WHERE task_id = ?",
        "DELETE FROM task_recency WHERE task_id = ?",
    ] {
        removed += sqlx::query(sql)
            .bind(task_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    Ok(removed)
}

/// Physically remove expired rows and recency entries left without metadata
pub async fn purge_expired(conn: &mut SqliteConnection, now_ms: i64) -> Result<PurgeSummary> {
    let metadata = sqlx::query("DELETE FROM task_metadata WHERE expires_at <= ?")
        .bind(now_ms)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let stages = sqlx::query("DELETE FROM task_stages WHERE expires_at <= ?")
        .bind(now_ms)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let payloads = sqlx::query("DELETE FROM task_payloads WHERE expires_at <= ?")
        .bind(now_ms)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let recency = sqlx::query(
        "DELETE FROM task_recency WHERE task_id NOT IN (SELECT task_id FROM task_metadata)",
    )
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(PurgeSummary {
        metadata,
        stages,
        payloads,
        recency,
    })
}
