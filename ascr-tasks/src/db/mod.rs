//! Task persistence
//!
//! Four tables, each keyed by task id and carrying its own `expires_at`
//! (milliseconds since the Unix epoch). A row whose `expires_at` has passed is
//! invisible to reads and removed by the next purge.
//!
//! - `task_metadata`: label, status, result, error, timestamps
//! - `task_stages`: the stage list as one JSON array
//! - `task_payloads`: retained input for retry (shorter retention)
//! - `task_recency`: creation-time ordered index used for listing

mod retry;
pub mod tasks;

pub use retry::retry_on_lock;

use ascr_common::Result;
use sqlx::SqlitePool;

/// Create the tracker tables if they don't exist
pub async fn create_task_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_metadata (
            task_id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            status TEXT NOT NULL,
            result TEXT,
            error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_stages (
            task_id TEXT PRIMARY KEY,
            stages TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_payloads (
            task_id TEXT PRIMARY KEY,
            payload BLOB NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // seq breaks ties between tasks created in the same millisecond
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_recency (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL UNIQUE,
            score INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_recency_score ON task_recency(score DESC, seq DESC)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_metadata_expires ON task_metadata(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}
