//! Intent repository
//!
//! Handles all database operations related to deployment intents. The
//! mutable JSONB columns (parsed, resolved_variables, plan, execution_log)
//! round-trip through the domain types' serde representations.
//!
//! `update` deliberately does not write `cancel_requested`: that flag is
//! owned by the service layer, and the worker only ever reads it, so a
//! worker persisting a stale in-memory copy cannot erase a cancel.

use std::str::FromStr;

use deckhand_core::domain::blueprint::Platform;
use deckhand_core::domain::intent::{DeploymentIntent, IntentStatus};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create(pool: &PgPool, intent: &DeploymentIntent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO intents (
            id, raw_command, application, status, platform, namespace,
            parsed, resolved_variables, plan, execution_log,
            retry_count, cancel_requested, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(intent.id)
    .bind(&intent.raw_command)
    .bind(&intent.application)
    .bind(intent.status.as_str())
    .bind(intent.platform.to_string())
    .bind(&intent.namespace)
    .bind(serde_json::to_value(&intent.parsed).unwrap())
    .bind(serde_json::to_value(&intent.resolved_variables).unwrap())
    .bind(serde_json::to_value(&intent.plan).unwrap())
    .bind(serde_json::to_value(&intent.execution_log).unwrap())
    .bind(intent.retry_count as i32)
    .bind(intent.cancel_requested)
    .bind(intent.created_at)
    .bind(intent.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<DeploymentIntent>, sqlx::Error> {
    let row = sqlx::query_as::<_, IntentRow>(
        r#"
        SELECT id, raw_command, application, status, platform, namespace,
               parsed, resolved_variables, plan, execution_log,
               retry_count, cancel_requested, created_at, updated_at
        FROM intents
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<DeploymentIntent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, IntentRow>(
        r#"
        SELECT id, raw_command, application, status, platform, namespace,
               parsed, resolved_variables, plan, execution_log,
               retry_count, cancel_requested, created_at, updated_at
        FROM intents
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn find_by_status(
    pool: &PgPool,
    status: IntentStatus,
) -> Result<Vec<DeploymentIntent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, IntentRow>(
        r#"
        SELECT id, raw_command, application, status, platform, namespace,
               parsed, resolved_variables, plan, execution_log,
               retry_count, cancel_requested, created_at, updated_at
        FROM intents
        WHERE status = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Intents that were in flight when the process stopped; re-driven at
/// startup.
pub async fn find_resumable(pool: &PgPool) -> Result<Vec<DeploymentIntent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, IntentRow>(
        r#"
        SELECT id, raw_command, application, status, platform, namespace,
               parsed, resolved_variables, plan, execution_log,
               retry_count, cancel_requested, created_at, updated_at
        FROM intents
        WHERE status NOT IN ('completed', 'failed', 'cancelled')
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Active (non-terminal) intents targeting the given application.
pub async fn count_active_by_application(
    pool: &PgPool,
    application: &str,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM intents
        WHERE application = $1
          AND status NOT IN ('completed', 'failed', 'cancelled')
        "#,
    )
    .bind(application)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Persist the worker-mutable fields of an intent.
pub async fn update(pool: &PgPool, intent: &DeploymentIntent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE intents
        SET status = $1, platform = $2, application = $3, parsed = $4,
            resolved_variables = $5, plan = $6, execution_log = $7,
            retry_count = $8, updated_at = $9
        WHERE id = $10
        "#,
    )
    .bind(intent.status.as_str())
    .bind(intent.platform.to_string())
    .bind(&intent.application)
    .bind(serde_json::to_value(&intent.parsed).unwrap())
    .bind(serde_json::to_value(&intent.resolved_variables).unwrap())
    .bind(serde_json::to_value(&intent.plan).unwrap())
    .bind(serde_json::to_value(&intent.execution_log).unwrap())
    .bind(intent.retry_count as i32)
    .bind(chrono::Utc::now())
    .bind(intent.id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_cancel_requested(
    pool: &PgPool,
    id: Uuid,
    requested: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE intents SET cancel_requested = $1, updated_at = $2 WHERE id = $3")
        .bind(requested)
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// The worker's between-steps cancellation probe.
pub async fn cancel_state(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<(IntentStatus, bool)>, sqlx::Error> {
    let row: Option<(String, bool)> =
        sqlx::query_as("SELECT status, cancel_requested FROM intents WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(status, requested)| {
        let status = IntentStatus::from_str(&status).unwrap_or(IntentStatus::Failed);
        (status, requested)
    }))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct IntentRow {
    id: Uuid,
    raw_command: String,
    application: String,
    status: String,
    platform: String,
    namespace: String,
    parsed: serde_json::Value,
    resolved_variables: serde_json::Value,
    plan: serde_json::Value,
    execution_log: serde_json::Value,
    retry_count: i32,
    cancel_requested: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<IntentRow> for DeploymentIntent {
    fn from(row: IntentRow) -> Self {
        DeploymentIntent {
            id: row.id,
            raw_command: row.raw_command,
            application: row.application,
            status: IntentStatus::from_str(&row.status).unwrap_or(IntentStatus::Failed),
            platform: Platform::from_str(&row.platform).unwrap_or(Platform::Kubernetes),
            namespace: row.namespace,
            parsed: serde_json::from_value(row.parsed).unwrap_or_default(),
            resolved_variables: serde_json::from_value(row.resolved_variables)
                .unwrap_or_default(),
            plan: serde_json::from_value(row.plan).unwrap_or_default(),
            execution_log: serde_json::from_value(row.execution_log).unwrap_or_default(),
            retry_count: row.retry_count as u32,
            cancel_requested: row.cancel_requested,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
