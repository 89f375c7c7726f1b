//! Generated-secret repository
//!
//! Durable keyed store for secrets issued during auto-wiring, scoped per
//! intent. Inserts never overwrite: once a secret is issued for a key it
//! stays stable across retries. Values are only ever read back into the
//! wiring stage; they are never logged or embedded in intent records.

use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

pub async fn load_for_intent(
    pool: &PgPool,
    intent_id: Uuid,
) -> Result<BTreeMap<String, String>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT secret_key, secret_value FROM intent_secrets WHERE intent_id = $1",
    )
    .bind(intent_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

pub async fn store_for_intent(
    pool: &PgPool,
    intent_id: Uuid,
    secrets: &BTreeMap<String, String>,
) -> Result<(), sqlx::Error> {
    for (key, value) in secrets {
        sqlx::query(
            r#"
            INSERT INTO intent_secrets (intent_id, secret_key, secret_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (intent_id, secret_key) DO NOTHING
            "#,
        )
        .bind(intent_id)
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    }

    Ok(())
}
