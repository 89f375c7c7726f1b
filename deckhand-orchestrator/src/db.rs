use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create intents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS intents (
            id UUID PRIMARY KEY,
            raw_command TEXT NOT NULL,
            application VARCHAR(255) NOT NULL,
            status VARCHAR(50) NOT NULL,
            platform VARCHAR(50) NOT NULL,
            namespace VARCHAR(255) NOT NULL,
            parsed JSONB NOT NULL DEFAULT 'null',
            resolved_variables JSONB NOT NULL DEFAULT '{}',
            plan JSONB NOT NULL DEFAULT '[]',
            execution_log JSONB NOT NULL DEFAULT '[]',
            retry_count INTEGER NOT NULL DEFAULT 0,
            cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create generated-secret table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS intent_secrets (
            intent_id UUID NOT NULL REFERENCES intents(id) ON DELETE CASCADE,
            secret_key VARCHAR(255) NOT NULL,
            secret_value TEXT NOT NULL,
            PRIMARY KEY (intent_id, secret_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_intents_status ON intents(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_intents_application ON intents(application, status)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_intents_created_at ON intents(created_at DESC)")
        .execute(pool)
        .await?;

    // At most one active install/update per application name; the service
    // checks first, this enforces it against races.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_intents_active_application
        ON intents(application)
        WHERE status NOT IN ('completed', 'failed', 'cancelled')
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
