use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id UUID PRIMARY KEY,
            run_name VARCHAR(255) NOT NULL,
            status VARCHAR(20) NOT NULL,
            create_dt TIMESTAMPTZ NOT NULL,
            start_dt TIMESTAMPTZ,
            end_dt TIMESTAMPTZ,
            output_folder_path TEXT NOT NULL,
            sample_sheet JSONB NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // run_id is a lookup-only back-reference, deliberately not a foreign
    // key: sample records must survive deletion of the run they point at.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            id UUID PRIMARY KEY,
            sample_id VARCHAR(255) NOT NULL,
            run_id UUID NOT NULL,
            barcode VARCHAR(64),
            status VARCHAR(20) NOT NULL,
            input_files TEXT NOT NULL,
            output_file TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pipeline_runs_run_name ON pipeline_runs(run_name)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_samples_run_id ON samples(run_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_samples_sample_id ON samples(sample_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
