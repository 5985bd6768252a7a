//! Postgres implementation of the record store
//!
//! All predicates are bound parameters; no query text is ever assembled from
//! caller input.

use async_trait::async_trait;
use helix_core::domain::run::{PipelineRun, RunStatus};
use helix_core::domain::sample::Sample;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::RunError;
use crate::repository::RunRecordStore;

pub struct PgRunRecordStore {
    pool: PgPool,
}

impl PgRunRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    run_name: String,
    status: String,
    create_dt: chrono::DateTime<chrono::Utc>,
    start_dt: Option<chrono::DateTime<chrono::Utc>>,
    end_dt: Option<chrono::DateTime<chrono::Utc>>,
    output_folder_path: String,
    sample_sheet: serde_json::Value,
}

impl TryFrom<RunRow> for PipelineRun {
    type Error = RunError;

    fn try_from(row: RunRow) -> Result<Self, RunError> {
        let status: RunStatus = row
            .status
            .parse()
            .map_err(|e| RunError::Decode(format!("run {}: {e}", row.id)))?;
        let sample_sheet = serde_json::from_value(row.sample_sheet)
            .map_err(|e| RunError::Decode(format!("run {} sample sheet: {e}", row.id)))?;

        Ok(PipelineRun {
            id: row.id,
            run_name: row.run_name,
            status,
            create_dt: row.create_dt,
            start_dt: row.start_dt,
            end_dt: row.end_dt,
            output_folder_path: row.output_folder_path,
            sample_sheet,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SampleRow {
    id: Uuid,
    sample_id: String,
    run_id: Uuid,
    barcode: Option<String>,
    status: String,
    input_files: String,
    output_file: String,
}

impl TryFrom<SampleRow> for Sample {
    type Error = RunError;

    fn try_from(row: SampleRow) -> Result<Self, RunError> {
        let status: RunStatus = row
            .status
            .parse()
            .map_err(|e| RunError::Decode(format!("sample {}: {e}", row.id)))?;

        Ok(Sample {
            id: row.id,
            sample_id: row.sample_id,
            run_id: row.run_id,
            barcode: row.barcode,
            status,
            input_files: row.input_files,
            output_file: row.output_file,
        })
    }
}

#[async_trait]
impl RunRecordStore for PgRunRecordStore {
    async fn find_run(&self, id: Uuid) -> Result<Option<PipelineRun>, RunError> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, run_name, status, create_dt, start_dt, end_dt,
                   output_folder_path, sample_sheet
            FROM pipeline_runs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PipelineRun::try_from).transpose()
    }

    async fn upsert_run(&self, run: &PipelineRun) -> Result<(), RunError> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs
                (id, run_name, status, create_dt, start_dt, end_dt,
                 output_folder_path, sample_sheet)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                run_name = EXCLUDED.run_name,
                status = EXCLUDED.status,
                create_dt = EXCLUDED.create_dt,
                start_dt = EXCLUDED.start_dt,
                end_dt = EXCLUDED.end_dt,
                output_folder_path = EXCLUDED.output_folder_path,
                sample_sheet = EXCLUDED.sample_sheet
            "#,
        )
        .bind(run.id)
        .bind(&run.run_name)
        .bind(run.status.as_str())
        .bind(run.create_dt)
        .bind(run.start_dt)
        .bind(run.end_dt)
        .bind(&run.output_folder_path)
        .bind(serde_json::to_value(&run.sample_sheet).map_err(|e| RunError::Decode(e.to_string()))?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_samples_by_run(&self, run_id: Uuid) -> Result<Vec<Sample>, RunError> {
        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT id, sample_id, run_id, barcode, status, input_files, output_file
            FROM samples
            WHERE run_id = $1
            ORDER BY sample_id ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Sample::try_from).collect()
    }

    async fn find_samples_by_sample_id(&self, sample_id: &str) -> Result<Vec<Sample>, RunError> {
        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT id, sample_id, run_id, barcode, status, input_files, output_file
            FROM samples
            WHERE sample_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(sample_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Sample::try_from).collect()
    }
}
