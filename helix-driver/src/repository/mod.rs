//! Record store access
//!
//! The [`RunRecordStore`] trait is the seam between the lifecycle controller
//! and the durable store: point lookups by identifier, equality-predicate
//! scans, and last-write-wins upserts over the `pipeline_runs` and `samples`
//! collections. The production implementation is Postgres via sqlx; tests
//! substitute an in-memory store.

mod pg;

pub use pg::PgRunRecordStore;

use async_trait::async_trait;
use helix_core::domain::run::PipelineRun;
use helix_core::domain::sample::Sample;
use uuid::Uuid;

use crate::error::RunError;

#[async_trait]
pub trait RunRecordStore: Send + Sync {
    /// Point lookup of a run by identifier.
    async fn find_run(&self, id: Uuid) -> Result<Option<PipelineRun>, RunError>;

    /// Upserts the run record by identifier. Last write wins.
    async fn upsert_run(&self, run: &PipelineRun) -> Result<(), RunError>;

    /// All samples enrolled under a run (equality scan on `run_id`).
    async fn find_samples_by_run(&self, run_id: Uuid) -> Result<Vec<Sample>, RunError>;

    /// Samples matching a sample identifier (equality scan on `sample_id`).
    async fn find_samples_by_sample_id(&self, sample_id: &str) -> Result<Vec<Sample>, RunError>;
}
