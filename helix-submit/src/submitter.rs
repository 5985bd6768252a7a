//! Batch job submission
//!
//! Creates one job and one task per run. The job terminates itself when the
//! task completes, and the task carries everything the in-container driver
//! needs to self-locate as environment settings.

use std::sync::Arc;

use async_trait::async_trait;
use helix_azure::AzureError;
use helix_azure::batch::{
    AutoUserScope, BatchClient, ContainerSpec, ElevationLevel, JobSpec, ResourceFileSpec,
    TaskSpec, UserIdentitySpec,
};
use tracing::info;
use uuid::Uuid;

use crate::config::{ASSET_CONTAINER, SubmitConfig};
use crate::error::SubmitError;

/// Remote scheduler job identifier limit.
pub const MAX_JOB_ID_LEN: usize = 60;

/// Submission seam, implemented by the batch client in production and by
/// recording fakes in tests.
#[async_trait]
pub trait BatchApi: Send + Sync {
    async fn add_job(&self, job: &JobSpec) -> Result<(), AzureError>;
    async fn add_task(&self, job_id: &str, task: &TaskSpec) -> Result<(), AzureError>;
}

#[async_trait]
impl BatchApi for BatchClient {
    async fn add_job(&self, job: &JobSpec) -> Result<(), AzureError> {
        BatchClient::add_job(self, job).await
    }

    async fn add_task(&self, job_id: &str, task: &TaskSpec) -> Result<(), AzureError> {
        BatchClient::add_task(self, job_id, task).await
    }
}

/// Builds the job identifier: `<run_name>-<uuid>`, capped at
/// [`MAX_JOB_ID_LEN`]. When the cap is exceeded, characters are dropped from
/// the left (the name side) so the uniqueness-bearing uuid suffix always
/// survives intact.
pub fn build_job_id(run_name: &str, suffix: Uuid) -> String {
    let id = format!("{run_name}-{suffix}");
    if id.len() <= MAX_JOB_ID_LEN {
        return id;
    }
    let mut start = id.len() - MAX_JOB_ID_LEN;
    while !id.is_char_boundary(start) {
        start += 1;
    }
    id[start..].to_string()
}

pub struct JobSubmitter {
    batch: Arc<dyn BatchApi>,
    config: SubmitConfig,
}

impl JobSubmitter {
    pub fn new(batch: Arc<dyn BatchApi>, config: SubmitConfig) -> Self {
        Self { batch, config }
    }

    /// Creates the remote job and its single task, returning the
    /// `(job_id, task_id)` pair. No local state is retained.
    pub async fn submit(
        &self,
        run_name: &str,
        output_path: &str,
        run_id: &str,
    ) -> Result<(String, String), SubmitError> {
        let job_id = build_job_id(run_name, Uuid::new_v4());
        info!(%job_id, run_name, "submitting batch job");

        let job = JobSpec {
            id: job_id.clone(),
            display_name: run_name.to_string(),
            pool_id: self.config.pool_id.clone(),
            terminate_on_all_tasks_complete: true,
        };
        self.batch
            .add_job(&job)
            .await
            .map_err(SubmitError::Submission)?;
        info!(%job_id, "created batch job");

        let task = self.build_task(run_name, output_path, run_id);
        self.batch
            .add_task(&job_id, &task)
            .await
            .map_err(SubmitError::Submission)?;
        info!(%job_id, task_id = %task.id, "added task to batch job");

        Ok((job_id, task.id))
    }

    fn build_task(&self, run_name: &str, output_path: &str, run_id: &str) -> TaskSpec {
        let env = |name: &str, value: &str| (name.to_string(), value.to_string());

        TaskSpec {
            id: run_name.to_string(),
            command: vec![
                "/bin/bash".to_string(),
                "-c".to_string(),
                "helix-driver".to_string(),
            ],
            container: ContainerSpec {
                image_name: self.config.container_image.clone(),
                registry_server: self.config.registry_server().to_string(),
                identity_resource_id: self.config.managed_identity_resource_id.clone(),
            },
            identity: UserIdentitySpec {
                elevation_level: ElevationLevel::Admin,
                scope: AutoUserScope::Pool,
            },
            environment: vec![
                env("OUTPUT_PATH", output_path),
                env("RUN_NAME", run_name),
                env("PIPELINE_RUN_ID", run_id),
                env("STORAGE_ACCOUNT_NAME", &self.config.storage_account_name),
                env(
                    "AUTOSTORAGE_ACCOUNT_NAME",
                    &self.config.autostorage_account_name,
                ),
                env("KEYVAULT_NAME", &self.config.keyvault_name),
                env("BATCH_ACCOUNT_NAME", &self.config.batch_account_name),
            ],
            resource_files: vec![ResourceFileSpec {
                auto_storage_container_name: ASSET_CONTAINER.to_string(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use std::sync::Mutex;

    struct RecordingBatch {
        jobs: Mutex<Vec<JobSpec>>,
        tasks: Mutex<Vec<(String, TaskSpec)>>,
    }

    impl RecordingBatch {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                jobs: Mutex::new(Vec::new()),
                tasks: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl BatchApi for RecordingBatch {
        async fn add_job(&self, job: &JobSpec) -> Result<(), AzureError> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(())
        }

        async fn add_task(&self, job_id: &str, task: &TaskSpec) -> Result<(), AzureError> {
            self.tasks
                .lock()
                .unwrap()
                .push((job_id.to_string(), task.clone()));
            Ok(())
        }
    }

    #[test]
    fn test_short_name_keeps_full_id() {
        let suffix = Uuid::new_v4();
        let id = build_job_id("RUN001", suffix);
        assert_eq!(id, format!("RUN001-{suffix}"));
        assert!(id.len() <= MAX_JOB_ID_LEN);
    }

    #[test]
    fn test_long_name_truncated_to_limit_with_suffix_intact() {
        let suffix = Uuid::new_v4();
        let id = build_job_id(&"a".repeat(80), suffix);
        assert_eq!(id.len(), MAX_JOB_ID_LEN);
        assert!(
            id.ends_with(&suffix.to_string()),
            "uniqueness suffix must survive truncation"
        );
        assert!(id.starts_with('a'));
    }

    #[test]
    fn test_job_id_never_exceeds_limit() {
        for len in [0, 1, 23, 24, 59, 60, 61, 200] {
            let id = build_job_id(&"n".repeat(len), Uuid::new_v4());
            assert!(id.len() <= MAX_JOB_ID_LEN, "name length {len}");
        }
    }

    #[tokio::test]
    async fn test_submit_creates_job_then_task() {
        let batch = RecordingBatch::new();
        let submitter = JobSubmitter::new(batch.clone(), test_config());

        let (job_id, task_id) = submitter
            .submit("RUN001", "az://nextflow/webapp-runs/RUN001", "run-uuid")
            .await
            .unwrap();

        let jobs = batch.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job_id);
        assert_eq!(jobs[0].display_name, "RUN001");
        assert!(jobs[0].terminate_on_all_tasks_complete);
        assert_eq!(jobs[0].pool_id, "genomics-pool");

        let tasks = batch.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].0, job_id);
        assert_eq!(tasks[0].1.id, task_id);
        assert_eq!(task_id, "RUN001");
    }

    #[tokio::test]
    async fn test_task_environment_carries_driver_configuration() {
        let batch = RecordingBatch::new();
        let submitter = JobSubmitter::new(batch.clone(), test_config());

        submitter
            .submit("RUN001", "az://nextflow/webapp-runs/RUN001", "run-uuid")
            .await
            .unwrap();

        let tasks = batch.tasks.lock().unwrap();
        let task = &tasks[0].1;

        let names: Vec<&str> = task.environment.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "OUTPUT_PATH",
                "RUN_NAME",
                "PIPELINE_RUN_ID",
                "STORAGE_ACCOUNT_NAME",
                "AUTOSTORAGE_ACCOUNT_NAME",
                "KEYVAULT_NAME",
                "BATCH_ACCOUNT_NAME",
            ]
        );

        assert_eq!(task.identity.elevation_level, ElevationLevel::Admin);
        assert_eq!(task.identity.scope, AutoUserScope::Pool);
        assert_eq!(task.resource_files.len(), 1);
        assert_eq!(task.resource_files[0].auto_storage_container_name, "nextflow");
    }
}
