//! Run lifecycle controller
//!
//! The orchestrating state machine: resolve the run record, fetch secrets,
//! drive the pipeline subprocess, record exactly one terminal transition,
//! then unconditionally upload artifacts and dispatch exactly one
//! notification. Only failures before the run record is resolved may abort
//! without a status write; every later error still reaches the terminal
//! write and the finalization block.

use chrono::Utc;
use helix_core::domain::run::{PipelineRun, RunStatus};
use helix_core::sample_sheet::SampleSheet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactUploader;
use crate::config::DriverConfig;
use crate::error::RunError;
use crate::notify::NotificationDispatcher;
use crate::process::{CommandSpec, ProcessRunner};
use crate::repository::RunRecordStore;
use crate::secrets::SecretProvider;

/// Everything the controller drives, constructed once per process in `main`
/// and passed in explicitly. No module-level client state anywhere.
pub struct RunContext {
    pub store: Arc<dyn RunRecordStore>,
    pub secrets: Arc<dyn SecretProvider>,
    pub process: Arc<dyn ProcessRunner>,
    pub artifacts: ArtifactUploader,
    pub notifier: NotificationDispatcher,
    pub config: DriverConfig,
}

pub struct RunLifecycleController {
    ctx: RunContext,
}

impl RunLifecycleController {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    /// Drives one run to a terminal status.
    ///
    /// Returns the final status when orchestration completed (the pipeline
    /// itself may still have Failed); returns an error only for pre-flight
    /// failures (no matching record, store unreachable) or a failed terminal
    /// write.
    pub async fn run(&self) -> Result<RunStatus, RunError> {
        let run_id = self.ctx.config.pipeline_run_id;

        let mut run = self
            .ctx
            .store
            .find_run(run_id)
            .await?
            .ok_or(RunError::Lookup(run_id))?;

        info!(run_name = %run.run_name, %run_id, status = %run.status, "resolved run record");
        self.log_enrollment(&run).await;

        let result = self.execute(&mut run).await;

        // Exactly one terminal transition per invocation. A failed write is
        // remembered but must not skip finalization.
        let terminal = match &result {
            Ok(()) => RunStatus::Succeeded,
            Err(e) => {
                warn!(run_name = %run.run_name, "run failed: {e}");
                RunStatus::Failed
            }
        };
        let persisted = self.persist_terminal(&mut run, terminal).await;

        // Finalization fires on every path that resolved a record: artifact
        // upload first, then exactly one notification attempt. Neither can
        // alter the status already recorded.
        let report = self.ctx.artifacts.upload(&run.output_folder_path).await;
        debug!(?report, "artifact upload finished");

        let error_text = result.as_ref().err().map(|e| e.to_string());
        self.ctx.notifier.notify(&run, error_text.as_deref()).await;

        persisted?;
        Ok(run.status)
    }

    /// Steps 2-5 of the sequence: secrets, Started transition, subprocess.
    /// Any error here drives the run to Failed; a secret failure happens
    /// before Started, leaving `start_dt` unset.
    async fn execute(&self, run: &mut PipelineRun) -> Result<(), RunError> {
        let secrets = self.ctx.secrets.fetch().await?;

        for install in CommandSpec::secret_installs(&secrets) {
            self.ctx.process.run(&install).await?.into_result()?;
        }

        run.transition(RunStatus::Started, Utc::now())?;
        self.ctx.store.upsert_run(run).await?;
        info!(run_name = %run.run_name, "run started");

        let output = self
            .ctx
            .process
            .run(&CommandSpec::nextflow_run(&self.ctx.config))
            .await?;
        output.into_result()
    }

    async fn persist_terminal(
        &self,
        run: &mut PipelineRun,
        status: RunStatus,
    ) -> Result<(), RunError> {
        run.transition(status, Utc::now())?;
        self.ctx.store.upsert_run(run).await?;
        info!(run_name = %run.run_name, status = %status, "terminal status recorded");
        Ok(())
    }

    /// Cross-checks the local sample sheet against the enrolled records.
    /// Purely informational; mismatches are logged, never fatal.
    async fn log_enrollment(&self, run: &PipelineRun) {
        match self.ctx.store.find_samples_by_run(run.id).await {
            Ok(samples) => info!(count = samples.len(), "enrolled samples for run"),
            Err(e) => warn!("failed to list enrolled samples: {e}"),
        }

        match std::fs::read_to_string(&self.ctx.config.sample_sheet_path) {
            Ok(text) => match SampleSheet::parse(&text) {
                Ok(sheet) => {
                    if sheet.run_name() != run.run_name {
                        warn!(
                            sheet_run_name = sheet.run_name(),
                            record_run_name = %run.run_name,
                            "sample sheet run name differs from run record"
                        );
                    }
                }
                Err(e) => warn!("failed to parse sample sheet: {e}"),
            },
            Err(e) => warn!(
                path = %self.ctx.config.sample_sheet_path.display(),
                "failed to read sample sheet: {e}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::BlobStore;
    use crate::config::test_config;
    use crate::notify::EmailSender;
    use crate::process::ProcessOutput;
    use crate::secrets::RunSecrets;
    use async_trait::async_trait;
    use helix_azure::AzureError;
    use helix_azure::email::EmailMessage;
    use helix_core::domain::sample::Sample;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeStore {
        run: Mutex<Option<PipelineRun>>,
        /// Status observed at each upsert, in order.
        history: Mutex<Vec<RunStatus>>,
    }

    impl FakeStore {
        fn with_run(run: PipelineRun) -> Arc<Self> {
            Arc::new(Self {
                run: Mutex::new(Some(run)),
                history: Mutex::new(Vec::new()),
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self {
                run: Mutex::new(None),
                history: Mutex::new(Vec::new()),
            })
        }

        fn stored(&self) -> PipelineRun {
            self.run.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl RunRecordStore for FakeStore {
        async fn find_run(&self, id: Uuid) -> Result<Option<PipelineRun>, RunError> {
            Ok(self
                .run
                .lock()
                .unwrap()
                .clone()
                .filter(|r| r.id == id))
        }

        async fn upsert_run(&self, run: &PipelineRun) -> Result<(), RunError> {
            self.history.lock().unwrap().push(run.status);
            *self.run.lock().unwrap() = Some(run.clone());
            Ok(())
        }

        async fn find_samples_by_run(&self, _run_id: Uuid) -> Result<Vec<Sample>, RunError> {
            Ok(Vec::new())
        }

        async fn find_samples_by_sample_id(
            &self,
            _sample_id: &str,
        ) -> Result<Vec<Sample>, RunError> {
            Ok(Vec::new())
        }
    }

    struct FakeSecrets {
        missing: Option<&'static str>,
    }

    #[async_trait]
    impl SecretProvider for FakeSecrets {
        async fn fetch(&self) -> Result<RunSecrets, RunError> {
            if let Some(name) = self.missing {
                return Err(RunError::Secret {
                    name,
                    source: AzureError::api_error(404, "secret not found"),
                });
            }
            Ok(RunSecrets {
                storage_account_key: "sk".to_string(),
                batch_account_key: "bk".to_string(),
                acr_password: None,
            })
        }
    }

    struct FakeProcess {
        pipeline_exit: i32,
        pipeline_stderr: &'static str,
        calls: Mutex<Vec<CommandSpec>>,
    }

    #[async_trait]
    impl ProcessRunner for FakeProcess {
        async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, RunError> {
            self.calls.lock().unwrap().push(command.clone());
            if command.args.first().map(String::as_str) == Some("secrets") {
                return Ok(ProcessOutput {
                    exit_code: 0,
                    stderr: String::new(),
                });
            }
            Ok(ProcessOutput {
                exit_code: self.pipeline_exit,
                stderr: self.pipeline_stderr.to_string(),
            })
        }
    }

    struct FakeBlob {
        attempts: Mutex<Vec<String>>,
        fail_containing: Option<&'static str>,
    }

    #[async_trait]
    impl BlobStore for FakeBlob {
        async fn put_blob(&self, name: &str, _data: Vec<u8>) -> Result<(), AzureError> {
            self.attempts.lock().unwrap().push(name.to_string());
            if let Some(needle) = self.fail_containing {
                if name.contains(needle) {
                    return Err(AzureError::api_error(500, "storage unavailable"));
                }
            }
            Ok(())
        }
    }

    struct FakeEmail {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailSender for FakeEmail {
        async fn send(&self, message: &EmailMessage) -> Result<(), AzureError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct Harness {
        store: Arc<FakeStore>,
        process: Arc<FakeProcess>,
        blob: Arc<FakeBlob>,
        email: Arc<FakeEmail>,
        controller: RunLifecycleController,
        _dir: tempfile::TempDir,
    }

    fn harness(
        run_name: &str,
        store: Arc<FakeStore>,
        run_id: Uuid,
        secrets: FakeSecrets,
        pipeline_exit: i32,
        pipeline_stderr: &'static str,
        blob_fail: Option<&'static str>,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".nextflow.log"), "engine log").unwrap();
        std::fs::write(
            dir.path().join("sample_sheet.csv"),
            format!("Run_name,sample_id,input_file\n{run_name},S1,/data/S1.fastq.gz\n"),
        )
        .unwrap();

        let mut config = test_config();
        config.pipeline_run_id = run_id;
        config.sample_sheet_path = dir.path().join("sample_sheet.csv");
        config.engine_log_path = dir.path().join(".nextflow.log");

        let process = Arc::new(FakeProcess {
            pipeline_exit,
            pipeline_stderr,
            calls: Mutex::new(Vec::new()),
        });
        let blob = Arc::new(FakeBlob {
            attempts: Mutex::new(Vec::new()),
            fail_containing: blob_fail,
        });
        let email = Arc::new(FakeEmail {
            sent: Mutex::new(Vec::new()),
        });

        let artifacts = ArtifactUploader::new(
            blob.clone(),
            config.container_root(),
            config.engine_log_path.clone(),
            config.sample_sheet_path.clone(),
        );
        let notifier = NotificationDispatcher::new(email.clone(), &config);

        let controller = RunLifecycleController::new(RunContext {
            store: store.clone(),
            secrets: Arc::new(secrets),
            process: process.clone(),
            artifacts,
            notifier,
            config,
        });

        Harness {
            store,
            process,
            blob,
            email,
            controller,
            _dir: dir,
        }
    }

    fn created_run(run_name: &str) -> PipelineRun {
        PipelineRun {
            id: Uuid::new_v4(),
            run_name: run_name.to_string(),
            status: RunStatus::Created,
            create_dt: Utc::now(),
            start_dt: None,
            end_dt: None,
            output_folder_path: format!("az://nextflow/webapp-runs/{run_name}/pipeline-outputs"),
            sample_sheet: Vec::new(),
        }
    }

    fn assert_monotonic(history: &[RunStatus]) {
        let mut prev = RunStatus::Created;
        for &status in history {
            assert!(
                prev.can_transition_to(status),
                "observed illegal transition {prev} -> {status}"
            );
            prev = status;
        }
    }

    #[tokio::test]
    async fn test_successful_run_reaches_succeeded() {
        let run = created_run("RUN001");
        let run_id = run.id;
        let h = harness(
            "RUN001",
            FakeStore::with_run(run),
            run_id,
            FakeSecrets { missing: None },
            0,
            "",
            None,
        );

        let status = h.controller.run().await.unwrap();
        assert_eq!(status, RunStatus::Succeeded);

        let stored = h.store.stored();
        assert!(stored.start_dt.is_some());
        assert!(stored.end_dt.is_some());

        let history = h.store.history.lock().unwrap();
        assert_eq!(*history, vec![RunStatus::Started, RunStatus::Succeeded]);
        assert_monotonic(&history);

        let sent = h.email.sent.lock().unwrap();
        assert_eq!(sent.len(), 1, "exactly one notification per invocation");
        assert_eq!(sent[0].subject, "Nextflow Pipeline Report - RUN001 - Succeeded");
    }

    #[tokio::test]
    async fn test_failed_pipeline_embeds_stderr_in_notification() {
        let run = created_run("RUN002");
        let run_id = run.id;
        let h = harness(
            "RUN002",
            FakeStore::with_run(run),
            run_id,
            FakeSecrets { missing: None },
            1,
            "segfault",
            None,
        );

        let status = h.controller.run().await.unwrap();
        assert_eq!(status, RunStatus::Failed);

        let history = h.store.history.lock().unwrap();
        assert_eq!(*history, vec![RunStatus::Started, RunStatus::Failed]);

        let sent = h.email.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Nextflow Pipeline Report - RUN002 - Failed");
        assert!(sent[0].plain_text.contains("segfault"));
    }

    #[tokio::test]
    async fn test_missing_secret_fails_without_started() {
        let run = created_run("RUN003");
        let run_id = run.id;
        let h = harness(
            "RUN003",
            FakeStore::with_run(run),
            run_id,
            FakeSecrets {
                missing: Some("storage-account-key"),
            },
            0,
            "",
            None,
        );

        let status = h.controller.run().await.unwrap();
        assert_eq!(status, RunStatus::Failed);

        let stored = h.store.stored();
        assert!(stored.start_dt.is_none(), "run never started");
        assert!(stored.end_dt.is_some());

        // Created -> Failed directly, no Started write
        let history = h.store.history.lock().unwrap();
        assert_eq!(*history, vec![RunStatus::Failed]);
        assert_monotonic(&history);

        // no subprocess ever ran
        assert!(h.process.calls.lock().unwrap().is_empty());

        // artifacts and notification still fired
        assert_eq!(h.blob.attempts.lock().unwrap().len(), 2);
        let sent = h.email.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].plain_text.contains("storage-account-key"));
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_status_and_notification() {
        let run = created_run("RUN004");
        let run_id = run.id;
        let h = harness(
            "RUN004",
            FakeStore::with_run(run),
            run_id,
            FakeSecrets { missing: None },
            0,
            "",
            Some(".nextflow.log"),
        );

        let status = h.controller.run().await.unwrap();
        assert_eq!(status, RunStatus::Succeeded, "upload failure never alters status");

        // both uploads attempted despite the log failing
        let attempts = h.blob.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].ends_with(".nextflow.log"));
        assert!(attempts[1].ends_with("sample_sheet.csv"));

        assert_eq!(h.email.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_run_aborts_before_any_side_effect() {
        let run_id = Uuid::new_v4();
        let h = harness(
            "RUN005",
            FakeStore::empty(),
            run_id,
            FakeSecrets { missing: None },
            0,
            "",
            None,
        );

        let err = h.controller.run().await.unwrap_err();
        assert!(matches!(err, RunError::Lookup(id) if id == run_id));

        assert!(h.store.history.lock().unwrap().is_empty());
        assert!(h.blob.attempts.lock().unwrap().is_empty());
        assert!(h.email.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_attempted_exactly_once_per_invocation() {
        for (exit, missing) in [(0, None), (1, None), (0, Some("batch-account-key"))] {
            let run = created_run("RUN006");
            let run_id = run.id;
            let h = harness(
                "RUN006",
                FakeStore::with_run(run),
                run_id,
                FakeSecrets { missing },
                exit,
                "boom",
                None,
            );

            h.controller.run().await.unwrap();
            // one attempt for each of the two artifacts, regardless of path
            assert_eq!(h.blob.attempts.lock().unwrap().len(), 2);
            assert_eq!(h.email.sent.lock().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_secrets_installed_before_pipeline_runs() {
        let run = created_run("RUN007");
        let run_id = run.id;
        let h = harness(
            "RUN007",
            FakeStore::with_run(run),
            run_id,
            FakeSecrets { missing: None },
            0,
            "",
            None,
        );

        h.controller.run().await.unwrap();

        let calls = h.process.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].args[..2], ["secrets", "set"]);
        assert_eq!(calls[1].args[..2], ["secrets", "set"]);
        assert!(calls[0].sensitive && calls[1].sensitive);
        assert_eq!(calls[2].args[0], "-C");
    }
}
