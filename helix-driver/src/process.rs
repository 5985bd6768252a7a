//! Pipeline subprocess execution
//!
//! Commands are built as program + argument vectors and handed to
//! `tokio::process::Command` directly; nothing is ever interpolated into a
//! shell line, so secret values and run parameters cannot break out of their
//! argument position.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::DriverConfig;
use crate::error::RunError;
use crate::secrets::RunSecrets;

/// How many trailing bytes of stderr are kept for the failure notification.
const STDERR_TAIL_BYTES: usize = 4096;

/// A subprocess invocation, built as data.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Suppresses argument logging for invocations that carry secret values.
    pub sensitive: bool,
}

impl CommandSpec {
    fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            sensitive: false,
        }
    }

    /// `nextflow secrets set <name> <value>` for each required secret.
    pub fn secret_installs(secrets: &RunSecrets) -> Vec<CommandSpec> {
        let mut specs = vec![
            Self::secret_set("storageAccountKey", &secrets.storage_account_key),
            Self::secret_set("batchAccountKey", &secrets.batch_account_key),
        ];
        if let Some(acr_password) = &secrets.acr_password {
            specs.push(Self::secret_set("acrPassword", acr_password));
        }
        specs
    }

    fn secret_set(name: &str, value: &str) -> CommandSpec {
        let mut spec = Self::new(
            "nextflow",
            vec![
                "secrets".to_string(),
                "set".to_string(),
                name.to_string(),
                value.to_string(),
            ],
        );
        spec.sensitive = true;
        spec
    }

    /// The main engine invocation:
    /// `nextflow -C nextflow.config run -w <work> main.nf -with-timeline
    ///  --samples_file <sheet> --outdir <output>`.
    pub fn nextflow_run(config: &DriverConfig) -> CommandSpec {
        Self::new(
            "nextflow",
            vec![
                "-C".to_string(),
                "nextflow.config".to_string(),
                "run".to_string(),
                "-w".to_string(),
                config.work_dir.clone(),
                "main.nf".to_string(),
                "-with-timeline".to_string(),
                "--samples_file".to_string(),
                config.sample_sheet_path.display().to_string(),
                "--outdir".to_string(),
                config.output_path.clone(),
            ],
        )
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Maps a nonzero exit to the execution error carried into the failure
    /// notification.
    pub fn into_result(self) -> Result<(), RunError> {
        if self.success() {
            Ok(())
        } else {
            Err(RunError::Execution {
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs the command to completion, blocking for however long it takes.
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, RunError>;
}

/// Production runner: spawns the engine binary and waits.
pub struct NextflowRunner;

#[async_trait]
impl ProcessRunner for NextflowRunner {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, RunError> {
        if command.sensitive {
            info!(program = %command.program, "running subprocess (arguments redacted)");
        } else {
            info!(program = %command.program, args = ?command.args, "running subprocess");
        }

        let output = Command::new(&command.program)
            .args(&command.args)
            .output()
            .await?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_BYTES);

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(program = %command.program, "subprocess stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!(program = %command.program, "subprocess stderr: {}", stderr.trim());
        }

        Ok(ProcessOutput { exit_code, stderr })
    }
}

fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
