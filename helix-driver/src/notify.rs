//! Terminal-status notification
//!
//! One message per run invocation, sent after artifacts are uploaded. The
//! send is best-effort: the dispatcher waits for the transport's terminal
//! delivery status, but a delivery failure is logged and never propagates —
//! the run's recorded status is the source of truth, the email is advisory.

use std::sync::Arc;

use async_trait::async_trait;
use helix_azure::AzureError;
use helix_azure::email::{EmailClient, EmailMessage};
use helix_core::domain::run::{PipelineRun, RunStatus};
use tracing::{error, info};

use crate::config::{BLOB_CONTAINER, DriverConfig};

/// Send seam, implemented by the email client in production and by recording
/// fakes in tests.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), AzureError>;
}

#[async_trait]
impl EmailSender for EmailClient {
    async fn send(&self, message: &EmailMessage) -> Result<(), AzureError> {
        self.send_and_wait(message).await
    }
}

pub struct NotificationDispatcher {
    sender: Arc<dyn EmailSender>,
    base_subject: String,
    sender_address: String,
    recipient_address: String,
    webapp_host: String,
    storage_account_name: String,
}

impl NotificationDispatcher {
    pub fn new(sender: Arc<dyn EmailSender>, config: &DriverConfig) -> Self {
        Self {
            sender,
            base_subject: config.email_subject.clone(),
            sender_address: config.email_sender.clone(),
            recipient_address: config.email_receiver.clone(),
            webapp_host: config.webapp_host.clone(),
            storage_account_name: config.storage_account_name.clone(),
        }
    }

    /// `"<base subject> - <run name> - <status>"`
    fn subject(&self, run_name: &str, status: RunStatus) -> String {
        format!("{} - {} - {}", self.base_subject, run_name, status)
    }

    fn success_body(&self, run: &PipelineRun) -> String {
        format!(
            "Nextflow Pipeline Run {run_name} Succeeded.\n\
             Please refer to the web app at {host}/{run_id}/{run_name} for details.\n\
             Result files are available in the storage account under the path: \
             {account}/{container}/{output_path}.",
            run_name = run.run_name,
            host = self.webapp_host,
            run_id = run.id,
            account = self.storage_account_name,
            container = BLOB_CONTAINER,
            output_path = run.output_folder_path,
        )
    }

    fn failure_body(&self, run: &PipelineRun, error_text: &str) -> String {
        format!(
            "Nextflow Pipeline Run {} Failed with error:\n{}\n",
            run.run_name, error_text
        )
    }

    /// Composes the outcome message and sends it, returning whether delivery
    /// succeeded. Delivery errors are logged only.
    pub async fn notify(&self, run: &PipelineRun, error_text: Option<&str>) -> bool {
        let body = match error_text {
            None => self.success_body(run),
            Some(detail) => self.failure_body(run, detail),
        };
        let message = EmailMessage {
            sender_address: self.sender_address.clone(),
            recipient_address: self.recipient_address.clone(),
            subject: self.subject(&run.run_name, run.status),
            plain_text: body,
        };

        match self.sender.send(&message).await {
            Ok(()) => {
                info!(run_name = %run.run_name, status = %run.status, "notification sent");
                true
            }
            Err(e) => {
                error!(run_name = %run.run_name, "failed to send notification: {e}");
                false
            }
        }
    }
}
