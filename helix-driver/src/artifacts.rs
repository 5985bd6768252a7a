//! Artifact upload
//!
//! After termination the engine log and the resolved sample manifest are
//! pushed to blob storage under the run's output prefix. The two uploads are
//! independent: either can fail without blocking the other, and failures are
//! logged rather than propagated — they never alter the recorded run status
//! or suppress the notification.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use helix_azure::AzureError;
use helix_azure::blob::BlobClient;
use tracing::{info, warn};

/// Blob upload seam, implemented by the storage client in production and by
/// recording fakes in tests.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_blob(&self, name: &str, data: Vec<u8>) -> Result<(), AzureError>;
}

#[async_trait]
impl BlobStore for BlobClient {
    async fn put_blob(&self, name: &str, data: Vec<u8>) -> Result<(), AzureError> {
        BlobClient::put_blob(self, name, data).await
    }
}

/// Which of the two artifact uploads landed.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadReport {
    pub engine_log_uploaded: bool,
    pub sample_sheet_uploaded: bool,
}

pub struct ArtifactUploader {
    store: Arc<dyn BlobStore>,
    /// Prefix stripped from the output path to form blob names
    /// (e.g. "az://nextflow/").
    container_root: String,
    engine_log_path: PathBuf,
    sample_sheet_path: PathBuf,
}

impl ArtifactUploader {
    pub fn new(
        store: Arc<dyn BlobStore>,
        container_root: String,
        engine_log_path: PathBuf,
        sample_sheet_path: PathBuf,
    ) -> Self {
        Self {
            store,
            container_root,
            engine_log_path,
            sample_sheet_path,
        }
    }

    /// Uploads both artifacts under the run's output prefix. Attempted
    /// exactly once per run invocation, on every exit path.
    pub async fn upload(&self, output_path: &str) -> UploadReport {
        let prefix = self.blob_prefix(output_path);

        let engine_log_name = format!("{prefix}/.nextflow.log");
        let sample_sheet_name = format!("{prefix}/sample_sheet.csv");

        UploadReport {
            engine_log_uploaded: self
                .upload_one(&self.engine_log_path, &engine_log_name)
                .await,
            sample_sheet_uploaded: self
                .upload_one(&self.sample_sheet_path, &sample_sheet_name)
                .await,
        }
    }

    /// Destination prefix: the output path minus the container root.
    fn blob_prefix<'a>(&self, output_path: &'a str) -> &'a str {
        output_path
            .strip_prefix(self.container_root.as_str())
            .unwrap_or(output_path)
            .trim_end_matches('/')
    }

    async fn upload_one(&self, local_path: &Path, blob_name: &str) -> bool {
        let data = match tokio::fs::read(local_path).await {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    path = %local_path.display(),
                    blob = blob_name,
                    "failed to read artifact for upload: {e}"
                );
                return false;
            }
        };

        match self.store.put_blob(blob_name, data).await {
            Ok(()) => {
                info!(blob = blob_name, "uploaded run artifact");
                true
            }
            Err(e) => {
                warn!(blob = blob_name, "failed to upload run artifact: {e}");
                false
            }
        }
    }
}
