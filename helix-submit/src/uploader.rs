//! Input-asset upload
//!
//! Mirrors a local asset directory into the shared blob container before job
//! submission: the pipeline source, config, and per-run inputs the batch
//! task stages into its working directory. Blob names are the paths relative
//! to the directory root, upload is overwrite, so re-running is idempotent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use helix_azure::AzureError;
use helix_azure::blob::BlobClient;
use tracing::info;

use crate::error::SubmitError;

/// Upload seam, implemented by the storage client in production.
#[async_trait]
pub trait BlobApi: Send + Sync {
    async fn ensure_container(&self) -> Result<(), AzureError>;
    async fn put_blob(&self, name: &str, data: Vec<u8>) -> Result<(), AzureError>;
}

#[async_trait]
impl BlobApi for BlobClient {
    async fn ensure_container(&self) -> Result<(), AzureError> {
        BlobClient::ensure_container(self).await
    }

    async fn put_blob(&self, name: &str, data: Vec<u8>) -> Result<(), AzureError> {
        BlobClient::put_blob(self, name, data).await
    }
}

pub struct AssetUploader {
    blob: Arc<dyn BlobApi>,
}

impl AssetUploader {
    pub fn new(blob: Arc<dyn BlobApi>) -> Self {
        Self { blob }
    }

    /// Uploads every file under `root`, returning how many were pushed.
    /// Unlike artifact upload after a run, a failure here aborts: submitting
    /// a job without its inputs would only fail later and slower.
    pub async fn upload_dir(&self, root: &Path) -> Result<usize, SubmitError> {
        self.blob
            .ensure_container()
            .await
            .map_err(|source| SubmitError::Upload {
                name: "<container>".to_string(),
                source,
            })?;

        let files = collect_files(root)?;
        for (path, blob_name) in &files {
            info!(path = %path.display(), blob = %blob_name, "uploading asset");
            let data = std::fs::read(path)?;
            self.blob
                .put_blob(blob_name, data)
                .await
                .map_err(|source| SubmitError::Upload {
                    name: blob_name.clone(),
                    source,
                })?;
        }

        info!(count = files.len(), "asset folder uploaded");
        Ok(files.len())
    }
}

/// Recursively collects files under `root` with their relative blob names.
fn collect_files(root: &Path) -> std::io::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries: Vec<_> = std::fs::read_dir(&dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.path());

        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let blob_name = path
                    .strip_prefix(root)
                    .expect("entry is under root")
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path, blob_name));
            }
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}
