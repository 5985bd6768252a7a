//! Helix submit
//!
//! Enrollment-side binary: mirrors the local input-asset directory into the
//! shared blob container, then submits one batch job with one task bound to
//! the pipeline container image. The in-container driver takes over from
//! there.

mod config;
mod error;
mod submitter;
mod uploader;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use helix_azure::auth::{ManagedIdentityCredential, TokenCredential};
use helix_azure::batch::BatchClient;
use helix_azure::blob::BlobClient;

use crate::config::{ASSET_CONTAINER, SubmitConfig};
use crate::submitter::JobSubmitter;
use crate::uploader::AssetUploader;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helix_submit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Helix submit");

    let config = SubmitConfig::from_env()?;
    info!(
        run_name = %config.run_name,
        pool_id = %config.pool_id,
        "Loaded configuration"
    );

    let credential: Arc<dyn TokenCredential> = Arc::new(ManagedIdentityCredential::new());

    let blob = Arc::new(BlobClient::new(
        &config.autostorage_account_name,
        ASSET_CONTAINER,
        credential.clone(),
    ));
    let uploaded = AssetUploader::new(blob)
        .upload_dir(&config.local_folder_path)
        .await
        .context("Failed to upload input assets")?;
    info!(count = uploaded, "input assets uploaded");

    let batch = Arc::new(BatchClient::new(
        config.batch_account_url.clone(),
        credential,
    ));
    let submitter = JobSubmitter::new(batch, config.clone());

    let (job_id, task_id) = submitter
        .submit(&config.run_name, &config.output_path, &config.pipeline_run_id)
        .await
        .context("Failed to submit batch job")?;

    info!(%job_id, %task_id, "Job submitted successfully");
    println!("Job submitted successfully. Job ID: {job_id}, Task ID: {task_id}");

    Ok(())
}
