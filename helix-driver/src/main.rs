//! Helix run driver
//!
//! Runs inside the pipeline container, once per run: resolves the run record,
//! installs secrets, drives the nextflow engine to completion, records the
//! terminal status, uploads execution artifacts, and notifies the operator.
//!
//! Architecture:
//! - Configuration: all inputs arrive as task environment variables
//! - Repository: run/sample records in Postgres via sqlx
//! - Services: secret retrieval, subprocess execution, artifact upload,
//!   notification dispatch, each behind a trait seam
//! - Controller: the lifecycle state machine wiring the services together

mod artifacts;
mod config;
mod controller;
mod db;
mod error;
mod notify;
mod process;
mod repository;
mod secrets;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use helix_azure::auth::{ManagedIdentityCredential, TokenCredential};
use helix_azure::blob::BlobClient;
use helix_azure::email::EmailClient;
use helix_azure::keyvault::KeyVaultClient;

use crate::artifacts::ArtifactUploader;
use crate::config::{BLOB_CONTAINER, DriverConfig};
use crate::controller::{RunContext, RunLifecycleController};
use crate::notify::NotificationDispatcher;
use crate::process::NextflowRunner;
use crate::repository::PgRunRecordStore;
use crate::secrets::KeyVaultSecretProvider;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helix_driver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Helix run driver");

    let config = DriverConfig::from_env()?;
    config.validate()?;
    info!(
        run_id = %config.pipeline_run_id,
        output_path = %config.output_path,
        environment = %config.environment,
        "Loaded configuration"
    );

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to the record store")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run record store migrations")?;

    // One credential, one set of clients, passed in explicitly.
    let credential: Arc<dyn TokenCredential> = Arc::new(ManagedIdentityCredential::new());

    let store = Arc::new(PgRunRecordStore::new(pool));
    let secrets = Arc::new(KeyVaultSecretProvider::new(
        KeyVaultClient::new(&config.keyvault_name, credential.clone()),
        config.is_prd(),
    ));
    let blob = Arc::new(BlobClient::new(
        &config.storage_account_name,
        BLOB_CONTAINER,
        credential.clone(),
    ));
    let artifacts = ArtifactUploader::new(
        blob,
        config.container_root(),
        config.engine_log_path.clone(),
        config.sample_sheet_path.clone(),
    );
    let email = Arc::new(EmailClient::new(
        config.communication_endpoint.clone(),
        credential,
    ));
    let notifier = NotificationDispatcher::new(email, &config);

    let controller = RunLifecycleController::new(RunContext {
        store,
        secrets,
        process: Arc::new(NextflowRunner),
        artifacts,
        notifier,
        config,
    });

    let status = controller.run().await?;
    info!(%status, "Run driver finished");

    Ok(())
}
