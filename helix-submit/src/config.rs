//! Submit-side configuration

use std::path::PathBuf;

use crate::error::SubmitError;

/// Blob container shared with the batch pool as auto-storage.
pub const ASSET_CONTAINER: &str = "nextflow";

const DEFAULT_CONTAINER_IMAGE: &str = "helixacr.azurecr.io/batch-nf:2.0";

#[derive(Debug, Clone)]
pub struct SubmitConfig {
    /// Batch account URL (e.g. "https://myaccount.westus2.batch.azure.com").
    pub batch_account_url: String,
    pub batch_account_name: String,
    pub pool_id: String,

    /// Storage account the run writes outputs to.
    pub storage_account_name: String,
    /// Auto-storage account whose asset container is staged into tasks.
    pub autostorage_account_name: String,

    pub keyvault_name: String,

    /// Local directory of input assets to mirror into the asset container.
    pub local_folder_path: PathBuf,

    /// Managed identity used by the pool to pull the container image.
    pub managed_identity_resource_id: String,

    /// Pipeline container image reference.
    pub container_image: String,

    pub run_name: String,
    pub output_path: String,
    pub pipeline_run_id: String,
}

fn require(name: &'static str) -> Result<String, SubmitError> {
    std::env::var(name).map_err(|_| SubmitError::Config(name))
}

impl SubmitConfig {
    pub fn from_env() -> Result<Self, SubmitError> {
        Ok(Self {
            batch_account_url: require("BATCH_ACCOUNT_URL")?,
            batch_account_name: require("BATCH_ACCOUNT_NAME")?,
            pool_id: require("POOL_ID")?,
            storage_account_name: require("STORAGE_ACCOUNT_NAME")?,
            autostorage_account_name: require("AUTOSTORAGE_ACCOUNT_NAME")?,
            keyvault_name: require("KEYVAULT_NAME")?,
            local_folder_path: PathBuf::from(require("LOCAL_FOLDER_PATH")?),
            managed_identity_resource_id: require("MANAGED_IDENTITY_RESOURCE_ID")?,
            container_image: std::env::var("CONTAINER_IMAGE")
                .unwrap_or_else(|_| DEFAULT_CONTAINER_IMAGE.to_string()),
            run_name: require("RUN_NAME")?,
            output_path: require("OUTPUT_PATH")?,
            pipeline_run_id: require("PIPELINE_RUN_ID")?,
        })
    }

    /// Registry host, taken from the image reference.
    pub fn registry_server(&self) -> &str {
        self.container_image
            .split_once('/')
            .map(|(host, _)| host)
            .unwrap_or(&self.container_image)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> SubmitConfig {
    SubmitConfig {
        batch_account_url: "https://testbatch.westus2.batch.azure.com".to_string(),
        batch_account_name: "testbatch".to_string(),
        pool_id: "genomics-pool".to_string(),
        storage_account_name: "teststorage".to_string(),
        autostorage_account_name: "testautostorage".to_string(),
        keyvault_name: "testvault".to_string(),
        local_folder_path: PathBuf::from("/tmp/assets"),
        managed_identity_resource_id: "/subscriptions/x/resourceGroups/y/providers/z/id".to_string(),
        container_image: DEFAULT_CONTAINER_IMAGE.to_string(),
        run_name: "RUN001".to_string(),
        output_path: "az://nextflow/webapp-runs/RUN001/pipeline-outputs".to_string(),
        pipeline_run_id: "4b2cdd3e-8a51-4a2e-9c71-0a2f9d2f61e4".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_server_from_image() {
        let config = test_config();
        assert_eq!(config.registry_server(), "helixacr.azurecr.io");
    }
}
