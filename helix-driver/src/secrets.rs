//! Secret retrieval
//!
//! Run secrets come from the key vault right before the engine starts; a
//! failed fetch is fatal and drives the run straight to Failed without a
//! Started transition.

use async_trait::async_trait;
use helix_azure::keyvault::KeyVaultClient;

use crate::error::RunError;

pub const STORAGE_ACCOUNT_KEY: &str = "storage-account-key";
pub const BATCH_ACCOUNT_KEY: &str = "batch-account-key";
pub const ACR_PASSWORD: &str = "acr-password-prd";

/// Credentials the pipeline engine needs installed before it can run.
pub struct RunSecrets {
    pub storage_account_key: String,
    pub batch_account_key: String,
    /// Registry password, only fetched in prd deployments.
    pub acr_password: Option<String>,
}

#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn fetch(&self) -> Result<RunSecrets, RunError>;
}

/// Production provider backed by the key vault.
pub struct KeyVaultSecretProvider {
    client: KeyVaultClient,
    include_acr_password: bool,
}

impl KeyVaultSecretProvider {
    pub fn new(client: KeyVaultClient, include_acr_password: bool) -> Self {
        Self {
            client,
            include_acr_password,
        }
    }

    async fn get(&self, name: &'static str) -> Result<String, RunError> {
        self.client
            .get_secret(name)
            .await
            .map_err(|source| RunError::Secret { name, source })
    }
}

#[async_trait]
impl SecretProvider for KeyVaultSecretProvider {
    async fn fetch(&self) -> Result<RunSecrets, RunError> {
        let storage_account_key = self.get(STORAGE_ACCOUNT_KEY).await?;
        let batch_account_key = self.get(BATCH_ACCOUNT_KEY).await?;
        let acr_password = if self.include_acr_password {
            Some(self.get(ACR_PASSWORD).await?)
        } else {
            None
        };

        Ok(RunSecrets {
            storage_account_key,
            batch_account_key,
            acr_password,
        })
    }
}
