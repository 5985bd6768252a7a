//! Blob storage client
//!
//! Covers the two operations the orchestration core needs: uploading a blob
//! with overwrite semantics and ensuring the target container exists.

use std::sync::Arc;

use crate::auth::TokenCredential;
use crate::error::{AzureError, Result, check_status};

const STORAGE_RESOURCE: &str = "https://storage.azure.com/";
const API_VERSION: &str = "2021-08-06";

/// Client scoped to one storage account + container.
pub struct BlobClient {
    client: reqwest::Client,
    base_url: String,
    credential: Arc<dyn TokenCredential>,
}

impl BlobClient {
    /// # Arguments
    /// * `account` - storage account name (e.g. "pdhoccdevsadigpath1")
    /// * `container` - target blob container (e.g. "nextflow")
    pub fn new(account: &str, container: &str, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("https://{account}.blob.core.windows.net/{container}"),
            credential,
        }
    }

    /// Custom base URL for tests and emulators.
    pub fn with_base_url(base_url: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            credential,
        }
    }

    /// Uploads a block blob, overwriting any existing blob with that name.
    pub async fn put_blob(&self, name: &str, data: Vec<u8>) -> Result<()> {
        let token = self.credential.token(STORAGE_RESOURCE).await?;
        let url = format!("{}/{}", self.base_url, name);

        let response = self
            .client
            .put(&url)
            .bearer_auth(token)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .body(data)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Creates the container if it does not exist. 409 means it already does.
    pub async fn ensure_container(&self) -> Result<()> {
        let token = self.credential.token(STORAGE_RESOURCE).await?;
        let url = format!("{}?restype=container", self.base_url);

        let response = self
            .client
            .put(&url)
            .bearer_auth(token)
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;

        match check_status(response).await {
            Ok(_) => Ok(()),
            Err(AzureError::ApiError { status: 409, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
