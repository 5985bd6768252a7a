//! Key vault secrets client

use std::sync::Arc;

use serde::Deserialize;

use crate::auth::TokenCredential;
use crate::error::{Result, check_status};

const VAULT_RESOURCE: &str = "https://vault.azure.net";
const API_VERSION: &str = "7.4";

/// Client scoped to one key vault.
pub struct KeyVaultClient {
    client: reqwest::Client,
    base_url: String,
    credential: Arc<dyn TokenCredential>,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

impl KeyVaultClient {
    /// # Arguments
    /// * `vault_name` - key vault name (the `<name>` in `https://<name>.vault.azure.net`)
    pub fn new(vault_name: &str, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("https://{vault_name}.vault.azure.net"),
            credential,
        }
    }

    /// Custom base URL for tests.
    pub fn with_base_url(base_url: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            credential,
        }
    }

    /// Fetches the current version of a secret.
    pub async fn get_secret(&self, name: &str) -> Result<String> {
        let token = self.credential.token(VAULT_RESOURCE).await?;
        let url = format!("{}/secrets/{}", self.base_url, name);

        let response = self
            .client
            .get(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .send()
            .await?;

        let bundle: SecretBundle = check_status(response).await?.json().await?;
        Ok(bundle.value)
    }
}
