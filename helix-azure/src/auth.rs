//! Credential handling
//!
//! Every client in this crate takes a [`TokenCredential`] explicitly instead
//! of resolving ambient credentials at import time. Production deployments use
//! [`ManagedIdentityCredential`]; tests and local development can use
//! [`StaticTokenCredential`].

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Result, check_status};

/// Source of bearer tokens for a given resource scope.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Returns a bearer token valid for `resource`
    /// (e.g. `https://storage.azure.com/`).
    async fn token(&self, resource: &str) -> Result<String>;
}

/// Fetches tokens from the instance metadata service (IMDS).
///
/// Available on any Azure compute with a managed identity attached, which
/// covers both the submit host and the batch pool nodes.
pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ImdsTokenResponse {
    access_token: String,
}

impl ManagedIdentityCredential {
    const IMDS_ENDPOINT: &'static str =
        "http://169.254.169.254/metadata/identity/oauth2/token";

    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: Self::IMDS_ENDPOINT.to_string(),
        }
    }

    /// Override the metadata endpoint (used by tests).
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for ManagedIdentityCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn token(&self, resource: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("api-version", "2019-08-01"), ("resource", resource)])
            .header("Metadata", "true")
            .send()
            .await?;

        let body: ImdsTokenResponse = check_status(response).await?.json().await?;
        Ok(body.access_token)
    }
}

/// A fixed token, for tests and local development against emulators.
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self, _resource: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credential_ignores_resource() {
        let cred = StaticTokenCredential::new("tok");
        assert_eq!(cred.token("https://storage.azure.com/").await.unwrap(), "tok");
        assert_eq!(cred.token("https://vault.azure.net").await.unwrap(), "tok");
    }
}
