//! Communication-service email client
//!
//! The send API is asynchronous at the transport level: the POST returns an
//! operation reference, and the caller must poll it to learn the terminal
//! delivery status. [`EmailClient::send_and_wait`] does that polling with a
//! bounded attempt budget so a stuck operation cannot hang the run forever.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::TokenCredential;
use crate::error::{AzureError, Result, check_status};

const COMMUNICATION_RESOURCE: &str = "https://communication.azure.com/";
const API_VERSION: &str = "2023-03-31";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_POLLS: u32 = 60;

/// A plain-text email to a single recipient.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub sender_address: String,
    pub recipient_address: String,
    pub subject: String,
    pub plain_text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    sender_address: &'a str,
    recipients: RecipientsBody<'a>,
    content: ContentBody<'a>,
}

#[derive(Serialize)]
struct RecipientsBody<'a> {
    to: Vec<AddressBody<'a>>,
}

#[derive(Serialize)]
struct AddressBody<'a> {
    address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentBody<'a> {
    subject: &'a str,
    plain_text: &'a str,
}

#[derive(Deserialize)]
struct OperationStatus {
    status: String,
}

/// Client scoped to one communication-service endpoint.
pub struct EmailClient {
    client: reqwest::Client,
    endpoint: String,
    credential: Arc<dyn TokenCredential>,
    poll_interval: Duration,
    max_polls: u32,
}

impl EmailClient {
    /// # Arguments
    /// * `endpoint` - communication service endpoint
    ///   (e.g. "https://myservice.communication.azure.com")
    pub fn new(endpoint: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Tune the status poll cadence (used by tests).
    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Submits the message and blocks until the operation reaches a terminal
    /// status. Anything other than `Succeeded` is a delivery error.
    pub async fn send_and_wait(&self, message: &EmailMessage) -> Result<()> {
        let token = self.credential.token(COMMUNICATION_RESOURCE).await?;
        let url = format!("{}/emails:send", self.endpoint);

        let body = SendBody {
            sender_address: &message.sender_address,
            recipients: RecipientsBody {
                to: vec![AddressBody {
                    address: &message.recipient_address,
                }],
            },
            content: ContentBody {
                subject: &message.subject,
                plain_text: &message.plain_text,
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let operation_url = response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .ok_or(AzureError::MissingHeader("Operation-Location"))?
            .to_string();

        self.wait_for_delivery(&operation_url, &token).await
    }

    async fn wait_for_delivery(&self, operation_url: &str, token: &str) -> Result<()> {
        let mut last_status = "NotStarted".to_string();

        for attempt in 0..self.max_polls {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }

            let response = self
                .client
                .get(operation_url)
                .bearer_auth(token)
                .send()
                .await?;
            let status: OperationStatus = check_status(response).await?.json().await?;
            last_status = status.status;

            debug!(status = %last_status, attempt, "email operation status");

            match last_status.as_str() {
                "NotStarted" | "Running" => continue,
                "Succeeded" => return Ok(()),
                _ => return Err(AzureError::Delivery(last_status)),
            }
        }

        Err(AzureError::DeliveryTimeout(last_status))
    }
}
