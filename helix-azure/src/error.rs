//! Error types for the Azure clients

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, AzureError>;

/// Errors that can occur when talking to an Azure service
#[derive(Debug, Error)]
pub enum AzureError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Service returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error body returned by the service
        message: String,
    },

    /// Failed to parse a response body
    #[error("failed to parse response: {0}")]
    ParseError(String),

    /// Response was missing a required header
    #[error("response missing required header '{0}'")]
    MissingHeader(&'static str),

    /// Email send reached a terminal state other than Succeeded
    #[error("email delivery finished with status '{0}'")]
    Delivery(String),

    /// Email send did not reach a terminal state within the poll budget
    #[error("email delivery status still '{0}' after poll budget exhausted")]
    DeliveryTimeout(String),
}

impl AzureError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }
}

/// Check a response status and surface the error body on failure.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AzureError::api_error(status.as_u16(), message));
    }
    Ok(response)
}
