//! Submit-side error taxonomy

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Required environment variable absent. Pre-flight.
    #[error("{0} environment variable is not set")]
    Config(&'static str),

    /// Remote job or task creation failed. Propagates uncaught; the caller
    /// treats it as a run failure.
    #[error("batch submission failed: {0}")]
    Submission(#[source] helix_azure::AzureError),

    /// Asset upload to the shared container failed.
    #[error("failed to upload asset '{name}': {source}")]
    Upload {
        name: String,
        #[source]
        source: helix_azure::AzureError,
    },

    /// Local asset directory could not be read.
    #[error("failed to read asset directory: {0}")]
    Io(#[from] std::io::Error),
}
