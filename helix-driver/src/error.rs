//! Run driver error taxonomy
//!
//! Each failing stage gets its own kind so the controller can match
//! exhaustively instead of funnelling everything through one catch-all.
//! Upload and delivery failures never appear here: they are advisory, logged
//! at the point of failure ([`crate::artifacts`], [`crate::notify`]) and
//! never alter the run's recorded status.

use helix_core::domain::run::TransitionError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RunError {
    /// Required environment variable absent. Pre-flight, no state mutation.
    #[error("{0} environment variable is not set")]
    Config(&'static str),

    /// Malformed environment variable value. Pre-flight, no state mutation.
    #[error("invalid value for {name}: {detail}")]
    InvalidConfig { name: &'static str, detail: String },

    /// No run record matches the supplied identifier. Aborts before any
    /// transition.
    #[error("pipeline run record {0} not found")]
    Lookup(Uuid),

    /// Credential fetch failed. The run is driven directly to Failed.
    #[error("failed to retrieve secret '{name}': {source}")]
    Secret {
        name: &'static str,
        #[source]
        source: helix_azure::AzureError,
    },

    /// Pipeline subprocess exited nonzero.
    #[error("pipeline process exited with code {exit_code}: {stderr}")]
    Execution { exit_code: i32, stderr: String },

    /// Pipeline subprocess could not be launched at all.
    #[error("failed to launch pipeline process: {0}")]
    ProcessSpawn(#[from] std::io::Error),

    /// Record store query or write failed.
    #[error("record store operation failed: {0}")]
    Store(#[from] sqlx::Error),

    /// Stored row could not be mapped back to a domain type.
    #[error("failed to decode run record: {0}")]
    Decode(String),

    /// Lifecycle rules rejected a status mutation.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}
