//! Helix Azure clients
//!
//! Thin, type-safe HTTP clients for the external services the orchestration
//! core talks to: blob storage, key vault secrets, batch job submission, and
//! the communication-service email API.
//!
//! These are deliberately dumb I/O wrappers with no state machine of their
//! own; every client takes an explicit [`auth::TokenCredential`] rather than
//! reading ambient credentials.

pub mod auth;
pub mod batch;
pub mod blob;
pub mod email;
pub mod error;
pub mod keyvault;

pub use error::{AzureError, Result};
