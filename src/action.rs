//! Actions: named units of work the agent performs on request.
//!
//! Each action takes JSON arguments and returns a JSON result or an error,
//! never both. Actions clean up whatever local resources they allocate,
//! whether they succeed or fail.

mod logs;

use serde_json::Value;

use crate::{blobstore::BlobstoreError, compressor::CompressError};

pub use logs::{FETCH_LOGS, LogsAction};

/// Errors an action can report back to its caller.
///
/// Messages name the stage that failed; the underlying cause is kept
/// as the error source.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Bad arguments. Terminal: retrying the same request fails the same way.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Making logs tarball")]
    CompressionFailed(#[source] CompressError),

    #[error("Create file on blobstore")]
    UploadFailed(#[source] BlobstoreError),
}

impl ActionError {
    /// Whether re-dispatching the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UploadFailed(e) => e.is_transient(),
            Self::InvalidInput(_) | Self::CompressionFailed(_) => false,
        }
    }
}

/// A unit of work the dispatcher can run by name.
pub trait Action: Send + Sync {
    /// Whether the dispatcher must run this off the request path and report later.
    fn is_asynchronous(&self) -> bool;

    /// Run once for a single request.
    fn run(&self, args: &[Value]) -> Result<Value, ActionError>;
}
