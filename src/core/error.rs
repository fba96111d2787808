//! Error types for encounter sync.

use thiserror::Error;

use crate::client::ClientError;
use crate::server::ServerError;
use crate::wire::WireError;

/// Top-level encounter sync errors.
///
/// Layer errors (`WireError`, `ServerError`, `ClientError`) live with
/// their layer; this aggregates them for callers that hold both roles.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wire codec error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Server error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Client error.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
