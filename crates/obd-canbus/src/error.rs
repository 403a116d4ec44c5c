//! CAN bus error types.

use obd_protocol::RequestError;
use thiserror::Error;

/// Errors that can occur during CAN bus operations.
#[derive(Debug, Error)]
pub enum CanError {
    #[error("CAN interface error: {0}")]
    Interface(String),

    #[error("Response timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("ISO-TP reassembly error: {0}")]
    IsoTp(String),

    #[error(transparent)]
    Request(#[from] RequestError),
}

impl CanError {
    pub(crate) fn timeout(timeout: std::time::Duration) -> Self {
        CanError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

/// Convenience alias for CAN bus results.
pub type CanResult<T> = Result<T, CanError>;
