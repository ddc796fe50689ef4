use thiserror::Error;

pub type VdrResult<T> = Result<T, VdrError>;

/// Error taxonomy for VDR operations.
///
/// `InvalidInput` and `InvalidHandle` are detected synchronously, before any
/// network work starts. `Ledger` carries the ledger-reported text verbatim.
/// Network operations are never retried internally; retry is the caller's
/// responsibility.
#[derive(Debug, Error)]
pub enum VdrError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ledger error: {message}")]
    Ledger { message: String },

    #[error("operation invalid for current state: {0}")]
    InvalidState(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("shut down: {0}")]
    Shutdown(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VdrError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, VdrError::Ledger { .. })
    }
}

impl From<serde_json::Error> for VdrError {
    fn from(err: serde_json::Error) -> Self {
        VdrError::InvalidInput(format!("malformed json: {err}"))
    }
}
