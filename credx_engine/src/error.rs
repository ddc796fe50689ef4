use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Error taxonomy for protocol engine operations.
///
/// `InvalidState` distinguishes "operation is wrong for where this object is
/// in its protocol" from retryable ledger/transport failures, so callers can
/// tell a logic error from a "try again later". Use of a released handle is
/// always `InvalidHandle`, never silently ignored.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ledger error: {message}")]
    Ledger { message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation invalid for current state: {0}")]
    InvalidState(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("shut down: {0}")]
    Shutdown(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InvalidInput(format!("malformed json: {err}"))
    }
}

impl From<multiledger_vdr::VdrError> for EngineError {
    fn from(err: multiledger_vdr::VdrError) -> Self {
        use multiledger_vdr::VdrError;
        match err {
            VdrError::InvalidInput(msg) => EngineError::InvalidInput(msg),
            VdrError::NotFound(msg) => EngineError::NotFound(msg),
            VdrError::Ledger { message } => EngineError::Ledger { message },
            VdrError::InvalidState(msg) => EngineError::InvalidState(msg),
            VdrError::InvalidHandle(msg) => EngineError::InvalidHandle(msg),
            VdrError::Shutdown(msg) => EngineError::Shutdown(msg),
            VdrError::Internal(msg) => EngineError::Internal(msg),
        }
    }
}
