use serde::Serialize;
use thiserror::Error;

/// Crate-wide error taxonomy for the lifecycle core.
///
/// User-initiated operations (`initialize`, manual check, simulate, retry,
/// `request_generation`) always resolve to either a new state or one of these
/// errors. Background failures inside scheduled ticks are logged and absorbed
/// by the tick itself instead of being surfaced through this type.
#[derive(Error, Debug, Serialize)]
pub enum ServiceError {
    /// The payment session could not be created. Fatal to the current
    /// attempt; recoverable through `retry`.
    #[error("Payment initialization failed: {0}")]
    Initialization(String),

    /// Transport or gateway failure on a user-initiated call.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A manual status check failed. The orchestrator state is unchanged.
    #[error("Manual status check failed: {0}")]
    ManualCheck(String),

    /// The generation request was rejected by the backend. The generation
    /// status is unchanged and the request itself may be retried.
    #[error("Generation request failed: {0}")]
    GenerationRequest(String),

    /// Operation is not legal in the current lifecycle state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Input validation failed before any side effect was issued.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No backend binding exists for the requested plan type.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The injected session store rejected a read or write.
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// Catch-all for internal inconsistencies.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        ServiceError::InvalidOperation(msg.into())
    }
}
