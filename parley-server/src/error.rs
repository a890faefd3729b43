//! Dispatcher error type and its mapping onto error envelopes.

use parley_core::ParleyError;
use parley_llm::LlmError;
use thiserror::Error;

use crate::protocol::OutboundMessage;

/// Why a request could not be answered normally.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request itself is unacceptable. Reported with code 400.
    #[error("{0}")]
    BadRequest(String),

    /// The text generator failed or timed out.
    #[error(transparent)]
    Generation(#[from] LlmError),

    /// The core engine rejected an operation (e.g. a malformed memory override).
    #[error(transparent)]
    Core(#[from] ParleyError),

    /// Anything else, including panics caught while handling.
    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    /// Shorthand for [`DispatchError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Status code carried in the error envelope.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Generation(_) | Self::Core(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<DispatchError> for OutboundMessage {
    fn from(err: DispatchError) -> Self {
        OutboundMessage::Error {
            code: err.code(),
            error: err.to_string(),
        }
    }
}
