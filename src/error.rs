use crate::codec::DatumError;
use crate::form::FieldError;
use crate::ledger::ServiceError;
use crate::tx::FinalizeError;
use thiserror::Error;

/// Why a transaction flow stopped before (or at) submission.
///
/// Nothing is recorded as pending unless the flow returns `Ok`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Malformed or insufficient user input.
    #[error(transparent)]
    Validation(#[from] FieldError),
    /// The subscription or wallet is in no state for this action.
    #[error("{0}")]
    Precondition(String),
    /// Wallet or ledger failure, including rejected signatures and submissions.
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Codec(#[from] DatumError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    #[error("another action is in progress")]
    Busy,
    #[error("wallet not connected")]
    NotConnected,
}

impl BuildError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        BuildError::Precondition(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Session torn down; the message is shown to the user.
    #[error("{0}")]
    Disconnected(String),
    #[error("{0}")]
    Connect(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
}
