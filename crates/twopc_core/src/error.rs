//! Error types for the coordinator.

use crate::types::{ParticipantId, TransactionId, TransactionState};
use std::io;
use thiserror::Error;

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors raised by the coordinator itself.
///
/// Participant-side failures are a separate type,
/// [`ParticipantFault`](crate::ParticipantFault): they are absorbed into an
/// abort decision during phase 1 and reported as
/// [`ParticipantFailure`](crate::ParticipantFailure)s during phase 2, never
/// returned through this enum.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] twopc_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No transaction with this id is known.
    #[error("unknown transaction {txid}")]
    UnknownTransaction {
        /// The id that was looked up.
        txid: TransactionId,
    },

    /// The operation is not allowed in the transaction's current state.
    #[error("cannot {operation} {txid} in state {state}")]
    InvalidState {
        /// The transaction.
        txid: TransactionId,
        /// Its current state.
        state: TransactionState,
        /// What the caller attempted.
        operation: &'static str,
    },

    /// The participant is already enlisted in another open transaction.
    #[error("participant {participant} is already bound to {bound_to}")]
    ParticipantAlreadyBound {
        /// The participant.
        participant: ParticipantId,
        /// The open transaction that owns it.
        bound_to: TransactionId,
    },

    /// A participant id cannot be used in the decision log.
    #[error("invalid participant id {id:?}: {reason}")]
    InvalidParticipantId {
        /// The rejected id.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A decision log record could not be made durable.
    #[error("decision log write failed: {message}")]
    LogWrite {
        /// Description of the failure.
        message: String,
    },

    /// The decision log contains a malformed record.
    #[error("decision log corrupted at line {line}: {message}")]
    LogCorruption {
        /// 1-based line number.
        line: usize,
        /// Description of the corruption.
        message: String,
    },

    /// Another coordinator process holds the log directory.
    #[error("coordinator locked: another process owns the decision log")]
    CoordinatorLocked,

    /// Configuration values are unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl CoordinatorError {
    /// Creates an unknown transaction error.
    pub fn unknown_transaction(txid: TransactionId) -> Self {
        Self::UnknownTransaction { txid }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(
        txid: TransactionId,
        state: TransactionState,
        operation: &'static str,
    ) -> Self {
        Self::InvalidState {
            txid,
            state,
            operation,
        }
    }

    /// Creates an invalid participant id error.
    pub fn invalid_participant_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParticipantId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a log write error.
    pub fn log_write(message: impl Into<String>) -> Self {
        Self::LogWrite {
            message: message.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(line: usize, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            line,
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true for caller mistakes that had no side effect.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTransaction { .. }
                | Self::InvalidState { .. }
                | Self::ParticipantAlreadyBound { .. }
                | Self::InvalidParticipantId { .. }
        )
    }
}
