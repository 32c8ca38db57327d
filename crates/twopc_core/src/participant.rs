//! The participant contract.
//!
//! Every resource the coordinator drives implements [`Participant`]:
//!
//! ```text
//! prepare(txid)  -> Vote{Yes|No} | Fault
//! commit(txid)   -> ()           | Fault   (idempotent)
//! rollback(txid) -> ()           | Fault   (idempotent)
//! ```
//!
//! Calls may be repeated by retries and by recovery, so `commit` and
//! `rollback` must tolerate at-least-once delivery. Implementations must not
//! block the async executor; wrap blocking work in
//! `tokio::task::spawn_blocking`.

use crate::types::{ParticipantId, TransactionId, Vote};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A failure reported by a participant.
///
/// Kept apart from [`CoordinatorError`](crate::CoordinatorError) so callers
/// can tell retryable participant trouble from coordinator usage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParticipantFault {
    /// Temporary trouble (connection reset, busy resource); retrying may
    /// succeed.
    #[error("transient fault: {0}")]
    Transient(String),

    /// The participant cannot perform the call; retrying now is pointless.
    #[error("permanent fault: {0}")]
    Permanent(String),
}

impl ParticipantFault {
    /// Creates a transient fault.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Creates a permanent fault.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    /// Returns true if the call can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A resource manager taking part in two-phase commit.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Stable identity, used for binding checks and written to the log.
    fn id(&self) -> &ParticipantId;

    /// Tentatively reserves the transaction's work and votes.
    async fn prepare(&self, txid: TransactionId) -> Result<Vote, ParticipantFault>;

    /// Makes the reserved work permanent. Must be idempotent.
    async fn commit(&self, txid: TransactionId) -> Result<(), ParticipantFault>;

    /// Undoes the reserved work, if any. Must be idempotent and must succeed
    /// for transactions the participant never prepared.
    async fn rollback(&self, txid: TransactionId) -> Result<(), ParticipantFault>;
}

/// Resolves participant ids read from the decision log back into live
/// participants after a coordinator restart.
pub trait ParticipantDirectory: Send + Sync {
    /// Returns the participant with this id, if it is reachable.
    fn resolve(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>>;

    /// Names the participants of a transaction whose log records do not
    /// list them. Recovery leaves such a transaction untouched while this
    /// returns `None`.
    fn participants_of(&self, _txid: TransactionId) -> Option<Vec<ParticipantId>> {
        None
    }
}

impl ParticipantDirectory for HashMap<ParticipantId, Arc<dyn Participant>> {
    fn resolve(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        self.get(id).cloned()
    }
}
