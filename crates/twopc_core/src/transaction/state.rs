//! Transaction record.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::participant::Participant;
use crate::types::{Decision, ParticipantId, TransactionId, TransactionState};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;

/// The coordinator's view of one transaction.
pub struct TransactionRecord {
    txid: TransactionId,
    /// Enlisted participants in insertion order, no duplicates.
    participants: Vec<Arc<dyn Participant>>,
    state: TransactionState,
    decision: Option<Decision>,
    created_at: SystemTime,
}

impl TransactionRecord {
    /// Creates a fresh record in `Init`.
    pub(crate) fn new(txid: TransactionId) -> Self {
        Self {
            txid,
            participants: Vec::new(),
            state: TransactionState::Init,
            decision: None,
            created_at: SystemTime::now(),
        }
    }

    /// Rebuilds a decided record found in the log after a restart.
    pub(crate) fn recovered(
        txid: TransactionId,
        participants: Vec<Arc<dyn Participant>>,
        decision: Decision,
    ) -> Self {
        let state = match decision {
            Decision::Commit => TransactionState::Committing,
            Decision::Abort => TransactionState::Aborting,
        };
        Self {
            txid,
            participants,
            state,
            decision: Some(decision),
            created_at: SystemTime::now(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        self.txid
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns the recorded decision, if phase 1 has finished.
    #[must_use]
    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    /// Returns the enlisted participants.
    #[must_use]
    pub fn participants(&self) -> &[Arc<dyn Participant>] {
        &self.participants
    }

    /// Returns the ids of the enlisted participants.
    #[must_use]
    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.participants.iter().map(|p| p.id().clone()).collect()
    }

    /// Returns true if a participant with this id is enlisted.
    #[must_use]
    pub fn is_enlisted(&self, id: &ParticipantId) -> bool {
        self.participants.iter().any(|p| p.id() == id)
    }

    pub(crate) fn ensure_state(
        &self,
        expected: TransactionState,
        operation: &'static str,
    ) -> CoordinatorResult<()> {
        if self.state != expected {
            return Err(CoordinatorError::invalid_state(self.txid, self.state, operation));
        }
        Ok(())
    }

    /// Appends a participant. The caller has checked state and bindings.
    pub(crate) fn push_participant(&mut self, participant: Arc<dyn Participant>) {
        self.participants.push(participant);
    }

    /// Moves to `next`, refusing moves the state machine does not allow.
    pub(crate) fn transition(&mut self, next: TransactionState) -> CoordinatorResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CoordinatorError::invalid_state(
                self.txid,
                self.state,
                "change state of",
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Stores the decision and moves to the state that follows it.
    ///
    /// `Prepared` for commit, `Aborting` for abort.
    pub(crate) fn decide(&mut self, decision: Decision) -> CoordinatorResult<()> {
        let next = match decision {
            Decision::Commit => TransactionState::Prepared,
            Decision::Abort => TransactionState::Aborting,
        };
        self.transition(next)?;
        self.decision = Some(decision);
        Ok(())
    }

    /// Returns a detached copy of the observable fields.
    #[must_use]
    pub fn snapshot(&self) -> TransactionSnapshot {
        TransactionSnapshot {
            txid: self.txid,
            state: self.state,
            decision: self.decision,
            participants: self.participant_ids(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for TransactionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRecord")
            .field("txid", &self.txid)
            .field("state", &self.state)
            .field("decision", &self.decision)
            .field("participants", &self.participant_ids())
            .finish()
    }
}

/// Read-only view of a transaction, detached from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSnapshot {
    /// Transaction ID.
    pub txid: TransactionId,
    /// State when the snapshot was taken.
    pub state: TransactionState,
    /// Recorded decision, if any.
    pub decision: Option<Decision>,
    /// Enlisted participants in insertion order.
    pub participants: Vec<ParticipantId>,
    /// When the transaction was begun (or adopted by recovery).
    pub created_at: SystemTime,
}
