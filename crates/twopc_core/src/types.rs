//! Core type definitions for the coordinator.

use crate::error::{CoordinatorError, CoordinatorResult};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a transaction.
///
/// Transaction IDs are random v4 UUIDs, opaque to participants and never
/// reused. They are persisted in the decision log in hyphenated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Allocates a fresh transaction ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the form written to the decision log.
    #[must_use]
    pub fn to_log_string(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0.hyphenated())
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("txn:").unwrap_or(s);
        Uuid::parse_str(raw).map(Self)
    }
}

/// Opaque identity of a participant.
///
/// The id is written into the decision log, so it must be non-empty and must
/// not contain the log delimiters `,` and `;` or line breaks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a participant ID, validating it for use in the log.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParticipantId` if the id is empty or contains a
    /// delimiter character.
    pub fn new(id: impl Into<String>) -> CoordinatorResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoordinatorError::invalid_participant_id(id, "empty id"));
        }
        if let Some(c) = id.chars().find(|c| matches!(c, ',' | ';' | '\n' | '\r')) {
            return Err(CoordinatorError::invalid_participant_id(
                id.clone(),
                format!("contains reserved character {c:?}"),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A participant's phase-1 vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vote {
    /// The participant reserved its state and can commit.
    Yes,
    /// The participant refuses to commit.
    No,
}

/// The coordinator's phase-1 decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Decision {
    /// Every participant voted yes; commit everywhere.
    Commit,
    /// At least one participant did not vote yes; roll back everywhere.
    Abort,
}

impl Decision {
    /// Returns the outcome a fully applied decision produces.
    #[must_use]
    pub const fn outcome(self) -> Outcome {
        match self {
            Decision::Commit => Outcome::Committed,
            Decision::Abort => Outcome::Aborted,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Commit => f.write_str("COMMIT"),
            Decision::Abort => f.write_str("ABORT"),
        }
    }
}

/// The definite result of a transaction, as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    /// The transaction committed.
    Committed,
    /// The transaction aborted.
    Aborted,
}

impl Outcome {
    /// Returns the decision that produces this outcome.
    #[must_use]
    pub const fn decision(self) -> Decision {
        match self {
            Outcome::Committed => Decision::Commit,
            Outcome::Aborted => Decision::Abort,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Committed => f.write_str("COMMITTED"),
            Outcome::Aborted => f.write_str("ABORTED"),
        }
    }
}

/// State of a transaction.
///
/// ```text
/// Init -> Preparing -> Prepared -> Committing -> Committed
///                   \-> Aborting -> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionState {
    /// Created by `begin`; participants may be enlisted.
    Init,
    /// Phase 1 is in flight.
    Preparing,
    /// Every participant voted yes and COMMIT is durably recorded.
    Prepared,
    /// Commit calls are being applied.
    Committing,
    /// Every participant acknowledged commit.
    Committed,
    /// Rollback calls are being applied.
    Aborting,
    /// Every participant acknowledged rollback.
    Aborted,
}

impl TransactionState {
    /// Returns true for `Committed` and `Aborted`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }

    /// Returns true if the state machine allows moving to `next`.
    ///
    /// A terminal state only "moves" to itself (idempotent re-application).
    #[must_use]
    pub const fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Init, Preparing)
                | (Init, Aborting)
                | (Preparing, Prepared)
                | (Preparing, Aborting)
                | (Prepared, Committing)
                | (Committing, Committed)
                | (Aborting, Aborted)
                | (Committed, Committed)
                | (Aborted, Aborted)
        )
    }

    /// Returns the terminal outcome, if any.
    #[must_use]
    pub const fn outcome(self) -> Option<Outcome> {
        match self {
            TransactionState::Committed => Some(Outcome::Committed),
            TransactionState::Aborted => Some(Outcome::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Init => "INIT",
            TransactionState::Preparing => "PREPARING",
            TransactionState::Prepared => "PREPARED",
            TransactionState::Committing => "COMMITTING",
            TransactionState::Committed => "COMMITTED",
            TransactionState::Aborting => "ABORTING",
            TransactionState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_roundtrips_through_log_form() {
        let id = TransactionId::new();
        let parsed: TransactionId = id.to_log_string().parse().unwrap();
        assert_eq!(parsed, id);

        let prefixed: TransactionId = id.to_string().parse().unwrap();
        assert_eq!(prefixed, id);
    }

    #[test]
    fn transaction_ids_are_unique() {
        assert_ne!(TransactionId::new(), TransactionId::new());
    }

    #[test]
    fn participant_id_rejects_delimiters() {
        assert!(ParticipantId::new("inventory").is_ok());
        assert!(ParticipantId::new("").is_err());
        assert!(ParticipantId::new("a,b").is_err());
        assert!(ParticipantId::new("a;b").is_err());
        assert!(ParticipantId::new("a\nb").is_err());
    }

    #[test]
    fn terminal_states_only_move_to_themselves() {
        use TransactionState::*;
        for next in [Init, Preparing, Prepared, Committing, Aborting, Aborted] {
            assert!(!Committed.can_transition_to(next));
        }
        assert!(Committed.can_transition_to(Committed));
        assert!(Aborted.can_transition_to(Aborted));
        assert!(!Aborted.can_transition_to(Committed));
    }

    #[test]
    fn commit_path_requires_prepared() {
        use TransactionState::*;
        assert!(!Preparing.can_transition_to(Committing));
        assert!(!Init.can_transition_to(Prepared));
        assert!(Prepared.can_transition_to(Committing));
    }

    #[test]
    fn decision_and_outcome_correspond() {
        assert_eq!(Decision::Commit.outcome(), Outcome::Committed);
        assert_eq!(Outcome::Aborted.decision(), Decision::Abort);
        assert_eq!(Decision::Commit.to_string(), "COMMIT");
    }
}
