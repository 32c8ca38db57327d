//! Property-based test generators using proptest.
//!
//! Strategies produce participant behaviours; [`Behaviour::build`] turns one
//! into a [`ScriptedParticipant`].

use crate::participant::{PrepareScript, ScriptedParticipant};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use twopc_core::{Decision, ParticipantFault, ParticipantId};

/// How a generated participant behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Votes yes and acknowledges at once.
    Yes,
    /// Votes no.
    No,
    /// Reports a fault from `prepare`.
    PrepareFault,
    /// Answers `prepare` only after the deadline.
    Late,
    /// Votes yes, then fails this many commit/rollback calls transiently.
    Flaky(u32),
}

impl Behaviour {
    /// True if this behaviour lets the transaction commit.
    pub fn votes_yes(self) -> bool {
        matches!(self, Self::Yes | Self::Flaky(_))
    }

    /// Builds a participant. `late` is how long a [`Behaviour::Late`]
    /// participant sleeps in `prepare`; keep it above the prepare timeout.
    pub fn build(self, id: &str, late: Duration) -> Arc<ScriptedParticipant> {
        let participant = ScriptedParticipant::new(id);
        Arc::new(match self {
            Self::Yes => participant,
            Self::No => participant.with_prepare(PrepareScript::No),
            Self::PrepareFault => participant
                .with_prepare(PrepareScript::Fault(ParticipantFault::transient("generated"))),
            Self::Late => participant.with_prepare(PrepareScript::YesAfter(late)),
            Self::Flaky(n) => participant.failing_commits(n).failing_rollbacks(n),
        })
    }
}

/// The decision a set of behaviours must lead to.
pub fn expected_decision(behaviours: &[Behaviour]) -> Decision {
    if behaviours.iter().all(|b| b.votes_yes()) {
        Decision::Commit
    } else {
        Decision::Abort
    }
}

/// Strategy for a single behaviour. Yes votes dominate so that commits are
/// well represented. Flaky participants fail fewer than `max_failures`
/// times.
pub fn behaviour_strategy(max_failures: u32) -> impl Strategy<Value = Behaviour> {
    prop_oneof![
        6 => Just(Behaviour::Yes),
        1 => Just(Behaviour::No),
        1 => Just(Behaviour::PrepareFault),
        1 => Just(Behaviour::Late),
        2 => (0..max_failures.max(1)).prop_map(Behaviour::Flaky),
    ]
}

/// Strategy for the behaviours of one transaction's participants.
pub fn behaviours_strategy(
    max_participants: usize,
    max_failures: u32,
) -> impl Strategy<Value = Vec<Behaviour>> {
    prop::collection::vec(behaviour_strategy(max_failures), 1..=max_participants.max(1))
}

/// Strategy for valid participant ids.
pub fn participant_id_strategy() -> impl Strategy<Value = ParticipantId> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,15}")
        .expect("Invalid regex")
        .prop_map(|s| ParticipantId::new(s).expect("generated id is valid"))
}
