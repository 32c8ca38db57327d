//! Phase 1: collecting votes.
//!
//! Every participant is asked to prepare in its own task, each call bounded
//! by the prepare timeout. The executor waits for every task, so a single
//! slow participant costs at most one timeout, and a late answer from a
//! timed-out call is dropped with its task.

use crate::participant::Participant;
use crate::types::{Decision, ParticipantId, TransactionId, Vote};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// What one participant answered in phase 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteResult {
    /// Voted yes.
    Yes,
    /// Voted no.
    No,
    /// Did not answer within the prepare timeout.
    Timeout,
    /// Reported a fault instead of a vote.
    Fault(String),
    /// The call's task panicked.
    Panicked,
}

impl VoteResult {
    /// Returns true only for an explicit yes vote.
    #[must_use]
    pub fn is_yes(&self) -> bool {
        matches!(self, VoteResult::Yes)
    }
}

impl fmt::Display for VoteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteResult::Yes => f.write_str("yes"),
            VoteResult::No => f.write_str("no"),
            VoteResult::Timeout => f.write_str("timeout"),
            VoteResult::Fault(message) => write!(f, "fault: {message}"),
            VoteResult::Panicked => f.write_str("panicked"),
        }
    }
}

/// Aggregated result of phase 1.
#[derive(Debug, Clone)]
pub struct PrepareOutcome {
    /// `Commit` iff every participant voted yes.
    pub decision: Decision,
    /// Per-participant results in enlistment order.
    pub votes: Vec<(ParticipantId, VoteResult)>,
}

impl PrepareOutcome {
    fn count(&self, pred: impl Fn(&VoteResult) -> bool) -> usize {
        self.votes.iter().filter(|(_, v)| pred(v)).count()
    }

    /// Number of participants that timed out.
    #[must_use]
    pub fn timeouts(&self) -> usize {
        self.count(|v| matches!(v, VoteResult::Timeout))
    }

    /// Number of explicit no votes.
    #[must_use]
    pub fn no_votes(&self) -> usize {
        self.count(|v| matches!(v, VoteResult::No))
    }

    /// Number of faults, panics included.
    #[must_use]
    pub fn faults(&self) -> usize {
        self.count(|v| matches!(v, VoteResult::Fault(_) | VoteResult::Panicked))
    }
}

/// Runs phase 1 for one transaction at a time.
#[derive(Debug, Clone)]
pub struct PreparePhase {
    timeout: Duration,
}

impl PreparePhase {
    /// Creates an executor with the given per-call deadline.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Asks every participant to prepare and aggregates the votes.
    ///
    /// Never fails: timeouts, faults and panics all count as "not yes". With
    /// no participants the decision is `Commit`.
    pub async fn run(
        &self,
        txid: TransactionId,
        participants: &[Arc<dyn Participant>],
    ) -> PrepareOutcome {
        let mut tasks = JoinSet::new();
        for (index, participant) in participants.iter().enumerate() {
            let participant = Arc::clone(participant);
            let deadline = self.timeout;
            tasks.spawn(async move {
                let result = match timeout(deadline, participant.prepare(txid)).await {
                    Ok(Ok(Vote::Yes)) => VoteResult::Yes,
                    Ok(Ok(Vote::No)) => VoteResult::No,
                    Ok(Err(fault)) => VoteResult::Fault(fault.to_string()),
                    Err(_) => VoteResult::Timeout,
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<VoteResult>> = vec![None; participants.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => warn!(txid = %txid, error = %e, "prepare task failed"),
            }
        }

        let votes: Vec<(ParticipantId, VoteResult)> = participants
            .iter()
            .zip(results)
            .map(|(participant, result)| {
                let result = result.unwrap_or(VoteResult::Panicked);
                if result.is_yes() {
                    debug!(txid = %txid, participant = %participant.id(), "voted yes");
                } else {
                    warn!(txid = %txid, participant = %participant.id(), vote = %result, "did not vote yes");
                }
                (participant.id().clone(), result)
            })
            .collect();

        let decision = if votes.iter().all(|(_, v)| v.is_yes()) {
            Decision::Commit
        } else {
            Decision::Abort
        };
        info!(txid = %txid, participants = votes.len(), decision = ?decision, "phase 1 finished");

        PrepareOutcome { decision, votes }
    }
}
