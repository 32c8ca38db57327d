//! Phase 2: applying a durable decision.
//!
//! Once a decision is in the log it is never reversed here. Each participant
//! gets its own task that retries `commit` (or `rollback`) with exponential
//! backoff until it acknowledges, the attempts run out, or it reports a
//! permanent fault. Participants that never acknowledge are reported as
//! [`ParticipantFailure`]s; everybody else stays applied.

use crate::config::RetryConfig;
use crate::participant::Participant;
use crate::types::{Decision, ParticipantId, TransactionId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Which phase-2 call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailurePhase {
    /// `commit` never succeeded.
    Commit,
    /// `rollback` never succeeded.
    Rollback,
}

impl From<Decision> for FailurePhase {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Commit => FailurePhase::Commit,
            Decision::Abort => FailurePhase::Rollback,
        }
    }
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePhase::Commit => f.write_str("commit"),
            FailurePhase::Rollback => f.write_str("rollback"),
        }
    }
}

/// A participant that did not acknowledge the decision.
///
/// The decision stands; the participant must be driven again later by a
/// retry pass or by recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantFailure {
    /// The participant.
    pub participant: ParticipantId,
    /// The call that failed.
    pub phase: FailurePhase,
    /// How many calls were made.
    pub attempts: u32,
    /// The last error observed.
    pub last_error: String,
}

impl fmt::Display for ParticipantFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed to {} after {} attempt(s): {}",
            self.participant, self.phase, self.attempts, self.last_error
        )
    }
}

/// Result of one phase-2 pass.
#[derive(Debug, Clone)]
pub struct PhaseTwoReport {
    /// The decision that was applied.
    pub decision: Decision,
    /// Participants that acknowledged.
    pub acknowledged: Vec<ParticipantId>,
    /// Participants that did not.
    pub failures: Vec<ParticipantFailure>,
    /// Calls beyond the first, summed over participants.
    pub retries: u32,
}

impl PhaseTwoReport {
    /// Returns true if every participant acknowledged.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs phase 2 with retry.
#[derive(Debug, Clone)]
pub struct PhaseTwo {
    timeout: Duration,
    retry: RetryConfig,
}

impl PhaseTwo {
    /// Creates an executor. `timeout` bounds each individual call.
    #[must_use]
    pub fn new(timeout: Duration, retry: RetryConfig) -> Self {
        Self { timeout, retry }
    }

    /// Sends `decision` to every participant.
    pub async fn apply(
        &self,
        txid: TransactionId,
        participants: &[Arc<dyn Participant>],
        decision: Decision,
    ) -> PhaseTwoReport {
        let mut tasks = JoinSet::new();
        for (index, participant) in participants.iter().enumerate() {
            let participant = Arc::clone(participant);
            let deadline = self.timeout;
            let retry = self.retry.clone();
            tasks.spawn(async move {
                let result = drive(participant.as_ref(), txid, decision, deadline, &retry).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Attempts>> = vec![None; participants.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => warn!(txid = %txid, error = %e, "phase 2 task failed"),
            }
        }

        let mut report = PhaseTwoReport {
            decision,
            acknowledged: Vec::new(),
            failures: Vec::new(),
            retries: 0,
        };
        for (participant, result) in participants.iter().zip(results) {
            let id = participant.id().clone();
            let result = result.unwrap_or(Attempts {
                count: 0,
                error: Some("task panicked".to_string()),
            });
            report.retries += result.count.saturating_sub(1);
            match result.error {
                None => report.acknowledged.push(id),
                Some(last_error) => {
                    warn!(
                        txid = %txid,
                        participant = %id,
                        attempts = result.count,
                        error = %last_error,
                        "participant did not acknowledge {}",
                        FailurePhase::from(decision)
                    );
                    report.failures.push(ParticipantFailure {
                        participant: id,
                        phase: decision.into(),
                        attempts: result.count,
                        last_error,
                    });
                }
            }
        }

        info!(
            txid = %txid,
            decision = ?decision,
            acknowledged = report.acknowledged.len(),
            failed = report.failures.len(),
            "phase 2 finished"
        );
        report
    }
}

#[derive(Debug, Clone)]
struct Attempts {
    count: u32,
    /// `None` once the participant acknowledged.
    error: Option<String>,
}

async fn drive(
    participant: &dyn Participant,
    txid: TransactionId,
    decision: Decision,
    deadline: Duration,
    retry: &RetryConfig,
) -> Attempts {
    let mut last_error = String::new();
    let mut count = 0;

    while count < retry.max_attempts {
        let delay = retry.delay_for_attempt(count);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        count += 1;

        let call = match decision {
            Decision::Commit => participant.commit(txid),
            Decision::Abort => participant.rollback(txid),
        };
        match timeout(deadline, call).await {
            Ok(Ok(())) => {
                debug!(txid = %txid, participant = %participant.id(), attempt = count, "acknowledged");
                return Attempts { count, error: None };
            }
            Ok(Err(fault)) => {
                last_error = fault.to_string();
                if !fault.is_retryable() {
                    break;
                }
            }
            Err(_) => last_error = format!("timed out after {deadline:?}"),
        }
        debug!(
            txid = %txid,
            participant = %participant.id(),
            attempt = count,
            error = %last_error,
            "phase 2 call failed"
        );
    }

    Attempts {
        count,
        error: Some(last_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::StubParticipant;

    fn quick_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts).with_initial_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn commit_reaches_everyone() {
        let a = StubParticipant::yes("a");
        let b = StubParticipant::yes("b");
        let participants: Vec<Arc<dyn Participant>> = vec![a.clone(), b.clone()];

        let report = PhaseTwo::new(Duration::from_secs(1), quick_retry(3))
            .apply(TransactionId::new(), &participants, Decision::Commit)
            .await;

        assert!(report.is_complete());
        assert_eq!(report.acknowledged.len(), 2);
        assert_eq!(report.retries, 0);
        assert_eq!((a.commits(), b.commits()), (1, 1));
        assert_eq!(a.rollbacks(), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let flaky = StubParticipant::flaky("flaky", 2);
        let participants: Vec<Arc<dyn Participant>> = vec![flaky.clone()];

        let report = PhaseTwo::new(Duration::from_secs(1), quick_retry(3))
            .apply(TransactionId::new(), &participants, Decision::Abort)
            .await;

        assert!(report.is_complete());
        assert_eq!(report.retries, 2);
        assert_eq!(flaky.rollbacks(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported_without_undoing_others() {
        let good = StubParticipant::yes("good");
        let flaky = StubParticipant::flaky("flaky", 10);
        let participants: Vec<Arc<dyn Participant>> = vec![good.clone(), flaky.clone()];

        let report = PhaseTwo::new(Duration::from_secs(1), quick_retry(3))
            .apply(TransactionId::new(), &participants, Decision::Commit)
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.acknowledged, vec![good.id().clone()]);
        let failure = &report.failures[0];
        assert_eq!(failure.participant, *flaky.id());
        assert_eq!(failure.phase, FailurePhase::Commit);
        assert_eq!(failure.attempts, 3);
        assert_eq!(good.rollbacks(), 0);
    }

    #[tokio::test]
    async fn permanent_fault_stops_retrying() {
        let broken = StubParticipant::broken("broken");
        let participants: Vec<Arc<dyn Participant>> = vec![broken.clone()];

        let report = PhaseTwo::new(Duration::from_secs(1), quick_retry(5))
            .apply(TransactionId::new(), &participants, Decision::Abort)
            .await;

        assert_eq!(report.failures[0].attempts, 1);
        assert_eq!(report.failures[0].phase, FailurePhase::Rollback);
        assert_eq!(broken.rollbacks(), 1);
    }

    #[test]
    fn failure_display() {
        let failure = ParticipantFailure {
            participant: ParticipantId::new("ledger").unwrap(),
            phase: FailurePhase::Commit,
            attempts: 3,
            last_error: "transient fault: busy".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "ledger failed to commit after 3 attempt(s): transient fault: busy"
        );
    }
}
