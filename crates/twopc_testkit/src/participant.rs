//! Scripted participants.
//!
//! A [`ScriptedParticipant`] answers according to a script fixed at
//! construction and records every call it receives, so tests can assert
//! exactly what the coordinator sent and in which order.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use twopc_core::{Participant, ParticipantFault, ParticipantId, TransactionId, Vote};

/// One call received by a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    /// `prepare` was called.
    Prepare(TransactionId),
    /// `commit` was called (successful or not).
    Commit(TransactionId),
    /// `rollback` was called (successful or not).
    Rollback(TransactionId),
}

/// How a participant answers `prepare`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareScript {
    /// Vote yes.
    Yes,
    /// Vote no.
    No,
    /// Vote yes after sleeping this long.
    YesAfter(Duration),
    /// Report a fault.
    Fault(ParticipantFault),
}

/// A participant driven by a script.
#[derive(Debug)]
pub struct ScriptedParticipant {
    id: ParticipantId,
    prepare: PrepareScript,
    commit_failures: AtomicU32,
    rollback_failures: AtomicU32,
    phase_two_delay: Duration,
    permanent_failure: bool,
    calls: Mutex<Vec<Call>>,
    committed: Mutex<HashSet<TransactionId>>,
    rolled_back: Mutex<HashSet<TransactionId>>,
}

impl ScriptedParticipant {
    /// Creates a participant that votes yes and acknowledges everything.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a valid participant id.
    pub fn new(id: &str) -> Self {
        Self {
            id: ParticipantId::new(id).expect("valid participant id"),
            prepare: PrepareScript::Yes,
            commit_failures: AtomicU32::new(0),
            rollback_failures: AtomicU32::new(0),
            phase_two_delay: Duration::ZERO,
            permanent_failure: false,
            calls: Mutex::new(Vec::new()),
            committed: Mutex::new(HashSet::new()),
            rolled_back: Mutex::new(HashSet::new()),
        }
    }

    /// Shorthand for a participant voting yes.
    pub fn yes(id: &str) -> Arc<Self> {
        Arc::new(Self::new(id))
    }

    /// Shorthand for a participant voting no.
    pub fn no(id: &str) -> Arc<Self> {
        Arc::new(Self::new(id).with_prepare(PrepareScript::No))
    }

    /// Shorthand for a participant that answers yes after `delay`.
    pub fn slow(id: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(id).with_prepare(PrepareScript::YesAfter(delay)))
    }

    /// Sets the prepare script.
    #[must_use]
    pub fn with_prepare(mut self, script: PrepareScript) -> Self {
        self.prepare = script;
        self
    }

    /// Fails the first `n` commit calls with a transient fault.
    #[must_use]
    pub fn failing_commits(self, n: u32) -> Self {
        self.commit_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fails the first `n` rollback calls with a transient fault.
    #[must_use]
    pub fn failing_rollbacks(self, n: u32) -> Self {
        self.rollback_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fails every commit and rollback with a permanent fault.
    #[must_use]
    pub fn permanently_failing(mut self) -> Self {
        self.permanent_failure = true;
        self
    }

    /// Sleeps this long inside every commit and rollback call.
    #[must_use]
    pub fn with_phase_two_delay(mut self, delay: Duration) -> Self {
        self.phase_two_delay = delay;
        self
    }

    /// Lets later commit and rollback calls succeed.
    pub fn heal(&self) {
        self.commit_failures.store(0, Ordering::SeqCst);
        self.rollback_failures.store(0, Ordering::SeqCst);
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of `prepare` calls for `txid`.
    pub fn prepare_count(&self, txid: TransactionId) -> usize {
        self.count(|c| *c == Call::Prepare(txid))
    }

    /// Number of `commit` calls for `txid`, failed ones included.
    pub fn commit_count(&self, txid: TransactionId) -> usize {
        self.count(|c| *c == Call::Commit(txid))
    }

    /// Number of `rollback` calls for `txid`, failed ones included.
    pub fn rollback_count(&self, txid: TransactionId) -> usize {
        self.count(|c| *c == Call::Rollback(txid))
    }

    /// True once a commit for `txid` succeeded.
    pub fn has_committed(&self, txid: TransactionId) -> bool {
        self.committed.lock().contains(&txid)
    }

    /// True once a rollback for `txid` succeeded.
    pub fn has_rolled_back(&self, txid: TransactionId) -> bool {
        self.rolled_back.lock().contains(&txid)
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    async fn phase_two(
        &self,
        remaining: &AtomicU32,
        applied: &Mutex<HashSet<TransactionId>>,
        txid: TransactionId,
    ) -> Result<(), ParticipantFault> {
        if !self.phase_two_delay.is_zero() {
            tokio::time::sleep(self.phase_two_delay).await;
        }
        if self.permanent_failure {
            return Err(ParticipantFault::permanent("scripted permanent failure"));
        }
        let consumed = remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(ParticipantFault::transient("scripted transient failure"));
        }
        applied.lock().insert(txid);
        Ok(())
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn prepare(&self, txid: TransactionId) -> Result<Vote, ParticipantFault> {
        self.calls.lock().push(Call::Prepare(txid));
        match &self.prepare {
            PrepareScript::Yes => Ok(Vote::Yes),
            PrepareScript::No => Ok(Vote::No),
            PrepareScript::YesAfter(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Vote::Yes)
            }
            PrepareScript::Fault(fault) => Err(fault.clone()),
        }
    }

    async fn commit(&self, txid: TransactionId) -> Result<(), ParticipantFault> {
        self.calls.lock().push(Call::Commit(txid));
        self.phase_two(&self.commit_failures, &self.committed, txid)
            .await
    }

    async fn rollback(&self, txid: TransactionId) -> Result<(), ParticipantFault> {
        self.calls.lock().push(Call::Rollback(txid));
        self.phase_two(&self.rollback_failures, &self.rolled_back, txid)
            .await
    }
}
