//! In-crate participant double for unit tests.

use crate::participant::{Participant, ParticipantFault};
use crate::types::{ParticipantId, TransactionId, Vote};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct StubParticipant {
    id: ParticipantId,
    vote: Vote,
    prepare_delay: Duration,
    prepare_fault: Option<ParticipantFault>,
    commit_failures: AtomicU32,
    rollback_failures: AtomicU32,
    permanent: bool,
    prepares: AtomicU32,
    commits: AtomicU32,
    rollbacks: AtomicU32,
}

impl StubParticipant {
    fn build(id: &str, vote: Vote) -> Self {
        Self {
            id: ParticipantId::new(id).unwrap(),
            vote,
            prepare_delay: Duration::ZERO,
            prepare_fault: None,
            commit_failures: AtomicU32::new(0),
            rollback_failures: AtomicU32::new(0),
            permanent: false,
            prepares: AtomicU32::new(0),
            commits: AtomicU32::new(0),
            rollbacks: AtomicU32::new(0),
        }
    }

    pub(crate) fn yes(id: &str) -> Arc<Self> {
        Arc::new(Self::build(id, Vote::Yes))
    }

    pub(crate) fn no(id: &str) -> Arc<Self> {
        Arc::new(Self::build(id, Vote::No))
    }

    pub(crate) fn slow(id: &str, delay: Duration) -> Arc<Self> {
        let mut stub = Self::build(id, Vote::Yes);
        stub.prepare_delay = delay;
        Arc::new(stub)
    }

    pub(crate) fn faulty(id: &str, fault: ParticipantFault) -> Arc<Self> {
        let mut stub = Self::build(id, Vote::Yes);
        stub.prepare_fault = Some(fault);
        Arc::new(stub)
    }

    /// Votes yes, then fails the first `n` commit and rollback calls.
    pub(crate) fn flaky(id: &str, n: u32) -> Arc<Self> {
        let stub = Self::build(id, Vote::Yes);
        stub.commit_failures.store(n, Ordering::SeqCst);
        stub.rollback_failures.store(n, Ordering::SeqCst);
        Arc::new(stub)
    }

    /// Votes yes, then fails every commit and rollback permanently.
    pub(crate) fn broken(id: &str) -> Arc<Self> {
        let mut stub = Self::build(id, Vote::Yes);
        stub.permanent = true;
        Arc::new(stub)
    }

    pub(crate) fn prepares(&self) -> u32 {
        self.prepares.load(Ordering::SeqCst)
    }

    pub(crate) fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    pub(crate) fn rollbacks(&self) -> u32 {
        self.rollbacks.load(Ordering::SeqCst)
    }

    fn phase_two(&self, remaining: &AtomicU32, counter: &AtomicU32) -> Result<(), ParticipantFault> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.permanent {
            return Err(ParticipantFault::permanent("broken"));
        }
        let left = remaining.load(Ordering::SeqCst);
        if left > 0 {
            remaining.store(left - 1, Ordering::SeqCst);
            return Err(ParticipantFault::transient("flaky"));
        }
        Ok(())
    }
}

#[async_trait]
impl Participant for StubParticipant {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn prepare(&self, _txid: TransactionId) -> Result<Vote, ParticipantFault> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        if !self.prepare_delay.is_zero() {
            tokio::time::sleep(self.prepare_delay).await;
        }
        match &self.prepare_fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(self.vote),
        }
    }

    async fn commit(&self, _txid: TransactionId) -> Result<(), ParticipantFault> {
        self.phase_two(&self.commit_failures, &self.commits)
    }

    async fn rollback(&self, _txid: TransactionId) -> Result<(), ParticipantFault> {
        self.phase_two(&self.rollback_failures, &self.rollbacks)
    }
}
