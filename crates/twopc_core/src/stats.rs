//! Coordinator statistics.
//!
//! ```rust,ignore
//! let stats = coordinator.stats().snapshot();
//! println!("committed: {}", stats.committed);
//! println!("prepare timeouts: {}", stats.prepare_timeouts);
//! ```

use crate::prepare::PrepareOutcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Coordinator counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    prepare_timeouts: AtomicU64,
    no_votes: AtomicU64,
    prepare_faults: AtomicU64,
    phase_two_retries: AtomicU64,
    phase_two_failures: AtomicU64,
    log_write_failures: AtomicU64,
    recovered: AtomicU64,
}

impl CoordinatorStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_begin(&self) {
        self.begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the non-yes votes of one phase 1.
    pub(crate) fn record_votes(&self, outcome: &PrepareOutcome) {
        self.prepare_timeouts
            .fetch_add(outcome.timeouts() as u64, Ordering::Relaxed);
        self.no_votes
            .fetch_add(outcome.no_votes() as u64, Ordering::Relaxed);
        self.prepare_faults
            .fetch_add(outcome.faults() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_phase_two(&self, retries: u32, failures: usize) {
        self.phase_two_retries
            .fetch_add(u64::from(retries), Ordering::Relaxed);
        self.phase_two_failures
            .fetch_add(failures as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_log_write_failure(&self) {
        self.log_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovered(&self) {
        self.recovered.fetch_add(1, Ordering::Relaxed);
    }

    /// Transactions begun in this process.
    pub fn begun(&self) -> u64 {
        self.begun.load(Ordering::Relaxed)
    }

    /// Transactions that reached `Committed`.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Transactions that reached `Aborted`.
    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            begun: self.begun(),
            committed: self.committed(),
            aborted: self.aborted(),
            prepare_timeouts: self.prepare_timeouts.load(Ordering::Relaxed),
            no_votes: self.no_votes.load(Ordering::Relaxed),
            prepare_faults: self.prepare_faults.load(Ordering::Relaxed),
            phase_two_retries: self.phase_two_retries.load(Ordering::Relaxed),
            phase_two_failures: self.phase_two_failures.load(Ordering::Relaxed),
            log_write_failures: self.log_write_failures.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`CoordinatorStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Transactions begun.
    pub begun: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions aborted.
    pub aborted: u64,
    /// Prepare calls that timed out.
    pub prepare_timeouts: u64,
    /// Explicit no votes.
    pub no_votes: u64,
    /// Prepare calls that faulted or panicked.
    pub prepare_faults: u64,
    /// Commit/rollback calls beyond the first.
    pub phase_two_retries: u64,
    /// Participants that exhausted their commit/rollback attempts.
    pub phase_two_failures: u64,
    /// Decision log appends that failed.
    pub log_write_failures: u64,
    /// Transactions driven by recovery.
    pub recovered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::VoteResult;
    use crate::types::{Decision, ParticipantId};

    #[test]
    fn default_stats_are_zero() {
        assert_eq!(CoordinatorStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_votes_splits_by_kind() {
        let stats = CoordinatorStats::new();
        let pid = |s: &str| ParticipantId::new(s).unwrap();
        let outcome = PrepareOutcome {
            decision: Decision::Abort,
            votes: vec![
                (pid("a"), VoteResult::Yes),
                (pid("b"), VoteResult::No),
                (pid("c"), VoteResult::Timeout),
                (pid("d"), VoteResult::Fault("io".into())),
                (pid("e"), VoteResult::Panicked),
            ],
        };

        stats.record_votes(&outcome);
        let snap = stats.snapshot();
        assert_eq!(snap.no_votes, 1);
        assert_eq!(snap.prepare_timeouts, 1);
        assert_eq!(snap.prepare_faults, 2);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(CoordinatorStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_begin();
                        s.record_committed();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.begun(), 800);
        assert_eq!(stats.committed(), 800);
    }
}
