//! Stress helpers.
//!
//! Drives many transactions through one coordinator concurrently.

use crate::participant::ScriptedParticipant;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use twopc_core::{Coordinator, Outcome, Participant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Transactions that committed.
    pub committed: usize,
    /// Transactions that aborted.
    pub aborted: usize,
    /// Transactions whose commit call returned an error.
    pub errors: usize,
    /// Wall time of the run.
    pub duration: Duration,
    /// Transactions per second.
    pub tx_per_second: f64,
}

impl StressTestResult {
    fn new(committed: usize, aborted: usize, errors: usize, duration: Duration) -> Self {
        let total = committed + aborted + errors;
        let tx_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            committed,
            aborted,
            errors,
            duration,
            tx_per_second,
        }
    }

    /// Total transactions attempted.
    pub fn total(&self) -> usize {
        self.committed + self.aborted + self.errors
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Committed: {}", self.committed);
        println!("Aborted: {}", self.aborted);
        println!("Errors: {}", self.errors);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} tx/sec", self.tx_per_second);
    }
}

/// Shape of a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions.
    pub transactions: usize,
    /// Participants per transaction.
    pub participants: usize,
    /// Every n-th transaction gets a participant voting no; 0 disables.
    pub abort_every: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transactions: 200,
            participants: 3,
            abort_every: 5,
        }
    }
}

/// Runs `config.transactions` commits concurrently, each with its own
/// fresh participants.
///
/// # Panics
///
/// Panics if a transaction cannot be set up.
pub async fn run_concurrent_commits(
    coordinator: Arc<Coordinator>,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();
    let mut set = JoinSet::new();

    for i in 0..config.transactions {
        let coordinator = Arc::clone(&coordinator);
        let participants = config.participants;
        let vote_no = config.abort_every > 0 && i % config.abort_every == 0;
        set.spawn(async move {
            let txid = coordinator.begin();
            for p in 0..participants {
                let id = format!("tx{i}-p{p}");
                let participant: Arc<dyn Participant> = if vote_no && p == 0 {
                    ScriptedParticipant::no(&id)
                } else {
                    ScriptedParticipant::yes(&id)
                };
                coordinator
                    .enlist(txid, participant)
                    .expect("Failed to enlist participant");
            }
            coordinator.commit_transaction(txid).await
        });
    }

    let (mut committed, mut aborted, mut errors) = (0, 0, 0);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(report)) if report.outcome == Outcome::Committed => committed += 1,
            Ok(Ok(_)) => aborted += 1,
            Ok(Err(_)) | Err(_) => errors += 1,
        }
    }

    StressTestResult::new(committed, aborted, errors, start.elapsed())
}
