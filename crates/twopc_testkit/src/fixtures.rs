//! Coordinator fixtures.
//!
//! Provides ready-made coordinators for tests: in-memory, file-backed with
//! restart support, and a crash harness whose log survives simulated
//! process restarts.

use crate::backend::{FlakyBackend, LogFaults};
use crate::participant::ScriptedParticipant;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use twopc_core::{
    Coordinator, CoordinatorConfig, LogRecord, RetryConfig, StorageDecisionLog, TransactionId,
};
use twopc_storage::InMemoryBackend;

/// A configuration with short timeouts and quick retries, suited to tests.
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig::new()
        .prepare_timeout(Duration::from_millis(200))
        .phase_two_timeout(Duration::from_millis(200))
        .retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5))
                .with_jitter(false),
        )
        .sync_on_write(false)
}

/// Creates an in-memory coordinator with [`fast_config`].
///
/// # Panics
///
/// Panics if the coordinator cannot be created.
pub fn memory_coordinator() -> Coordinator {
    Coordinator::in_memory(fast_config()).expect("Failed to create in-memory coordinator")
}

/// Begins a transaction and enlists `participants` in order.
///
/// # Panics
///
/// Panics if any enlistment is rejected.
pub fn begin_with(
    coordinator: &Coordinator,
    participants: &[Arc<ScriptedParticipant>],
) -> TransactionId {
    let txid = coordinator.begin();
    for participant in participants {
        coordinator
            .enlist(txid, participant.clone())
            .expect("Failed to enlist participant");
    }
    txid
}

/// A coordinator whose log lives in a temporary directory.
pub struct FileCoordinator {
    /// The coordinator instance.
    pub coordinator: Coordinator,
    config: CoordinatorConfig,
    dir: TempDir,
}

impl FileCoordinator {
    /// Opens a coordinator in a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory or the coordinator cannot be created.
    pub fn new(config: CoordinatorConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let coordinator =
            Coordinator::open(dir.path(), config.clone()).expect("Failed to open coordinator");
        Self {
            coordinator,
            config,
            dir,
        }
    }

    /// The coordinator directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Drops the coordinator, releasing the directory lock, and opens a new
    /// one over the same directory. Nothing in memory survives.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be reopened.
    #[must_use]
    pub fn restart(self) -> Self {
        let Self {
            coordinator,
            config,
            dir,
        } = self;
        drop(coordinator);
        let coordinator =
            Coordinator::open(dir.path(), config.clone()).expect("Failed to reopen coordinator");
        Self {
            coordinator,
            config,
            dir,
        }
    }
}

impl std::ops::Deref for FileCoordinator {
    type Target = Coordinator;

    fn deref(&self) -> &Self::Target {
        &self.coordinator
    }
}

/// Simulates coordinator crashes over a log that outlives the process.
///
/// Every [`start`](Self::start) builds a fresh coordinator over the same
/// bytes, as if the process had been restarted. Faults injected through
/// [`faults`](Self::faults) apply to the running coordinator's log.
pub struct CrashHarness {
    storage: InMemoryBackend,
    faults: Arc<LogFaults>,
    config: CoordinatorConfig,
}

impl CrashHarness {
    /// Creates a harness with an empty log.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            storage: InMemoryBackend::new(),
            faults: LogFaults::new(),
            config,
        }
    }

    /// Fault switches for the log of the running coordinator.
    pub fn faults(&self) -> &Arc<LogFaults> {
        &self.faults
    }

    /// Starts a coordinator over the surviving log bytes. Faults are
    /// cleared first; a restarted process gets a healthy disk.
    ///
    /// # Panics
    ///
    /// Panics if the log cannot be opened.
    pub fn start(&self) -> Coordinator {
        self.faults.clear();
        let backend = FlakyBackend::new(Box::new(self.storage.clone()), Arc::clone(&self.faults));
        let log = StorageDecisionLog::new(Box::new(backend), self.config.sync_on_write)
            .expect("Failed to open decision log");
        Coordinator::new(self.config.clone(), Arc::new(log)).expect("Failed to create coordinator")
    }

    /// The raw log contents.
    pub fn log_bytes(&self) -> Vec<u8> {
        self.storage.data()
    }

    /// The complete records currently in the log.
    ///
    /// # Panics
    ///
    /// Panics if the log is corrupt.
    pub fn records(&self) -> Vec<LogRecord> {
        twopc_core::log::parse_log(&self.storage.data())
            .expect("Failed to parse decision log")
            .records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twopc_core::{Outcome, Participant, RecordKind};

    #[tokio::test]
    async fn file_coordinator_restart_keeps_log() {
        let fixture = FileCoordinator::new(fast_config().compact_on_recovery(false));
        let a = ScriptedParticipant::yes("a");
        let txid = begin_with(&fixture, &[Arc::clone(&a)]);
        fixture.commit_transaction(txid).await.unwrap();

        let fixture = fixture.restart();
        let a: Arc<dyn Participant> = a;
        let directory = crate::directory::MapDirectory::from_participants([a]);
        let report = fixture.recover(&directory).await.unwrap();
        assert!(report.pending.is_empty());

        let again = fixture.commit_transaction(txid).await.unwrap();
        assert_eq!(again.outcome, Outcome::Committed);
    }

    #[tokio::test]
    async fn crash_harness_shares_bytes_across_starts() {
        let harness = CrashHarness::new(fast_config());
        let coordinator = harness.start();
        let txid = begin_with(&coordinator, &[ScriptedParticipant::yes("a")]);
        coordinator.commit_transaction(txid).await.unwrap();
        drop(coordinator);

        let kinds: Vec<RecordKind> = harness.records().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![RecordKind::Preparing, RecordKind::Commit, RecordKind::Committed]
        );
        let _restarted = harness.start();
        assert!(!harness.log_bytes().is_empty());
    }
}
