//! The coordinator API.

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::log::{DecisionLog, LogRecord, StorageDecisionLog};
use crate::participant::Participant;
use crate::phase_two::{ParticipantFailure, PhaseTwo};
use crate::prepare::PreparePhase;
use crate::stats::CoordinatorStats;
use crate::transaction::{Lookup, TransactionHandle, TransactionRegistry, TransactionSnapshot};
use crate::types::{Decision, Outcome, ParticipantId, TransactionId, TransactionState};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(feature = "std")]
use std::path::Path;

/// What `commit_transaction` and `rollback_transaction` report.
///
/// The outcome is always definite. `failures` lists participants that did
/// not acknowledge it; they are driven again by
/// [`Coordinator::retry_pending`] or recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionReport {
    /// The transaction.
    pub txid: TransactionId,
    /// The decided outcome.
    pub outcome: Outcome,
    /// Participants still owing an acknowledgement.
    pub failures: Vec<ParticipantFailure>,
}

impl TransactionReport {
    /// Returns true if every participant acknowledged the outcome.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn settled(snapshot: &TransactionSnapshot) -> CoordinatorResult<Self> {
        match snapshot.state.outcome() {
            Some(outcome) => Ok(Self {
                txid: snapshot.txid,
                outcome,
                failures: Vec::new(),
            }),
            None => Err(CoordinatorError::invalid_state(
                snapshot.txid,
                snapshot.state,
                "report on",
            )),
        }
    }
}

/// A two-phase commit coordinator.
///
/// # Example
///
/// ```rust,ignore
/// let coordinator = Coordinator::open(Path::new("/var/lib/twopc"), CoordinatorConfig::default())?;
/// coordinator.recover(&directory).await?;
///
/// let txid = coordinator.begin();
/// coordinator.enlist(txid, inventory)?;
/// coordinator.enlist(txid, payment)?;
/// let report = coordinator.commit_transaction(txid).await?;
/// assert_eq!(report.outcome, Outcome::Committed);
/// ```
pub struct Coordinator {
    pub(crate) config: CoordinatorConfig,
    pub(crate) log: Arc<dyn DecisionLog>,
    pub(crate) registry: TransactionRegistry,
    prepare: PreparePhase,
    phase_two: PhaseTwo,
    pub(crate) stats: CoordinatorStats,
}

impl Coordinator {
    /// Creates a coordinator over an existing decision log.
    ///
    /// Call [`recover`](Self::recover) before serving new transactions if
    /// the log may hold unfinished ones.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is unusable.
    pub fn new(config: CoordinatorConfig, log: Arc<dyn DecisionLog>) -> CoordinatorResult<Self> {
        config.validate()?;
        Ok(Self {
            registry: TransactionRegistry::new(config.retired_capacity),
            prepare: PreparePhase::new(config.prepare_timeout),
            phase_two: PhaseTwo::new(config.phase_two_timeout, config.retry.clone()),
            stats: CoordinatorStats::new(),
            config,
            log,
        })
    }

    /// Creates a coordinator with a volatile in-memory log.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is unusable.
    pub fn in_memory(config: CoordinatorConfig) -> CoordinatorResult<Self> {
        Self::new(config, Arc::new(StorageDecisionLog::in_memory()))
    }

    /// Opens a coordinator whose log lives in `path`, taking the directory
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorLocked` if another process holds the directory,
    /// `LogCorruption` for a damaged log, or `InvalidConfig`.
    #[cfg(feature = "std")]
    pub fn open(path: &Path, config: CoordinatorConfig) -> CoordinatorResult<Self> {
        config.validate()?;
        let log = StorageDecisionLog::open_dir(path, config.sync_on_write)?;
        Self::new(config, Arc::new(log))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Returns the statistics counters.
    #[must_use]
    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Returns the number of transactions open in this process.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Starts a transaction.
    pub fn begin(&self) -> TransactionId {
        self.stats.record_begin();
        self.registry.begin()
    }

    /// Enlists a participant in a transaction that has not started
    /// committing.
    ///
    /// # Errors
    ///
    /// `UnknownTransaction`, `InvalidState` or `ParticipantAlreadyBound`.
    pub fn enlist(
        &self,
        txid: TransactionId,
        participant: Arc<dyn Participant>,
    ) -> CoordinatorResult<()> {
        self.registry.enlist(&txid, participant)
    }

    /// Returns the state of a transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTransaction` if the id is not known.
    pub fn state(&self, txid: TransactionId) -> CoordinatorResult<TransactionState> {
        Ok(self.registry.get(&txid)?.state)
    }

    /// Returns a snapshot of a transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTransaction` if the id is not known.
    pub fn snapshot(&self, txid: TransactionId) -> CoordinatorResult<TransactionSnapshot> {
        self.registry.get(&txid)
    }

    /// Runs two-phase commit for a transaction and reports its outcome.
    ///
    /// Repeated calls return the same outcome. A call on a transaction
    /// whose phase 2 did not finish re-drives phase 2; phase 1 never runs
    /// twice.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTransaction` for an id this coordinator does not
    /// know. Participant trouble is never an error: it turns into an abort
    /// during phase 1 and into report failures during phase 2.
    pub async fn commit_transaction(
        &self,
        txid: TransactionId,
    ) -> CoordinatorResult<TransactionReport> {
        let handle = match self.registry.lookup(&txid) {
            Lookup::Active(handle) => handle,
            Lookup::Retired(snapshot) => return TransactionReport::settled(&snapshot),
            Lookup::Unknown => return Err(CoordinatorError::unknown_transaction(txid)),
        };
        let _op = handle.lock_operation().await;

        let decision = match handle.state() {
            TransactionState::Init => self.run_phase_one(&handle).await?,
            // An earlier call was cancelled before its decision was recorded.
            TransactionState::Preparing => self.record_abort(&handle).await?,
            TransactionState::Prepared | TransactionState::Committing => Decision::Commit,
            TransactionState::Aborting => Decision::Abort,
            TransactionState::Committed | TransactionState::Aborted => {
                return TransactionReport::settled(&handle.snapshot())
            }
        };
        self.run_phase_two(&handle, decision).await
    }

    /// Aborts a transaction that has not been decided COMMIT.
    ///
    /// Idempotent on aborted transactions; resumes an unfinished rollback.
    ///
    /// # Errors
    ///
    /// `UnknownTransaction`, or `InvalidState` if the transaction is decided
    /// COMMIT.
    pub async fn rollback_transaction(
        &self,
        txid: TransactionId,
    ) -> CoordinatorResult<TransactionReport> {
        let handle = match self.registry.lookup(&txid) {
            Lookup::Active(handle) => handle,
            Lookup::Retired(snapshot) if snapshot.state == TransactionState::Aborted => {
                return TransactionReport::settled(&snapshot)
            }
            Lookup::Retired(snapshot) => {
                return Err(CoordinatorError::invalid_state(txid, snapshot.state, "roll back"))
            }
            Lookup::Unknown => return Err(CoordinatorError::unknown_transaction(txid)),
        };
        let _op = handle.lock_operation().await;

        let decision = match handle.state() {
            TransactionState::Init | TransactionState::Preparing => {
                self.record_abort(&handle).await?
            }
            TransactionState::Aborting => Decision::Abort,
            TransactionState::Aborted => return TransactionReport::settled(&handle.snapshot()),
            state @ (TransactionState::Prepared
            | TransactionState::Committing
            | TransactionState::Committed) => {
                return Err(CoordinatorError::invalid_state(txid, state, "roll back"))
            }
        };
        self.run_phase_two(&handle, decision).await
    }

    /// Re-drives phase 2 of every open transaction that has a decision.
    ///
    /// # Errors
    ///
    /// Only internal state errors; participant failures are in the reports.
    pub async fn retry_pending(&self) -> CoordinatorResult<Vec<TransactionReport>> {
        let mut reports = Vec::new();
        for handle in self.registry.open_transactions() {
            if handle.read(|r| r.decision()).is_none() {
                continue;
            }
            let _op = handle.lock_operation().await;
            let decision = match handle.state() {
                TransactionState::Prepared | TransactionState::Committing => Decision::Commit,
                TransactionState::Aborting => Decision::Abort,
                _ => continue,
            };
            reports.push(self.run_phase_two(&handle, decision).await?);
        }
        Ok(reports)
    }

    /// Prunes completed transactions from the decision log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or rewritten.
    pub async fn compact_log(&self) -> CoordinatorResult<usize> {
        let log = Arc::clone(&self.log);
        tokio::task::spawn_blocking(move || log.compact())
            .await
            .map_err(|e| CoordinatorError::log_write(format!("compaction task failed: {e}")))?
    }

    /// Durably appends a record off the async executor.
    pub(crate) async fn append(&self, record: LogRecord) -> CoordinatorResult<()> {
        let log = Arc::clone(&self.log);
        let result = tokio::task::spawn_blocking(move || log.append(&record))
            .await
            .map_err(|e| CoordinatorError::log_write(format!("log writer task failed: {e}")))
            .and_then(|written| written);
        if result.is_err() {
            self.stats.record_log_write_failure();
        }
        result
    }

    /// Phase 1 plus the durable decision. Caller holds the operation lock.
    async fn run_phase_one(&self, handle: &TransactionHandle) -> CoordinatorResult<Decision> {
        let txid = handle.txid();
        let participants = handle.update(|r| {
            r.transition(TransactionState::Preparing)?;
            Ok::<_, CoordinatorError>(r.participants().to_vec())
        })?;
        let ids: Vec<ParticipantId> = participants.iter().map(|p| p.id().clone()).collect();

        let proposed = match self.append(LogRecord::intent(txid, &ids)).await {
            Ok(()) => {
                let outcome = self.prepare.run(txid, &participants).await;
                self.stats.record_votes(&outcome);
                outcome.decision
            }
            Err(e) => {
                warn!(txid = %txid, error = %e, "intent not recorded, aborting without prepare");
                Decision::Abort
            }
        };

        if proposed == Decision::Commit {
            match self.append(LogRecord::decision(txid, Decision::Commit, &ids)).await {
                Ok(()) => {
                    handle.update(|r| r.decide(Decision::Commit))?;
                    info!(txid = %txid, decision = ?Decision::Commit, "decision recorded");
                    return Ok(Decision::Commit);
                }
                Err(e) => {
                    warn!(txid = %txid, error = %e, "COMMIT not durable, switching to ABORT");
                }
            }
        }

        self.record_abort(handle).await
    }

    /// Decides ABORT. The log write is best-effort: without a decision on
    /// disk, recovery presumes abort anyway.
    async fn record_abort(&self, handle: &TransactionHandle) -> CoordinatorResult<Decision> {
        let txid = handle.txid();
        let ids = handle.read(|r| r.participant_ids());
        if let Err(e) = self
            .append(LogRecord::decision(txid, Decision::Abort, &ids))
            .await
        {
            warn!(txid = %txid, error = %e, "ABORT not recorded, relying on presumed abort");
        }
        handle.update(|r| r.decide(Decision::Abort))?;
        info!(txid = %txid, decision = ?Decision::Abort, "decision recorded");
        Ok(Decision::Abort)
    }

    /// Applies a decision and retires the transaction once every participant
    /// acknowledged. Caller holds the operation lock.
    pub(crate) async fn run_phase_two(
        &self,
        handle: &TransactionHandle,
        decision: Decision,
    ) -> CoordinatorResult<TransactionReport> {
        let txid = handle.txid();
        let participants = handle.update(|r| {
            if r.state() == TransactionState::Prepared {
                r.transition(TransactionState::Committing)?;
            }
            Ok::<_, CoordinatorError>(r.participants().to_vec())
        })?;

        let report = self.phase_two.apply(txid, &participants, decision).await;
        self.stats
            .record_phase_two(report.retries, report.failures.len());
        let outcome = decision.outcome();

        if report.is_complete() {
            if let Err(e) = self.append(LogRecord::completion(txid, outcome)).await {
                warn!(txid = %txid, error = %e, "completion marker not recorded");
            }
            let terminal = match outcome {
                Outcome::Committed => TransactionState::Committed,
                Outcome::Aborted => TransactionState::Aborted,
            };
            handle.update(|r| r.transition(terminal))?;
            self.registry.retire(handle);
            match outcome {
                Outcome::Committed => self.stats.record_committed(),
                Outcome::Aborted => self.stats.record_aborted(),
            }
            info!(txid = %txid, outcome = %outcome, "transaction finished");
        } else {
            warn!(
                txid = %txid,
                outcome = %outcome,
                failed = report.failures.len(),
                "phase 2 incomplete, transaction stays open"
            );
        }

        Ok(TransactionReport {
            txid,
            outcome,
            failures: report.failures,
        })
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
