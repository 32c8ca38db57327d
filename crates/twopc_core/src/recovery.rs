//! Crash recovery.
//!
//! After a restart the decision log is replayed and every transaction
//! without a completion marker is driven to its end:
//!
//! 1. A recorded decision is re-applied with the phase-2 executor. Phase 1
//!    is never re-run.
//! 2. A transaction with only a `PREPARING` intent is presumed aborted:
//!    `ABORT` is recorded and every listed participant is rolled back.
//! 3. Transactions whose participants cannot all be resolved stay pending
//!    in the log; a later `recover` call picks them up again.
//! 4. A transaction whose records carry no participant list is completed
//!    only if the directory names its participants. Otherwise it is
//!    reported as unresolved and its records stay in the log.
//!
//! Recovery is idempotent. Running it twice applies decisions twice at
//! most, and participants must already tolerate that.

use crate::coordinator::{Coordinator, TransactionReport};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::log::{LogAnomaly, LogRecord, LogReplay, LoggedTransaction};
use crate::participant::{Participant, ParticipantDirectory};
use crate::phase_two::ParticipantFailure;
use crate::transaction::{TransactionRecord, TransactionSnapshot};
use crate::types::{Decision, Outcome, ParticipantId, TransactionId, TransactionState};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{error, info, warn};

/// What a recovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Transactions whose recorded decision was re-applied.
    pub resumed: Vec<TransactionId>,
    /// Transactions found with only an intent and aborted.
    pub presumed_aborted: Vec<TransactionId>,
    /// Recovered transactions that every participant acknowledged.
    pub completed: Vec<TransactionId>,
    /// Recovered transactions still owing acknowledgements.
    pub pending: Vec<TransactionReport>,
    /// Transactions nobody could name the participants of. Their records
    /// are kept so a later pass can finish them.
    pub unresolved: Vec<LogAnomaly>,
    /// Transactions pruned from the log afterwards.
    pub compacted: usize,
}

impl Coordinator {
    /// Replays the decision log and finishes every incomplete transaction.
    ///
    /// Transactions open in this process are skipped. Finished transactions
    /// found in the log are remembered, so duplicate commit calls for them
    /// keep returning their outcome after a restart.
    ///
    /// # Errors
    ///
    /// Returns `LogCorruption` if the log cannot be parsed. Participant
    /// trouble is reported in [`RecoveryReport::pending`].
    pub async fn recover(
        &self,
        directory: &dyn ParticipantDirectory,
    ) -> CoordinatorResult<RecoveryReport> {
        let log = Arc::clone(&self.log);
        let records = tokio::task::spawn_blocking(move || log.read_all())
            .await
            .map_err(|e| CoordinatorError::log_write(format!("log reader task failed: {e}")))?
            .map_err(|e| {
                error!(error = %e, "decision log unreadable");
                e
            })?;
        let replay = LogReplay::from_records(records);
        for anomaly in replay.anomalies() {
            warn!(txid = %anomaly.txid, "decision log anomaly: {}", anomaly.message);
        }

        for finished in replay.transactions().iter().filter(|t| !t.is_pending()) {
            if let Some(snapshot) = finished_snapshot(finished) {
                self.registry.remember(snapshot);
            }
        }

        let mut report = RecoveryReport::default();
        for logged in replay.pending() {
            let txid = logged.txid;
            if self.registry.contains(&txid) {
                continue;
            }
            self.stats.record_recovered();

            let Some(participant_ids) = logged
                .participants
                .clone()
                .or_else(|| directory.participants_of(txid))
            else {
                warn!(txid = %txid, "participants of logged transaction unknown, left in log");
                report.unresolved.push(LogAnomaly {
                    txid,
                    message: "no participant list in the log or the directory".to_string(),
                });
                continue;
            };

            let decision = match logged.decision {
                Some(decision) => {
                    report.resumed.push(txid);
                    decision
                }
                None => {
                    if let Err(e) = self
                        .append(LogRecord::decision(txid, Decision::Abort, &participant_ids))
                        .await
                    {
                        warn!(txid = %txid, error = %e, "could not record presumed ABORT");
                    }
                    report.presumed_aborted.push(txid);
                    Decision::Abort
                }
            };
            info!(txid = %txid, decision = ?decision, "recovering transaction");

            let mut resolved: Vec<Arc<dyn Participant>> = Vec::new();
            let mut missing = Vec::new();
            for id in &participant_ids {
                match directory.resolve(id) {
                    Some(participant) => resolved.push(participant),
                    None => missing.push(id.clone()),
                }
            }
            if !missing.is_empty() {
                warn!(
                    txid = %txid,
                    missing = missing.len(),
                    "participants not resolvable, left pending"
                );
                report.pending.push(unreached(
                    txid,
                    decision,
                    missing,
                    "participant not resolvable",
                ));
                continue;
            }

            let handle = match self
                .registry
                .adopt(TransactionRecord::recovered(txid, resolved, decision))
            {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(txid = %txid, error = %e, "could not adopt recovered transaction");
                    let reason = e.to_string();
                    report.pending.push(unreached(txid, decision, participant_ids, &reason));
                    continue;
                }
            };

            let _op = handle.lock_operation().await;
            let outcome = self.run_phase_two(&handle, decision).await?;
            if outcome.is_complete() {
                report.completed.push(txid);
            } else {
                report.pending.push(outcome);
            }
        }

        if self.config.compact_on_recovery {
            match self.compact_log().await {
                Ok(pruned) => report.compacted = pruned,
                Err(e) => warn!(error = %e, "decision log compaction failed"),
            }
        }

        info!(
            resumed = report.resumed.len(),
            presumed_aborted = report.presumed_aborted.len(),
            completed = report.completed.len(),
            pending = report.pending.len(),
            unresolved = report.unresolved.len(),
            compacted = report.compacted,
            "recovery finished"
        );
        Ok(report)
    }
}

fn finished_snapshot(logged: &LoggedTransaction) -> Option<TransactionSnapshot> {
    let state = match logged.completed? {
        Outcome::Committed => TransactionState::Committed,
        Outcome::Aborted => TransactionState::Aborted,
    };
    Some(TransactionSnapshot {
        txid: logged.txid,
        state,
        decision: logged.decision,
        participants: logged.participants.clone().unwrap_or_default(),
        created_at: UNIX_EPOCH + Duration::from_millis(logged.first_seen_millis),
    })
}

fn unreached(
    txid: TransactionId,
    decision: Decision,
    participants: Vec<ParticipantId>,
    reason: &str,
) -> TransactionReport {
    TransactionReport {
        txid,
        outcome: decision.outcome(),
        failures: participants
            .into_iter()
            .map(|participant| ParticipantFailure {
                participant,
                phase: decision.into(),
                attempts: 0,
                last_error: reason.to_string(),
            })
            .collect(),
    }
}
