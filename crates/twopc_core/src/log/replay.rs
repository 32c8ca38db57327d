//! Folding log records into per-transaction state.

use crate::log::record::{LogRecord, RecordKind};
use crate::types::{Decision, Outcome, ParticipantId, TransactionId};
use serde::Serialize;
use std::collections::HashMap;

/// What the log says about one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedTransaction {
    /// The transaction.
    pub txid: TransactionId,
    /// Enlisted participants, from the first intent or decision record
    /// that lists them. `None` if no record does.
    pub participants: Option<Vec<ParticipantId>>,
    /// The authoritative decision, if one was recorded.
    pub decision: Option<Decision>,
    /// The completion marker, if phase 2 finished.
    pub completed: Option<Outcome>,
    /// Timestamp of the first record for this transaction.
    pub first_seen_millis: u64,
}

impl LoggedTransaction {
    fn new(txid: TransactionId, timestamp_millis: u64) -> Self {
        Self {
            txid,
            participants: None,
            decision: None,
            completed: None,
            first_seen_millis: timestamp_millis,
        }
    }

    /// Returns true if phase 2 has not been confirmed complete.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.completed.is_none()
    }
}

/// A record sequence that breaks the protocol's rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogAnomaly {
    /// The transaction concerned.
    pub txid: TransactionId,
    /// What is wrong.
    pub message: String,
}

/// The decision log replayed into per-transaction state.
///
/// Decision rule: an `ABORT` always wins over a `COMMIT` for the same
/// transaction. The coordinator only writes `ABORT` after a `COMMIT` whose
/// append was not acknowledged, so no participant can have been told to
/// commit. A `COMMIT` following an `ABORT` is ignored and reported.
#[derive(Debug, Default)]
pub struct LogReplay {
    transactions: Vec<LoggedTransaction>,
    index: HashMap<TransactionId, usize>,
    anomalies: Vec<LogAnomaly>,
}

impl LogReplay {
    /// Replays records in log order.
    pub fn from_records(records: impl IntoIterator<Item = LogRecord>) -> Self {
        let mut replay = Self::default();
        for record in records {
            replay.apply(record);
        }
        replay
    }

    fn apply(&mut self, record: LogRecord) {
        let slot = match self.index.get(&record.txid) {
            Some(&slot) => slot,
            None => {
                self.transactions
                    .push(LoggedTransaction::new(record.txid, record.timestamp_millis));
                self.index.insert(record.txid, self.transactions.len() - 1);
                self.transactions.len() - 1
            }
        };
        let tx = &mut self.transactions[slot];

        if tx.participants.is_none() {
            tx.participants = record.participants;
        }

        let mut anomaly = None;
        match record.kind {
            RecordKind::Preparing => {
                if tx.decision.is_some() {
                    anomaly = Some("PREPARING after a decision".to_string());
                }
            }
            RecordKind::Commit => match tx.decision {
                None => tx.decision = Some(Decision::Commit),
                Some(Decision::Commit) => {}
                Some(Decision::Abort) => {
                    anomaly = Some("COMMIT after ABORT ignored".to_string());
                }
            },
            RecordKind::Abort => {
                // An ABORT after COMMIT supersedes an unacknowledged COMMIT.
                tx.decision = Some(Decision::Abort);
            }
            RecordKind::Committed | RecordKind::RolledBack => {
                let outcome = record.kind.completion();
                match (tx.decision, outcome) {
                    (None, _) => anomaly = Some(format!("{} without a decision", record.kind)),
                    (Some(decision), Some(outcome)) if decision.outcome() != outcome => {
                        anomaly = Some(format!(
                            "{} contradicts decision {decision}",
                            record.kind
                        ));
                    }
                    _ => tx.completed = outcome,
                }
            }
        }

        if let Some(message) = anomaly {
            self.anomalies.push(LogAnomaly {
                txid: record.txid,
                message,
            });
        }
    }

    /// All transactions, in order of first appearance.
    #[must_use]
    pub fn transactions(&self) -> &[LoggedTransaction] {
        &self.transactions
    }

    /// Transactions whose phase 2 is not confirmed complete.
    pub fn pending(&self) -> impl Iterator<Item = &LoggedTransaction> {
        self.transactions.iter().filter(|t| t.is_pending())
    }

    /// Looks up one transaction.
    #[must_use]
    pub fn get(&self, txid: &TransactionId) -> Option<&LoggedTransaction> {
        self.index.get(txid).map(|&slot| &self.transactions[slot])
    }

    /// Protocol violations found while replaying.
    #[must_use]
    pub fn anomalies(&self) -> &[LogAnomaly] {
        &self.anomalies
    }
}
