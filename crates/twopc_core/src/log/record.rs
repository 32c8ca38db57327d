//! Decision log records and their line encoding.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::types::{Decision, Outcome, ParticipantId, TransactionId};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Field separator within a line.
const FIELD_SEP: char = ',';

/// Separator between participant ids in the fourth field.
const PARTICIPANT_SEP: char = ';';

/// Kind of a decision log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Phase 1 is about to start. Not authoritative.
    Preparing,
    /// Phase-1 decision COMMIT.
    Commit,
    /// Phase-1 decision ABORT.
    Abort,
    /// Every participant acknowledged commit.
    Committed,
    /// Every participant acknowledged rollback.
    RolledBack,
}

impl RecordKind {
    /// Returns the token written to the log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordKind::Preparing => "PREPARING",
            RecordKind::Commit => "COMMIT",
            RecordKind::Abort => "ABORT",
            RecordKind::Committed => "COMMITTED",
            RecordKind::RolledBack => "ROLLED_BACK",
        }
    }

    /// Parses a log token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "PREPARING" => Some(RecordKind::Preparing),
            "COMMIT" => Some(RecordKind::Commit),
            "ABORT" => Some(RecordKind::Abort),
            "COMMITTED" => Some(RecordKind::Committed),
            "ROLLED_BACK" => Some(RecordKind::RolledBack),
            _ => None,
        }
    }

    /// Returns the decision carried by a decision record.
    #[must_use]
    pub const fn decision(self) -> Option<Decision> {
        match self {
            RecordKind::Commit => Some(Decision::Commit),
            RecordKind::Abort => Some(Decision::Abort),
            _ => None,
        }
    }

    /// Returns the outcome carried by a completion marker.
    #[must_use]
    pub const fn completion(self) -> Option<Outcome> {
        match self {
            RecordKind::Committed => Some(Outcome::Committed),
            RecordKind::RolledBack => Some(Outcome::Aborted),
            _ => None,
        }
    }
}

impl From<Decision> for RecordKind {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Commit => RecordKind::Commit,
            Decision::Abort => RecordKind::Abort,
        }
    }
}

impl From<Outcome> for RecordKind {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Committed => RecordKind::Committed,
            Outcome::Aborted => RecordKind::RolledBack,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the decision log.
///
/// ```text
/// <transactionId>,<KIND>,<timestamp_millis>[,<participant>;<participant>...]
/// ```
///
/// The coordinator always writes the fourth field on intent and decision
/// records, empty for a transaction without participants. A line without it
/// says nothing about who took part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Transaction the record belongs to.
    pub txid: TransactionId,
    /// What the record says.
    pub kind: RecordKind,
    /// Milliseconds since the Unix epoch when the record was created.
    pub timestamp_millis: u64,
    /// Enlisted participants, `None` when the line has no participant field.
    pub participants: Option<Vec<ParticipantId>>,
}

impl LogRecord {
    /// Creates a `PREPARING` intent record.
    #[must_use]
    pub fn intent(txid: TransactionId, participants: &[ParticipantId]) -> Self {
        Self {
            txid,
            kind: RecordKind::Preparing,
            timestamp_millis: now_millis(),
            participants: Some(participants.to_vec()),
        }
    }

    /// Creates a `COMMIT` or `ABORT` decision record.
    #[must_use]
    pub fn decision(
        txid: TransactionId,
        decision: Decision,
        participants: &[ParticipantId],
    ) -> Self {
        Self {
            txid,
            kind: decision.into(),
            timestamp_millis: now_millis(),
            participants: Some(participants.to_vec()),
        }
    }

    /// Creates a `COMMITTED` or `ROLLED_BACK` completion marker.
    #[must_use]
    pub fn completion(txid: TransactionId, outcome: Outcome) -> Self {
        Self {
            txid,
            kind: outcome.into(),
            timestamp_millis: now_millis(),
            participants: None,
        }
    }

    /// Encodes the record as one newline-terminated line.
    #[must_use]
    pub fn encode_line(&self) -> String {
        let mut line = format!(
            "{}{FIELD_SEP}{}{FIELD_SEP}{}",
            self.txid.to_log_string(),
            self.kind,
            self.timestamp_millis
        );
        if let Some(participants) = &self.participants {
            line.push(FIELD_SEP);
            for (i, participant) in participants.iter().enumerate() {
                if i > 0 {
                    line.push(PARTICIPANT_SEP);
                }
                line.push_str(participant.as_str());
            }
        }
        line.push('\n');
        line
    }

    /// Parses one line (without its newline). `line_no` is 1-based and only
    /// used in error messages.
    ///
    /// # Errors
    ///
    /// Returns `LogCorruption` if the line is malformed.
    pub fn parse_line(line: &str, line_no: usize) -> CoordinatorResult<Self> {
        let fields: Vec<&str> = line.split(FIELD_SEP).collect();
        if fields.len() != 3 && fields.len() != 4 {
            return Err(CoordinatorError::log_corruption(
                line_no,
                format!("expected 3 or 4 fields, found {}", fields.len()),
            ));
        }

        let txid: TransactionId = fields[0].parse().map_err(|e| {
            CoordinatorError::log_corruption(line_no, format!("bad transaction id: {e}"))
        })?;
        let kind = RecordKind::parse(fields[1]).ok_or_else(|| {
            CoordinatorError::log_corruption(line_no, format!("unknown record kind {:?}", fields[1]))
        })?;
        let timestamp_millis: u64 = fields[2].parse().map_err(|e| {
            CoordinatorError::log_corruption(line_no, format!("bad timestamp: {e}"))
        })?;

        let participants = match fields.get(3) {
            Some(list) if list.is_empty() => Some(Vec::new()),
            Some(list) => Some(
                list.split(PARTICIPANT_SEP)
                    .map(|id| {
                        ParticipantId::new(id).map_err(|e| {
                            CoordinatorError::log_corruption(line_no, e.to_string())
                        })
                    })
                    .collect::<CoordinatorResult<Vec<_>>>()?,
            ),
            None => None,
        };

        if participants.is_some() && kind.completion().is_some() {
            return Err(CoordinatorError::log_corruption(
                line_no,
                "completion marker carries participants",
            ));
        }

        Ok(Self {
            txid,
            kind,
            timestamp_millis,
            participants,
        })
    }
}

/// Result of scanning raw log bytes.
#[derive(Debug, Default)]
pub struct ParsedLog {
    /// Complete records in file order.
    pub records: Vec<LogRecord>,
    /// Length of the prefix made of complete lines. Anything past it is a
    /// torn final write.
    pub valid_len: u64,
}

/// Parses raw log bytes into records.
///
/// A final line without its newline is a write that never completed; it is
/// dropped. Blank lines are skipped.
///
/// # Errors
///
/// Returns `LogCorruption` for any malformed complete line.
pub fn parse_log(bytes: &[u8]) -> CoordinatorResult<ParsedLog> {
    let mut parsed = ParsedLog::default();
    let mut start = 0usize;
    let mut line_no = 0usize;

    while let Some(pos) = bytes[start..].iter().position(|&b| b == b'\n') {
        line_no += 1;
        let end = start + pos;
        let raw = &bytes[start..end];
        start = end + 1;
        parsed.valid_len = start as u64;

        let line = std::str::from_utf8(raw)
            .map_err(|e| CoordinatorError::log_corruption(line_no, format!("invalid UTF-8: {e}")))?
            .trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        parsed.records.push(LogRecord::parse_line(line, line_no)?);
    }

    if start < bytes.len() {
        warn!(
            torn_bytes = bytes.len() - start,
            "discarding incomplete final decision log line"
        );
    }

    Ok(parsed)
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    #[test]
    fn decision_line_layout() {
        let txid = TransactionId::new();
        let record = LogRecord {
            txid,
            kind: RecordKind::Commit,
            timestamp_millis: 1_700_000_000_000,
            participants: Some(vec![pid("inventory"), pid("payment")]),
        };

        assert_eq!(
            record.encode_line(),
            format!(
                "{},COMMIT,1700000000000,inventory;payment\n",
                txid.to_log_string()
            )
        );
    }

    #[test]
    fn three_field_line_parses() {
        let txid = TransactionId::new();
        let line = format!("{},ABORT,42", txid.to_log_string());
        let record = LogRecord::parse_line(&line, 1).unwrap();

        assert_eq!(record.txid, txid);
        assert_eq!(record.kind, RecordKind::Abort);
        assert_eq!(record.timestamp_millis, 42);
        assert_eq!(record.participants, None);
    }

    #[test]
    fn empty_participant_field_is_not_a_missing_one() {
        let txid = TransactionId::new();
        let record = LogRecord::decision(txid, Decision::Commit, &[]);
        let line = record.encode_line();

        assert_eq!(
            line,
            format!("{},COMMIT,{},\n", txid.to_log_string(), record.timestamp_millis)
        );
        let parsed = LogRecord::parse_line(line.trim_end(), 1).unwrap();
        assert_eq!(parsed.participants, Some(Vec::new()));
    }

    #[test]
    fn completion_marker_has_three_fields() {
        let txid = TransactionId::new();
        let marker = LogRecord::completion(txid, Outcome::Aborted);
        assert_eq!(marker.encode_line().matches(',').count(), 2);
    }

    #[test]
    fn encoded_line_parses_back() {
        let record = LogRecord::intent(TransactionId::new(), &[pid("a"), pid("b")]);
        let line = record.encode_line();
        let parsed = LogRecord::parse_line(line.trim_end(), 1).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn malformed_lines_are_corruption() {
        let txid = TransactionId::new().to_log_string();
        for line in [
            "not-a-uuid,COMMIT,1".to_string(),
            format!("{txid},MAYBE,1"),
            format!("{txid},COMMIT,yesterday"),
            format!("{txid},COMMIT"),
            format!("{txid},COMMIT,1,a,b"),
            format!("{txid},COMMITTED,1,a"),
            format!("{txid},ROLLED_BACK,1,"),
            format!("{txid},ABORT,1,a;;b"),
        ] {
            assert!(
                matches!(
                    LogRecord::parse_line(&line, 7),
                    Err(CoordinatorError::LogCorruption { line: 7, .. })
                ),
                "{line} should be rejected"
            );
        }
    }

    #[test]
    fn parse_log_drops_torn_tail() {
        let first = LogRecord::decision(TransactionId::new(), Decision::Commit, &[pid("a")]);
        let mut bytes = first.encode_line().into_bytes();
        let complete_len = bytes.len() as u64;
        bytes.extend_from_slice(b"0f1e2d3c-half-written");

        let parsed = parse_log(&bytes).unwrap();
        assert_eq!(parsed.records, vec![first]);
        assert_eq!(parsed.valid_len, complete_len);
    }

    #[test]
    fn parse_log_reports_line_numbers() {
        let good = LogRecord::completion(TransactionId::new(), Outcome::Committed);
        let mut bytes = good.encode_line().into_bytes();
        bytes.extend_from_slice(b"\ngarbage\n");

        match parse_log(&bytes) {
            Err(CoordinatorError::LogCorruption { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected corruption, got {other:?}"),
        }
    }
}
