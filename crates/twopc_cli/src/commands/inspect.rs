//! Inspect command implementation.

use super::{CliResult, Format, LogFile};
use serde::Serialize;
use std::path::Path;
use twopc_core::log::LoggedTransaction;

/// Decision log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log file path.
    pub path: String,
    /// Log file size in bytes.
    pub log_size: u64,
    /// Number of complete records.
    pub record_count: usize,
    /// Bytes of a torn final append.
    pub torn_bytes: u64,
    /// Transactions mentioned in the log.
    pub transaction_count: usize,
    /// Transactions without a completion marker.
    pub pending_count: usize,
    /// The listed transactions.
    pub transactions: Vec<LoggedTransaction>,
}

/// Runs the inspect command.
pub fn run(path: &Path, all: bool, format: Format) -> CliResult<()> {
    let result = inspect(path, all)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text(&result, all),
    }
    Ok(())
}

/// Builds the inspection result; pending transactions only unless `all`.
pub fn inspect(path: &Path, all: bool) -> CliResult<InspectResult> {
    let log = LogFile::read(path)?;
    let replay = log.replay();
    let pending_count = replay.pending().count();
    let transactions = replay
        .transactions()
        .iter()
        .filter(|t| all || t.is_pending())
        .cloned()
        .collect();

    Ok(InspectResult {
        path: log.path.display().to_string(),
        log_size: log.size,
        record_count: log.parsed.records.len(),
        torn_bytes: log.torn_bytes(),
        transaction_count: replay.transactions().len(),
        pending_count,
        transactions,
    })
}

fn print_text(result: &InspectResult, all: bool) {
    println!("Decision log: {}", result.path);
    println!("  Size:         {} bytes", result.log_size);
    println!("  Records:      {}", result.record_count);
    if result.torn_bytes > 0 {
        println!("  Torn tail:    {} bytes", result.torn_bytes);
    }
    println!("  Transactions: {}", result.transaction_count);
    println!("  Pending:      {}", result.pending_count);
    println!();

    if result.transactions.is_empty() {
        let what = if all { "transactions" } else { "pending transactions" };
        println!("No {what}.");
        return;
    }

    println!("{:<42} {:<9} {:<10} PARTICIPANTS", "TRANSACTION", "DECISION", "COMPLETED");
    for t in &result.transactions {
        let decision = t.decision.map_or_else(|| "-".to_string(), |d| d.to_string());
        let completed = t.completed.map_or_else(|| "-".to_string(), |o| o.to_string());
        let participants = match &t.participants {
            Some(ids) => ids.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(","),
            None => "?".to_string(),
        };
        println!(
            "{:<42} {:<9} {:<10} {}",
            t.txid.to_string(),
            decision,
            completed,
            participants
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::seed_log;
    use tempfile::tempdir;

    #[test]
    fn pending_only_by_default() {
        let temp = tempdir().unwrap();
        let (_done, open) = seed_log(temp.path());

        let result = inspect(temp.path(), false).unwrap();
        assert_eq!(result.transaction_count, 2);
        assert_eq!(result.pending_count, 1);
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].txid, open);
        assert_eq!(result.record_count, 5);
    }

    #[test]
    fn all_lists_completed_too() {
        let temp = tempdir().unwrap();
        seed_log(temp.path());

        let result = inspect(temp.path(), true).unwrap();
        assert_eq!(result.transactions.len(), 2);
        assert!(serde_json::to_string(&result).unwrap().contains("\"pending_count\":1"));
    }
}
