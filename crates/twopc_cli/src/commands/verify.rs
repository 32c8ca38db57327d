//! Verify command implementation.

use super::{CliError, CliResult, LogFile};
use std::path::Path;
use twopc_core::CoordinatorError;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of complete records checked.
    pub records_checked: usize,
    /// Number of transactions in the log.
    pub transactions: usize,
    /// Bytes of a torn final append; removed on the next open.
    pub torn_bytes: u64,
    /// Protocol violations and corruption found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying decision log in {:?}", path);
    println!();

    let result = verify(path)?;
    println!("  Records checked: {}", result.records_checked);
    println!("  Transactions:    {}", result.transactions);
    if result.torn_bytes > 0 {
        println!(
            "  Torn tail:       {} bytes (dropped when the coordinator reopens the log)",
            result.torn_bytes
        );
    }
    for error in &result.errors {
        println!("  ✗ {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Decision log verification passed");
        Ok(())
    } else {
        println!("✗ Decision log verification failed");
        Err(CliError::VerifyFailed(result.errors.len()))
    }
}

/// Checks that every line parses and the records obey the protocol.
pub fn verify(path: &Path) -> CliResult<VerifyResult> {
    let log = match LogFile::read(path) {
        Ok(log) => log,
        Err(CliError::Coordinator(e @ CoordinatorError::LogCorruption { .. })) => {
            return Ok(VerifyResult {
                errors: vec![e.to_string()],
                ..VerifyResult::default()
            });
        }
        Err(e) => return Err(e),
    };

    let replay = log.replay();
    Ok(VerifyResult {
        records_checked: log.parsed.records.len(),
        transactions: replay.transactions().len(),
        torn_bytes: log.torn_bytes(),
        errors: replay
            .anomalies()
            .iter()
            .map(|a| format!("{}: {}", a.txid, a.message))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::seed_log;
    use tempfile::tempdir;
    use twopc_core::CoordinatorDir;

    #[test]
    fn clean_log_passes() {
        let temp = tempdir().unwrap();
        seed_log(temp.path());

        let result = verify(temp.path()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.records_checked, 5);
        assert_eq!(result.transactions, 2);
    }

    #[test]
    fn malformed_line_fails() {
        let temp = tempdir().unwrap();
        seed_log(temp.path());
        let log_path = temp.path().join(CoordinatorDir::LOG_FILE);
        let mut text = std::fs::read_to_string(&log_path).unwrap();
        text.push_str("not,a,record\n");
        std::fs::write(&log_path, text).unwrap();

        let result = verify(temp.path()).unwrap();
        assert!(!result.is_ok());
        assert!(run(temp.path()).is_err());
    }

    #[test]
    fn completion_without_decision_is_reported() {
        let temp = tempdir().unwrap();
        let (_done, open) = seed_log(temp.path());
        let log_path = temp.path().join(CoordinatorDir::LOG_FILE);
        let mut text = std::fs::read_to_string(&log_path).unwrap();
        let orphan = twopc_core::TransactionId::new();
        text.push_str(&format!("{},ROLLED_BACK,1\n", orphan.to_log_string()));
        std::fs::write(&log_path, text).unwrap();

        let result = verify(temp.path()).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(!result.errors[0].contains(&open.to_string()));
    }
}
