//! Compact command implementation.

use super::{CliResult, LogFile};
use std::path::Path;
use tracing::info;
use twopc_core::{DecisionLog, StorageDecisionLog};

/// Compaction result.
#[derive(Debug)]
pub struct CompactResult {
    /// Transactions with a completion marker (pruned, or prunable on a dry run).
    pub pruned: usize,
    /// Transactions kept because phase 2 is unfinished.
    pub kept: usize,
    /// Log size before compaction.
    pub size_before: u64,
    /// Log size afterwards; unchanged on a dry run.
    pub size_after: u64,
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> CliResult<()> {
    let result = compact(path, dry_run)?;

    if dry_run {
        println!("Dry run: {} completed transaction(s) would be pruned", result.pruned);
    } else {
        println!("Pruned {} completed transaction(s)", result.pruned);
        println!(
            "Log size: {} -> {} bytes",
            result.size_before, result.size_after
        );
    }
    println!("{} unfinished transaction(s) kept", result.kept);
    Ok(())
}

/// Prunes completed transactions. A real run takes the directory lock and
/// fails with `CoordinatorLocked` while a coordinator owns the log.
pub fn compact(path: &Path, dry_run: bool) -> CliResult<CompactResult> {
    let before = LogFile::read(path)?;
    let replay = before.replay();
    let kept = replay.pending().count();

    if dry_run {
        return Ok(CompactResult {
            pruned: replay.transactions().len() - kept,
            kept,
            size_before: before.size,
            size_after: before.size,
        });
    }

    let log = StorageDecisionLog::open_dir(path, true)?;
    let pruned = log.compact()?;
    let size_after = log.size()?;
    info!(pruned, size_after, "decision log compacted");

    Ok(CompactResult {
        pruned,
        kept,
        size_before: before.size,
        size_after,
    })
}
