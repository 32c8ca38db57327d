//! CLI command implementations.

pub mod compact;
pub mod inspect;
pub mod verify;

use std::path::{Path, PathBuf};
use thiserror::Error;
use twopc_core::log::{parse_log, LogReplay, ParsedLog};
use twopc_core::{CoordinatorDir, CoordinatorError};
use twopc_storage::{FileBackend, StorageBackend, StorageError};

/// Errors reported by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// The directory holds no decision log.
    #[error("no decision log found in {}", .0.display())]
    NoLog(PathBuf),

    /// Coordinator-level failure (corruption, lock held).
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Storage failure while reading the log.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON output could not be produced.
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported `--format` value.
    #[error("unknown output format {0:?} (expected text or json)")]
    Format(String),

    /// `verify` found problems.
    #[error("verification failed: {0} problem(s)")]
    VerifyFailed(usize),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Output format for commands that print data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a `--format` value.
    pub fn parse(value: &str) -> CliResult<Self> {
        match value {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::Format(other.to_string())),
        }
    }
}

/// A decision log read without taking the directory lock.
pub struct LogFile {
    /// Path of the log file.
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub size: u64,
    /// Parsed complete records.
    pub parsed: ParsedLog,
}

impl LogFile {
    /// Reads and parses the log in a coordinator directory.
    ///
    /// Reading does not lock the directory, so a running coordinator may be
    /// inspected; the result is a point-in-time view.
    pub fn read(dir: &Path) -> CliResult<Self> {
        let path = dir.join(CoordinatorDir::LOG_FILE);
        if !path.is_file() {
            return Err(CliError::NoLog(dir.to_path_buf()));
        }
        let backend = FileBackend::open(&path)?;
        let bytes = backend.read_all()?;
        let parsed = parse_log(&bytes)?;
        Ok(Self {
            path,
            size: bytes.len() as u64,
            parsed,
        })
    }

    /// Bytes after the last complete record (a torn append).
    pub fn torn_bytes(&self) -> u64 {
        self.size.saturating_sub(self.parsed.valid_len)
    }

    /// Replays the parsed records.
    pub fn replay(&self) -> LogReplay {
        LogReplay::from_records(self.parsed.records.iter().cloned())
    }
}
