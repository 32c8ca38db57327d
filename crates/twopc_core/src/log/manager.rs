//! The decision log contract and its storage-backed implementation.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::log::record::{parse_log, LogRecord};
use crate::types::{Decision, Outcome, ParticipantId, TransactionId};
use parking_lot::Mutex;
use std::collections::HashSet;
use twopc_storage::{InMemoryBackend, StorageBackend};
use tracing::{debug, info, warn};

#[cfg(feature = "std")]
use crate::dir::CoordinatorDir;
#[cfg(feature = "std")]
use std::path::Path;

/// Append-only, durable record of transaction decisions.
///
/// # Durability contract
///
/// [`append`](DecisionLog::append) returns `Ok` only once the record is
/// flushed to durable storage. The coordinator never starts phase 2 before
/// the decision record's `append` has returned `Ok`.
pub trait DecisionLog: Send + Sync {
    /// Durably appends one record.
    ///
    /// # Errors
    ///
    /// Returns `LogWrite` if the record could not be made durable. The
    /// record must then be treated as not written.
    fn append(&self, record: &LogRecord) -> CoordinatorResult<()>;

    /// Returns every complete record in append order.
    ///
    /// # Errors
    ///
    /// Returns `LogCorruption` for malformed records.
    fn read_all(&self) -> CoordinatorResult<Vec<LogRecord>>;

    /// Drops the records of transactions that carry a completion marker.
    ///
    /// Returns the number of transactions pruned.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or rewritten. The log is
    /// unchanged on error.
    fn compact(&self) -> CoordinatorResult<usize>;

    /// Records that phase 1 is about to start.
    fn record_intent(
        &self,
        txid: TransactionId,
        participants: &[ParticipantId],
    ) -> CoordinatorResult<()> {
        self.append(&LogRecord::intent(txid, participants))
    }

    /// Records the phase-1 decision.
    fn record(
        &self,
        txid: TransactionId,
        decision: Decision,
        participants: &[ParticipantId],
    ) -> CoordinatorResult<()> {
        self.append(&LogRecord::decision(txid, decision, participants))
    }

    /// Records that every participant acknowledged the decision.
    fn mark_complete(&self, txid: TransactionId, outcome: Outcome) -> CoordinatorResult<()> {
        self.append(&LogRecord::completion(txid, outcome))
    }
}

/// A [`DecisionLog`] over any [`StorageBackend`].
///
/// Appends are serialised by a mutex held only for the write and its flush.
/// If a failed append cannot be cut off again, the log stops accepting
/// records until the leftover bytes are removed: a later append would fuse
/// with them into one malformed line.
pub struct StorageDecisionLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    /// Length of the last acknowledged prefix while unacknowledged bytes
    /// follow it. Locked after `backend`.
    dirty_from: Mutex<Option<u64>>,
    sync_on_write: bool,
    #[cfg(feature = "std")]
    _dir: Option<CoordinatorDir>,
}

impl StorageDecisionLog {
    /// Opens a log over a backend.
    ///
    /// A torn final line left by a crash mid-append is cut off so later
    /// appends start on a clean line.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing contents are corrupt or the torn
    /// tail cannot be removed.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> CoordinatorResult<Self> {
        let mut backend = backend;
        let bytes = backend.read_all()?;
        let parsed = parse_log(&bytes)?;
        if parsed.valid_len < bytes.len() as u64 {
            backend.truncate(parsed.valid_len)?;
            backend.sync()?;
        }
        debug!(
            records = parsed.records.len(),
            bytes = parsed.valid_len,
            "decision log opened"
        );

        Ok(Self {
            backend: Mutex::new(backend),
            dirty_from: Mutex::new(None),
            sync_on_write,
            #[cfg(feature = "std")]
            _dir: None,
        })
    }

    /// Creates an empty in-memory log.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: Mutex::new(Box::new(InMemoryBackend::new())),
            dirty_from: Mutex::new(None),
            sync_on_write: false,
            #[cfg(feature = "std")]
            _dir: None,
        }
    }

    /// Opens the log inside a coordinator directory, taking its lock.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorLocked` if another process owns the directory,
    /// or any error from [`StorageDecisionLog::new`].
    #[cfg(feature = "std")]
    pub fn open_dir(path: &Path, sync_on_write: bool) -> CoordinatorResult<Self> {
        let dir = CoordinatorDir::open(path, true)?;
        let backend = twopc_storage::FileBackend::open(&dir.log_path())?;
        let mut log = Self::new(Box::new(backend), sync_on_write)?;
        info!(path = %path.display(), "decision log directory opened");
        log._dir = Some(dir);
        Ok(log)
    }

    /// Returns the current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> CoordinatorResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

impl DecisionLog for StorageDecisionLog {
    fn append(&self, record: &LogRecord) -> CoordinatorResult<()> {
        let line = record.encode_line();
        let mut backend = self.backend.lock();
        let mut dirty_from = self.dirty_from.lock();

        if let Some(valid_len) = *dirty_from {
            backend.truncate(valid_len).map_err(|e| {
                CoordinatorError::log_write(format!(
                    "unacknowledged bytes past offset {valid_len} cannot be removed: {e}"
                ))
            })?;
            *dirty_from = None;
            info!(bytes = valid_len, "unacknowledged log bytes removed");
        }

        let before = backend
            .size()
            .map_err(|e| CoordinatorError::log_write(e.to_string()))?;

        let written = match backend.append(line.as_bytes()) {
            Ok(_) if self.sync_on_write => backend.sync(),
            Ok(_) => backend.flush(),
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            // The bytes may have reached the file; cut them off so the record
            // cannot resurface on replay.
            if let Err(undo) = backend.truncate(before) {
                warn!(error = %undo, "could not remove unacknowledged log record, appends blocked");
                *dirty_from = Some(before);
            }
            return Err(CoordinatorError::log_write(e.to_string()));
        }

        Ok(())
    }

    fn read_all(&self) -> CoordinatorResult<Vec<LogRecord>> {
        let backend = self.backend.lock();
        let dirty_from = *self.dirty_from.lock();
        let bytes = backend.read_all()?;
        Ok(parse_log(acknowledged(&bytes, dirty_from))?.records)
    }

    fn compact(&self) -> CoordinatorResult<usize> {
        let mut backend = self.backend.lock();
        let mut dirty_from = self.dirty_from.lock();
        let bytes = backend.read_all()?;
        let records = parse_log(acknowledged(&bytes, *dirty_from))?.records;

        let completed: HashSet<TransactionId> = records
            .iter()
            .filter(|r| r.kind.completion().is_some())
            .map(|r| r.txid)
            .collect();
        if completed.is_empty() && dirty_from.is_none() {
            return Ok(0);
        }

        let survivors: String = records
            .iter()
            .filter(|r| !completed.contains(&r.txid))
            .map(LogRecord::encode_line)
            .collect();

        backend.replace(survivors.as_bytes())?;
        *dirty_from = None;
        info!(pruned = completed.len(), "decision log compacted");
        Ok(completed.len())
    }
}

fn acknowledged(bytes: &[u8], dirty_from: Option<u64>) -> &[u8] {
    match dirty_from {
        Some(len) => &bytes[..bytes.len().min(len as usize)],
        None => bytes,
    }
}

impl std::fmt::Debug for StorageDecisionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageDecisionLog")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}
