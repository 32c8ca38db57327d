//! Fault-injecting storage backend.
//!
//! [`FlakyBackend`] wraps another backend and fails writes on demand. The
//! switches live in a shared [`LogFaults`] handle, so a test can flip them
//! after the backend has been moved into a decision log.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use twopc_storage::{StorageBackend, StorageError, StorageResult};

/// Shared switches controlling a [`FlakyBackend`].
#[derive(Debug)]
pub struct LogFaults {
    fail_appends_containing: Mutex<Option<Vec<u8>>>,
    fail_all_appends: AtomicBool,
    fail_sync: AtomicBool,
    crashed: AtomicBool,
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    failed_appends: AtomicUsize,
}

impl Default for LogFaults {
    fn default() -> Self {
        Self {
            fail_appends_containing: Mutex::new(None),
            fail_all_appends: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
            crashed: AtomicBool::new(false),
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            failed_appends: AtomicUsize::new(0),
        }
    }
}

impl LogFaults {
    /// Creates a handle with every fault switched off.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fails every append whose bytes contain `pattern`.
    ///
    /// `",COMMIT,"` fails exactly the COMMIT decision records.
    pub fn fail_appends_containing(&self, pattern: &str) {
        *self.fail_appends_containing.lock() = Some(pattern.as_bytes().to_vec());
    }

    /// Fails every append.
    pub fn fail_all_appends(&self, fail: bool) {
        self.fail_all_appends.store(fail, Ordering::SeqCst);
    }

    /// Fails `sync` (and `flush`), after the bytes were written.
    pub fn fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Simulates a crash once `bytes` more bytes have been written: the
    /// write crossing the threshold lands partially and fails, and every
    /// later write fails too until [`clear`](Self::clear) is called.
    pub fn crash_after(&self, bytes: usize) {
        self.bytes_written.store(0, Ordering::SeqCst);
        self.crash_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Switches every fault off.
    pub fn clear(&self) {
        *self.fail_appends_containing.lock() = None;
        self.fail_all_appends.store(false, Ordering::SeqCst);
        self.fail_sync.store(false, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.bytes_written.store(0, Ordering::SeqCst);
    }

    /// True once a simulated crash has happened.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Number of appends that were failed on purpose.
    pub fn failed_appends(&self) -> usize {
        self.failed_appends.load(Ordering::SeqCst)
    }

    fn should_fail(&self, data: &[u8]) -> bool {
        if self.fail_all_appends.load(Ordering::SeqCst) {
            return true;
        }
        match &*self.fail_appends_containing.lock() {
            Some(pattern) => data.windows(pattern.len()).any(|w| w == pattern.as_slice()),
            None => false,
        }
    }
}

fn injected(message: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, message.to_string()))
}

/// A storage backend wrapper that fails on command.
pub struct FlakyBackend {
    inner: Box<dyn StorageBackend>,
    faults: Arc<LogFaults>,
}

impl FlakyBackend {
    /// Wraps `inner`, controlled by `faults`.
    pub fn new(inner: Box<dyn StorageBackend>, faults: Arc<LogFaults>) -> Self {
        Self { inner, faults }
    }
}

impl StorageBackend for FlakyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.faults.has_crashed() {
            return Err(injected("backend crashed"));
        }
        if self.faults.should_fail(data) {
            self.faults.failed_appends.fetch_add(1, Ordering::SeqCst);
            return Err(injected("injected append failure"));
        }

        let written = self
            .faults
            .bytes_written
            .fetch_add(data.len(), Ordering::SeqCst);
        let threshold = self.faults.crash_after_bytes.load(Ordering::SeqCst);
        if written.saturating_add(data.len()) > threshold {
            self.faults.failed_appends.fetch_add(1, Ordering::SeqCst);
            self.faults.crashed.store(true, Ordering::SeqCst);
            let partial = threshold.saturating_sub(written).min(data.len());
            if partial > 0 {
                self.inner.append(&data[..partial])?;
            }
            return Err(injected("simulated crash during append"));
        }

        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.faults.fail_sync.load(Ordering::SeqCst) {
            return Err(injected("injected flush failure"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.faults.fail_sync.load(Ordering::SeqCst) {
            return Err(injected("injected sync failure"));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.faults.has_crashed() {
            return Err(injected("backend crashed"));
        }
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        if self.faults.has_crashed() {
            return Err(injected("backend crashed"));
        }
        self.inner.replace(data)
    }
}
