//! # twopc storage
//!
//! Storage backend trait and implementations for the twopc decision log.
//!
//! Storage backends are **opaque byte stores** - they do not interpret
//! the data they store. The decision log in `twopc_core` owns the record
//! format; backends only provide ordered, durable bytes.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, flush, replace)
//! - No knowledge of transactions, decisions or log records
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral coordinators
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use twopc_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
