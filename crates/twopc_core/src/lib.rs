//! # twopc core
//!
//! A single-process two-phase-commit coordinator.
//!
//! This crate provides:
//! - A transaction registry with per-transaction locking and participant
//!   bindings
//! - Parallel prepare with per-call timeouts (any non-yes answer aborts)
//! - A durable, append-only decision log written before phase 2 starts
//! - Commit/rollback fan-out with exponential backoff retry
//! - Crash recovery with presumed abort
//!
//! ## Example
//!
//! ```rust,ignore
//! use twopc_core::{Coordinator, CoordinatorConfig, Outcome};
//!
//! let coordinator = Coordinator::in_memory(CoordinatorConfig::default())?;
//! let txid = coordinator.begin();
//! coordinator.enlist(txid, inventory)?;
//! coordinator.enlist(txid, payment)?;
//!
//! let report = coordinator.commit_transaction(txid).await?;
//! match report.outcome {
//!     Outcome::Committed => println!("committed"),
//!     Outcome::Aborted => println!("aborted"),
//! }
//! ```
//!
//! ## Guarantees
//!
//! - No participant receives `commit` unless every participant voted yes
//!   and the COMMIT decision is durable.
//! - A recorded decision is never reversed.
//! - After a crash, [`Coordinator::recover`] finishes every transaction the
//!   log left incomplete.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
#[cfg(feature = "std")]
mod dir;
mod error;
pub mod log;
mod participant;
mod phase_two;
mod prepare;
mod recovery;
mod stats;
mod transaction;
mod types;

#[cfg(test)]
mod test_util;

pub use config::{CoordinatorConfig, RetryConfig};
pub use coordinator::{Coordinator, TransactionReport};
#[cfg(feature = "std")]
pub use dir::CoordinatorDir;
pub use error::{CoordinatorError, CoordinatorResult};
pub use log::{DecisionLog, LogRecord, RecordKind, StorageDecisionLog};
pub use participant::{Participant, ParticipantDirectory, ParticipantFault};
pub use phase_two::{FailurePhase, ParticipantFailure, PhaseTwo, PhaseTwoReport};
pub use prepare::{PrepareOutcome, PreparePhase, VoteResult};
pub use recovery::RecoveryReport;
pub use stats::{CoordinatorStats, StatsSnapshot};
pub use transaction::{Lookup, TransactionHandle, TransactionRegistry, TransactionSnapshot};
pub use types::{Decision, Outcome, ParticipantId, TransactionId, TransactionState, Vote};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
