//! # twopc testkit
//!
//! Test utilities for the twopc coordinator.
//!
//! This crate provides:
//! - Scripted participants that record every call they receive
//! - A fault-injecting storage backend for decision log failures and crashes
//! - Coordinator fixtures, including restartable file-backed coordinators
//! - Property-based test generators using proptest
//! - Concurrent stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use twopc_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn commit_with_two_participants() {
//!     let coordinator = memory_coordinator();
//!     let a = ScriptedParticipant::yes("a");
//!     let b = ScriptedParticipant::yes("b");
//!     let txid = begin_with(&coordinator, &[a.clone(), b.clone()]);
//!     let report = coordinator.commit_transaction(txid).await.unwrap();
//!     assert!(a.has_committed(txid));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod directory;
pub mod fixtures;
pub mod generators;
pub mod participant;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::directory::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::participant::*;
    pub use crate::stress::*;
}

pub use backend::{FlakyBackend, LogFaults};
pub use directory::MapDirectory;
pub use fixtures::{begin_with, fast_config, memory_coordinator, CrashHarness, FileCoordinator};
pub use generators::{behaviour_strategy, behaviours_strategy, expected_decision, Behaviour};
pub use participant::{Call, PrepareScript, ScriptedParticipant};
pub use stress::{run_concurrent_commits, StressConfig, StressTestResult};
