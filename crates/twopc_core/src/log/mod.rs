//! Durable decision log.
//!
//! The decision log is the coordinator's single source of truth after a
//! crash. It is an append-only text file, one record per line:
//!
//! ```text
//! 7d1c...-...,PREPARING,1700000000000,inventory;payment
//! 7d1c...-...,COMMIT,1700000000120,inventory;payment
//! 7d1c...-...,COMMITTED,1700000000245
//! ```
//!
//! Only `COMMIT` and `ABORT` are authoritative. `PREPARING` marks that phase 1
//! started (and lets recovery presume abort), completion markers let
//! recovery and compaction skip finished transactions.

mod manager;
mod record;
mod replay;

pub use manager::{DecisionLog, StorageDecisionLog};
pub use record::{now_millis, parse_log, LogRecord, ParsedLog, RecordKind};
pub use replay::{LogAnomaly, LogReplay, LoggedTransaction};
