//! Transaction bookkeeping.
//!
//! The registry tracks every transaction this process has begun and not yet
//! retired:
//! - **Sharded**: lookups hash the id to one of a fixed number of shards, so
//!   unrelated transactions never share a lock
//! - **Per-transaction serialisation**: commit and rollback of one id hold
//!   that transaction's operation lock for their whole duration
//! - **Bindings**: a participant is enlisted in at most one open transaction
//! - **Retired outcomes**: terminal outcomes are remembered (bounded) so
//!   duplicate calls answer idempotently

mod registry;
mod state;

pub use registry::{Lookup, TransactionHandle, TransactionRegistry};
pub use state::{TransactionRecord, TransactionSnapshot};
