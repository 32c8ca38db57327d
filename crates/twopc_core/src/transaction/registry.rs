//! Sharded transaction registry.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::participant::Participant;
use crate::transaction::state::{TransactionRecord, TransactionSnapshot};
use crate::types::{ParticipantId, TransactionId, TransactionState};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// Number of shards for both the transaction map and the binding map.
const SHARD_COUNT: usize = 16;

fn shard_index<K: Hash>(key: &K) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

/// A registered transaction.
///
/// The record sits behind a short read/write lock so snapshots never wait
/// for a commit in progress. Commit and rollback additionally hold the
/// operation lock across all of their participant calls.
pub struct TransactionHandle {
    txid: TransactionId,
    record: RwLock<TransactionRecord>,
    operation: tokio::sync::Mutex<()>,
}

impl TransactionHandle {
    fn new(record: TransactionRecord) -> Self {
        Self {
            txid: record.txid(),
            record: RwLock::new(record),
            operation: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        self.txid
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.record.read().state()
    }

    /// Returns a snapshot of the record.
    #[must_use]
    pub fn snapshot(&self) -> TransactionSnapshot {
        self.record.read().snapshot()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&TransactionRecord) -> R) -> R {
        f(&self.record.read())
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut TransactionRecord) -> R) -> R {
        f(&mut self.record.write())
    }

    /// Waits for exclusive use of this transaction.
    pub(crate) async fn lock_operation(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.operation.lock().await
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("txid", &self.txid)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Result of looking a transaction up.
#[derive(Debug)]
pub enum Lookup {
    /// Still open in this process.
    Active(Arc<TransactionHandle>),
    /// Reached a terminal state; the final snapshot is remembered.
    Retired(TransactionSnapshot),
    /// Never seen, or forgotten.
    Unknown,
}

/// Bounded FIFO of terminal snapshots.
struct RetiredOutcomes {
    order: VecDeque<TransactionId>,
    snapshots: HashMap<TransactionId, TransactionSnapshot>,
    capacity: usize,
}

impl RetiredOutcomes {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            snapshots: HashMap::new(),
            capacity,
        }
    }

    fn insert(&mut self, snapshot: TransactionSnapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.snapshots.insert(snapshot.txid, snapshot.clone()).is_none() {
            self.order.push_back(snapshot.txid);
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.snapshots.remove(&evicted);
            }
        }
    }

    fn get(&self, txid: &TransactionId) -> Option<&TransactionSnapshot> {
        self.snapshots.get(txid)
    }
}

struct Shard {
    active: HashMap<TransactionId, Arc<TransactionHandle>>,
    retired: RetiredOutcomes,
}

/// Registry of open transactions and participant bindings.
pub struct TransactionRegistry {
    shards: Box<[RwLock<Shard>]>,
    bindings: Box<[Mutex<HashMap<ParticipantId, TransactionId>>]>,
}

impl TransactionRegistry {
    /// Creates an empty registry that remembers up to `retired_capacity`
    /// terminal transactions per shard.
    #[must_use]
    pub fn new(retired_capacity: usize) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| {
                RwLock::new(Shard {
                    active: HashMap::new(),
                    retired: RetiredOutcomes::new(retired_capacity),
                })
            })
            .collect();
        let bindings = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self { shards, bindings }
    }

    fn shard(&self, txid: &TransactionId) -> &RwLock<Shard> {
        &self.shards[shard_index(txid)]
    }

    fn binding_shard(&self, id: &ParticipantId) -> &Mutex<HashMap<ParticipantId, TransactionId>> {
        &self.bindings[shard_index(id)]
    }

    /// Creates a transaction in `Init`.
    pub fn begin(&self) -> TransactionId {
        let txid = TransactionId::new();
        let handle = Arc::new(TransactionHandle::new(TransactionRecord::new(txid)));
        self.shard(&txid).write().active.insert(txid, handle);
        debug!(txid = %txid, "transaction begun");
        txid
    }

    /// Looks a transaction up among active and retired ones.
    #[must_use]
    pub fn lookup(&self, txid: &TransactionId) -> Lookup {
        let shard = self.shard(txid).read();
        if let Some(handle) = shard.active.get(txid) {
            return Lookup::Active(Arc::clone(handle));
        }
        match shard.retired.get(txid) {
            Some(snapshot) => Lookup::Retired(snapshot.clone()),
            None => Lookup::Unknown,
        }
    }

    /// Returns true if the transaction is open in this process.
    #[must_use]
    pub fn contains(&self, txid: &TransactionId) -> bool {
        self.shard(txid).read().active.contains_key(txid)
    }

    /// Returns a snapshot of an active or retired transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTransaction` if the id is not known.
    pub fn get(&self, txid: &TransactionId) -> CoordinatorResult<TransactionSnapshot> {
        match self.lookup(txid) {
            Lookup::Active(handle) => Ok(handle.snapshot()),
            Lookup::Retired(snapshot) => Ok(snapshot),
            Lookup::Unknown => Err(CoordinatorError::unknown_transaction(*txid)),
        }
    }

    /// Adds a participant to a transaction in `Init`.
    ///
    /// Enlisting a participant that is already enlisted in the same
    /// transaction does nothing.
    ///
    /// # Errors
    ///
    /// - `UnknownTransaction` if the id is not known
    /// - `InvalidState` if the transaction has left `Init`
    /// - `ParticipantAlreadyBound` if the participant belongs to another
    ///   open transaction
    pub fn enlist(
        &self,
        txid: &TransactionId,
        participant: Arc<dyn Participant>,
    ) -> CoordinatorResult<()> {
        let handle = match self.lookup(txid) {
            Lookup::Active(handle) => handle,
            Lookup::Retired(snapshot) => {
                return Err(CoordinatorError::invalid_state(
                    *txid,
                    snapshot.state,
                    "enlist into",
                ))
            }
            Lookup::Unknown => return Err(CoordinatorError::unknown_transaction(*txid)),
        };

        let id = participant.id().clone();
        handle.update(|record| {
            record.ensure_state(TransactionState::Init, "enlist into")?;
            if record.is_enlisted(&id) {
                return Ok(());
            }
            self.bind(&id, *txid)?;
            record.push_participant(participant);
            debug!(txid = %txid, participant = %id, "participant enlisted");
            Ok(())
        })
    }

    fn bind(&self, id: &ParticipantId, txid: TransactionId) -> CoordinatorResult<()> {
        let mut bindings = self.binding_shard(id).lock();
        match bindings.get(id) {
            Some(&owner) if owner != txid => Err(CoordinatorError::ParticipantAlreadyBound {
                participant: id.clone(),
                bound_to: owner,
            }),
            _ => {
                bindings.insert(id.clone(), txid);
                Ok(())
            }
        }
    }

    fn release(&self, ids: &[ParticipantId], txid: TransactionId) {
        for id in ids {
            let mut bindings = self.binding_shard(id).lock();
            if bindings.get(id) == Some(&txid) {
                bindings.remove(id);
            }
        }
    }

    /// Returns the open transaction a participant is bound to.
    #[must_use]
    pub fn bound_to(&self, id: &ParticipantId) -> Option<TransactionId> {
        self.binding_shard(id).lock().get(id).copied()
    }

    /// Moves a terminal transaction from the active map to the retired
    /// outcomes and releases its participant bindings.
    pub(crate) fn retire(&self, handle: &TransactionHandle) {
        let snapshot = handle.snapshot();
        let txid = snapshot.txid;
        {
            let mut shard = self.shard(&txid).write();
            shard.active.remove(&txid);
            shard.retired.insert(snapshot.clone());
        }
        self.release(&snapshot.participants, txid);
        debug!(txid = %txid, state = %snapshot.state, "transaction retired");
    }

    /// Remembers the outcome of a transaction this process never held, such
    /// as one finished by recovery.
    pub(crate) fn remember(&self, snapshot: TransactionSnapshot) {
        self.shard(&snapshot.txid).write().retired.insert(snapshot);
    }

    /// Registers a decided transaction found in the log so a later retry can
    /// finish its phase 2.
    ///
    /// # Errors
    ///
    /// Returns `ParticipantAlreadyBound` if one of its participants already
    /// belongs to another open transaction. Nothing is registered then.
    pub(crate) fn adopt(
        &self,
        record: TransactionRecord,
    ) -> CoordinatorResult<Arc<TransactionHandle>> {
        let txid = record.txid();
        let ids = record.participant_ids();

        let mut bound = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Err(e) = self.bind(id, txid) {
                self.release(&bound, txid);
                return Err(e);
            }
            bound.push(id.clone());
        }

        let handle = Arc::new(TransactionHandle::new(record));
        self.shard(&txid)
            .write()
            .active
            .insert(txid, Arc::clone(&handle));
        debug!(txid = %txid, "transaction adopted from decision log");
        Ok(handle)
    }

    /// Returns the number of open transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shards.iter().map(|s| s.read().active.len()).sum()
    }

    /// Returns every open transaction.
    #[must_use]
    pub fn open_transactions(&self) -> Vec<Arc<TransactionHandle>> {
        self.shards
            .iter()
            .flat_map(|s| s.read().active.values().cloned().collect::<Vec<_>>())
            .collect()
    }
}

impl std::fmt::Debug for TransactionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRegistry")
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}
