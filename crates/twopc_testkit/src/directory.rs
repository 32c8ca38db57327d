//! A mutable participant directory for recovery tests.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use twopc_core::{Participant, ParticipantDirectory, ParticipantId, TransactionId};

/// A [`ParticipantDirectory`] whose entries can change between recovery
/// passes, e.g. to model a participant coming back online.
#[derive(Default)]
pub struct MapDirectory {
    entries: RwLock<HashMap<ParticipantId, Arc<dyn Participant>>>,
    members: RwLock<HashMap<TransactionId, Vec<ParticipantId>>>,
}

impl MapDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory holding `participants`.
    pub fn from_participants<I>(participants: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Participant>>,
    {
        let directory = Self::new();
        for participant in participants {
            directory.insert(participant);
        }
        directory
    }

    /// Adds or replaces a participant.
    pub fn insert(&self, participant: Arc<dyn Participant>) {
        self.entries
            .write()
            .insert(participant.id().clone(), participant);
    }

    /// Records who took part in `txid`, for log lines that do not say.
    pub fn assign(&self, txid: TransactionId, participants: &[ParticipantId]) {
        self.members.write().insert(txid, participants.to_vec());
    }

    /// Removes a participant, making it unresolvable.
    pub fn remove(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        self.entries.write().remove(id)
    }

    /// Number of resolvable participants.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing is resolvable.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ParticipantDirectory for MapDirectory {
    fn resolve(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        self.entries.read().get(id).cloned()
    }

    fn participants_of(&self, txid: TransactionId) -> Option<Vec<ParticipantId>> {
        self.members.read().get(&txid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::ScriptedParticipant;

    #[test]
    fn resolves_until_removed() {
        let participant: Arc<dyn Participant> = ScriptedParticipant::yes("ledger");
        let id = participant.id().clone();
        let directory = MapDirectory::from_participants([participant]);

        assert!(directory.resolve(&id).is_some());
        assert!(directory.remove(&id).is_some());
        assert!(directory.resolve(&id).is_none());
        assert!(directory.is_empty());
    }

    #[test]
    fn assigned_members_are_returned() {
        let directory = MapDirectory::new();
        let txid = TransactionId::new();
        assert!(directory.participants_of(txid).is_none());

        let ids = [ParticipantId::new("a").unwrap(), ParticipantId::new("b").unwrap()];
        directory.assign(txid, &ids);
        assert_eq!(directory.participants_of(txid), Some(ids.to_vec()));
    }
}
