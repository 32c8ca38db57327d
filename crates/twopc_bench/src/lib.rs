//! Benchmark utilities.

#![warn(missing_docs)]

use async_trait::async_trait;
use std::sync::Arc;
use twopc_core::{Participant, ParticipantFault, ParticipantId, TransactionId, Vote};

/// A participant that answers immediately and keeps no state.
pub struct InstantParticipant {
    id: ParticipantId,
    vote: Vote,
}

impl InstantParticipant {
    /// Creates a participant voting `vote`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a valid participant id.
    pub fn new(id: &str, vote: Vote) -> Self {
        Self {
            id: ParticipantId::new(id).expect("valid participant id"),
            vote,
        }
    }
}

#[async_trait]
impl Participant for InstantParticipant {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn prepare(&self, _txid: TransactionId) -> Result<Vote, ParticipantFault> {
        Ok(self.vote)
    }

    async fn commit(&self, _txid: TransactionId) -> Result<(), ParticipantFault> {
        Ok(())
    }

    async fn rollback(&self, _txid: TransactionId) -> Result<(), ParticipantFault> {
        Ok(())
    }
}

/// Generates `count` participants voting yes, plus one voting no when
/// `with_no_vote` is set.
pub fn participants(count: usize, with_no_vote: bool) -> Vec<Arc<dyn Participant>> {
    let mut all: Vec<Arc<dyn Participant>> = (0..count)
        .map(|i| {
            Arc::new(InstantParticipant::new(&format!("p{i}"), Vote::Yes)) as Arc<dyn Participant>
        })
        .collect();
    if with_no_vote {
        all.push(Arc::new(InstantParticipant::new("refuser", Vote::No)));
    }
    all
}
