//! Observe requests and how their replies are counted.

use async_trait::async_trait;
use bytes::Bytes;
use corelib::Node;

use crate::error::{DurabilityError, ObserveError};
use crate::requirement::{DurabilityRequirement, PersistTo};

/// State of a key on one node, as reported by an observe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserveStatus {
    FoundNotPersisted,
    FoundPersisted,
    /// The key changed since the observed mutation.
    Modified,
    NotFoundPersisted,
    NotFoundNotPersisted,
    Unknown,
}

impl ObserveStatus {
    /// Decode the one-byte status of an observe response.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => ObserveStatus::FoundNotPersisted,
            0x01 => ObserveStatus::FoundPersisted,
            0x02 => ObserveStatus::Modified,
            0x80 => ObserveStatus::NotFoundPersisted,
            0x81 => ObserveStatus::NotFoundNotPersisted,
            _ => ObserveStatus::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ObserveStatus::FoundNotPersisted => 0x00,
            ObserveStatus::FoundPersisted => 0x01,
            ObserveStatus::Modified => 0x02,
            ObserveStatus::NotFoundPersisted => 0x80,
            ObserveStatus::NotFoundNotPersisted => 0x81,
            ObserveStatus::Unknown => 0xff,
        }
    }

    pub fn is_found(self) -> bool {
        matches!(
            self,
            ObserveStatus::FoundNotPersisted | ObserveStatus::FoundPersisted
        )
    }
}

/// One node's answer: the key's state and the CAS it holds there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveReply {
    pub status: ObserveStatus,
    pub cas: u64,
}

impl ObserveReply {
    pub fn new(status: ObserveStatus, cas: u64) -> Self {
        Self { status, cas }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Store,
    Remove,
}

/// A write acknowledged by the master, to be checked for durability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub key: Bytes,
    /// CAS the master returned for the write.
    pub cas: u64,
    pub kind: MutationKind,
}

impl Mutation {
    pub fn store(key: impl Into<Bytes>, cas: u64) -> Self {
        Self {
            key: key.into(),
            cas,
            kind: MutationKind::Store,
        }
    }

    pub fn remove(key: impl Into<Bytes>, cas: u64) -> Self {
        Self {
            key: key.into(),
            cas,
            kind: MutationKind::Remove,
        }
    }
}

/// Transport seam for observe requests.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    /// Ask `node` for the state of `key` in `partition`.
    async fn observe(
        &self,
        node: &Node,
        partition: u16,
        key: &[u8],
    ) -> Result<ObserveReply, ObserveError>;
}

/// Counts gathered from one round of observe replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub persisted: usize,
    pub replicated: usize,
    pub master_persisted: bool,
}

impl Tally {
    /// Count one round. `replies` pairs each reply with whether it came from
    /// the master; failed requests are already filtered out.
    ///
    /// Fails with [`DurabilityError::Superseded`] when the master shows that
    /// another write replaced the mutation.
    pub fn count(
        mutation: &Mutation,
        replies: impl IntoIterator<Item = (bool, ObserveReply)>,
    ) -> Result<Self, DurabilityError> {
        let (persisted_as, replicated_as) = match mutation.kind {
            MutationKind::Store => (
                ObserveStatus::FoundPersisted,
                ObserveStatus::FoundNotPersisted,
            ),
            MutationKind::Remove => (
                ObserveStatus::NotFoundPersisted,
                ObserveStatus::NotFoundNotPersisted,
            ),
        };

        let mut tally = Tally::default();
        for (master, reply) in replies {
            if master && superseded(mutation, reply) {
                return Err(DurabilityError::Superseded {
                    expected: mutation.cas,
                    observed: reply.cas,
                });
            }
            // A store only counts where the node already holds our CAS.
            if mutation.kind == MutationKind::Store && reply.cas != mutation.cas {
                continue;
            }
            if reply.status == persisted_as {
                tally.persisted += 1;
                if master {
                    tally.master_persisted = true;
                } else {
                    tally.replicated += 1;
                }
            } else if reply.status == replicated_as && !master {
                tally.replicated += 1;
            }
        }
        Ok(tally)
    }

    pub fn satisfies(&self, requirement: &DurabilityRequirement) -> bool {
        let persisted = match requirement.persist_to {
            PersistTo::Master => self.master_persisted,
            level => self.persisted >= level.count(),
        };
        persisted && self.replicated >= requirement.replicate_to.count()
    }
}

fn superseded(mutation: &Mutation, reply: ObserveReply) -> bool {
    match reply.status {
        ObserveStatus::Modified => true,
        ObserveStatus::Unknown => false,
        status if status.is_found() => reply.cas != 0 && reply.cas != mutation.cas,
        // The master no longer holds a key it just acknowledged storing.
        _ => mutation.kind == MutationKind::Store,
    }
}
