//! Quiescence Barrier
//!
//! A cycle whose members are all `Sync` never settles on its own: each member
//! waits for the next. The barrier breaks the wait by deciding that no more
//! information is coming for the current batch of nodes.
//!
//! # Epochs
//!
//! Every wired node that is still pending enlists in the current epoch. When
//! the whole graph is described, the epoch is *sealed*: its members are set
//! aside and a fresh epoch starts right away, so nodes wired afterwards get
//! their own judgement. Opening a sealed epoch happens one scheduling step
//! later and defaults every member that is still pending to `Sync`.
//!
//! Opening is split from sealing so that settlements already in flight get
//! to take the direct path first.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use serde::Serialize;

use crate::graph::{NodeId, NodeStore};

/// One generation of the quiescence barrier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Epoch(u64);

impl Epoch {
    pub fn raw(&self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch#{}", self.0)
    }
}

/// The re-armable gate.
#[derive(Debug, Default)]
pub struct QuiescenceBarrier {
    current: Epoch,

    /// Pending nodes racing against `current`.
    members: Vec<NodeId>,

    /// Sealed epochs waiting to open.
    sealed: BTreeMap<Epoch, Vec<NodeId>>,

    /// Number of epochs opened so far.
    openings: u64,

    /// Nodes settled by a barrier default so far.
    defaulted: usize,
}

impl QuiescenceBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Epoch {
        self.current
    }

    /// Enlist a pending node in the current epoch.
    pub fn enlist(&mut self, node_id: NodeId) -> Epoch {
        self.members.push(node_id);
        self.current
    }

    /// Seal the current epoch and arm a fresh one.
    ///
    /// Returns `None` when no member is still pending, since opening would
    /// have nothing to default. The caller has already checked quiescence.
    pub fn seal<K>(&mut self, store: &NodeStore<K>) -> Option<Epoch>
    where
        K: Eq + Hash + Clone,
    {
        self.members.retain(|&id| store.get(id).is_pending());
        if self.members.is_empty() {
            return None;
        }

        let sealed = self.current;
        let members = std::mem::take(&mut self.members);
        self.sealed.insert(sealed, members);
        self.current = sealed.next();
        Some(sealed)
    }

    /// Open a sealed epoch, returning its members.
    ///
    /// Returns `None` if the epoch was never sealed or has already opened.
    pub fn open(&mut self, epoch: Epoch) -> Option<Vec<NodeId>> {
        let members = self.sealed.remove(&epoch)?;
        self.openings += 1;
        Some(members)
    }

    /// Sealed epochs that have not opened yet, oldest first.
    pub fn sealed_epochs(&self) -> Vec<Epoch> {
        self.sealed.keys().copied().collect()
    }

    pub fn record_defaulted(&mut self, count: usize) {
        self.defaulted += count;
    }

    pub fn openings(&self) -> u64 {
        self.openings
    }

    pub fn defaulted(&self) -> usize {
        self.defaulted
    }
}
