//! Diagnostics
//!
//! Read-only views of the tracker state. The main use is finding out why a
//! verdict never settles: a module named as a dependency but never declared
//! keeps the barrier closed for as long as it stays undeclared.

use serde::Serialize;

use super::barrier::Epoch;
use crate::graph::{Declared, SelfVerdict, SubtreeVerdict};

/// State of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus<K> {
    pub key: K,
    pub declared: Declared,
    pub self_verdict: SelfVerdict,
    pub subtree: SubtreeVerdict,
    /// Barrier epoch the node is racing against, if it was wired while pending.
    pub epoch: Option<Epoch>,
    pub children: usize,
    pub dependents: usize,
}

/// Aggregate counts across the whole graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerSnapshot {
    pub nodes: usize,
    /// Nodes that no longer block quiescence.
    pub described: usize,
    pub pending: usize,
    pub async_nodes: usize,
    pub sync_nodes: usize,
    pub current_epoch: Epoch,
    pub sealed_epochs: Vec<Epoch>,
    pub barrier_openings: u64,
    /// Nodes settled `Sync` by a barrier default rather than by their inputs.
    pub defaulted: usize,
}

impl TrackerSnapshot {
    pub fn is_quiescent(&self) -> bool {
        self.described == self.nodes
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
