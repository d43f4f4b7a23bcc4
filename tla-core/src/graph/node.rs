//! Graph Nodes
//!
//! This module defines the per-module state that lives in the node store.

use serde::Serialize;
use smallvec::SmallVec;

use crate::tracker::Epoch;

/// Index of a node in the [`NodeStore`](super::NodeStore) arena.
///
/// Ids are handed out in insertion order and are never reused, since nodes
/// are never removed from the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Get the raw arena index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

/// A module's own verdict, independent of its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SelfVerdict {
    /// No entry declaration yet.
    Unknown,

    /// The module itself uses top-level await.
    Async,

    /// The module itself does not use top-level await.
    Sync,
}

impl SelfVerdict {
    pub fn from_flag(is_async: bool) -> Self {
        if is_async {
            Self::Async
        } else {
            Self::Sync
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }
}

/// Verdict for a module's whole dependency subtree.
///
/// Moves from `Pending` to one of the settled states exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubtreeVerdict {
    Pending,
    Async,
    Sync,
}

impl SubtreeVerdict {
    pub fn is_pending(&self) -> bool {
        *self == Self::Pending
    }

    /// The external two-valued answer, once settled.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Pending => None,
            Self::Async => Some(true),
            Self::Sync => Some(false),
        }
    }
}

/// Which of the two declarations a node has received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Declared {
    /// Only known because another node named it as a dependency.
    Neither,
    EntryOnly,
    ChildrenOnly,
    Both,
}

/// A module in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// Set once by the entry declaration.
    self_verdict: SelfVerdict,

    /// Set once by the dependency declaration. Deduplicated, in declaration order.
    children: Option<SmallVec<[NodeId; 4]>>,

    /// Nodes whose children include this node.
    dependents: SmallVec<[NodeId; 4]>,

    /// Settlement of the subtree channel.
    subtree: SubtreeVerdict,

    /// Inputs (self plus children) not yet known to be `Sync`.
    /// Only meaningful once the children are wired.
    waiting: usize,

    /// Barrier epoch the subtree channel races against.
    epoch: Option<Epoch>,

    /// Whether this node has been counted towards quiescence.
    described: bool,

    /// Whether a declaration has mentioned this node. Nodes that were only
    /// asked about do not take part in the quiescence check.
    in_graph: bool,
}

impl Node {
    /// Create a node nobody has declared anything about yet.
    pub fn new() -> Self {
        Self {
            self_verdict: SelfVerdict::Unknown,
            children: None,
            dependents: SmallVec::new(),
            subtree: SubtreeVerdict::Pending,
            waiting: 0,
            epoch: None,
            described: false,
            in_graph: false,
        }
    }

    pub fn self_verdict(&self) -> SelfVerdict {
        self.self_verdict
    }

    pub fn set_self_verdict(&mut self, verdict: SelfVerdict) {
        debug_assert!(!self.self_verdict.is_known(), "self verdict is write-once");
        self.self_verdict = verdict;
    }

    pub fn children(&self) -> Option<&[NodeId]> {
        self.children.as_deref()
    }

    pub fn set_children(&mut self, children: SmallVec<[NodeId; 4]>) {
        debug_assert!(self.children.is_none(), "children are write-once");
        self.children = Some(children);
    }

    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    pub fn add_dependent(&mut self, node_id: NodeId) {
        if !self.dependents.contains(&node_id) {
            self.dependents.push(node_id);
        }
    }

    pub fn declared(&self) -> Declared {
        match (self.self_verdict.is_known(), self.children.is_some()) {
            (false, false) => Declared::Neither,
            (true, false) => Declared::EntryOnly,
            (false, true) => Declared::ChildrenOnly,
            (true, true) => Declared::Both,
        }
    }

    /// A node is described once nothing more can change its verdict or the
    /// shape of the graph below it: both declarations arrived, or the subtree
    /// already settled `Async`.
    pub fn is_described(&self) -> bool {
        self.declared() == Declared::Both || self.subtree == SubtreeVerdict::Async
    }

    pub fn subtree(&self) -> SubtreeVerdict {
        self.subtree
    }

    pub fn is_pending(&self) -> bool {
        self.subtree.is_pending()
    }

    /// Settle the subtree channel. Returns `false` if it had already settled.
    pub fn settle(&mut self, verdict: SubtreeVerdict) -> bool {
        if !self.subtree.is_pending() || verdict.is_pending() {
            return false;
        }
        self.subtree = verdict;
        true
    }

    /// Whether the subtree channel has been wired (children declared).
    pub fn is_wired(&self) -> bool {
        self.children.is_some()
    }

    pub fn set_waiting(&mut self, waiting: usize) {
        self.waiting = waiting;
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Record one input settling `Sync`. Returns `true` when that was the last
    /// outstanding input.
    pub fn satisfy_one(&mut self) -> bool {
        self.waiting = self.waiting.saturating_sub(1);
        self.waiting == 0
    }

    pub fn epoch(&self) -> Option<Epoch> {
        self.epoch
    }

    pub fn set_epoch(&mut self, epoch: Epoch) {
        self.epoch = Some(epoch);
    }

    pub(crate) fn counted_described(&self) -> bool {
        self.described
    }

    pub(crate) fn mark_counted_described(&mut self) {
        self.described = true;
    }

    pub(crate) fn in_graph(&self) -> bool {
        self.in_graph
    }

    pub(crate) fn join_graph(&mut self) {
        self.in_graph = true;
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}
