//! Settlement Scheduler
//!
//! The scheduler moves settlements through the graph, from a node to the
//! nodes that depend on it.
//!
//! # Algorithm
//!
//! Every settlement is a message `(node, verdict)` on a FIFO queue. Draining
//! the queue:
//!
//! 1. Pop a message. If the node already settled, drop it (settlement is
//!    write-once, so the first message wins).
//! 2. Settle the node and record it for publication.
//! 3. For each dependent that is still pending:
//!    - `Async` settles the dependent `Async` immediately (short circuit)
//!    - `Sync` counts down the dependent's outstanding inputs, and settles it
//!      `Sync` once none remain
//!
//! Cycles need no special casing here. A cycle whose members are all `Sync`
//! simply never reaches zero outstanding inputs, and it stays pending until
//! the quiescence barrier defaults it.

use std::collections::VecDeque;
use std::hash::Hash;

use tracing::trace;

use super::node::{NodeId, SubtreeVerdict};
use super::store::NodeStore;

/// Queue of pending settlements.
#[derive(Debug, Default)]
pub struct SettlementScheduler {
    queue: VecDeque<(NodeId, SubtreeVerdict)>,
}

impl SettlementScheduler {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Post a settlement. Nothing happens until [`run`](Self::run).
    pub fn enqueue(&mut self, node_id: NodeId, verdict: SubtreeVerdict) {
        debug_assert!(!verdict.is_pending());
        self.queue.push_back((node_id, verdict));
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain the queue, propagating every settlement to its dependents.
    ///
    /// Returns the nodes that settled, in settlement order.
    pub fn run<K>(&mut self, store: &mut NodeStore<K>) -> Vec<(NodeId, SubtreeVerdict)>
    where
        K: Eq + Hash + Clone,
    {
        let mut settled = Vec::new();

        while let Some((node_id, verdict)) = self.queue.pop_front() {
            if !store.get_mut(node_id).settle(verdict) {
                continue;
            }
            store.refresh_described(node_id);
            trace!(node = node_id.index(), ?verdict, "subtree settled");
            settled.push((node_id, verdict));

            let dependents = store.get(node_id).dependents().to_vec();
            for dependent_id in dependents {
                let dependent = store.get_mut(dependent_id);
                if !dependent.is_pending() || !dependent.is_wired() {
                    continue;
                }
                match verdict {
                    SubtreeVerdict::Async => {
                        self.queue.push_back((dependent_id, SubtreeVerdict::Async));
                    }
                    SubtreeVerdict::Sync => {
                        if dependent.satisfy_one() {
                            self.queue.push_back((dependent_id, SubtreeVerdict::Sync));
                        }
                    }
                    SubtreeVerdict::Pending => {}
                }
            }
        }

        settled
    }
}
