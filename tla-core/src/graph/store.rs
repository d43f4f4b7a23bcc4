//! Node Store
//!
//! Arena of module nodes keyed by module identity. The position of a key in
//! the underlying `IndexMap` is its [`NodeId`], so edges are plain indices and
//! cycles in the module graph never turn into reference cycles.

use std::hash::Hash;

use indexmap::IndexMap;

use super::node::{Node, NodeId};

/// All nodes known to one tracker.
#[derive(Debug)]
pub struct NodeStore<K> {
    nodes: IndexMap<K, Node>,

    /// Nodes mentioned by at least one declaration.
    in_graph: usize,

    /// How many of those are described (see [`Node::is_described`]).
    described: usize,
}

impl<K> NodeStore<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            in_graph: 0,
            described: 0,
        }
    }

    /// Look up a key mentioned by a declaration, creating an undeclared node
    /// on first mention. The node takes part in the quiescence check from now
    /// on.
    pub fn intern(&mut self, key: &K) -> NodeId {
        let id = self.reserve(key);
        let node = self.get_mut(id);
        if !node.in_graph() {
            node.join_graph();
            self.in_graph += 1;
        }
        id
    }

    /// Look up a key, creating a node that does not yet take part in the
    /// quiescence check. Used when a consumer asks about a module before any
    /// declaration has named it.
    pub fn reserve(&mut self, key: &K) -> NodeId {
        if let Some(index) = self.nodes.get_index_of(key) {
            return NodeId::from(index);
        }
        let (index, _) = self.nodes.insert_full(key.clone(), Node::new());
        NodeId::from(index)
    }

    /// Look up a key without creating it.
    pub fn id_of(&self, key: &K) -> Option<NodeId> {
        self.nodes.get_index_of(key).map(NodeId::from)
    }

    pub fn key(&self, id: NodeId) -> &K {
        self.entry(id).0
    }

    pub fn get(&self, id: NodeId) -> &Node {
        self.entry(id).1
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_index_mut(id.index())
            .map(|(_, node)| node)
            .expect("node ids are only minted by this store")
    }

    fn entry(&self, id: NodeId) -> (&K, &Node) {
        self.nodes
            .get_index(id.index())
            .expect("node ids are only minted by this store")
    }

    /// Re-evaluate whether a node now counts towards quiescence.
    ///
    /// Must be called after anything that can make a node described. A node
    /// never stops being described, so the counter only moves up.
    pub fn refresh_described(&mut self, id: NodeId) {
        let node = self.get_mut(id);
        if node.in_graph() && !node.counted_described() && node.is_described() {
            node.mark_counted_described();
            self.described += 1;
        }
    }

    /// Every node in the graph is described.
    pub fn is_quiescent(&self) -> bool {
        self.described == self.in_graph
    }

    /// Nodes mentioned by a declaration.
    pub fn graph_len(&self) -> usize {
        self.in_graph
    }

    pub fn described_count(&self) -> usize {
        self.described
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &K, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, (key, node))| (NodeId::from(index), key, node))
    }
}

impl<K> Default for NodeStore<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{SelfVerdict, SubtreeVerdict};
    use smallvec::SmallVec;

    #[test]
    fn intern_is_stable() {
        let mut store = NodeStore::new();

        let a = store.intern(&"a");
        let b = store.intern(&"b");
        assert_ne!(a, b);
        assert_eq!(store.intern(&"a"), a);
        assert_eq!(store.len(), 2);
        assert_eq!(*store.key(b), "b");
        assert_eq!(store.id_of(&"c"), None);
    }

    #[test]
    fn empty_store_is_quiescent() {
        let store: NodeStore<&str> = NodeStore::new();
        assert!(store.is_empty());
        assert!(store.is_quiescent());
    }

    #[test]
    fn quiescence_follows_declarations() {
        let mut store = NodeStore::new();
        let a = store.intern(&"a");
        let b = store.intern(&"b");
        assert!(!store.is_quiescent());

        for id in [a, b] {
            let node = store.get_mut(id);
            node.set_self_verdict(SelfVerdict::Sync);
            node.set_children(SmallVec::new());
            store.refresh_described(id);
        }
        assert!(store.is_quiescent());

        // refreshing twice does not double count
        store.refresh_described(a);
        assert_eq!(store.described_count(), 2);

        store.intern(&"c");
        assert!(!store.is_quiescent());
    }

    #[test]
    fn reserved_nodes_do_not_block_quiescence() {
        let mut store = NodeStore::new();
        let a = store.reserve(&"a");
        assert_eq!(store.len(), 1);
        assert_eq!(store.graph_len(), 0);
        assert!(store.is_quiescent());

        assert_eq!(store.intern(&"a"), a);
        assert_eq!(store.graph_len(), 1);
        assert!(!store.is_quiescent());
    }

    #[test]
    fn async_settlement_makes_node_described() {
        let mut store = NodeStore::new();
        let a = store.intern(&"a");

        store.get_mut(a).set_self_verdict(SelfVerdict::Async);
        store.refresh_described(a);
        assert!(!store.is_quiescent());

        store.get_mut(a).settle(SubtreeVerdict::Async);
        store.refresh_described(a);
        assert!(store.is_quiescent());
    }
}
