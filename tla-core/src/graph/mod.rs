//! Module Graph
//!
//! This module holds the dependency graph the tracker reasons about, and the
//! machinery that pushes settlements through it.
//!
//! # Overview
//!
//! The graph is directed and may contain cycles:
//!
//! - Nodes are modules, identified by an opaque key
//! - An edge from A to B means A imports B (B is a child of A)
//!
//! Edges arrive incrementally and in any order. A node can exist only because
//! some other node named it as a child, before anything was declared about it.
//!
//! # Design Decisions
//!
//! 1. Nodes live in an arena indexed by [`NodeId`]. Keys are interned once,
//!    and edges are stored as ids in both directions (children and
//!    dependents), so propagation never hashes keys.
//!
//! 2. Nodes are never removed. The graph lives for one build pass.
//!
//! 3. Settlement is an explicit per-node state machine
//!    (`Pending -> Async | Sync`) driven by a message queue, rather than a web
//!    of callbacks.

mod node;
mod scheduler;
mod store;

pub use node::{Declared, Node, NodeId, SelfVerdict, SubtreeVerdict};
pub use scheduler::SettlementScheduler;
pub use store::NodeStore;
