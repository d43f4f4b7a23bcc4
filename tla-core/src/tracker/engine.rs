//! Async TLA Tracker
//!
//! The tracker is the central coordinator. It accepts declarations about
//! modules in any order and keeps every verdict handle up to date.
//!
//! # How It Works
//!
//! 1. `declare_self` records whether a module itself uses top-level await. A
//!    positive answer settles the module `Async` on the spot.
//!
//! 2. `declare_dependencies` records a module's imports and wires its subtree
//!    channel: it counts the inputs that still have to settle `Sync`, and
//!    settles `Async` straight away if any input already is.
//!
//! 3. Every settlement runs through the [`SettlementScheduler`] before the
//!    declaration returns, so `Async` reaches every known ancestor and
//!    acyclic `Sync` resolves bottom-up with no extra step.
//!
//! 4. After propagation, if every module in the graph is described, the
//!    current barrier epoch is sealed and its opening is scheduled. Opening
//!    defaults the cycles left pending in that epoch to `Sync`.
//!
//! # Thread Safety
//!
//! All state lives behind one mutex. A declaration, including everything it
//! propagates, is atomic with respect to other declarations and to barrier
//! openings. Nothing waits while holding the lock, so declarations never
//! block for longer than the propagation they trigger.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::barrier::{Epoch, QuiescenceBarrier};
use super::diagnostics::{NodeStatus, TrackerSnapshot};
use super::verdict::{ResultCache, VerdictHandle};
use crate::config::{BarrierDeferral, RedeclarationPolicy, TrackerConfig};
use crate::error::{Declaration, Result, TrackerError};
use crate::graph::{
    Declared, NodeId, NodeStore, SelfVerdict, SettlementScheduler, SubtreeVerdict,
};

/// Bounds every module key has to meet.
pub trait ModuleKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> ModuleKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Tracks which modules need async handling because of top-level await.
///
/// Cloning is cheap and every clone shares the same graph.
///
/// # Example
///
/// ```rust
/// use tla_core::AsyncTlaTracker;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tla_core::Result<()> {
/// let tracker = AsyncTlaTracker::new();
///
/// tracker.declare_dependencies("main.js", ["db.js"])?;
/// tracker.declare_self("main.js", false)?;
/// tracker.declare_self("db.js", true)?;
///
/// assert!(tracker.verdict(&"main.js").await?);
/// # Ok(())
/// # }
/// ```
pub struct AsyncTlaTracker<K> {
    shared: Arc<Shared<K>>,
}

struct Shared<K> {
    config: TrackerConfig,
    state: Mutex<TrackerState<K>>,
}

struct TrackerState<K> {
    store: NodeStore<K>,
    scheduler: SettlementScheduler,
    barrier: QuiescenceBarrier,
    results: ResultCache,
}

impl<K: ModuleKey> AsyncTlaTracker<K> {
    /// Create a tracker with the default config.
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(TrackerState {
                    store: NodeStore::new(),
                    scheduler: SettlementScheduler::new(),
                    barrier: QuiescenceBarrier::new(),
                    results: ResultCache::new(),
                }),
            }),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.shared.config
    }

    /// Record whether `key` itself uses top-level await.
    ///
    /// A module that does needs no dependency declaration: it is async
    /// whatever it imports.
    pub fn declare_self(&self, key: K, is_async: bool) -> Result<()> {
        let sealed = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;

            let id = state.store.intern(&key);
            let verdict = SelfVerdict::from_flag(is_async);
            let previous = state.store.get(id).self_verdict();
            if previous.is_known() {
                return self.redeclared(&key, Declaration::Entry, previous == verdict);
            }

            debug!(?key, is_async, "entry declared");
            let node = state.store.get_mut(id);
            node.set_self_verdict(verdict);
            if is_async {
                state.scheduler.enqueue(id, SubtreeVerdict::Async);
            } else if node.is_wired() && node.is_pending() && node.satisfy_one() {
                state.scheduler.enqueue(id, SubtreeVerdict::Sync);
            }
            state.store.refresh_described(id);

            state.propagate();
            state.seal_if_quiescent()
        };

        if let Some(epoch) = sealed {
            self.schedule_opening(epoch);
        }
        Ok(())
    }

    /// Record the modules `key` imports.
    ///
    /// Dependencies that have not been seen before are added to the graph.
    /// Repeated keys in `children` count once.
    pub fn declare_dependencies<I>(&self, key: K, children: I) -> Result<()>
    where
        I: IntoIterator<Item = K>,
    {
        let children: Vec<K> = children.into_iter().collect();

        let sealed = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;

            let id = state.store.intern(&key);
            if state.store.get(id).is_wired() {
                let identical = state.same_children(id, &children);
                return self.redeclared(&key, Declaration::Dependencies, identical);
            }

            let mut child_ids: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(children.len());
            for child in &children {
                let child_id = state.store.intern(child);
                if !child_ids.contains(&child_id) {
                    child_ids.push(child_id);
                }
            }
            debug!(?key, children = child_ids.len(), "dependencies declared");
            state.wire(id, child_ids);
            state.store.refresh_described(id);

            state.propagate();
            state.seal_if_quiescent()
        };

        if let Some(epoch) = sealed {
            self.schedule_opening(epoch);
        }
        Ok(())
    }

    /// Get the verdict handle for `key`.
    ///
    /// Safe to call at any time, including before anything was declared about
    /// `key`. Asking about a module does not add it to the quiescence check;
    /// only declarations do.
    pub fn verdict(&self, key: &K) -> VerdictHandle {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        let id = state.store.reserve(key);
        let current = state.store.get(id).subtree();
        state.results.bind(id, current)
    }

    /// Open every sealed epoch now.
    ///
    /// This is the commit step under [`BarrierDeferral::Manual`]. Under the
    /// default deferral it only makes an already scheduled opening happen
    /// early. Returns the number of nodes settled as a result.
    pub fn open_sealed(&self) -> usize {
        let mut state = self.shared.state.lock();
        state
            .barrier
            .sealed_epochs()
            .into_iter()
            .map(|epoch| state.open(epoch))
            .sum()
    }

    /// Current state of one node, if the tracker has seen it.
    pub fn status(&self, key: &K) -> Option<NodeStatus<K>> {
        let state = self.shared.state.lock();
        let id = state.store.id_of(key)?;
        let node = state.store.get(id);
        Some(NodeStatus {
            key: key.clone(),
            declared: node.declared(),
            self_verdict: node.self_verdict(),
            subtree: node.subtree(),
            epoch: node.epoch(),
            children: node.children().map_or(0, <[NodeId]>::len),
            dependents: node.dependents().len(),
        })
    }

    /// Modules that keep the barrier from opening, with what is missing.
    ///
    /// After the host has made its last declaration, anything listed here is
    /// a dangling reference: it was named as a dependency (or half declared)
    /// and its verdict, and every verdict waiting on it through a cycle, will
    /// not settle.
    pub fn undeclared(&self) -> Vec<(K, Declared)> {
        let state = self.shared.state.lock();
        state
            .store
            .iter()
            .filter(|(_, _, node)| node.in_graph() && !node.is_described())
            .map(|(_, key, node)| (key.clone(), node.declared()))
            .collect()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.shared.state.lock();
        let mut snapshot = TrackerSnapshot {
            nodes: state.store.graph_len(),
            described: state.store.described_count(),
            current_epoch: state.barrier.current(),
            sealed_epochs: state.barrier.sealed_epochs(),
            barrier_openings: state.barrier.openings(),
            defaulted: state.barrier.defaulted(),
            ..Default::default()
        };
        for (_, _, node) in state.store.iter().filter(|(_, _, node)| node.in_graph()) {
            match node.subtree() {
                SubtreeVerdict::Pending => snapshot.pending += 1,
                SubtreeVerdict::Async => snapshot.async_nodes += 1,
                SubtreeVerdict::Sync => snapshot.sync_nodes += 1,
            }
        }
        snapshot
    }

    /// Number of modules the tracker knows about, including ones that were
    /// only asked about.
    pub fn len(&self) -> usize {
        self.shared.state.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn redeclared(&self, key: &K, declaration: Declaration, identical: bool) -> Result<()> {
        match self.shared.config.redeclaration {
            RedeclarationPolicy::Reject => Err(TrackerError::Redeclared {
                key: format!("{key:?}"),
                declaration,
            }),
            RedeclarationPolicy::FirstWriteWins => {
                if identical {
                    debug!(?key, %declaration, "repeated declaration ignored");
                } else {
                    warn!(?key, %declaration, "conflicting declaration ignored, keeping the first");
                }
                Ok(())
            }
        }
    }

    fn schedule_opening(&self, epoch: Epoch) {
        match self.shared.config.deferral {
            BarrierDeferral::Manual => {
                debug!(%epoch, "epoch sealed, waiting for open_sealed");
            }
            BarrierDeferral::Yield => match Handle::try_current() {
                Ok(runtime) => {
                    let shared = Arc::clone(&self.shared);
                    runtime.spawn(async move {
                        tokio::task::yield_now().await;
                        shared.state.lock().open(epoch);
                    });
                }
                Err(_) => {
                    self.shared.state.lock().open(epoch);
                }
            },
        }
    }
}

impl<K: ModuleKey> TrackerState<K> {
    /// Wire the subtree channel of `id` to its children.
    fn wire(&mut self, id: NodeId, child_ids: SmallVec<[NodeId; 4]>) {
        for &child_id in &child_ids {
            self.store.get_mut(child_id).add_dependent(id);
        }

        let node = self.store.get(id);
        let mut waiting = usize::from(!node.self_verdict().is_known());
        let mut any_async = false;
        for &child_id in &child_ids {
            match self.store.get(child_id).subtree() {
                SubtreeVerdict::Async => any_async = true,
                SubtreeVerdict::Pending => waiting += 1,
                SubtreeVerdict::Sync => {}
            }
        }

        let node = self.store.get_mut(id);
        let pending = node.is_pending();
        node.set_children(child_ids);
        if !pending {
            return;
        }

        if any_async {
            self.scheduler.enqueue(id, SubtreeVerdict::Async);
        } else if waiting == 0 {
            self.scheduler.enqueue(id, SubtreeVerdict::Sync);
        } else {
            let epoch = self.barrier.enlist(id);
            let node = self.store.get_mut(id);
            node.set_waiting(waiting);
            node.set_epoch(epoch);
        }
    }

    /// Drain the settlement queue and publish every settlement.
    fn propagate(&mut self) -> usize {
        let settled = self.scheduler.run(&mut self.store);
        for &(id, verdict) in &settled {
            self.results.publish(id, verdict);
        }
        settled.len()
    }

    fn seal_if_quiescent(&mut self) -> Option<Epoch> {
        if !self.store.is_quiescent() {
            return None;
        }
        let epoch = self.barrier.seal(&self.store)?;
        debug!(%epoch, nodes = self.store.graph_len(), "graph quiescent, epoch sealed");
        Some(epoch)
    }

    /// Default every still-pending member of a sealed epoch to `Sync`.
    fn open(&mut self, epoch: Epoch) -> usize {
        let Some(members) = self.barrier.open(epoch) else {
            return 0;
        };
        for id in members {
            if self.store.get(id).is_pending() {
                self.scheduler.enqueue(id, SubtreeVerdict::Sync);
            }
        }
        let settled = self.propagate();
        self.barrier.record_defaulted(settled);
        debug!(%epoch, settled, "quiescence barrier opened");
        settled
    }

    /// Whether `children` matches the dependencies already recorded for `id`.
    fn same_children(&self, id: NodeId, children: &[K]) -> bool {
        let Some(existing) = self.store.get(id).children() else {
            return false;
        };
        let mut proposed: SmallVec<[NodeId; 4]> = SmallVec::new();
        for child in children {
            match self.store.id_of(child) {
                Some(child_id) if !proposed.contains(&child_id) => proposed.push(child_id),
                Some(_) => {}
                None => return false,
            }
        }
        proposed.as_slice() == existing
    }
}

impl<K> Clone for AsyncTlaTracker<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: ModuleKey> Default for AsyncTlaTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ModuleKey> Debug for AsyncTlaTracker<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("AsyncTlaTracker")
            .field("nodes", &snapshot.nodes)
            .field("pending", &snapshot.pending)
            .field("current_epoch", &snapshot.current_epoch)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
