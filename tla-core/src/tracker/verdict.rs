//! Result Cache
//!
//! Consumers never see the subtree channel itself. They get a
//! [`VerdictHandle`], a receiver on a per-node slot that is bound the first
//! time anyone asks for the node and filled in once when the node settles.

use std::collections::HashMap;
use std::future::IntoFuture;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::watch;

use crate::error::{Result, TrackerError};
use crate::graph::{NodeId, SubtreeVerdict};

/// Awaitable answer to "does this module need async handling?".
///
/// Cloning is cheap. All clones, and every handle returned for the same key,
/// observe the same slot.
#[derive(Debug, Clone)]
pub struct VerdictHandle {
    rx: watch::Receiver<Option<bool>>,
}

impl VerdictHandle {
    /// The verdict if it has settled, without waiting.
    pub fn peek(&self) -> Option<bool> {
        *self.rx.borrow()
    }

    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }

    /// Wait until the verdict settles.
    ///
    /// Fails only if the tracker is dropped while the node is still pending.
    pub async fn wait(self) -> Result<bool> {
        let mut rx = self.rx;
        let settled = rx
            .wait_for(Option::is_some)
            .await
            .map(|value| *value)
            .map_err(|_| TrackerError::Abandoned)?;
        Ok(settled.unwrap_or_default())
    }
}

impl IntoFuture for VerdictHandle {
    type Output = Result<bool>;
    type IntoFuture = BoxFuture<'static, Result<bool>>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}

/// One slot per node that has been asked about.
#[derive(Debug, Default)]
pub(crate) struct ResultCache {
    slots: HashMap<NodeId, watch::Sender<Option<bool>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a slot for `node_id` if there is none yet, and hand out a handle.
    ///
    /// `current` seeds a new slot, so binding after settlement still works.
    pub fn bind(&mut self, node_id: NodeId, current: SubtreeVerdict) -> VerdictHandle {
        let tx = self
            .slots
            .entry(node_id)
            .or_insert_with(|| watch::channel(current.as_bool()).0);
        VerdictHandle { rx: tx.subscribe() }
    }

    /// Publish a settlement to the node's slot, if one is bound.
    pub fn publish(&mut self, node_id: NodeId, verdict: SubtreeVerdict) {
        if let Some(tx) = self.slots.get(&node_id) {
            tx.send_replace(verdict.as_bool());
        }
    }

    #[cfg(test)]
    pub fn is_bound(&self, node_id: NodeId) -> bool {
        self.slots.contains_key(&node_id)
    }
}
