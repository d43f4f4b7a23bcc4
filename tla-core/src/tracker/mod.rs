//! Async Mark Tracking
//!
//! This module implements the public face of the crate: the tracker that
//! decides which modules have to be treated as async because of top-level
//! await.
//!
//! # Concepts
//!
//! ## Entry verdict
//!
//! Whether a module itself uses top-level await. The host pipeline finds this
//! out by looking at the module's source and reports it with
//! [`AsyncTlaTracker::declare_self`].
//!
//! ## Subtree verdict
//!
//! Whether a module or anything it transitively imports uses top-level await.
//! It combines the entry verdict with the subtree verdicts of the module's
//! imports, reported with [`AsyncTlaTracker::declare_dependencies`]. `Async`
//! spreads upward as soon as it is found. `Sync` needs every input to be
//! `Sync`.
//!
//! ## Quiescence barrier
//!
//! Modules in an import cycle wait on each other, so an all-`Sync` cycle can
//! never prove itself `Sync`. Once every module in the graph has been fully
//! declared, the [barrier](barrier) defaults whatever is still pending to
//! `Sync`. It re-arms after each opening, so modules discovered later (for
//! example through dynamic imports) get their own round.
//!
//! ## Verdict handles
//!
//! [`AsyncTlaTracker::verdict`] returns a [`VerdictHandle`] that consumers
//! can peek at or await. Handles never block declarations.

pub mod barrier;
mod diagnostics;
mod engine;
mod verdict;

pub use barrier::{Epoch, QuiescenceBarrier};
pub use diagnostics::{NodeStatus, TrackerSnapshot};
pub use engine::{AsyncTlaTracker, ModuleKey};
pub use verdict::VerdictHandle;
