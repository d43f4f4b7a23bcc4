//! TLA Core
//!
//! This crate decides which modules in a build have to be treated as async
//! because they use top-level await, either directly or through something
//! they import. It implements:
//!
//! - An incrementally built module graph (cycles allowed)
//! - Eager upward propagation of async marks
//! - A re-armable quiescence barrier that settles import cycles
//! - Awaitable, de-duplicated verdict handles for consumers
//!
//! Declarations can arrive in any order and from any number of concurrent
//! producers. The final verdicts depend only on what was declared, never on
//! the order.
//!
//! # Architecture
//!
//! - `graph`: node arena and settlement propagation
//! - `tracker`: the public tracker, the barrier and the verdict handles
//!
//! # Example
//!
//! ```rust
//! use tla_core::AsyncTlaTracker;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tla_core::Result<()> {
//! let tracker = AsyncTlaTracker::new();
//!
//! // a.js imports b.js, b.js imports a.js, neither awaits at top level
//! tracker.declare_dependencies("a.js", ["b.js"])?;
//! tracker.declare_dependencies("b.js", ["a.js"])?;
//! tracker.declare_self("a.js", false)?;
//! tracker.declare_self("b.js", false)?;
//!
//! // the cycle is settled by the quiescence barrier
//! assert!(!tracker.verdict(&"a.js").await?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod tracker;

pub use config::{BarrierDeferral, RedeclarationPolicy, TrackerConfig};
pub use error::{Declaration, Result, TrackerError};
pub use graph::{Declared, SelfVerdict, SubtreeVerdict};
pub use tracker::{AsyncTlaTracker, Epoch, ModuleKey, NodeStatus, TrackerSnapshot, VerdictHandle};
