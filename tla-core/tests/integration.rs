//! Integration Tests for the Tracker
//!
//! These tests drive the tracker the way a build pipeline does: declarations
//! in arbitrary order, verdicts awaited afterwards.

use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

use tla_core::{AsyncTlaTracker, Declared, TrackerError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A→{B,C}, B→{D,E}, C→{F,G}, leaves D..G.
fn acyclic_tree() -> AsyncTlaTracker<&'static str> {
    init_tracing();
    let tree = AsyncTlaTracker::new();
    tree.declare_dependencies("A", ["B", "C"]).unwrap();
    tree.declare_dependencies("B", ["D", "E"]).unwrap();
    tree.declare_dependencies("C", ["F", "G"]).unwrap();
    tree.declare_dependencies("D", []).unwrap();
    tree.declare_dependencies("E", []).unwrap();
    tree.declare_dependencies("F", []).unwrap();
    tree.declare_dependencies("G", []).unwrap();
    tree
}

/// Same shape plus D→F and F→B, which closes the cycle B→D→F→B.
fn cyclic_tree() -> AsyncTlaTracker<&'static str> {
    init_tracing();
    let tree = AsyncTlaTracker::new();
    tree.declare_dependencies("A", ["B", "C"]).unwrap();
    tree.declare_dependencies("B", ["D", "E"]).unwrap();
    tree.declare_dependencies("C", ["F", "G"]).unwrap();
    tree.declare_dependencies("D", ["F"]).unwrap();
    tree.declare_dependencies("E", []).unwrap();
    tree.declare_dependencies("F", ["B"]).unwrap();
    tree.declare_dependencies("G", []).unwrap();
    tree
}

async fn settled<K: tla_core::ModuleKey>(tracker: &AsyncTlaTracker<K>, key: K) -> bool {
    timeout(Duration::from_secs(5), tracker.verdict(&key).wait())
        .await
        .unwrap_or_else(|_| panic!("verdict for {key:?} never settled"))
        .unwrap()
}

async fn assert_verdicts(tracker: &AsyncTlaTracker<&'static str>, expected: &[(&'static str, bool)]) {
    for &(key, value) in expected {
        assert_eq!(settled(tracker, key).await, value, "verdict for {key}");
    }
}

// ----------------------------------------------------------------------------
// Acyclic graphs
// ----------------------------------------------------------------------------

#[tokio::test]
async fn marks_leaf_nodes() {
    let tree = acyclic_tree();

    tree.declare_self("D", false).unwrap();
    tree.declare_self("F", true).unwrap();

    assert_verdicts(&tree, &[("D", false), ("F", true)]).await;
}

#[tokio::test]
async fn leaf_determination_without_a_prebuilt_graph() {
    let tracker = AsyncTlaTracker::new();

    tracker.declare_dependencies("D", []).unwrap();
    tracker.declare_self("D", false).unwrap();
    // a module with top-level await needs no dependency declaration
    tracker.declare_self("F", true).unwrap();

    assert_verdicts(&tracker, &[("D", false), ("F", true)]).await;
}

#[tokio::test]
async fn propagates_markings_to_ancestors() {
    let tree = acyclic_tree();
    tree.declare_self("A", false).unwrap();
    tree.declare_self("B", false).unwrap();
    tree.declare_self("D", true).unwrap();

    assert_verdicts(&tree, &[("D", true), ("B", true), ("A", true)]).await;
}

#[tokio::test]
async fn propagates_unmarked_status_to_ancestors() {
    let tree = acyclic_tree();
    for key in ["A", "B", "C", "D", "E", "F", "G"] {
        tree.declare_self(key, false).unwrap();
    }

    // acyclic, so no barrier is involved
    assert_eq!(tree.verdict(&"A").peek(), Some(false));
    assert_eq!(tree.snapshot().barrier_openings, 0);
}

// ----------------------------------------------------------------------------
// Cyclic graphs
// ----------------------------------------------------------------------------

#[tokio::test]
async fn resolves_all_negative_cycle_as_unmarked() {
    let tree = cyclic_tree();
    for key in ["A", "B", "C", "D", "E", "F", "G"] {
        tree.declare_self(key, false).unwrap();
    }

    assert_verdicts(&tree, &[("A", false), ("B", false), ("D", false)]).await;
}

#[tokio::test]
async fn propagates_markings_across_a_cycle() {
    let tree = cyclic_tree();

    tree.declare_self("B", true).unwrap();

    assert_verdicts(&tree, &[("A", true), ("B", true), ("D", true), ("F", true)]).await;
}

#[tokio::test]
async fn marks_entire_cycle_when_a_sibling_is_marked() {
    let tree = cyclic_tree();

    tree.declare_self("B", false).unwrap();
    tree.declare_self("D", false).unwrap();
    tree.declare_self("F", false).unwrap();
    tree.declare_self("E", true).unwrap();

    assert_verdicts(&tree, &[("A", true), ("B", true), ("D", true), ("F", true)]).await;
}

#[tokio::test]
async fn resolves_cycles_as_unmarked() {
    let tree = cyclic_tree();

    for key in ["A", "B", "C", "D", "E", "F"] {
        tree.declare_self(key, false).unwrap();
    }
    tree.declare_self("G", true).unwrap();

    assert_verdicts(
        &tree,
        &[("B", false), ("D", false), ("F", false), ("C", true), ("A", true)],
    )
    .await;
}

#[tokio::test]
async fn propagates_markings_before_resolving_cycles() {
    let tree = cyclic_tree();

    for key in ["A", "B", "C", "D", "E"] {
        tree.declare_self(key, false).unwrap();
    }
    tree.declare_self("G", true).unwrap();
    tree.declare_self("F", true).unwrap();

    assert_verdicts(&tree, &[("B", true), ("D", true), ("F", true)]).await;
    assert_eq!(tree.snapshot().defaulted, 0);
}

#[tokio::test]
async fn barrier_opens_after_a_yield() {
    let tree = cyclic_tree();
    for key in ["A", "B", "C", "D", "E", "F", "G"] {
        tree.declare_self(key, false).unwrap();
    }

    // sealed, but the opening is queued behind the current task
    let b = tree.verdict(&"B");
    assert_eq!(b.peek(), None);
    assert_eq!(tree.snapshot().sealed_epochs.len(), 1);

    assert!(!b.await.unwrap());
    let snapshot = tree.snapshot();
    assert!(snapshot.sealed_epochs.is_empty());
    assert_eq!(snapshot.barrier_openings, 1);
}

#[tokio::test]
async fn verdicts_do_not_depend_on_declaration_order() {
    let graph: [(&'static str, &[&'static str]); 7] = [
        ("A", &["B", "C"]),
        ("B", &["D", "E"]),
        ("C", &["F", "G"]),
        ("D", &["F"]),
        ("E", &[]),
        ("F", &["B"]),
        ("G", &[]),
    ];

    let mut outcomes = Vec::new();
    for e_first in [true, false] {
        for deps_first in [true, false] {
            let tracker = AsyncTlaTracker::new();
            let declare_deps = |tracker: &AsyncTlaTracker<&'static str>| {
                for (key, children) in graph {
                    tracker.declare_dependencies(key, children.iter().copied()).unwrap();
                }
            };

            if deps_first {
                declare_deps(&tracker);
            }
            if e_first {
                tracker.declare_self("E", true).unwrap();
            }
            for key in ["B", "D", "F", "G"] {
                tracker.declare_self(key, false).unwrap();
            }
            if !e_first {
                tracker.declare_self("E", true).unwrap();
            }
            if !deps_first {
                declare_deps(&tracker);
            }

            let mut verdicts = Vec::new();
            for key in ["A", "B", "D", "F"] {
                verdicts.push(settled(&tracker, key).await);
            }
            outcomes.push(verdicts);
        }
    }

    assert!(outcomes.iter().all(|verdicts| verdicts == &[true, true, true, true]));
}

// ----------------------------------------------------------------------------
// Barrier epochs
// ----------------------------------------------------------------------------

#[tokio::test]
async fn rearmed_barrier_settles_late_arrivals() {
    let tree = cyclic_tree();
    for key in ["A", "B", "C", "D", "E", "F", "G"] {
        tree.declare_self(key, false).unwrap();
    }
    assert_verdicts(&tree, &[("A", false), ("B", false)]).await;
    let first_epoch = tree.status(&"B").unwrap().epoch.unwrap();

    // a second wave, found later through a dynamic import
    tree.declare_dependencies("lazy", ["A", "X"]).unwrap();
    tree.declare_dependencies("X", ["Y"]).unwrap();
    tree.declare_dependencies("Y", ["X"]).unwrap();
    for key in ["lazy", "X", "Y"] {
        tree.declare_self(key, false).unwrap();
    }

    assert_verdicts(&tree, &[("X", false), ("Y", false), ("lazy", false)]).await;
    let second_epoch = tree.status(&"X").unwrap().epoch.unwrap();
    assert!(second_epoch > first_epoch);
    assert_eq!(tree.snapshot().barrier_openings, 2);
}

#[tokio::test]
async fn settled_ancestors_are_not_revised() {
    let tree = cyclic_tree();
    for key in ["A", "B", "C", "D", "E", "F", "G"] {
        tree.declare_self(key, false).unwrap();
    }
    assert_verdicts(&tree, &[("A", false)]).await;

    // a new async module cannot be attached below a settled module
    tree.declare_self("N", true).unwrap();
    let err = tree.declare_dependencies("A", ["B", "C", "N"]).unwrap_err();
    assert!(matches!(err, TrackerError::Redeclared { .. }));

    // but a new importer sees both the settled verdict and the new one
    tree.declare_dependencies("P", ["A", "N"]).unwrap();
    tree.declare_dependencies("Q", ["A"]).unwrap();
    tree.declare_self("Q", false).unwrap();

    assert_verdicts(&tree, &[("N", true), ("P", true), ("Q", false), ("A", false)]).await;
}

#[tokio::test]
async fn dangling_reference_stalls_the_barrier() {
    let tracker = AsyncTlaTracker::new();
    tracker.declare_dependencies("a", ["b", "ghost"]).unwrap();
    tracker.declare_dependencies("b", ["a"]).unwrap();
    tracker.declare_self("a", false).unwrap();
    tracker.declare_self("b", false).unwrap();

    let stalled = timeout(Duration::from_millis(50), tracker.verdict(&"a").wait()).await;
    assert!(stalled.is_err());
    assert_eq!(tracker.undeclared(), vec![("ghost", Declared::Neither)]);

    tracker.declare_dependencies("ghost", []).unwrap();
    tracker.declare_self("ghost", false).unwrap();

    assert!(!settled(&tracker, "a").await);
    assert!(tracker.undeclared().is_empty());
}

// ----------------------------------------------------------------------------
// Verdict handles
// ----------------------------------------------------------------------------

#[tokio::test]
async fn repeated_reads_observe_one_verdict() {
    let tree = cyclic_tree();
    let early = [tree.verdict(&"D"), tree.verdict(&"D")];

    for key in ["A", "B", "C", "D", "E", "F", "G"] {
        tree.declare_self(key, false).unwrap();
    }

    let late = tree.verdict(&"D");
    for handle in early.into_iter().chain([late.clone()]) {
        assert!(!timeout(Duration::from_secs(5), handle.wait()).await.unwrap().unwrap());
    }
    assert_eq!(late.peek(), Some(false));
    assert_eq!(tree.verdict(&"D").peek(), Some(false));
}

#[tokio::test]
async fn verdict_before_any_declaration() {
    let tracker = AsyncTlaTracker::new();
    let handle = tracker.verdict(&"later.js");
    assert!(!handle.is_settled());

    let waiter = tokio::spawn(handle.wait());
    tracker.declare_self("later.js", true).unwrap();

    assert!(waiter.await.unwrap().unwrap());
}

#[tokio::test]
async fn dropping_the_tracker_abandons_pending_handles() {
    let tracker = AsyncTlaTracker::new();
    tracker.declare_dependencies("a", ["missing"]).unwrap();
    let handle = tracker.verdict(&"a");
    drop(tracker);

    assert!(matches!(handle.await, Err(TrackerError::Abandoned)));
}

// ----------------------------------------------------------------------------
// Concurrency
// ----------------------------------------------------------------------------

/// Twelve rings of ten modules. Module `g*10` of ring `g` also imports module
/// `(g+1)*10 + 5` of the next ring. Only module 37 awaits at top level.
fn ring_graph() -> Vec<(String, bool, Vec<String>)> {
    let name = |i: usize| format!("m{i}");
    (0..120)
        .map(|i| {
            let ring = i / 10;
            let mut children = vec![name(ring * 10 + (i + 1) % 10)];
            if i % 10 == 0 && ring < 11 {
                children.push(name((ring + 1) * 10 + 5));
            }
            (name(i), i == 37, children)
        })
        .collect()
}

/// Least fixpoint of "async if self async or any child async".
fn expected_verdicts(graph: &[(String, bool, Vec<String>)]) -> Vec<bool> {
    let index = |key: &String| graph.iter().position(|(k, _, _)| k == key).unwrap();
    let mut marked: Vec<bool> = graph.iter().map(|(_, is_async, _)| *is_async).collect();
    loop {
        let mut changed = false;
        for (i, (_, _, children)) in graph.iter().enumerate() {
            if !marked[i] && children.iter().any(|c| marked[index(c)]) {
                marked[i] = true;
                changed = true;
            }
        }
        if !changed {
            return marked;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_declarations_agree_with_reference() {
    init_tracing();
    let graph = ring_graph();
    let expected = expected_verdicts(&graph);
    let tracker: AsyncTlaTracker<String> = AsyncTlaTracker::new();

    // 240 declarations, issued in a scrambled order from separate tasks
    let total = graph.len() * 2;
    let tasks = (0..total).map(|k| {
        let slot = (k * 37) % total;
        let (key, is_async, children) = graph[slot / 2].clone();
        let tracker = tracker.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            if slot % 2 == 0 {
                tracker.declare_self(key, is_async)
            } else {
                tracker.declare_dependencies(key, children)
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    for ((key, _, _), want) in graph.iter().zip(&expected) {
        assert_eq!(settled(&tracker, key.clone()).await, *want, "verdict for {key}");
    }
    // rings 0 to 3 reach module 37, the rest are all-sync cycles
    assert_eq!(expected.iter().filter(|v| **v).count(), 40);
    assert!(tracker.undeclared().is_empty());
    assert_eq!(tracker.snapshot().pending, 0);
}

#[tokio::test]
async fn snapshot_reports_final_counts() {
    let tree = cyclic_tree();
    for key in ["A", "B", "C", "D", "E", "F"] {
        tree.declare_self(key, false).unwrap();
    }
    tree.declare_self("G", true).unwrap();
    assert_verdicts(&tree, &[("B", false)]).await;

    let snapshot = tree.snapshot();
    assert_eq!(snapshot.nodes, 7);
    assert!(snapshot.is_quiescent());
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.async_nodes, 3);
    assert_eq!(snapshot.sync_nodes, 4);
    assert_eq!(snapshot.defaulted, 3);

    let json: serde_json::Value = serde_json::from_str(&snapshot.to_json()).unwrap();
    assert_eq!(json["barrier_openings"], 1);
}
