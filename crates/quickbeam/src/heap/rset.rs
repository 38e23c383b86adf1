//! Recursive-set (RSet) cycle detection
//!
//! A pure graph algorithm over the [`OwnershipGraph`] trait, so it can be
//! exercised against hand-built graphs as easily as against the heap.
//!
//! Starting from a candidate, the walk visits every scannable node
//! reachable through owned handles and counts, per node, how many of its
//! owners are edges from inside the visited set. A node whose reference
//! count exceeds that number has an owner outside the set: it is live, and
//! so is everything it reaches. If the candidate itself is live nothing is
//! collected; otherwise the nodes that are not live form a closed set whose
//! only owners are each other.

use std::collections::HashMap;

use log::trace;

use crate::value::ObjId;

/// Read access to an ownership graph.
pub trait OwnershipGraph {
    /// Current reference count of `node`, or `None` if it no longer exists.
    fn ref_count(&self, node: ObjId) -> Option<usize>;

    /// Whether `node` may take part in a cycle.
    fn is_scannable(&self, node: ObjId) -> bool;

    /// Push the handles `node` owns, with multiplicity. Returns false if the
    /// node no longer exists.
    fn edges(&self, node: ObjId, out: &mut Vec<ObjId>) -> bool;

    /// Mutation counter; any change to counts or edges advances it.
    fn epoch(&self) -> u64;
}

/// Result of a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A closed set owned only by its own members
    Garbage(Vec<ObjId>),
    /// The candidate has an external owner
    Live,
    /// The graph changed while the scan ran
    Stale,
    /// The walk exceeded the node limit
    TooLarge,
    /// The candidate no longer exists
    Vanished,
    /// Counts that cannot be explained by the edges seen (fewer owners
    /// than internal edges) on an unchanged graph
    Inconsistent,
}

struct Node {
    id: ObjId,
    rc: usize,
    internal_in: usize,
    out: Vec<usize>,
}

/// Decide whether `candidate` belongs to an unreachable cycle.
///
/// `limit` bounds the number of nodes visited.
pub fn find_garbage<G: OwnershipGraph + ?Sized>(graph: &G, candidate: ObjId, limit: usize) -> ScanOutcome {
    let start = graph.epoch();
    if !graph.is_scannable(candidate) {
        return ScanOutcome::Live;
    }
    let Some(rc) = graph.ref_count(candidate) else {
        return ScanOutcome::Vanished;
    };

    let mut index: HashMap<ObjId, usize> = HashMap::from([(candidate, 0)]);
    let mut nodes = vec![Node {
        id: candidate,
        rc,
        internal_in: 0,
        out: Vec::new(),
    }];
    let mut stack = vec![0usize];
    let mut edges = Vec::new();

    while let Some(i) = stack.pop() {
        edges.clear();
        if !graph.edges(nodes[i].id, &mut edges) {
            return if i == 0 {
                ScanOutcome::Vanished
            } else {
                ScanOutcome::Stale
            };
        }
        for &child in &edges {
            if !graph.is_scannable(child) {
                continue;
            }
            let j = match index.get(&child) {
                Some(&j) => j,
                None => {
                    if nodes.len() >= limit {
                        return ScanOutcome::TooLarge;
                    }
                    let Some(rc) = graph.ref_count(child) else {
                        return ScanOutcome::Stale;
                    };
                    let j = nodes.len();
                    index.insert(child, j);
                    nodes.push(Node {
                        id: child,
                        rc,
                        internal_in: 0,
                        out: Vec::new(),
                    });
                    stack.push(j);
                    j
                }
            };
            nodes[j].internal_in += 1;
            nodes[i].out.push(j);
        }
    }

    let mut live = vec![false; nodes.len()];
    let mut work = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        if node.rc < node.internal_in {
            return if graph.epoch() != start {
                ScanOutcome::Stale
            } else {
                ScanOutcome::Inconsistent
            };
        }
        if node.rc > node.internal_in {
            live[i] = true;
            work.push(i);
        }
    }
    while let Some(i) = work.pop() {
        for &j in &nodes[i].out {
            if !live[j] {
                live[j] = true;
                work.push(j);
            }
        }
    }

    trace!(
        "rset scan of {}: {} nodes, {} live",
        candidate,
        nodes.len(),
        live.iter().filter(|l| **l).count()
    );

    if live[0] {
        return ScanOutcome::Live;
    }
    if graph.epoch() != start {
        return ScanOutcome::Stale;
    }
    ScanOutcome::Garbage(
        nodes
            .iter()
            .zip(&live)
            .filter(|(_, live)| !**live)
            .map(|(node, _)| node.id)
            .collect(),
    )
}
