//! Cycle collection driver: runs RSet scans against the live heap and
//! destroys the sets they find.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::debug;

use super::rset::{find_garbage, OwnershipGraph, ScanOutcome};
use super::{Heap, Slot};
use crate::error::invariant_violation;
use crate::sync::{lock, read, write};
use crate::value::ObjId;

impl OwnershipGraph for Heap {
    fn ref_count(&self, node: ObjId) -> Option<usize> {
        Heap::ref_count(self, node)
    }

    fn is_scannable(&self, node: ObjId) -> bool {
        self.slot(node).is_some_and(|s| s.header.needs_scan())
    }

    fn edges(&self, node: ObjId, out: &mut Vec<ObjId>) -> bool {
        let Some(slot) = self.slot(node) else {
            return false;
        };
        if slot.header.in_teardown() {
            return false;
        }
        let found = match read(&slot.data).as_ref() {
            Some(container) => {
                container.children(out);
                true
            }
            None => false,
        };
        found
    }

    fn epoch(&self) -> u64 {
        Heap::epoch(self)
    }
}

impl Heap {
    /// Scan `candidate` for an unreachable cycle and destroy it if found.
    /// Returns the number of objects collected.
    ///
    /// The scan holds the heap's scan lock; teardown of the collected set
    /// runs after it is released.
    pub fn collect_cycles(&self, candidate: ObjId) -> usize {
        if !self.config.cycle_detection {
            return 0;
        }
        let mut attempts = 0;
        let doomed = loop {
            let guard = lock(&self.scan_lock);
            self.counters.scans.fetch_add(1, Ordering::Relaxed);
            match find_garbage(self, candidate, self.config.max_scan_nodes) {
                ScanOutcome::Garbage(set) => {
                    let mut doomed = Vec::with_capacity(set.len());
                    for id in set {
                        match self.slot(id) {
                            Some(slot) if slot.header.begin_teardown() => doomed.push((id, slot)),
                            _ => invariant_violation!("rset member {} already in teardown", id),
                        }
                    }
                    drop(guard);
                    break doomed;
                }
                ScanOutcome::Stale if attempts < self.config.scan_retries => {
                    attempts += 1;
                    debug!("rset scan of {} stale, retry {}", candidate, attempts);
                }
                ScanOutcome::Stale => {
                    debug!("rset scan of {} abandoned after {} retries", candidate, attempts);
                    return 0;
                }
                ScanOutcome::TooLarge => {
                    debug!(
                        "rset scan of {} exceeded {} nodes",
                        candidate, self.config.max_scan_nodes
                    );
                    return 0;
                }
                ScanOutcome::Inconsistent => {
                    invariant_violation!("rset scan of {} saw inconsistent counts", candidate);
                    return 0;
                }
                ScanOutcome::Live | ScanOutcome::Vanished => return 0,
            }
        };
        self.destroy_set(doomed)
    }

    /// Tear down a closed set: detach every member, break the edges between
    /// members, run destructors, release what the set held from outside and
    /// free the slots.
    fn destroy_set(&self, doomed: Vec<(ObjId, Arc<Slot>)>) -> usize {
        let members: HashSet<ObjId> = doomed.iter().map(|(id, _)| *id).collect();
        let mut detached = Vec::with_capacity(doomed.len());
        for (id, slot) in &doomed {
            if let Some(container) = write(&slot.data).take() {
                detached.push((*id, slot, container));
            }
        }
        for (_, _, container) in &mut detached {
            container.break_edges(&members);
        }
        for (id, slot, container) in &mut detached {
            if slot.header.has(super::header::CUSTOM_HANDLERS) {
                self.run_hook(*id, container);
            }
        }
        let mut external = Vec::new();
        for (_, _, container) in &detached {
            container.children(&mut external);
        }
        drop(detached);
        for (id, slot) in &doomed {
            self.free_slot(*id, slot);
        }
        let count = doomed.len();
        self.counters.collected.fetch_add(count as u64, Ordering::Relaxed);
        debug!("rset collected {} objects", count);
        for id in external {
            self.release(id);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::SimpleClass;
    use crate::heap::Container;
    use crate::value::Value;
    use std::sync::atomic::AtomicUsize;

    fn link(heap: &Heap, from: Value, member: &str, to: Value) {
        let to = heap.dup(to);
        heap.with_container_mut(from.handle().unwrap(), |c| {
            if let Container::Object(data) = c {
                data.members.insert(member.to_string(), to);
            }
        })
        .unwrap();
    }

    #[test]
    fn test_release_collects_two_object_cycle() {
        let heap = Heap::default();
        let drops = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&drops);
        let class = SimpleClass::new("Node")
            .member("next")
            .with_destructor(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let a = heap.alloc_object(Arc::clone(&class));
        let b = heap.alloc_object(class);
        link(&heap, a, "next", b);
        link(&heap, b, "next", a);
        heap.release_value(b);
        assert!(heap.is_live(b.handle().unwrap()));
        heap.release_value(a);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        assert_eq!(heap.stats().live, 0);
        assert_eq!(heap.stats().collected, 2);
    }

    #[test]
    fn test_disabled_detection_leaves_cycle() {
        let heap = Heap::new(crate::EngineConfig::default().with_cycle_detection(false));
        let class = SimpleClass::new("Node").member("next").build();
        let a = heap.alloc_object(class);
        link(&heap, a, "next", a);
        heap.release_value(a);
        assert_eq!(heap.stats().live, 1);
        assert_eq!(heap.collect_cycles(a.handle().unwrap()), 0);
    }

    #[test]
    fn test_collect_live_candidate_is_noop() {
        let heap = Heap::default();
        let class = SimpleClass::new("Node").member("next").build();
        let a = heap.alloc_object(class);
        link(&heap, a, "next", a);
        assert_eq!(heap.collect_cycles(a.handle().unwrap()), 0);
        assert_eq!(heap.ref_count(a.handle().unwrap()), Some(2));
        heap.release_value(a);
        assert_eq!(heap.stats().live, 0);
    }
}
