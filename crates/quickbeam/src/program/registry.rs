//! Process-wide thread registry
//!
//! Maps each OS thread participating in any program to its variable stack.
//! An entry is created when a thread first attaches and destroyed when its
//! last attachment goes away, at which point its stack should be empty.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use log::{trace, warn};

use crate::error::invariant_violation;
use crate::heap::Heap;
use crate::stack::{StackMark, VarStack};
use crate::sync::lock;

/// One registered thread.
#[derive(Debug)]
pub struct ThreadEntry {
    thread: ThreadId,
    ordinal: u64,
    pub(crate) stack: Mutex<VarStack>,
    attachments: AtomicUsize,
}

impl ThreadEntry {
    /// OS thread identity
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Registration ordinal, unique for the registry's lifetime
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Live attachments across all programs
    pub fn attachments(&self) -> usize {
        self.attachments.load(Ordering::Acquire)
    }

    /// Number of locals currently on this thread's stack
    pub fn local_count(&self) -> usize {
        lock(&self.stack).local_count()
    }
}

/// Registry of every thread attached to a program of one engine.
#[derive(Debug)]
pub struct ThreadRegistry {
    entries: DashMap<ThreadId, Arc<ThreadEntry>>,
    next_ordinal: AtomicU64,
    block_size: usize,
}

impl ThreadRegistry {
    /// Create an empty registry whose stacks use `block_size` slots per
    /// block.
    pub fn new(block_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            next_ordinal: AtomicU64::new(1),
            block_size: block_size.max(1),
        }
    }

    /// Register the calling thread, or add an attachment if it already is.
    pub fn register(&self) -> Arc<ThreadEntry> {
        let id = thread::current().id();
        let entry = self.entries.entry(id).or_insert_with(|| {
            let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
            trace!("registering thread {:?} as #{}", id, ordinal);
            Arc::new(ThreadEntry {
                thread: id,
                ordinal,
                stack: Mutex::new(VarStack::new(self.block_size, ordinal)),
                attachments: AtomicUsize::new(0),
            })
        });
        entry.attachments.fetch_add(1, Ordering::AcqRel);
        Arc::clone(entry.value())
    }

    /// Drop one attachment of the calling thread, destroying its entry on
    /// the last. Anything still on the stack then is released.
    pub fn deregister(&self, heap: &Heap) {
        let id = thread::current().id();
        let Some(entry) = self.get(id) else {
            invariant_violation!("deregistering unregistered thread {:?}", id);
            return;
        };
        let previous = entry.attachments.fetch_sub(1, Ordering::AcqRel);
        if previous == 0 {
            entry.attachments.fetch_add(1, Ordering::AcqRel);
            invariant_violation!("thread {:?} deregistered more often than registered", id);
            return;
        }
        if previous > 1 {
            return;
        }
        self.entries.remove(&id);
        trace!("deregistered thread {:?}", id);

        let owned = {
            let mut stack = lock(&entry.stack);
            if !stack.is_empty() {
                warn!(
                    "thread {:?} deregistered with {} locals and {} closure variables on its stack",
                    id,
                    stack.local_count(),
                    stack.closure_var_count()
                );
            }
            stack.unwind_to(StackMark::default())
        };
        for handle in owned {
            heap.release(handle);
        }
    }

    /// Entry of a registered thread
    pub fn get(&self, thread: ThreadId) -> Option<Arc<ThreadEntry>> {
        self.entries.get(&thread).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered threads
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no thread is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lvalue::VarIdent;
    use crate::value::{TypeConstraint, Value};

    #[test]
    fn test_register_counts_attachments() {
        let heap = Heap::default();
        let registry = ThreadRegistry::new(8);
        let first = registry.register();
        let second = registry.register();
        assert_eq!(first.ordinal(), second.ordinal());
        assert_eq!(first.attachments(), 2);
        assert_eq!(registry.len(), 1);

        registry.deregister(&heap);
        assert_eq!(registry.len(), 1);
        registry.deregister(&heap);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_threads_get_distinct_ordinals() {
        let registry = ThreadRegistry::new(8);
        let heap = Heap::default();
        let here = registry.register().ordinal();
        let there = std::thread::scope(|s| {
            s.spawn(|| {
                let ordinal = registry.register().ordinal();
                registry.deregister(&heap);
                ordinal
            })
            .join()
            .unwrap()
        });
        assert_ne!(here, there);
        registry.deregister(&heap);
    }

    #[test]
    fn test_deregister_releases_leftover_stack() {
        let heap = Heap::default();
        let registry = ThreadRegistry::new(8);
        let entry = registry.register();
        let list = heap.alloc_list(vec![Value::Int(1)]);
        lock(&entry.stack).instantiate_local(
            VarIdent::new(1),
            Arc::from("leftover"),
            list,
            TypeConstraint::Any,
        );
        registry.deregister(&heap);
        assert_eq!(heap.stats().live, 0);
    }
}
