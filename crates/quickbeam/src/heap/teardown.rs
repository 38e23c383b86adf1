//! Deferred release and destructor context

use indexmap::IndexMap;

use super::Heap;
use crate::value::{ObjId, Value};

/// Values displaced while locks were held, released once they are not.
///
/// Releasing can run class destructors, and a destructor may try to take
/// the very locks the displacing operation holds. Operations therefore
/// stage displaced values here and call [`flush`](Self::flush) after their
/// guards are gone. Dropping the queue flushes it as well, so declare it
/// before any guard it must outlive.
pub struct ReleaseQueue<'h> {
    heap: &'h Heap,
    values: Vec<Value>,
    rescan: Vec<ObjId>,
}

impl<'h> ReleaseQueue<'h> {
    /// Create an empty queue for `heap`.
    pub fn new(heap: &'h Heap) -> Self {
        Self {
            heap,
            values: Vec::new(),
            rescan: Vec::new(),
        }
    }

    /// Stage a value for release. Scalars are ignored.
    pub fn push(&mut self, value: Value) {
        if value.handle().is_some() {
            self.values.push(value);
        }
    }

    /// Stage a cycle scan of `id` after release.
    pub(crate) fn rescan(&mut self, id: ObjId) {
        if !self.rescan.contains(&id) {
            self.rescan.push(id);
        }
    }

    /// Number of staged values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if nothing is staged
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.rescan.is_empty()
    }

    /// Release everything staged, then run the staged scans.
    pub fn flush(&mut self) {
        while !self.values.is_empty() {
            for value in std::mem::take(&mut self.values) {
                self.heap.release_value(value);
            }
        }
        for id in std::mem::take(&mut self.rescan) {
            if self.heap.is_live(id) {
                self.heap.collect_cycles(id);
            }
        }
    }
}

impl Drop for ReleaseQueue<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// What a class destructor sees of the object being destroyed.
///
/// The object's data has already been detached from the heap and no heap
/// lock is held, so the destructor may freely read other objects or
/// release values. Members it does not take are released afterwards.
pub struct Teardown<'a> {
    heap: &'a Heap,
    id: ObjId,
    members: &'a mut IndexMap<String, Value>,
}

impl<'a> Teardown<'a> {
    pub(crate) fn new(heap: &'a Heap, id: ObjId, members: &'a mut IndexMap<String, Value>) -> Self {
        Self { heap, id, members }
    }

    /// The heap the object lived on.
    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    /// Handle of the object being destroyed; no longer accessible.
    pub fn id(&self) -> ObjId {
        self.id
    }

    /// Borrowed copy of a member (not retained).
    pub fn member(&self, name: &str) -> Value {
        self.members.get(name).copied().unwrap_or(Value::Nothing)
    }

    /// Take ownership of a member; the caller must release it.
    pub fn take_member(&mut self, name: &str) -> Value {
        self.members.shift_remove(name).unwrap_or(Value::Nothing)
    }

    /// Member names still present
    pub fn member_names(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }
}
