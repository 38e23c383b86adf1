//! Ownership manager
//!
//! Every container lives in a slot of one arena and is addressed by an
//! [`ObjId`]. A slot carries an [`ObjectHeader`](header::ObjectHeader)
//! with the atomic reference count, the ownership flags and the scan count,
//! plus the container payload behind its own lock.
//!
//! Reference counting is explicit: [`Heap::retain`]/[`Heap::dup`] add an
//! owner, [`Heap::release`]/[`Heap::release_value`] drop one. The release
//! that observes the count reach zero tears the object down iteratively;
//! a release that leaves a scannable object alive hands it to the cycle
//! detector.

mod collect;
mod container;
mod header;
mod rset;
mod teardown;

pub use container::{ClosureData, ClosureVarData, Container, ObjectData, ReferenceData};
pub use rset::{find_garbage, OwnershipGraph, ScanOutcome};
pub use teardown::{ReleaseQueue, Teardown};

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use indexmap::IndexMap;
use log::debug;

use crate::class::ClassDescriptor;
use crate::config::EngineConfig;
use crate::error::{invariant_violation, EngineError, Result};
use crate::lvalue::{LValueExpr, VarIdent};
use crate::sync::{lock, read, write};
use crate::value::{ObjId, Snapshot, TypeConstraint, Value};

use header::{ObjectHeader, CUSTOM_HANDLERS, UNIQUE};

pub(crate) struct Slot {
    generation: AtomicU32,
    header: ObjectHeader,
    data: RwLock<Option<Container>>,
}

#[derive(Debug, Default)]
struct Counters {
    allocated: AtomicU64,
    freed: AtomicU64,
    collected: AtomicU64,
    scans: AtomicU64,
    clones: AtomicU64,
}

/// Counters describing heap activity since creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// Containers allocated
    pub allocated: u64,
    /// Containers currently alive
    pub live: u64,
    /// Containers freed, by any path
    pub freed: u64,
    /// Containers freed by the cycle detector
    pub collected: u64,
    /// Cycle scans started
    pub scans: u64,
    /// Copy-on-write clones made by `ensure_unique`
    pub clones: u64,
}

/// The shared container heap.
pub struct Heap {
    slots: RwLock<Vec<Arc<Slot>>>,
    free: Mutex<Vec<u32>>,
    epoch: AtomicU64,
    scan_lock: Mutex<()>,
    counters: Counters,
    config: EngineConfig,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("stats", &self.stats())
            .field("epoch", &self.epoch())
            .finish()
    }
}

fn deleted(id: ObjId) -> EngineError {
    EngineError::ObjectAlreadyDeleted { id: id.to_string() }
}

fn unique_shared(id: ObjId) -> EngineError {
    EngineError::UniqueObject { id: id.to_string() }
}

impl Heap {
    /// Create an empty heap.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            free: Mutex::new(Vec::new()),
            epoch: AtomicU64::new(0),
            scan_lock: Mutex::new(()),
            counters: Counters::default(),
            config,
        }
    }

    /// Settings this heap was created with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════
    // Slots
    // ═══════════════════════════════════════════════════════════════════

    /// The slot currently occupied by `id`, even if its teardown has begun.
    fn slot(&self, id: ObjId) -> Option<Arc<Slot>> {
        let slot = read(&self.slots).get(id.index as usize).cloned()?;
        (slot.generation.load(Ordering::Acquire) == id.generation).then_some(slot)
    }

    fn live_slot(&self, id: ObjId) -> Result<Arc<Slot>> {
        match self.slot(id) {
            Some(slot) if !slot.header.in_teardown() && slot.header.refs() > 0 => Ok(slot),
            _ => Err(deleted(id)),
        }
    }

    /// Check if `id` still names a live container.
    pub fn is_live(&self, id: ObjId) -> bool {
        self.live_slot(id).is_ok()
    }

    pub(crate) fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Whole-graph mutation counter.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Allocation
    // ═══════════════════════════════════════════════════════════════════

    fn alloc(&self, container: Container, extra_flags: u8) -> ObjId {
        let scan = container
            .values()
            .iter()
            .filter(|v| self.value_needs_scan(v))
            .count();
        let flags = container.header_flags() | extra_flags;
        self.bump_epoch();
        self.counters.allocated.fetch_add(1, Ordering::Relaxed);

        let reused = lock(&self.free).pop();
        if let Some((index, slot)) =
            reused.and_then(|i| read(&self.slots).get(i as usize).cloned().map(|s| (i, s)))
        {
            *write(&slot.data) = Some(container);
            slot.header.reset(flags, scan);
            return ObjId::new(index, slot.generation.load(Ordering::Acquire));
        }

        let slot = Arc::new(Slot {
            generation: AtomicU32::new(0),
            header: ObjectHeader::new(flags, scan),
            data: RwLock::new(Some(container)),
        });
        let mut slots = write(&self.slots);
        let index = slots.len() as u32;
        slots.push(slot);
        ObjId::new(index, 0)
    }

    /// Allocate a string.
    pub fn alloc_string(&self, text: impl Into<String>) -> Value {
        Value::String(self.alloc(Container::Str(text.into()), 0))
    }

    /// Allocate a byte blob.
    pub fn alloc_binary(&self, bytes: impl Into<Vec<u8>>) -> Value {
        Value::Binary(self.alloc(Container::Binary(bytes.into()), 0))
    }

    /// Allocate a list, taking ownership of `items`.
    pub fn alloc_list(&self, items: Vec<Value>) -> Value {
        Value::List(self.alloc(Container::List(items), 0))
    }

    /// Allocate a map, taking ownership of its values.
    pub fn alloc_map(&self, entries: IndexMap<String, Value>) -> Value {
        Value::Map(self.alloc(Container::Map(entries), 0))
    }

    /// Instantiate `class`, constructing each declared member's default.
    pub fn alloc_object(&self, class: Arc<dyn ClassDescriptor>) -> Value {
        Value::Object(self.alloc(self.object_container(class), 0))
    }

    /// Instantiate `class` as a unique object: it has exactly one owner
    /// for its whole life and must never be retained.
    pub fn alloc_unique(&self, class: Arc<dyn ClassDescriptor>) -> Value {
        Value::Object(self.alloc(self.object_container(class), UNIQUE))
    }

    fn object_container(&self, class: Arc<dyn ClassDescriptor>) -> Container {
        let members = class
            .member_names()
            .into_iter()
            .map(|name| {
                let value = class.member_default(&name, self);
                (name, value)
            })
            .collect();
        Container::Object(ObjectData { class, members })
    }

    pub(crate) fn alloc_closure(&self, name: Arc<str>, captures: Vec<ObjId>) -> Value {
        Value::Closure(self.alloc(Container::Closure(ClosureData { name, captures }), 0))
    }

    pub(crate) fn alloc_closure_var(
        &self,
        ident: VarIdent,
        name: Arc<str>,
        value: Value,
        constraint: TypeConstraint,
    ) -> ObjId {
        self.alloc(
            Container::ClosureVar(ClosureVarData {
                ident,
                name,
                value,
                constraint,
            }),
            0,
        )
    }

    pub(crate) fn alloc_reference(&self, target: LValueExpr, read_only: bool) -> Value {
        Value::Reference(self.alloc(Container::Reference(ReferenceData { target, read_only }), 0))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reference Counting
    // ═══════════════════════════════════════════════════════════════════

    /// Add an owner to `id`.
    pub fn retain(&self, id: ObjId) {
        let Some(slot) = self.slot(id) else {
            invariant_violation!("retain of freed object {}", id);
            return;
        };
        if slot.header.is_unique() {
            invariant_violation!("retain of unique object {}", id);
            return;
        }
        self.bump_epoch();
        slot.header.increment();
    }

    /// Drop an owner of `id`, tearing it down if it was the last.
    ///
    /// Must not be called while holding any container lock; use a
    /// [`ReleaseQueue`] inside critical sections.
    pub fn release(&self, id: ObjId) {
        let mut work = vec![id];
        let mut candidates = Vec::new();
        while let Some(id) = work.pop() {
            let Some(slot) = self.slot(id) else {
                invariant_violation!("release of freed object {}", id);
                continue;
            };
            self.bump_epoch();
            match slot.header.decrement() {
                0 => invariant_violation!("reference count underflow on {}", id),
                1 => self.destroy(id, &slot, &mut work),
                _ => {
                    if slot.header.needs_scan() && !slot.header.in_teardown() {
                        candidates.push(id);
                    }
                }
            }
        }
        if self.config.cycle_detection {
            for id in candidates {
                if self.is_live(id) {
                    self.collect_cycles(id);
                }
            }
        }
    }

    /// Take an additional owned copy of `value`.
    pub fn dup(&self, value: Value) -> Value {
        if let Some(id) = value.handle() {
            self.retain(id);
        }
        value
    }

    /// Like [`dup`](Self::dup), but refuse to give a unique object a
    /// second owner.
    pub fn try_dup(&self, value: Value) -> Result<Value> {
        if let Some(id) = value.handle() {
            if self.is_unique(id) {
                return Err(unique_shared(id));
            }
            self.retain(id);
        }
        Ok(value)
    }

    /// Give up an owned value.
    pub fn release_value(&self, value: Value) {
        if let Some(id) = value.handle() {
            self.release(id);
        }
    }

    fn destroy(&self, id: ObjId, slot: &Slot, work: &mut Vec<ObjId>) {
        if !slot.header.begin_teardown() {
            invariant_violation!("object {} torn down twice", id);
            return;
        }
        let data = write(&slot.data).take();
        if let Some(mut container) = data {
            if slot.header.has(CUSTOM_HANDLERS) {
                self.run_hook(id, &mut container);
            }
            container.children(work);
        }
        self.free_slot(id, slot);
    }

    /// Run the class destructor of a detached object. No lock is held.
    fn run_hook(&self, id: ObjId, container: &mut Container) {
        if let Container::Object(data) = container {
            let class = Arc::clone(&data.class);
            debug!("running destructor of {} {}", class.name(), id);
            let mut teardown = Teardown::new(self, id, &mut data.members);
            class.destroy(&mut teardown);
        }
    }

    fn free_slot(&self, id: ObjId, slot: &Slot) {
        slot.generation.fetch_add(1, Ordering::AcqRel);
        slot.header.clear();
        lock(&self.free).push(id.index);
        self.counters.freed.fetch_add(1, Ordering::Relaxed);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════

    /// Current reference count, or `None` once teardown has begun.
    pub fn ref_count(&self, id: ObjId) -> Option<usize> {
        self.live_slot(id).ok().map(|s| s.header.refs())
    }

    /// Number of directly held children that need scanning.
    pub fn scan_count(&self, id: ObjId) -> Option<usize> {
        self.live_slot(id).ok().map(|s| s.header.scan_count())
    }

    /// Check if `id` was allocated unique.
    pub fn is_unique(&self, id: ObjId) -> bool {
        self.slot(id).is_some_and(|s| s.header.is_unique())
    }

    /// Whether holding `value` may close an ownership cycle.
    pub fn value_needs_scan(&self, value: &Value) -> bool {
        value
            .handle()
            .and_then(|id| self.slot(id))
            .is_some_and(|s| s.header.needs_scan())
    }

    pub(crate) fn adjust_scan(&self, id: ObjId, delta: isize) {
        if delta == 0 {
            return;
        }
        if let Some(slot) = self.slot(id) {
            slot.header.adjust_scan(delta);
        }
    }

    /// Class name of an object value.
    pub fn class_name_of(&self, value: &Value) -> Option<String> {
        match value {
            Value::Object(id) => self
                .with_container(*id, |c| match c {
                    Container::Object(data) => Some(data.class.name().to_string()),
                    _ => None,
                })
                .ok()
                .flatten(),
            _ => None,
        }
    }

    /// Text of a string container.
    pub fn string_text(&self, id: ObjId) -> Result<String> {
        self.with_container(id, |c| match c {
            Container::Str(s) => Ok(s.clone()),
            other => Err(EngineError::TypeError {
                expected: "string".to_string(),
                got: other.kind().name().to_string(),
            }),
        })?
    }

    /// Activity counters
    pub fn stats(&self) -> HeapStats {
        let allocated = self.counters.allocated.load(Ordering::Relaxed);
        let freed = self.counters.freed.load(Ordering::Relaxed);
        HeapStats {
            allocated,
            live: allocated.saturating_sub(freed),
            freed,
            collected: self.counters.collected.load(Ordering::Relaxed),
            scans: self.counters.scans.load(Ordering::Relaxed),
            clones: self.counters.clones.load(Ordering::Relaxed),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Container Access
    // ═══════════════════════════════════════════════════════════════════

    /// Run `f` with shared access to the container behind `id`.
    pub fn with_container<R>(&self, id: ObjId, f: impl FnOnce(&Container) -> R) -> Result<R> {
        let slot = self.live_slot(id)?;
        let guard = read(&slot.data);
        match guard.as_ref() {
            Some(container) if slot.generation.load(Ordering::Acquire) == id.generation => {
                Ok(f(container))
            }
            _ => Err(deleted(id)),
        }
    }

    /// Run `f` with exclusive access to the container behind `id`.
    ///
    /// Copy-on-write containers must be unique (see
    /// [`ensure_unique`](Self::ensure_unique)) before they are mutated.
    pub fn with_container_mut<R>(&self, id: ObjId, f: impl FnOnce(&mut Container) -> R) -> Result<R> {
        let slot = self.live_slot(id)?;
        let mut guard = write(&slot.data);
        if slot.generation.load(Ordering::Acquire) != id.generation || slot.header.in_teardown() {
            return Err(deleted(id));
        }
        let Some(container) = guard.as_mut() else {
            return Err(deleted(id));
        };
        self.bump_epoch();
        let result = f(container);
        self.bump_epoch();
        Ok(result)
    }

    /// Make the copy-on-write container in `cell` exclusively owned by the
    /// cell, cloning it if it is shared. Returns whether a clone was made.
    ///
    /// The displaced shared handle is staged on `queue`. Scalars, shared
    /// objects and already-unique containers are left alone, so a second
    /// call is always a no-op. A shared container holding a unique object
    /// cannot be cloned and yields [`EngineError::UniqueObject`].
    pub fn ensure_unique(&self, cell: &mut Value, queue: &mut ReleaseQueue<'_>) -> Result<bool> {
        let Some(id) = cell.cow_handle() else {
            return Ok(false);
        };
        let slot = self.live_slot(id)?;
        if slot.header.is_unique() || slot.header.refs() <= 1 {
            return Ok(false);
        }
        let copy = self
            .with_container(id, Container::clone_shallow)?
            .ok_or_else(|| EngineError::type_error("copy-on-write container", cell))?;
        let mut children = Vec::new();
        copy.children(&mut children);
        if let Some(held) = children.iter().find(|child| self.is_unique(**child)) {
            return Err(unique_shared(*held));
        }
        for child in children {
            self.retain(child);
        }
        let clone = self.alloc(copy, 0);
        self.counters.clones.fetch_add(1, Ordering::Relaxed);
        let unique = cell.with_handle(clone);
        queue.push(std::mem::replace(cell, unique));
        Ok(true)
    }

    /// Plain-data rendering of `value`. Freed handles render as `Nothing`.
    pub fn snapshot(&self, value: &Value) -> Snapshot {
        match *value {
            Value::Nothing => Snapshot::Nothing,
            Value::Bool(b) => Snapshot::Bool(b),
            Value::Int(n) => Snapshot::Int(n),
            Value::Float(n) => Snapshot::Float(n),
            Value::Date(us) => Snapshot::Date(us),
            Value::Closure(id) => Snapshot::Closure(id),
            Value::Reference(id) => Snapshot::Reference(id),
            Value::Object(id) => match self.class_name_of(value) {
                Some(class) => Snapshot::Object { class, id },
                None => Snapshot::Nothing,
            },
            Value::String(id) | Value::Binary(id) | Value::List(id) | Value::Map(id) => self
                .with_container(id, |c| match c {
                    Container::Str(s) => Snapshot::Str(s.clone()),
                    Container::Binary(b) => Snapshot::Binary(b.clone()),
                    Container::List(items) => {
                        Snapshot::List(items.iter().map(|v| self.snapshot(v)).collect())
                    }
                    Container::Map(map) => Snapshot::Map(
                        map.iter()
                            .map(|(k, v)| (k.clone(), self.snapshot(v)))
                            .collect(),
                    ),
                    _ => Snapshot::Nothing,
                })
                .unwrap_or(Snapshot::Nothing),
        }
    }
}
