//! Program coordination
//!
//! A [`Program`] is one interpreter instance: its globals, the threads
//! currently executing inside it, and each thread's program-local storage.
//!
//! Thread count changes are the only operations that race freely.
//! Structural changes (defining globals, clearing a thread's storage,
//! teardown) drain the program first: they wait until no other structural
//! change is running and every other executing thread has left.

mod globals;
mod registry;
mod thread;

pub use globals::{GlobalId, GlobalVar};
pub(crate) use globals::Globals;
pub use registry::{ThreadEntry, ThreadRegistry};
pub use thread::{ProgramThread, ScopeGuard};

use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;

use dashmap::DashMap;
use indexmap::IndexMap;
use log::debug;

use crate::config::EngineConfig;
use crate::error::{invariant_violation, EngineError, Result};
use crate::heap::Heap;
use crate::sync::{lock, wait};
use crate::value::{TypeConstraint, Value};

/// Lifecycle of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramPhase {
    /// Threads may attach and execute
    Active,
    /// A structural change is waiting for, or holding, quiescence
    Draining,
    /// Globals and thread data are gone; nothing may attach
    TornDown,
}

#[derive(Debug)]
struct Coord {
    phase: ProgramPhase,
    threads: usize,
}

/// Program-local storage of one thread.
#[derive(Debug, Default)]
struct ThreadData {
    attachments: usize,
    storage: IndexMap<String, Value>,
}

/// One interpreter instance.
#[derive(Debug)]
pub struct Program {
    id: u32,
    heap: Arc<Heap>,
    registry: Arc<ThreadRegistry>,
    config: EngineConfig,
    globals: Globals,
    coord: Mutex<Coord>,
    changed: Condvar,
    thread_data: DashMap<ThreadId, ThreadData>,
}

impl Program {
    pub(crate) fn new(id: u32, heap: Arc<Heap>, registry: Arc<ThreadRegistry>, config: EngineConfig) -> Self {
        Self {
            id,
            heap,
            registry,
            config,
            globals: Globals::new(id),
            coord: Mutex::new(Coord {
                phase: ProgramPhase::Active,
                threads: 0,
            }),
            changed: Condvar::new(),
            thread_data: DashMap::new(),
        }
    }

    /// Program id, unique within its engine
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The heap shared with every other program of the engine
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    pub(crate) fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ProgramPhase {
        lock(&self.coord).phase
    }

    /// Number of threads currently executing inside the program
    pub fn thread_count(&self) -> usize {
        lock(&self.coord).threads
    }

    // ═══════════════════════════════════════════════════════════════════
    // Thread Count
    // ═══════════════════════════════════════════════════════════════════

    /// Enter the program. Blocks while a structural change is draining.
    pub fn inc_thread_count(&self) -> Result<()> {
        let mut coord = lock(&self.coord);
        loop {
            match coord.phase {
                ProgramPhase::Active => break,
                ProgramPhase::Draining => coord = wait(&self.changed, coord),
                ProgramPhase::TornDown => return Err(EngineError::ProgramTornDown { id: self.id }),
            }
        }
        coord.threads += 1;
        Ok(())
    }

    /// Leave the program.
    pub fn dec_thread_count(&self) {
        let mut coord = lock(&self.coord);
        if coord.threads == 0 {
            invariant_violation!("thread count underflow in program {}", self.id);
            return;
        }
        coord.threads -= 1;
        self.changed.notify_all();
    }

    /// Attach the calling thread: register it, count it as executing and
    /// attach its program-local storage.
    pub fn attach_thread(self: &Arc<Self>) -> Result<ProgramThread> {
        self.inc_thread_count()?;
        let entry = self.registry.register();
        self.thread_data.entry(entry.thread()).or_default().attachments += 1;
        Ok(ProgramThread::new(Arc::clone(self), entry))
    }

    /// Reverse of [`Program::attach_thread`]'s storage attachment.
    pub(crate) fn detach_thread_data(&self, thread: ThreadId) {
        let last = match self.thread_data.get_mut(&thread) {
            Some(mut data) => {
                data.attachments = data.attachments.saturating_sub(1);
                data.attachments == 0
            }
            None => false,
        };
        if !last {
            return;
        }
        if let Some((_, data)) = self.thread_data.remove_if(&thread, |_, data| data.attachments == 0) {
            for value in data.storage.into_values() {
                self.heap.release_value(value);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Structural Changes
    // ═══════════════════════════════════════════════════════════════════

    /// Run `change` once the program is quiescent.
    ///
    /// The calling thread's own attachments are parked while it waits, so
    /// an executing thread can request a structural change without
    /// deadlocking against itself.
    pub fn with_structural_lock<R>(&self, change: impl FnOnce(&Program) -> R) -> Result<R> {
        let guard = self.drain()?;
        let result = change(self);
        drop(guard);
        Ok(result)
    }

    fn drain(&self) -> Result<DrainGuard<'_>> {
        let own = self.own_attachments();
        let mut coord = lock(&self.coord);
        coord.threads = coord.threads.saturating_sub(own);
        self.changed.notify_all();
        loop {
            match coord.phase {
                ProgramPhase::Active => break,
                ProgramPhase::Draining => coord = wait(&self.changed, coord),
                ProgramPhase::TornDown => {
                    coord.threads += own;
                    return Err(EngineError::ProgramTornDown { id: self.id });
                }
            }
        }
        coord.phase = ProgramPhase::Draining;
        debug!("program {} draining ({} threads executing)", self.id, coord.threads);
        while coord.threads > 0 {
            coord = wait(&self.changed, coord);
        }
        Ok(DrainGuard {
            program: self,
            own,
            finish: ProgramPhase::Active,
        })
    }

    fn own_attachments(&self) -> usize {
        self.thread_data
            .get(&std::thread::current().id())
            .map(|data| data.attachments)
            .unwrap_or(0)
    }

    /// Define a global. Takes ownership of `value`.
    pub fn define_global(
        &self,
        name: &str,
        value: Value,
        constraint: TypeConstraint,
        read_only: bool,
    ) -> Result<GlobalId> {
        let class = self.heap.class_name_of(&value);
        if let Err(err) = constraint.check(&value, class.as_deref()) {
            self.heap.release_value(value);
            return Err(err);
        }
        let defined = match self.with_structural_lock(|p| p.globals.define(name, value, constraint, read_only)) {
            Ok(defined) => defined,
            Err(err) => {
                self.heap.release_value(value);
                return Err(err);
            }
        };
        match defined {
            Ok(id) => {
                debug!("program {} defined global `{}` as {}", self.id, name, id);
                Ok(id)
            }
            Err((err, value)) => {
                self.heap.release_value(value);
                Err(err)
            }
        }
    }

    /// Address of the global called `name`
    pub fn global_id(&self, name: &str) -> Option<GlobalId> {
        self.globals.lookup(name)
    }

    /// Number of globals defined
    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    /// Release every program-local value `thread` stored, keeping its
    /// attachments. Returns how many values were dropped.
    pub fn clear_thread_data(&self, thread: ThreadId) -> Result<usize> {
        let taken = self.with_structural_lock(|p| {
            p.thread_data
                .get_mut(&thread)
                .map(|mut data| std::mem::take(&mut data.storage))
                .unwrap_or_default()
        })?;
        let count = taken.len();
        for value in taken.into_values() {
            self.heap.release_value(value);
        }
        Ok(count)
    }

    /// Wait for quiescence, release every global and all thread data, and
    /// refuse further attachments.
    pub fn teardown(&self) -> Result<()> {
        let mut guard = self.drain()?;
        guard.finish = ProgramPhase::TornDown;
        let mut released = self.globals.drain();
        let threads: Vec<ThreadId> = self.thread_data.iter().map(|entry| *entry.key()).collect();
        for thread in threads {
            if let Some(mut data) = self.thread_data.get_mut(&thread) {
                released.extend(std::mem::take(&mut data.storage).into_values());
            }
        }
        drop(guard);
        debug!("program {} torn down, releasing {} values", self.id, released.len());
        for value in released {
            self.heap.release_value(value);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Thread-Local Storage
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn thread_data_get(&self, thread: ThreadId, key: &str) -> Value {
        let value = self
            .thread_data
            .get(&thread)
            .and_then(|data| data.storage.get(key).copied())
            .unwrap_or(Value::Nothing);
        self.heap.dup(value)
    }

    pub(crate) fn thread_data_set(&self, thread: ThreadId, key: &str, value: Value) -> Result<()> {
        if let Some(id) = value.handle().filter(|id| self.heap.is_unique(*id)) {
            self.heap.release_value(value);
            return Err(EngineError::UniqueObject { id: id.to_string() });
        }
        let old = match self.thread_data.get_mut(&thread) {
            Some(mut data) => data.storage.insert(key.to_string(), value),
            None => {
                self.heap.release_value(value);
                return Err(EngineError::ThreadNotAttached { id: self.id });
            }
        };
        if let Some(old) = old {
            self.heap.release_value(old);
        }
        Ok(())
    }

    pub(crate) fn thread_data_remove(&self, thread: ThreadId, key: &str) -> Value {
        self.thread_data
            .get_mut(&thread)
            .and_then(|mut data| data.storage.shift_remove(key))
            .unwrap_or(Value::Nothing)
    }
}

/// Holds a program drained until dropped, then restores the parked
/// attachments and lets waiters in.
struct DrainGuard<'a> {
    program: &'a Program,
    own: usize,
    finish: ProgramPhase,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut coord = lock(&self.program.coord);
        coord.phase = self.finish;
        coord.threads += self.own;
        debug!("program {} is {:?}", self.program.id, coord.phase);
        self.program.changed.notify_all();
    }
}
