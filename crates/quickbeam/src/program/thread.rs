//! A thread's attachment to a program
//!
//! [`ProgramThread`] is the handle embedding code holds while running
//! inside a program on one OS thread. Every lvalue operation, stack
//! operation and closure call goes through it, so the resolver always sees
//! the right globals, the right variable stack and the current class
//! context.
//!
//! Value ownership at this boundary: arguments named `value` or `operand`
//! are consumed, and every returned [`Value`] carries an owner the caller
//! must eventually hand to [`Heap::release_value`].

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use log::trace;

use super::{Program, ProgramPhase, ThreadEntry};
use crate::error::{EngineError, Result};
use crate::heap::{Container, Heap};
use crate::lvalue::{Access, LValueExpr, LocalRef, Outcome, PathStep, Resolver, VarIdent};
use crate::stack::StackMark;
use crate::sync::lock;
use crate::value::{CompoundOp, ObjId, PreparedOperand, Snapshot, TypeConstraint, Value};

/// The calling thread, attached to one program.
///
/// Not `Send`: the attachment belongs to the OS thread that created it.
/// Dropping it detaches.
#[derive(Debug)]
pub struct ProgramThread {
    program: Arc<Program>,
    entry: Arc<ThreadEntry>,
    class_context: Option<String>,
    detached: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl ProgramThread {
    pub(super) fn new(program: Arc<Program>, entry: Arc<ThreadEntry>) -> Self {
        trace!("thread {:?} attached to program {}", entry.thread(), program.id());
        Self {
            program,
            entry,
            class_context: None,
            detached: false,
            _thread_bound: PhantomData,
        }
    }

    /// The program attached to
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// The engine heap
    pub fn heap(&self) -> &Heap {
        self.program.heap()
    }

    /// Registry entry of the calling thread
    pub fn entry(&self) -> &ThreadEntry {
        &self.entry
    }

    /// Detach now instead of on drop.
    pub fn detach(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if std::mem::replace(&mut self.detached, true) {
            return;
        }
        trace!("thread {:?} detaching from program {}", self.entry.thread(), self.program.id());
        self.program.detach_thread_data(self.entry.thread());
        self.program.registry().deregister(self.program.heap());
        self.program.dec_thread_count();
    }

    /// Class whose private members are visible to following operations.
    pub fn set_class_context(&mut self, class: Option<&str>) {
        self.class_context = class.map(str::to_string);
    }

    fn resolver(&self) -> Result<Resolver<'_>> {
        if self.program.phase() == ProgramPhase::TornDown {
            return Err(EngineError::ProgramTornDown { id: self.program.id() });
        }
        Ok(Resolver {
            heap: self.program.heap(),
            globals: self.program.globals(),
            stack: &self.entry.stack,
            class_context: self.class_context.as_deref(),
            max_depth: self.program.config().max_alias_depth,
            max_index: self.program.config().max_list_index,
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // LValue Operations
    // ═══════════════════════════════════════════════════════════════════

    /// Current value of `target`, following references. The caller owns
    /// the result; a unique object cannot be read out this way (use
    /// [`snapshot`](Self::snapshot) or [`remove`](Self::remove)).
    pub fn get_value(&self, target: &LValueExpr) -> Result<Value> {
        let outcome = self.resolver()?.run(target, Access::Read)?;
        Ok(single(outcome))
    }

    /// Store `value` into `target`, checked against the slot's declared
    /// type. On error the slot is unchanged and `value` is released.
    pub fn assign(&self, target: &LValueExpr, value: Value) -> Result<()> {
        self.store(target, value, None, false)
    }

    /// Like [`ProgramThread::assign`], additionally checking `constraint`.
    pub fn assign_checked(&self, target: &LValueExpr, value: Value, constraint: TypeConstraint) -> Result<()> {
        self.store(target, value, Some(constraint), false)
    }

    fn store(&self, target: &LValueExpr, value: Value, extra: Option<TypeConstraint>, bind: bool) -> Result<()> {
        let resolver = match self.resolver() {
            Ok(resolver) => resolver,
            Err(err) => {
                self.heap().release_value(value);
                return Err(err);
            }
        };
        let access = Access::Assign {
            value: Some(value),
            class: self.heap().class_name_of(&value),
            extra,
            bind,
        };
        resolver.run(target, access).map(|_| ())
    }

    /// `target <op>= operand`, returning the updated value.
    pub fn compound_update(&self, target: &LValueExpr, op: CompoundOp, operand: Value) -> Result<Value> {
        let resolver = match self.resolver() {
            Ok(resolver) => resolver,
            Err(err) => {
                self.heap().release_value(operand);
                return Err(err);
            }
        };
        let operand = match PreparedOperand::prepare(self.heap(), operand) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.heap().release_value(operand);
                return Err(err);
            }
        };
        let outcome = resolver.run(target, Access::Compound { op, operand })?;
        Ok(single(outcome))
    }

    /// Detach and return the value of `target`, leaving `Nothing`.
    pub fn remove(&self, target: &LValueExpr) -> Result<Value> {
        let outcome = self.resolver()?.run(target, Access::Remove)?;
        Ok(single(outcome))
    }

    /// Remove several elements of the list, map or object at `target`.
    ///
    /// List indices are applied in descending order, ignoring duplicates
    /// and indices past the end; the removed elements come back in that
    /// order. Map keys and object members are removed in the given order.
    pub fn remove_many(&self, target: &LValueExpr, keys: &[Value]) -> Result<Vec<Value>> {
        let resolver = self.resolver()?;
        let targets = keys
            .iter()
            .map(|key| PathStep::subscript(self.heap(), *key))
            .collect();
        match resolver.run(target, Access::RemoveMany { targets })? {
            Outcome::Values(values) => Ok(values),
            _ => Ok(Vec::new()),
        }
    }

    /// Give `target` its own copy of a shared string, binary, list or map.
    /// Returns whether a copy was made.
    pub fn ensure_unique(&self, target: &LValueExpr) -> Result<bool> {
        match self.resolver()?.run(target, Access::EnsureUnique)? {
            Outcome::Changed(changed) => Ok(changed),
            _ => Ok(false),
        }
    }

    /// A reference to `target`. Locals are bound to their current
    /// instantiation, so the reference goes stale when it is uninstantiated.
    pub fn make_reference(&self, target: &LValueExpr, read_only: bool) -> Result<Value> {
        self.resolver()?;
        let bound = self.bind_locals(target)?;
        let heap = self.heap();
        Ok(heap.alloc_reference(bound.retained(heap)?, read_only))
    }

    /// Make `target` an alias: store `reference` over the slot itself
    /// instead of assigning through any reference it already holds.
    pub fn bind_reference(&self, target: &LValueExpr, reference: Value) -> Result<()> {
        if !reference.is_reference() {
            let err = EngineError::type_error("reference", &reference);
            self.heap().release_value(reference);
            return Err(err);
        }
        self.store(target, reference, None, true)
    }

    /// Plain-data rendering of the value at `target`.
    ///
    /// Unlike [`get_value`](Self::get_value) this never takes ownership, so
    /// it also works on slots holding unique objects.
    pub fn snapshot(&self, target: &LValueExpr) -> Result<Snapshot> {
        match self.resolver()?.run(target, Access::Snapshot)? {
            Outcome::Snapshot(snapshot) => Ok(snapshot),
            _ => Ok(Snapshot::Nothing),
        }
    }

    fn bind_locals(&self, expr: &LValueExpr) -> Result<LValueExpr> {
        Ok(match expr {
            LValueExpr::Local(ident) => {
                let stack = lock(&self.entry.stack);
                if let Some(local) = stack.find_local(*ident) {
                    LValueExpr::LocalSlot(LocalRef {
                        ident: *ident,
                        serial: local.serial,
                    })
                } else if let Some(id) = stack.find_closure_var(*ident) {
                    LValueExpr::ClosureVar(id)
                } else {
                    return Err(EngineError::UndefinedVariable {
                        name: ident.to_string(),
                    });
                }
            }
            LValueExpr::Subscript(base, index) => LValueExpr::Subscript(Box::new(self.bind_locals(base)?), *index),
            LValueExpr::Member(base, name) => LValueExpr::Member(Box::new(self.bind_locals(base)?), Arc::clone(name)),
            other => other.clone(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Stack Operations
    // ═══════════════════════════════════════════════════════════════════

    /// Push a local holding `value`.
    pub fn instantiate_local(
        &self,
        ident: VarIdent,
        name: &str,
        value: Value,
        constraint: TypeConstraint,
    ) -> Result<LocalRef> {
        if let Err(err) = constraint.check(&value, self.heap().class_name_of(&value).as_deref()) {
            self.heap().release_value(value);
            return Err(err);
        }
        Ok(lock(&self.entry.stack).instantiate_local(ident, Arc::from(name), value, constraint))
    }

    /// Pop the innermost local and release its value. Returns false if
    /// there was none.
    pub fn uninstantiate_local(&self) -> bool {
        let value = lock(&self.entry.stack).uninstantiate_local();
        match value {
            Some(value) => {
                self.heap().release_value(value);
                true
            }
            None => false,
        }
    }

    /// Push a heap-allocated closure variable holding `value`.
    pub fn instantiate_closure_var(
        &self,
        ident: VarIdent,
        name: &str,
        value: Value,
        constraint: TypeConstraint,
    ) -> Result<ObjId> {
        if let Err(err) = constraint.check(&value, self.heap().class_name_of(&value).as_deref()) {
            self.heap().release_value(value);
            return Err(err);
        }
        let id = self.heap().alloc_closure_var(ident, Arc::from(name), value, constraint);
        lock(&self.entry.stack).instantiate_closure_var(ident, id);
        Ok(id)
    }

    /// Pop the innermost closure-variable entry. The variable lives on if a
    /// closure captured it.
    pub fn uninstantiate_closure_var(&self) -> bool {
        let id = lock(&self.entry.stack).uninstantiate_closure_var();
        match id {
            Some(id) => {
                self.heap().release(id);
                true
            }
            None => false,
        }
    }

    /// Hide or reveal the innermost variable with `ident`.
    pub fn set_skip(&self, ident: VarIdent, skip: bool) -> bool {
        lock(&self.entry.stack).set_skip(ident, skip)
    }

    /// Current stack heights
    pub fn mark(&self) -> StackMark {
        lock(&self.entry.stack).mark()
    }

    /// Pop everything pushed since `mark`.
    pub fn unwind_to(&self, mark: StackMark) {
        let owned = lock(&self.entry.stack).unwind_to(mark);
        for id in owned {
            self.heap().release(id);
        }
    }

    /// A scope that unwinds everything pushed inside it when dropped.
    pub fn scope(&self) -> ScopeGuard<'_> {
        ScopeGuard {
            mark: self.mark(),
            thread: self,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Closures
    // ═══════════════════════════════════════════════════════════════════

    /// Create a closure capturing the innermost closure variables named by
    /// `captured`.
    pub fn create_closure(&self, name: &str, captured: &[VarIdent]) -> Result<Value> {
        let captures = lock(&self.entry.stack).capture(captured)?;
        let heap = self.heap();
        for id in &captures {
            heap.retain(*id);
        }
        Ok(heap.alloc_closure(Arc::from(name), captures))
    }

    /// Make a closure's captured variables visible for a call. Pass the
    /// returned mark to [`ProgramThread::leave_closure`] when it returns.
    pub fn enter_closure(&self, closure: &Value) -> Result<StackMark> {
        let Value::Closure(cid) = *closure else {
            return Err(EngineError::type_error("closure", closure));
        };
        let heap = self.heap();
        let captures = heap.with_container(cid, |c| match c {
            Container::Closure(data) => Ok(data.captures.clone()),
            other => Err(EngineError::TypeError {
                expected: "closure".to_string(),
                got: other.kind().name().to_string(),
            }),
        })??;
        let mut entries = Vec::with_capacity(captures.len());
        for id in captures {
            let ident = heap.with_container(id, |c| match c {
                Container::ClosureVar(data) => Ok(data.ident),
                other => Err(EngineError::TypeError {
                    expected: "closure variable".to_string(),
                    got: other.kind().name().to_string(),
                }),
            })??;
            entries.push((ident, id));
        }
        for (_, id) in &entries {
            heap.retain(*id);
        }
        Ok(lock(&self.entry.stack).enter_captures(&entries))
    }

    /// End a closure call started with [`ProgramThread::enter_closure`].
    pub fn leave_closure(&self, mark: StackMark) {
        self.unwind_to(mark);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Program-Local Storage
    // ═══════════════════════════════════════════════════════════════════

    /// Stored value for `key`, or `Nothing`.
    pub fn thread_data_get(&self, key: &str) -> Value {
        self.program.thread_data_get(self.entry.thread(), key)
    }

    /// Store `value` under `key`, releasing what was there.
    ///
    /// Unique objects are refused (and released), since every read hands
    /// out another owner.
    pub fn thread_data_set(&self, key: &str, value: Value) -> Result<()> {
        self.program.thread_data_set(self.entry.thread(), key, value)
    }

    /// Detach and return the value under `key`.
    pub fn thread_data_remove(&self, key: &str) -> Value {
        self.program.thread_data_remove(self.entry.thread(), key)
    }
}

impl Drop for ProgramThread {
    fn drop(&mut self) {
        self.finish();
    }
}

fn single(outcome: Outcome) -> Value {
    match outcome {
        Outcome::Value(value) => value,
        _ => Value::Nothing,
    }
}

/// Unwinds the stack to where it was when the guard was created.
pub struct ScopeGuard<'a> {
    thread: &'a ProgramThread,
    mark: StackMark,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.thread.unwind_to(self.mark);
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = ProgramThread;

    fn deref(&self) -> &Self::Target {
        self.thread
    }
}
