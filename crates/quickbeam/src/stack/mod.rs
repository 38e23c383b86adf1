//! Thread-local variable stack
//!
//! Each OS thread owns one [`VarStack`] holding two segmented chains: plain
//! locals, whose values live in the slot itself, and closure-variable
//! entries, which point at heap-allocated closure variables so a closure
//! can keep them alive after their frame is gone.
//!
//! Lookup is by lexical identity, innermost first, so an inner declaration
//! shadows an outer one until it is uninstantiated.

mod block;
mod closure;

pub use block::BlockChain;

use std::sync::Arc;

use crate::lvalue::{LocalRef, VarIdent};
use crate::value::{ObjId, TypeConstraint, Value};

/// Slot lifecycle. Slots are reused, not reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Free
    #[default]
    Uninstantiated,
    /// Holds a live variable
    Instantiated,
    /// Value detached, about to be freed
    Finalized,
}

/// A local variable slot.
#[derive(Debug)]
pub struct LocalVar {
    pub(crate) ident: VarIdent,
    pub(crate) name: Arc<str>,
    pub(crate) serial: u64,
    pub(crate) value: Value,
    pub(crate) constraint: TypeConstraint,
    pub(crate) state: SlotState,
    pub(crate) skip: bool,
}

impl Default for LocalVar {
    fn default() -> Self {
        Self {
            ident: VarIdent::new(0),
            name: Arc::from(""),
            serial: 0,
            value: Value::Nothing,
            constraint: TypeConstraint::Any,
            state: SlotState::Uninstantiated,
            skip: false,
        }
    }
}

impl LocalVar {
    /// Lexical identity
    pub fn ident(&self) -> VarIdent {
        self.ident
    }

    /// Declared name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value (borrowed, not retained)
    pub fn value(&self) -> Value {
        self.value
    }

    /// Slot state
    pub fn state(&self) -> SlotState {
        self.state
    }
}

/// A closure-variable slot: a retained handle to the heap variable.
#[derive(Debug, Default)]
pub struct ClosureVarEntry {
    pub(crate) ident: Option<VarIdent>,
    pub(crate) id: Option<ObjId>,
    pub(crate) state: SlotState,
    pub(crate) skip: bool,
}

/// Stack heights to unwind back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackMark {
    locals: usize,
    closure_vars: usize,
}

/// One thread's variable stack.
#[derive(Debug)]
pub struct VarStack {
    locals: BlockChain<LocalVar>,
    closure_vars: BlockChain<ClosureVarEntry>,
    serial_base: u64,
    next_serial: u64,
}

impl VarStack {
    /// Create an empty stack. `ordinal` must be unique per thread; it keeps
    /// local serials distinct across threads.
    pub fn new(block_size: usize, ordinal: u64) -> Self {
        Self {
            locals: BlockChain::new(block_size),
            closure_vars: BlockChain::new(block_size),
            serial_base: ordinal << 40,
            next_serial: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Locals
    // ═══════════════════════════════════════════════════════════════════

    /// Push a local. The stack takes ownership of `value`.
    pub(crate) fn instantiate_local(
        &mut self,
        ident: VarIdent,
        name: Arc<str>,
        value: Value,
        constraint: TypeConstraint,
    ) -> LocalRef {
        self.next_serial += 1;
        let serial = self.serial_base | self.next_serial;
        self.locals.push(LocalVar {
            ident,
            name,
            serial,
            value,
            constraint,
            state: SlotState::Instantiated,
            skip: false,
        });
        LocalRef { ident, serial }
    }

    /// Pop the top local, returning its value for the caller to release.
    pub(crate) fn uninstantiate_local(&mut self) -> Option<Value> {
        let top = self.locals.last_mut()?;
        top.state = SlotState::Finalized;
        let value = std::mem::replace(&mut top.value, Value::Nothing);
        self.locals.pop();
        Some(value)
    }

    /// Innermost visible local with `ident`.
    pub fn find_local(&self, ident: VarIdent) -> Option<&LocalVar> {
        self.locals
            .iter_rev()
            .find(|l| l.ident == ident && !l.skip && l.state == SlotState::Instantiated)
    }

    /// The instantiation with `serial`, if it is still on the stack.
    pub fn find_local_slot(&self, serial: u64) -> Option<&LocalVar> {
        self.locals
            .iter_rev()
            .find(|l| l.serial == serial && l.state == SlotState::Instantiated)
    }

    pub(crate) fn find_local_slot_mut(&mut self, serial: u64) -> Option<&mut LocalVar> {
        self.locals
            .iter_rev_mut()
            .find(|l| l.serial == serial && l.state == SlotState::Instantiated)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Closure Variables
    // ═══════════════════════════════════════════════════════════════════

    /// Push a closure-variable entry. The stack takes over one owner of
    /// `id`.
    pub(crate) fn instantiate_closure_var(&mut self, ident: VarIdent, id: ObjId) {
        self.closure_vars.push(ClosureVarEntry {
            ident: Some(ident),
            id: Some(id),
            state: SlotState::Instantiated,
            skip: false,
        });
    }

    /// Pop the top closure-variable entry, returning the handle for the
    /// caller to release.
    pub(crate) fn uninstantiate_closure_var(&mut self) -> Option<ObjId> {
        let top = self.closure_vars.last_mut()?;
        top.state = SlotState::Finalized;
        let id = top.id.take();
        self.closure_vars.pop();
        id
    }

    /// Innermost visible closure variable with `ident`.
    pub fn find_closure_var(&self, ident: VarIdent) -> Option<ObjId> {
        self.closure_vars
            .iter_rev()
            .find(|e| e.ident == Some(ident) && !e.skip && e.state == SlotState::Instantiated)
            .and_then(|e| e.id)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Visibility and Scopes
    // ═══════════════════════════════════════════════════════════════════

    /// Hide (or reveal) the innermost local or closure variable with
    /// `ident`. Returns whether a slot was changed.
    pub fn set_skip(&mut self, ident: VarIdent, skip: bool) -> bool {
        if let Some(local) = self
            .locals
            .iter_rev_mut()
            .find(|l| l.ident == ident && l.skip != skip && l.state == SlotState::Instantiated)
        {
            local.skip = skip;
            return true;
        }
        if let Some(entry) = self
            .closure_vars
            .iter_rev_mut()
            .find(|e| e.ident == Some(ident) && e.skip != skip && e.state == SlotState::Instantiated)
        {
            entry.skip = skip;
            return true;
        }
        false
    }

    /// Current heights of both chains
    pub fn mark(&self) -> StackMark {
        StackMark {
            locals: self.locals.len(),
            closure_vars: self.closure_vars.len(),
        }
    }

    /// Pop both chains back to `mark`, returning every handle the popped
    /// slots owned, innermost first.
    pub(crate) fn unwind_to(&mut self, mark: StackMark) -> Vec<ObjId> {
        let mut owned = Vec::new();
        while self.locals.len() > mark.locals {
            if let Some(value) = self.uninstantiate_local() {
                owned.extend(value.handle());
            }
        }
        while self.closure_vars.len() > mark.closure_vars {
            if let Some(id) = self.uninstantiate_closure_var() {
                owned.push(id);
            }
        }
        owned
    }

    /// Number of instantiated locals
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Number of instantiated closure-variable entries
    pub fn closure_var_count(&self) -> usize {
        self.closure_vars.len()
    }

    /// Check if both chains are empty
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty() && self.closure_vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> VarIdent {
        VarIdent::new(1)
    }

    #[test]
    fn test_shadowing_by_identity() {
        let mut stack = VarStack::new(2, 1);
        stack.instantiate_local(x(), Arc::from("x"), Value::Int(1), TypeConstraint::Any);
        let mark = stack.mark();
        stack.instantiate_local(VarIdent::new(2), Arc::from("y"), Value::Int(0), TypeConstraint::Any);
        stack.instantiate_local(x(), Arc::from("x"), Value::Int(2), TypeConstraint::Any);
        assert_eq!(stack.find_local(x()).map(LocalVar::value), Some(Value::Int(2)));

        stack.unwind_to(mark);
        assert_eq!(stack.find_local(x()).map(LocalVar::value), Some(Value::Int(1)));
    }

    #[test]
    fn test_skip_hides_innermost() {
        let mut stack = VarStack::new(4, 1);
        stack.instantiate_local(x(), Arc::from("x"), Value::Int(1), TypeConstraint::Any);
        stack.instantiate_local(x(), Arc::from("x"), Value::Int(2), TypeConstraint::Any);
        assert!(stack.set_skip(x(), true));
        assert_eq!(stack.find_local(x()).map(LocalVar::value), Some(Value::Int(1)));
        assert!(stack.set_skip(x(), false));
        assert_eq!(stack.find_local(x()).map(LocalVar::value), Some(Value::Int(2)));
    }

    #[test]
    fn test_serials_distinguish_instantiations() {
        let mut stack = VarStack::new(4, 3);
        let first = stack.instantiate_local(x(), Arc::from("x"), Value::Int(1), TypeConstraint::Any);
        stack.uninstantiate_local();
        let second = stack.instantiate_local(x(), Arc::from("x"), Value::Int(2), TypeConstraint::Any);
        assert_ne!(first.serial(), second.serial());
        assert!(stack.find_local_slot(first.serial()).is_none());
        assert!(stack.find_local_slot(second.serial()).is_some());
    }

    #[test]
    fn test_serials_differ_across_threads() {
        let mut a = VarStack::new(4, 1);
        let mut b = VarStack::new(4, 2);
        let ra = a.instantiate_local(x(), Arc::from("x"), Value::Nothing, TypeConstraint::Any);
        let rb = b.instantiate_local(x(), Arc::from("x"), Value::Nothing, TypeConstraint::Any);
        assert_ne!(ra.serial(), rb.serial());
    }

    #[test]
    fn test_unwind_returns_owned_handles() {
        let mut stack = VarStack::new(4, 1);
        let list = ObjId::new(9, 0);
        let cv = ObjId::new(10, 0);
        stack.instantiate_local(x(), Arc::from("x"), Value::List(list), TypeConstraint::Any);
        stack.instantiate_closure_var(VarIdent::new(2), cv);
        let owned = stack.unwind_to(StackMark::default());
        assert_eq!(owned, vec![list, cv]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_closure_var_lookup() {
        let mut stack = VarStack::new(4, 1);
        let cv = ObjId::new(3, 1);
        stack.instantiate_closure_var(x(), cv);
        assert_eq!(stack.find_closure_var(x()), Some(cv));
        assert_eq!(stack.find_closure_var(VarIdent::new(7)), None);
        assert_eq!(stack.uninstantiate_closure_var(), Some(cv));
        assert_eq!(stack.find_closure_var(x()), None);
    }
}
