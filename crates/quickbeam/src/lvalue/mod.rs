//! LValue resolution engine
//!
//! An [`LValueExpr`] names a mutation target the way the parser layer hands
//! it over: a root (global, local, closure variable or temporary) followed
//! by subscripts and member accesses. Resolution turns it into a locked
//! slot and applies one access to it: read, assign, compound update,
//! remove, multi-remove or copy-on-write separation.
//!
//! Resolution proceeds in hops. A hop starts at a root, takes that root's
//! lock and descends through copy-on-write containers. Reaching an object
//! or a reference ends the hop: the handle is retained (a unique object is
//! only borrowed), every lock is dropped, and the next hop starts there. No two object locks are ever
//! held at once. Values displaced along the way are released only after
//! the last lock is gone.

mod remove;
mod view;

pub(crate) use view::{Access, Outcome, Resolver};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::heap::Heap;
use crate::program::GlobalId;
use crate::value::{canonical_key, index_of, ObjId, Value, ValueKind};
use crate::error::{EngineError, Result};

/// Lexical identity of a variable declaration, assigned by the parser.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarIdent(u64);

impl VarIdent {
    /// Wrap a parser-assigned identity.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw identity
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for VarIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var#{}", self.0)
    }
}

impl fmt::Display for VarIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var#{}", self.0)
    }
}

/// One instantiation of a local variable.
///
/// The serial distinguishes successive instantiations of the same
/// declaration (recursion, loops), so a reference bound to one of them
/// never silently lands on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalRef {
    pub(crate) ident: VarIdent,
    pub(crate) serial: u64,
}

impl LocalRef {
    /// Declaration identity
    pub fn ident(&self) -> VarIdent {
        self.ident
    }

    /// Instantiation serial
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// A mutable-expression handle.
///
/// Values embedded in the expression (temporaries, subscripts) are owned
/// by whoever built it; the engine never releases them.
#[derive(Debug, Clone, PartialEq)]
pub enum LValueExpr {
    /// Program global
    Global(GlobalId),
    /// Innermost visible local or closure variable with this identity
    Local(VarIdent),
    /// A specific local instantiation
    LocalSlot(LocalRef),
    /// A closure variable by handle
    ClosureVar(ObjId),
    /// An rvalue root; only members of an object reached through it are
    /// assignable
    Temp(Value),
    /// `base[index]`
    Subscript(Box<LValueExpr>, Value),
    /// `base.name`
    Member(Box<LValueExpr>, Arc<str>),
}

impl LValueExpr {
    /// `self[index]`
    pub fn index(self, index: impl Into<Value>) -> Self {
        LValueExpr::Subscript(Box::new(self), index.into())
    }

    /// `self.name`
    pub fn member(self, name: &str) -> Self {
        LValueExpr::Member(Box::new(self), Arc::from(name))
    }

    /// Push every handle the expression embeds.
    pub(crate) fn handles(&self, out: &mut Vec<ObjId>) {
        match self {
            LValueExpr::ClosureVar(id) => out.push(*id),
            LValueExpr::Temp(value) => out.extend(value.handle()),
            LValueExpr::Subscript(base, index) => {
                base.handles(out);
                out.extend(index.handle());
            }
            LValueExpr::Member(base, _) => base.handles(out),
            LValueExpr::Global(_) | LValueExpr::Local(_) | LValueExpr::LocalSlot(_) => {}
        }
    }

    /// Drop embedded handles that point into `set` without releasing them.
    pub(crate) fn break_edges(&mut self, set: &HashSet<ObjId>) {
        let inside = |v: &Value| v.handle().is_some_and(|id| set.contains(&id));
        match self {
            LValueExpr::ClosureVar(id) if set.contains(id) => *self = LValueExpr::Temp(Value::Nothing),
            LValueExpr::Temp(value) if inside(value) => *value = Value::Nothing,
            LValueExpr::Subscript(base, index) => {
                base.break_edges(set);
                if inside(index) {
                    *index = Value::Nothing;
                }
            }
            LValueExpr::Member(base, _) => base.break_edges(set),
            _ => {}
        }
    }

    /// Copy of the expression whose embedded handles are owned by the copy.
    /// Fails if the expression embeds a unique object.
    pub(crate) fn retained(&self, heap: &Heap) -> Result<LValueExpr> {
        let copy = self.clone();
        let mut handles = Vec::new();
        copy.handles(&mut handles);
        if let Some(id) = handles.iter().find(|id| heap.is_unique(**id)) {
            return Err(EngineError::UniqueObject { id: id.to_string() });
        }
        for id in handles {
            heap.retain(id);
        }
        Ok(copy)
    }

    /// Split into root and path, precomputing every key and index.
    pub(crate) fn flatten(&self, heap: &Heap) -> (Root, Vec<PathStep>) {
        let mut steps = Vec::new();
        let mut expr = self;
        let root = loop {
            match expr {
                LValueExpr::Subscript(base, index) => {
                    steps.push(PathStep::subscript(heap, *index));
                    expr = base;
                }
                LValueExpr::Member(base, name) => {
                    steps.push(PathStep::member(name));
                    expr = base;
                }
                LValueExpr::Global(id) => break Root::Global(*id),
                LValueExpr::Local(ident) => break Root::Local(*ident),
                LValueExpr::LocalSlot(local) => break Root::LocalSlot(*local),
                LValueExpr::ClosureVar(id) => break Root::ClosureVar(*id),
                LValueExpr::Temp(value) => break Root::Temp(*value),
            }
        };
        steps.reverse();
        (root, steps)
    }
}

/// Where a hop starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Root {
    Global(GlobalId),
    Local(VarIdent),
    LocalSlot(LocalRef),
    ClosureVar(ObjId),
    Temp(Value),
    Object(ObjId),
}

/// Identity of a storage slot visited during one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SlotKey {
    Global(GlobalId),
    Local(u64),
    ClosureVar(ObjId),
    Reference(ObjId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepKind {
    Subscript,
    Member,
}

/// One path element with its key forms computed up front, so no string
/// container is read while a slot lock is held.
#[derive(Debug, Clone)]
pub(crate) struct PathStep {
    pub(crate) kind: StepKind,
    pub(crate) raw: Value,
    pub(crate) key: Option<String>,
    pub(crate) index: Option<i64>,
}

impl PathStep {
    pub(crate) fn subscript(heap: &Heap, index: Value) -> Self {
        Self {
            kind: StepKind::Subscript,
            raw: index,
            key: canonical_key(heap, &index).ok(),
            index: index_of(heap, &index).ok(),
        }
    }

    pub(crate) fn member(name: &str) -> Self {
        Self {
            kind: StepKind::Member,
            raw: Value::Nothing,
            key: Some(name.to_string()),
            index: None,
        }
    }

    /// Container created when this step lands on `Nothing`.
    pub(crate) fn container_kind(&self) -> ValueKind {
        match self.kind {
            StepKind::Subscript => ValueKind::List,
            StepKind::Member => ValueKind::Map,
        }
    }

    pub(crate) fn list_index(&self) -> Result<usize> {
        if self.kind == StepKind::Member {
            return Err(EngineError::TypeError {
                expected: "map or object".to_string(),
                got: "list".to_string(),
            });
        }
        match self.index {
            Some(i) if i < 0 => Err(EngineError::NegativeIndex { index: i }),
            Some(i) => Ok(i as usize),
            None => Err(EngineError::type_error("integer index", &self.raw)),
        }
    }

    pub(crate) fn key(&self) -> Result<&str> {
        self.key
            .as_deref()
            .ok_or_else(|| EngineError::type_error("string key", &self.raw))
    }
}
