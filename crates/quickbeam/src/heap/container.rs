//! Heap container payloads

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::header::{CUSTOM_HANDLERS, SCAN_FIXED};
use crate::class::ClassDescriptor;
use crate::lvalue::{LValueExpr, VarIdent};
use crate::value::{ObjId, TypeConstraint, Value, ValueKind};

/// The payload of a heap slot.
///
/// Containers hold child handles, never nested containers, so ownership
/// cycles can only form through handles.
#[derive(Debug)]
pub enum Container {
    /// String text
    Str(String),
    /// Byte blob
    Binary(Vec<u8>),
    /// Ordered list
    List(Vec<Value>),
    /// Key-ordered map
    Map(IndexMap<String, Value>),
    /// Class instance
    Object(ObjectData),
    /// Closure and the variables it captured
    Closure(ClosureData),
    /// Heap-allocated captured variable
    ClosureVar(ClosureVarData),
    /// Alias to another lvalue
    Reference(ReferenceData),
}

/// A class instance: its descriptor and member table.
pub struct ObjectData {
    /// Class descriptor supplied by the class system
    pub class: Arc<dyn ClassDescriptor>,
    /// Members in declaration (then insertion) order
    pub members: IndexMap<String, Value>,
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectData")
            .field("class", &self.class.name())
            .field("members", &self.members)
            .finish()
    }
}

/// A closure body is owned by the code layer; the heap only tracks the
/// captured variables.
#[derive(Debug, Clone)]
pub struct ClosureData {
    /// Name for diagnostics
    pub name: Arc<str>,
    /// Captured closure variables, each retained
    pub captures: Vec<ObjId>,
}

/// A captured variable whose lifetime is governed by reference counting.
#[derive(Debug)]
pub struct ClosureVarData {
    /// Lexical identity
    pub ident: VarIdent,
    /// Declared name
    pub name: Arc<str>,
    /// Current value
    pub value: Value,
    /// Declared type
    pub constraint: TypeConstraint,
}

/// An alias: the lvalue it stands for plus its write policy.
#[derive(Debug)]
pub struct ReferenceData {
    /// Target expression; handles inside it are retained
    pub target: LValueExpr,
    /// Writes through the reference raise `ReadOnly`
    pub read_only: bool,
}

impl Container {
    /// Kind of value that addresses this container.
    pub fn kind(&self) -> ValueKind {
        match self {
            Container::Str(_) => ValueKind::String,
            Container::Binary(_) => ValueKind::Binary,
            Container::List(_) => ValueKind::List,
            Container::Map(_) => ValueKind::Map,
            Container::Object(_) => ValueKind::Object,
            // Closure variables are never addressed by a value cell
            Container::Closure(_) | Container::ClosureVar(_) => ValueKind::Closure,
            Container::Reference(_) => ValueKind::Reference,
        }
    }

    /// Initial header flags for a fresh allocation.
    pub(crate) fn header_flags(&self) -> u8 {
        match self {
            Container::Str(_) | Container::Binary(_) | Container::List(_) | Container::Map(_) => 0,
            Container::Object(data) if data.class.has_destructor() => SCAN_FIXED | CUSTOM_HANDLERS,
            _ => SCAN_FIXED,
        }
    }

    /// Push every directly held handle, with multiplicity.
    pub(crate) fn children(&self, out: &mut Vec<ObjId>) {
        match self {
            Container::Str(_) | Container::Binary(_) => {}
            Container::List(items) => out.extend(items.iter().filter_map(Value::handle)),
            Container::Map(map) => out.extend(map.values().filter_map(Value::handle)),
            Container::Object(data) => out.extend(data.members.values().filter_map(Value::handle)),
            Container::Closure(data) => out.extend(data.captures.iter().copied()),
            Container::ClosureVar(data) => out.extend(data.value.handle()),
            Container::Reference(data) => data.target.handles(out),
        }
    }

    /// Drop every handle that points into `set` without releasing it.
    pub(crate) fn break_edges(&mut self, set: &HashSet<ObjId>) {
        let inside = |v: &Value| v.handle().is_some_and(|id| set.contains(&id));
        let clear = |v: &mut Value| {
            if inside(v) {
                *v = Value::Nothing;
            }
        };
        match self {
            Container::Str(_) | Container::Binary(_) => {}
            Container::List(items) => items.iter_mut().for_each(clear),
            Container::Map(map) => map.values_mut().for_each(clear),
            Container::Object(data) => data.members.values_mut().for_each(clear),
            Container::Closure(data) => data.captures.retain(|id| !set.contains(id)),
            Container::ClosureVar(data) => clear(&mut data.value),
            Container::Reference(data) => data.target.break_edges(set),
        }
    }

    /// Shallow copy of a copy-on-write container. Child handles are copied
    /// without being retained.
    pub(crate) fn clone_shallow(&self) -> Option<Container> {
        match self {
            Container::Str(s) => Some(Container::Str(s.clone())),
            Container::Binary(b) => Some(Container::Binary(b.clone())),
            Container::List(items) => Some(Container::List(items.clone())),
            Container::Map(map) => Some(Container::Map(map.clone())),
            _ => None,
        }
    }

    /// Values held directly, for scan-count computation.
    pub(crate) fn values(&self) -> Vec<Value> {
        match self {
            Container::List(items) => items.clone(),
            Container::Map(map) => map.values().copied().collect(),
            Container::Object(data) => data.members.values().copied().collect(),
            Container::ClosureVar(data) => vec![data.value],
            _ => Vec::new(),
        }
    }
}
