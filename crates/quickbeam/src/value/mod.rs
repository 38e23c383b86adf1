//! Value representation for runtime values

mod coerce;
mod constraint;
mod display;
mod impls;
mod key;

pub use coerce::{CompoundOp, Number};
pub use constraint::TypeConstraint;
pub use key::canonical_key;

pub(crate) use coerce::{apply_byte, apply_compound, index_of, PreparedOperand};

use std::fmt;

/// Handle to a heap container.
///
/// The index addresses an arena slot; the generation distinguishes the
/// current occupant of that slot from earlier, already freed ones, so a
/// stale handle is detected instead of aliasing a new object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ObjId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation at allocation time
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// A value cell.
///
/// Scalars live inline. Every other variant is an ownership handle into the
/// [`crate::Heap`]; containers hold handles, never nested cells, so cycles
/// can only form through handles.
///
/// `Value` is `Copy`: copying a cell does **not** touch reference counts.
/// Use [`crate::Heap::dup`] to take an additional owned copy and
/// [`crate::Heap::release_value`] to give one up.
#[derive(Clone, Copy)]
pub enum Value {
    // ═══════════════════════════════════════════════════════════════════
    // Inline Scalars
    // ═══════════════════════════════════════════════════════════════════
    /// Absent value
    Nothing,

    /// Boolean
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit float
    Float(f64),

    /// Absolute date/time in microseconds since the Unix epoch
    Date(i64),

    // ═══════════════════════════════════════════════════════════════════
    // Handles
    // ═══════════════════════════════════════════════════════════════════
    /// Copy-on-write string
    String(ObjId),

    /// Copy-on-write byte blob
    Binary(ObjId),

    /// Copy-on-write ordered list
    List(ObjId),

    /// Copy-on-write key-ordered map
    Map(ObjId),

    /// Shared, locked class instance
    Object(ObjId),

    /// Closure with captured variables
    Closure(ObjId),

    /// Alias to another lvalue
    Reference(ObjId),
}

/// Payload-free discriminant of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `Value::Nothing`
    Nothing,
    /// `Value::Bool`
    Bool,
    /// `Value::Int`
    Int,
    /// `Value::Float`
    Float,
    /// `Value::Date`
    Date,
    /// `Value::String`
    String,
    /// `Value::Binary`
    Binary,
    /// `Value::List`
    List,
    /// `Value::Map`
    Map,
    /// `Value::Object`
    Object,
    /// `Value::Closure`
    Closure,
    /// `Value::Reference`
    Reference,
}

impl ValueKind {
    /// User-facing name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Nothing => "nothing",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Date => "date",
            ValueKind::String => "string",
            ValueKind::Binary => "binary",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Object => "object",
            ValueKind::Closure => "closure",
            ValueKind::Reference => "reference",
        }
    }

    /// Whether values of this kind follow copy-on-write discipline.
    pub fn is_copy_on_write(self) -> bool {
        matches!(
            self,
            ValueKind::String | ValueKind::Binary | ValueKind::List | ValueKind::Map
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owned, plain-data rendering of a value tree.
///
/// Produced by [`crate::Heap::snapshot`] for inspection and comparison;
/// shared objects, closures and references are rendered by identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Absent value
    Nothing,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Date in microseconds
    Date(i64),
    /// String contents
    Str(String),
    /// Binary contents
    Binary(Vec<u8>),
    /// List elements
    List(Vec<Snapshot>),
    /// Map entries in key order
    Map(Vec<(String, Snapshot)>),
    /// Object by class name and identity
    Object {
        /// Class name
        class: String,
        /// Object handle
        id: ObjId,
    },
    /// Closure by identity
    Closure(ObjId),
    /// Reference by identity
    Reference(ObjId),
}
