//! Error types for engine operations

use thiserror::Error;

use crate::value::{Value, ValueKind};

/// Main error type for engine operations.
///
/// Every variant is catchable: it aborts the single operation that raised
/// it and leaves the touched slot in its prior state. Invariant violations
/// are not represented here; see [`invariant_violation!`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Assignment or coercion incompatible with a declared constraint
    #[error("Type error: expected {expected}, got {got}")]
    TypeError {
        /// Expected type
        expected: String,
        /// Actual type received
        got: String,
    },

    /// An alias chain that resolves back to one of its own slots
    #[error("Recursive reference: `{name}` refers back to itself")]
    RecursiveReference {
        /// Name of the slot visited twice
        name: String,
    },

    /// An alias chain longer than the configured limit
    #[error("Alias chain exceeded {max} hops")]
    AliasDepthExceeded {
        /// Configured hop limit
        max: usize,
    },

    /// Subscript that coerces to a negative integer
    #[error("Negative index {index} is not a valid subscript")]
    NegativeIndex {
        /// The offending index
        index: i64,
    },

    /// Write past the end of a list or binary beyond the configured limit
    #[error("Index {index} exceeds the maximum of {max}")]
    IndexTooLarge {
        /// The offending index
        index: usize,
        /// Configured limit
        max: usize,
    },

    /// An operation that would give a unique object a second owner
    #[error("Unique object {id} cannot be shared")]
    UniqueObject {
        /// Display form of the handle
        id: String,
    },

    /// Access to an object whose teardown has begun or finished
    #[error("Object {id} has already been deleted")]
    ObjectAlreadyDeleted {
        /// Display form of the stale handle
        id: String,
    },

    /// Integer or float division (or modulo) by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Write through a read-only slot or reference
    #[error("Cannot modify read-only {what}")]
    ReadOnly {
        /// What was read-only
        what: String,
    },

    /// Access to a private member from outside its class
    #[error("Member `{member}` of class {class} is private")]
    PrivateMember {
        /// Class name
        class: String,
        /// Member name
        member: String,
    },

    /// Variable identity not found on the stack or in the program
    #[error("Undefined variable: {name}")]
    UndefinedVariable {
        /// Variable name or identity
        name: String,
    },

    /// A reference to a local whose frame has been uninstantiated
    #[error("Local variable {name} is no longer in scope")]
    LocalOutOfScope {
        /// Variable name
        name: String,
    },

    /// Mutation requested on something that is not an lvalue
    #[error("Not an lvalue: {what}")]
    NotAnLValue {
        /// Description of the target
        what: String,
    },

    /// Operation on a program that has been torn down
    #[error("Program {id} has been torn down")]
    ProgramTornDown {
        /// Program id
        id: u32,
    },

    /// Operation that requires the calling thread to be attached
    #[error("Thread is not attached to program {id}")]
    ThreadNotAttached {
        /// Program id
        id: u32,
    },

    /// Anything else the embedding layer asked for that cannot be done
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl EngineError {
    /// The stable error code handed to the interpreter's error sink.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::TypeError { .. } => "RUNTIME-TYPE-ERROR",
            EngineError::RecursiveReference { .. } => "RECURSIVE-REFERENCE",
            EngineError::AliasDepthExceeded { .. } => "RECURSIVE-REFERENCE",
            EngineError::NegativeIndex { .. } => "NEGATIVE-LIST-INDEX",
            EngineError::IndexTooLarge { .. } => "LIST-INDEX-TOO-LARGE",
            EngineError::UniqueObject { .. } => "UNIQUE-OBJECT-SHARED",
            EngineError::ObjectAlreadyDeleted { .. } => "OBJECT-ALREADY-DELETED",
            EngineError::DivisionByZero => "DIVISION-BY-ZERO",
            EngineError::ReadOnly { .. } => "ACCESS-READ-ONLY",
            EngineError::PrivateMember { .. } => "PRIVATE-MEMBER",
            EngineError::UndefinedVariable { .. } => "UNDEFINED-VARIABLE",
            EngineError::LocalOutOfScope { .. } => "LOCAL-OUT-OF-SCOPE",
            EngineError::NotAnLValue { .. } => "NOT-AN-LVALUE",
            EngineError::ProgramTornDown { .. } => "PROGRAM-TORN-DOWN",
            EngineError::ThreadNotAttached { .. } => "THREAD-NOT-ATTACHED",
            EngineError::InvalidOperation(_) => "INVALID-OPERATION",
        }
    }

    /// Shorthand for a type error against a concrete value.
    pub fn type_error(expected: impl Into<String>, got: &Value) -> Self {
        EngineError::TypeError {
            expected: expected.into(),
            got: type_name(got).to_string(),
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Get the user-facing type name of a value.
pub fn type_name(value: &Value) -> &'static str {
    value.kind().name()
}

/// Get the user-facing type name of a value kind.
pub fn kind_name(kind: ValueKind) -> &'static str {
    kind.name()
}

/// Report a broken internal invariant.
///
/// Fatal in debug builds. Release builds log the violation and carry on,
/// so call sites must leave state that is safe to continue from.
macro_rules! invariant_violation {
    ($($arg:tt)*) => {{
        log::error!("invariant violation: {}", format_args!($($arg)*));
        debug_assert!(false, "invariant violation: {}", format_args!($($arg)*));
    }};
}

pub(crate) use invariant_violation;
