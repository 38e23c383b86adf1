//! # Quickbeam
//!
//! The value and storage engine of a multi-threaded embeddable interpreter.
//!
//! Quickbeam owns everything an interpreter needs to keep values alive and
//! mutate them safely from several OS threads at once, and nothing about
//! parsing or evaluation:
//!
//! - **Values**: a `Copy` tagged [`Value`] holding scalars inline and
//!   handles to shared heap containers
//! - **Ownership**: atomic reference counts with copy-on-write containers
//!   and class destructors ([`Heap`])
//! - **Cycle collection**: a lazy recursive-set scan that reclaims closed
//!   reference cycles ([`find_garbage`])
//! - **LValues**: resolution of variables, subscripts, members and
//!   reference chains to a locked slot ([`LValueExpr`])
//! - **Variable stacks**: per-thread segmented stacks of locals and closure
//!   variables ([`VarStack`])
//! - **Programs**: interpreter instances with globals, attached threads and
//!   quiescence for structural changes ([`Program`])
//!
//! Start from an [`Engine`], create a [`Program`], and attach the current
//! thread to get a [`ProgramThread`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod class;
pub mod config;
pub mod engine;
pub mod error;
pub mod heap;
pub mod lvalue;
pub mod program;
pub mod stack;
mod sync;
pub mod value;

// Re-export main types
pub use class::{can_access, ClassDescriptor, SimpleClass, Visibility};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use heap::{
    find_garbage, Container, Heap, HeapStats, OwnershipGraph, ReleaseQueue, ScanOutcome,
    Teardown,
};
pub use lvalue::{LValueExpr, LocalRef, VarIdent};
pub use program::{
    GlobalId, GlobalVar, Program, ProgramPhase, ProgramThread, ScopeGuard, ThreadEntry,
    ThreadRegistry,
};
pub use stack::{BlockChain, LocalVar, SlotState, StackMark, VarStack};
pub use value::{canonical_key, CompoundOp, Number, ObjId, Snapshot, TypeConstraint, Value, ValueKind};

/// Quickbeam version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
