//! Engine: the shared heap, thread registry and configuration

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;

use crate::config::EngineConfig;
use crate::heap::Heap;
use crate::program::{Program, ThreadRegistry};

/// Everything programs of one embedding share.
///
/// # Example
///
/// ```
/// use quickbeam::{Engine, LValueExpr, TypeConstraint, Value};
///
/// let engine = Engine::default();
/// let program = engine.create_program();
/// let id = program
///     .define_global("answer", Value::Int(0), TypeConstraint::Any, false)
///     .unwrap();
///
/// let thread = program.attach_thread().unwrap();
/// thread.assign(&LValueExpr::Global(id), Value::Int(42)).unwrap();
/// assert_eq!(thread.get_value(&LValueExpr::Global(id)).unwrap(), Value::Int(42));
/// ```
#[derive(Debug)]
pub struct Engine {
    heap: Arc<Heap>,
    registry: Arc<ThreadRegistry>,
    config: EngineConfig,
    next_program: AtomicU32,
}

impl Engine {
    /// Create an engine with `config`.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            heap: Arc::new(Heap::new(config.clone())),
            registry: Arc::new(ThreadRegistry::new(config.stack_block_size)),
            config,
            next_program: AtomicU32::new(1),
        }
    }

    /// The shared heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The thread registry
    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create an empty program.
    pub fn create_program(&self) -> Arc<Program> {
        let id = self.next_program.fetch_add(1, Ordering::Relaxed);
        debug!("creating program {}", id);
        Arc::new(Program::new(
            id,
            Arc::clone(&self.heap),
            Arc::clone(&self.registry),
            self.config.clone(),
        ))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
