//! Program-wide variables

use std::fmt;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::error::{EngineError, Result};
use crate::sync::{read, write};
use crate::value::{TypeConstraint, Value};

/// Address of a global: owning program plus definition index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GlobalId {
    program: u32,
    index: u32,
}

impl GlobalId {
    /// Program that defined the global
    pub fn program(&self) -> u32 {
        self.program
    }

    /// Definition order within the program
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "global#{}.{}", self.program, self.index)
    }
}

/// A global variable slot.
#[derive(Debug)]
pub struct GlobalVar {
    pub(crate) name: Arc<str>,
    pub(crate) constraint: TypeConstraint,
    pub(crate) read_only: bool,
    pub(crate) value: RwLock<Value>,
}

impl GlobalVar {
    /// Declared name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type
    pub fn constraint(&self) -> &TypeConstraint {
        &self.constraint
    }

    /// Whether writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// The global table of one program, in definition order.
#[derive(Debug)]
pub(crate) struct Globals {
    program: u32,
    vars: RwLock<IndexMap<Arc<str>, Arc<GlobalVar>>>,
}

impl Globals {
    pub(crate) fn new(program: u32) -> Self {
        Self {
            program,
            vars: RwLock::new(IndexMap::new()),
        }
    }

    pub(crate) fn get(&self, id: GlobalId) -> Result<Arc<GlobalVar>> {
        if id.program != self.program {
            return Err(EngineError::UndefinedVariable { name: id.to_string() });
        }
        read(&self.vars)
            .get_index(id.index as usize)
            .map(|(_, var)| Arc::clone(var))
            .ok_or_else(|| EngineError::UndefinedVariable { name: id.to_string() })
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<GlobalId> {
        read(&self.vars).get_index_of(name).map(|index| GlobalId {
            program: self.program,
            index: index as u32,
        })
    }

    /// Add a global. On error `value` is handed back to the caller.
    pub(crate) fn define(
        &self,
        name: &str,
        value: Value,
        constraint: TypeConstraint,
        read_only: bool,
    ) -> std::result::Result<GlobalId, (EngineError, Value)> {
        let mut vars = write(&self.vars);
        if vars.contains_key(name) {
            return Err((
                EngineError::InvalidOperation(format!("global `{}` is already defined", name)),
                value,
            ));
        }
        let name: Arc<str> = Arc::from(name);
        let (index, _) = vars.insert_full(
            Arc::clone(&name),
            Arc::new(GlobalVar {
                name,
                constraint,
                read_only,
                value: RwLock::new(value),
            }),
        );
        Ok(GlobalId {
            program: self.program,
            index: index as u32,
        })
    }

    pub(crate) fn len(&self) -> usize {
        read(&self.vars).len()
    }

    /// Remove every global, returning the values they held.
    pub(crate) fn drain(&self) -> Vec<Value> {
        let vars = std::mem::take(&mut *write(&self.vars));
        vars.into_values()
            .map(|var| std::mem::replace(&mut *write(&var.value), Value::Nothing))
            .collect()
    }
}
