//! Capturing closure variables and re-entering them for a call

use super::{StackMark, VarStack};
use crate::error::{EngineError, Result};
use crate::lvalue::VarIdent;
use crate::value::ObjId;

impl VarStack {
    /// Closure variables a closure capturing `idents` would hold, resolved
    /// innermost first. Handles are not retained.
    pub(crate) fn capture(&self, idents: &[VarIdent]) -> Result<Vec<ObjId>> {
        idents
            .iter()
            .map(|ident| {
                self.find_closure_var(*ident)
                    .ok_or_else(|| EngineError::UndefinedVariable {
                        name: format!("closure variable {}", ident),
                    })
            })
            .collect()
    }

    /// Push a closure's captured variables for a call. Each handle must
    /// already carry an owner for the stack. Returns the mark to unwind to
    /// when the call ends.
    pub(crate) fn enter_captures(&mut self, captures: &[(VarIdent, ObjId)]) -> StackMark {
        let mark = self.mark();
        for (ident, id) in captures {
            self.instantiate_closure_var(*ident, *id);
        }
        mark
    }
}
