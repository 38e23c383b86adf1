//! Debug implementation for Value

use std::fmt;

use super::*;

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "nothing"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}f", n),
            Value::Date(us) => write!(f, "date({}us)", us),

            // Handles carry no contents; Heap::snapshot renders those
            Value::String(id) => write!(f, "string{:?}", id),
            Value::Binary(id) => write!(f, "binary{:?}", id),
            Value::List(id) => write!(f, "list{:?}", id),
            Value::Map(id) => write!(f, "map{:?}", id),
            Value::Object(id) => write!(f, "object{:?}", id),
            Value::Closure(id) => write!(f, "closure{:?}", id),
            Value::Reference(id) => write!(f, "ref{:?}", id),
        }
    }
}
