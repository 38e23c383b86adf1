//! Value trait implementations: predicates, extractors, From traits, PartialEq

use super::*;

impl Value {
    // ═══════════════════════════════════════════════════════════════════
    // Type Predicates
    // ═══════════════════════════════════════════════════════════════════

    /// The value's discriminant.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nothing => ValueKind::Nothing,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Date(_) => ValueKind::Date,
            Value::String(_) => ValueKind::String,
            Value::Binary(_) => ValueKind::Binary,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Object(_) => ValueKind::Object,
            Value::Closure(_) => ValueKind::Closure,
            Value::Reference(_) => ValueKind::Reference,
        }
    }

    /// Check if value is absent
    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }

    /// Check if value is an integer or a float
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Check if value is an inline scalar (no heap handle)
    pub fn is_scalar(&self) -> bool {
        self.handle().is_none()
    }

    /// Check if value is an alias
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Reference(_))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Extractors (return Option for safe access)
    // ═══════════════════════════════════════════════════════════════════

    /// The heap handle, if this is a handle variant.
    pub fn handle(&self) -> Option<ObjId> {
        match self {
            Value::String(id)
            | Value::Binary(id)
            | Value::List(id)
            | Value::Map(id)
            | Value::Object(id)
            | Value::Closure(id)
            | Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// The heap handle of a copy-on-write container.
    pub fn cow_handle(&self) -> Option<ObjId> {
        match self {
            Value::String(id) | Value::Binary(id) | Value::List(id) | Value::Map(id) => Some(*id),
            _ => None,
        }
    }

    /// Same variant, different handle. Scalars are returned unchanged.
    pub(crate) fn with_handle(&self, id: ObjId) -> Value {
        match self {
            Value::String(_) => Value::String(id),
            Value::Binary(_) => Value::Binary(id),
            Value::List(_) => Value::List(id),
            Value::Map(_) => Value::Map(id),
            Value::Object(_) => Value::Object(id),
            Value::Closure(_) => Value::Closure(id),
            Value::Reference(_) => Value::Reference(id),
            other => *other,
        }
    }

    /// Extract boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract integer value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract float value (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Extract date value
    pub fn as_date(&self) -> Option<i64> {
        match self {
            Value::Date(us) => Some(*us),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// PartialEq Implementation
// ═══════════════════════════════════════════════════════════════════

impl PartialEq for Value {
    /// Scalars compare by value; handles compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (a, b) => match (a.handle(), b.handle()) {
                (Some(x), Some(y)) => a.kind() == b.kind() && x == y,
                _ => false,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// From Trait Implementations
// ═══════════════════════════════════════════════════════════════════

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nothing
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Nothing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_equality() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Float(3.0));
        assert_eq!(Value::Nothing, Value::from(None::<i64>));
    }

    #[test]
    fn test_handle_identity_equality() {
        let a = ObjId::new(1, 0);
        let b = ObjId::new(1, 1);
        assert_eq!(Value::List(a), Value::List(a));
        assert_ne!(Value::List(a), Value::List(b));
        assert_ne!(Value::List(a), Value::Map(a));
    }

    #[test]
    fn test_with_handle_keeps_variant() {
        let a = ObjId::new(1, 0);
        let b = ObjId::new(2, 0);
        assert_eq!(Value::Map(a).with_handle(b), Value::Map(b));
        assert_eq!(Value::Int(4).with_handle(b), Value::Int(4));
    }

    #[test]
    fn test_cow_handle() {
        let a = ObjId::new(7, 0);
        assert_eq!(Value::List(a).cow_handle(), Some(a));
        assert_eq!(Value::Object(a).cow_handle(), None);
        assert!(ValueKind::Map.is_copy_on_write());
        assert!(!ValueKind::Object.is_copy_on_write());
    }
}
