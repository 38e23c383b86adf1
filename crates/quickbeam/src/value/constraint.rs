//! Declared-type constraints for slots

use std::fmt;
use std::sync::Arc;

use super::{Value, ValueKind};
use crate::error::{type_name, EngineError, Result};

/// The declared type of a variable, member or element slot.
///
/// Type descriptors come from the class/parser layers; the engine only
/// needs to answer two questions with them: does a value fit, and which
/// empty container may be created when a subscript or member access lands
/// on an absent value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeConstraint {
    /// Untyped: accepts anything
    #[default]
    Any,

    /// Exactly this kind
    Kind(ValueKind),

    /// This kind or `Nothing`
    OrNothing(ValueKind),

    /// `Int` or `Float`
    Number,

    /// An object of the named class
    Class(Arc<str>),
}

impl TypeConstraint {
    /// Constraint for objects of the named class.
    pub fn class(name: impl AsRef<str>) -> Self {
        TypeConstraint::Class(Arc::from(name.as_ref()))
    }

    /// Whether `value` may be stored in a slot with this constraint.
    ///
    /// `class` is the class name of `value` when it is an object; callers
    /// resolve it before taking any slot lock.
    pub fn accepts(&self, value: &Value, class: Option<&str>) -> bool {
        match self {
            TypeConstraint::Any => true,
            TypeConstraint::Kind(kind) => value.kind() == *kind,
            TypeConstraint::OrNothing(kind) => value.is_nothing() || value.kind() == *kind,
            TypeConstraint::Number => value.is_numeric(),
            TypeConstraint::Class(name) => {
                matches!(value, Value::Object(_)) && class == Some(name.as_ref())
            }
        }
    }

    /// Like [`accepts`](Self::accepts), as a typed error.
    pub fn check(&self, value: &Value, class: Option<&str>) -> Result<()> {
        if self.accepts(value, class) {
            Ok(())
        } else {
            Err(EngineError::TypeError {
                expected: self.to_string(),
                got: match class {
                    Some(name) => format!("object<{}>", name),
                    None => type_name(value).to_string(),
                },
            })
        }
    }

    /// Whether an empty container of `kind` may be materialized in a slot
    /// that currently holds `Nothing`.
    pub fn permits(&self, kind: ValueKind) -> bool {
        match self {
            TypeConstraint::Any => true,
            TypeConstraint::Kind(k) | TypeConstraint::OrNothing(k) => *k == kind,
            TypeConstraint::Number | TypeConstraint::Class(_) => false,
        }
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeConstraint::Any => write!(f, "any"),
            TypeConstraint::Kind(kind) => write!(f, "{}", kind),
            TypeConstraint::OrNothing(kind) => write!(f, "*{}", kind),
            TypeConstraint::Number => write!(f, "number"),
            TypeConstraint::Class(name) => write!(f, "object<{}>", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjId;

    #[test]
    fn test_any_accepts_everything() {
        let any = TypeConstraint::Any;
        assert!(any.accepts(&Value::Nothing, None));
        assert!(any.accepts(&Value::List(ObjId::new(0, 0)), None));
    }

    #[test]
    fn test_or_nothing() {
        let c = TypeConstraint::OrNothing(ValueKind::Int);
        assert!(c.accepts(&Value::Nothing, None));
        assert!(c.accepts(&Value::Int(1), None));
        assert!(!c.accepts(&Value::Float(1.0), None));
    }

    #[test]
    fn test_class_constraint_needs_matching_name() {
        let c = TypeConstraint::class("Point");
        let obj = Value::Object(ObjId::new(3, 0));
        assert!(c.accepts(&obj, Some("Point")));
        assert!(!c.accepts(&obj, Some("Line")));
        assert!(!c.accepts(&Value::Int(1), None));
    }

    #[test]
    fn test_permits_materialization() {
        assert!(TypeConstraint::Any.permits(ValueKind::List));
        assert!(TypeConstraint::Kind(ValueKind::Map).permits(ValueKind::Map));
        assert!(!TypeConstraint::Kind(ValueKind::Map).permits(ValueKind::List));
        assert!(!TypeConstraint::Number.permits(ValueKind::List));
    }

    #[test]
    fn test_check_reports_expected_type() {
        let err = TypeConstraint::Kind(ValueKind::Int)
            .check(&Value::Bool(false), None)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::TypeError {
                expected: "int".to_string(),
                got: "bool".to_string()
            }
        );
    }
}
