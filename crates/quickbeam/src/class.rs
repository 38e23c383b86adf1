//! Class-system boundary
//!
//! The engine knows nothing about class hierarchies or method dispatch. It
//! asks a [`ClassDescriptor`] the few questions member resolution and
//! object teardown need: which members exist, who may see them, what they
//! hold by default, and whether a destructor must run.

use std::fmt;
use std::sync::Arc;

use crate::heap::{Heap, Teardown};
use crate::value::{TypeConstraint, Value};

/// Member visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Accessible from anywhere
    #[default]
    Public,
    /// Accessible only with the owning class as the class context
    Private,
}

/// Metadata and hooks the class system supplies for each class.
pub trait ClassDescriptor: Send + Sync {
    /// Class name
    fn name(&self) -> &str;

    /// Declared members, in declaration order.
    fn member_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Visibility of a member. Undeclared members are public.
    fn member_visibility(&self, _member: &str) -> Visibility {
        Visibility::Public
    }

    /// Default value constructed for a member when an instance is created.
    fn member_default(&self, _member: &str, _heap: &Heap) -> Value {
        Value::Nothing
    }

    /// Declared type of a member.
    fn member_constraint(&self, _member: &str) -> TypeConstraint {
        TypeConstraint::Any
    }

    /// Whether [`destroy`](Self::destroy) must run at teardown.
    fn has_destructor(&self) -> bool {
        false
    }

    /// Run the destructor. Called at most once per object, with no heap
    /// lock held.
    fn destroy(&self, _teardown: &mut Teardown<'_>) {}
}

/// Check member access from the given class context.
pub fn can_access(class: &dyn ClassDescriptor, member: &str, context: Option<&str>) -> bool {
    match class.member_visibility(member) {
        Visibility::Public => true,
        Visibility::Private => context == Some(class.name()),
    }
}

type DefaultFn = Arc<dyn Fn(&Heap) -> Value + Send + Sync>;
type DestructorFn = Arc<dyn Fn(&mut Teardown<'_>) + Send + Sync>;

struct MemberDecl {
    name: String,
    visibility: Visibility,
    constraint: TypeConstraint,
    default: Option<DefaultFn>,
}

/// A ready-made descriptor built from member declarations.
///
/// ```
/// use quickbeam::{SimpleClass, TypeConstraint, ValueKind};
///
/// let class = SimpleClass::new("Counter")
///     .typed_member("count", TypeConstraint::Kind(ValueKind::Int))
///     .with_default("count", |_| 0.into())
///     .private_member("secret")
///     .build();
/// assert_eq!(quickbeam::ClassDescriptor::name(&*class), "Counter");
/// ```
pub struct SimpleClass {
    name: Arc<str>,
    members: Vec<MemberDecl>,
    destructor: Option<DestructorFn>,
}

impl SimpleClass {
    /// Start a class with no members.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            members: Vec::new(),
            destructor: None,
        }
    }

    fn declare(mut self, name: &str, visibility: Visibility, constraint: TypeConstraint) -> Self {
        self.members.retain(|m| m.name != name);
        self.members.push(MemberDecl {
            name: name.to_string(),
            visibility,
            constraint,
            default: None,
        });
        self
    }

    /// Declare an untyped public member.
    pub fn member(self, name: &str) -> Self {
        self.declare(name, Visibility::Public, TypeConstraint::Any)
    }

    /// Declare an untyped private member.
    pub fn private_member(self, name: &str) -> Self {
        self.declare(name, Visibility::Private, TypeConstraint::Any)
    }

    /// Declare a typed public member.
    pub fn typed_member(self, name: &str, constraint: TypeConstraint) -> Self {
        self.declare(name, Visibility::Public, constraint)
    }

    /// Set the default-value callback of a declared member.
    pub fn with_default(
        mut self,
        name: &str,
        default: impl Fn(&Heap) -> Value + Send + Sync + 'static,
    ) -> Self {
        if let Some(decl) = self.members.iter_mut().find(|m| m.name == name) {
            decl.default = Some(Arc::new(default));
        }
        self
    }

    /// Attach a destructor.
    pub fn with_destructor(
        mut self,
        destructor: impl Fn(&mut Teardown<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.destructor = Some(Arc::new(destructor));
        self
    }

    /// Finish into a shareable descriptor.
    pub fn build(self) -> Arc<dyn ClassDescriptor> {
        Arc::new(self)
    }

    fn decl(&self, member: &str) -> Option<&MemberDecl> {
        self.members.iter().find(|m| m.name == member)
    }
}

impl ClassDescriptor for SimpleClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }

    fn member_visibility(&self, member: &str) -> Visibility {
        self.decl(member).map(|m| m.visibility).unwrap_or_default()
    }

    fn member_default(&self, member: &str, heap: &Heap) -> Value {
        match self.decl(member).and_then(|m| m.default.as_ref()) {
            Some(default) => default(heap),
            None => Value::Nothing,
        }
    }

    fn member_constraint(&self, member: &str) -> TypeConstraint {
        self.decl(member)
            .map(|m| m.constraint.clone())
            .unwrap_or_default()
    }

    fn has_destructor(&self) -> bool {
        self.destructor.is_some()
    }

    fn destroy(&self, teardown: &mut Teardown<'_>) {
        if let Some(destructor) = &self.destructor {
            destructor(teardown);
        }
    }
}

impl fmt::Debug for SimpleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleClass")
            .field("name", &self.name)
            .field("members", &self.member_names())
            .field("destructor", &self.destructor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn test_declared_members_in_order() {
        let class = SimpleClass::new("P").member("x").member("y").build();
        assert_eq!(class.member_names(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_private_access_needs_class_context() {
        let class = SimpleClass::new("Account").private_member("pin").build();
        assert!(!can_access(&*class, "pin", None));
        assert!(!can_access(&*class, "pin", Some("Other")));
        assert!(can_access(&*class, "pin", Some("Account")));
        assert!(can_access(&*class, "undeclared", None));
    }

    #[test]
    fn test_member_constraint_and_default() {
        let heap = Heap::default();
        let class = SimpleClass::new("C")
            .typed_member("n", TypeConstraint::Kind(ValueKind::Int))
            .with_default("n", |_| Value::Int(7))
            .build();
        assert_eq!(class.member_constraint("n"), TypeConstraint::Kind(ValueKind::Int));
        assert_eq!(class.member_default("n", &heap), Value::Int(7));
        assert_eq!(class.member_constraint("other"), TypeConstraint::Any);
    }

    #[test]
    fn test_redeclaring_replaces() {
        let class = SimpleClass::new("C").member("a").private_member("a").build();
        assert_eq!(class.member_names().len(), 1);
        assert_eq!(class.member_visibility("a"), Visibility::Private);
    }
}
