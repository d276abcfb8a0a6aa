//! Type descriptors
//!
//! A `TypeDescriptor` is the engine's reflection surface for one concrete
//! type: its name, kind, visibility, declared supertypes, and a member
//! list where every method, property, and field carries an invoker
//! function pointer. Descriptors are built once, registered, and never
//! mutated afterwards; all structural matching and proxy synthesis runs
//! against this metadata.

use crate::value::Value;
use crate::TypeError;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// The `void` pseudo-type (no value)
    pub const VOID: TypeId = TypeId(0);
    /// Builtin boolean type
    pub const BOOL: TypeId = TypeId(1);
    /// Builtin 32-bit integer type
    pub const I32: TypeId = TypeId(2);
    /// Builtin 64-bit integer type
    pub const I64: TypeId = TypeId(3);
    /// Builtin double-precision float type
    pub const F64: TypeId = TypeId(4);
    /// Builtin string type
    pub const STRING: TypeId = TypeId(5);
    /// The root reference type; every value is assignable to it
    pub const OBJECT: TypeId = TypeId(6);
    /// Builtin exception type
    pub const EXCEPTION: TypeId = TypeId(7);

    /// Raw index value (for diagnostics)
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Category of a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Reference type: handles alias the same payload
    Reference,
    /// Value type: copy semantics at the boxing boundary
    ValueType,
    /// Enum type: an underlying integral value tagged with the declaring
    /// type
    Enum,
}

/// Invoker for a method member: receiver plus arguments in call order
pub type MethodFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, TypeError> + Send + Sync>;

/// Reader for a property or field member
pub type AccessorFn = Arc<dyn Fn(&Value) -> Result<Value, TypeError> + Send + Sync>;

/// Writer for a property or field member
pub type MutatorFn = Arc<dyn Fn(&Value, Value) -> Result<(), TypeError> + Send + Sync>;

/// Copy function for value types, used by the boxing boundary
pub type CloneFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// A method member of a registered type
pub struct MethodDescriptor {
    /// Member name
    pub name: String,
    /// Parameter types in call order (receiver excluded)
    pub params: Vec<TypeId>,
    /// Return type (`TypeId::VOID` for none)
    pub return_type: TypeId,
    /// Invoker bound at registration time
    pub invoke: MethodFn,
}

/// A property member of a registered type
pub struct PropertyDescriptor {
    /// Member name
    pub name: String,
    /// Property type
    pub ty: TypeId,
    /// Getter, if the property is readable
    pub getter: Option<AccessorFn>,
    /// Setter, if the property is writable
    pub setter: Option<MutatorFn>,
}

/// A field member of a registered type
pub struct FieldDescriptor {
    /// Member name
    pub name: String,
    /// Field type
    pub ty: TypeId,
    /// Reader
    pub get: AccessorFn,
    /// Writer, absent for read-only fields
    pub set: Option<MutatorFn>,
}

/// One member of a registered type
pub enum MemberDescriptor {
    /// A method
    Method(MethodDescriptor),
    /// A property
    Property(PropertyDescriptor),
    /// A field
    Field(FieldDescriptor),
}

impl MemberDescriptor {
    /// The member's name
    pub fn name(&self) -> &str {
        match self {
            MemberDescriptor::Method(m) => &m.name,
            MemberDescriptor::Property(p) => &p.name,
            MemberDescriptor::Field(f) => &f.name,
        }
    }
}

/// Metadata for one registered concrete type
pub struct TypeDescriptor {
    name: String,
    kind: TypeKind,
    is_public: bool,
    assignable_to: Vec<TypeId>,
    members: Vec<MemberDescriptor>,
    clone_fn: Option<CloneFn>,
}

impl TypeDescriptor {
    /// Start building a descriptor
    pub fn builder(name: impl Into<String>, kind: TypeKind) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            name: name.into(),
            kind,
            is_public: true,
            assignable_to: Vec::new(),
            members: Vec::new(),
            clone_fn: None,
        }
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type category
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Whether the type is visible to synthesized proxies
    pub fn is_public(&self) -> bool {
        self.is_public
    }

    /// Declared supertypes (direct edges only)
    pub fn assignable_to(&self) -> &[TypeId] {
        &self.assignable_to
    }

    /// All members, in declaration order
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    /// Members with the given name, with their indices
    pub fn members_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (usize, &'a MemberDescriptor)> + 'a {
        self.members
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.name() == name)
    }

    /// Member at a known index
    pub fn member(&self, index: usize) -> Option<&MemberDescriptor> {
        self.members.get(index)
    }

    pub(crate) fn clone_fn(&self) -> Option<&CloneFn> {
        self.clone_fn.as_ref()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_public", &self.is_public)
            .field("members", &self.members.len())
            .finish()
    }
}

/// Builder for [`TypeDescriptor`]
pub struct TypeDescriptorBuilder {
    name: String,
    kind: TypeKind,
    is_public: bool,
    assignable_to: Vec<TypeId>,
    members: Vec<MemberDescriptor>,
    clone_fn: Option<CloneFn>,
}

impl TypeDescriptorBuilder {
    /// Mark the type as not publicly visible
    pub fn non_public(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// Declare a direct supertype
    pub fn assignable_to(mut self, id: TypeId) -> Self {
        self.assignable_to.push(id);
        self
    }

    /// Add a method member
    pub fn method(
        mut self,
        name: impl Into<String>,
        params: Vec<TypeId>,
        return_type: TypeId,
        invoke: MethodFn,
    ) -> Self {
        self.members.push(MemberDescriptor::Method(MethodDescriptor {
            name: name.into(),
            params,
            return_type,
            invoke,
        }));
        self
    }

    /// Add a property member
    pub fn property(
        mut self,
        name: impl Into<String>,
        ty: TypeId,
        getter: Option<AccessorFn>,
        setter: Option<MutatorFn>,
    ) -> Self {
        self.members
            .push(MemberDescriptor::Property(PropertyDescriptor {
                name: name.into(),
                ty,
                getter,
                setter,
            }));
        self
    }

    /// Add a field member
    pub fn field(
        mut self,
        name: impl Into<String>,
        ty: TypeId,
        get: AccessorFn,
        set: Option<MutatorFn>,
    ) -> Self {
        self.members.push(MemberDescriptor::Field(FieldDescriptor {
            name: name.into(),
            ty,
            get,
            set,
        }));
        self
    }

    /// Provide the copy function required for boxing value types
    pub fn clone_with(mut self, clone_fn: CloneFn) -> Self {
        self.clone_fn = Some(clone_fn);
        self
    }

    /// Finish the descriptor
    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor {
            name: self.name,
            kind: self.kind,
            is_public: self.is_public,
            assignable_to: self.assignable_to,
            members: self.members,
            clone_fn: self.clone_fn,
        }
    }
}

/// Build a [`MethodFn`] from a typed closure over the receiver payload
pub fn method_fn<T, F>(f: F) -> MethodFn
where
    T: Any + Send + Sync,
    F: Fn(&mut T, &[Value]) -> Result<Value, TypeError> + Send + Sync + 'static,
{
    Arc::new(move |receiver: &Value, args: &[Value]| {
        let inst = receiver.as_instance().ok_or(TypeError::ReceiverMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        inst.borrow_mut::<T, _>(|payload| f(payload, args))?
    })
}

/// Build an [`AccessorFn`] from a typed closure over the receiver payload
pub fn getter_fn<T, F>(f: F) -> AccessorFn
where
    T: Any + Send + Sync,
    F: Fn(&T) -> Value + Send + Sync + 'static,
{
    Arc::new(move |receiver: &Value| {
        let inst = receiver.as_instance().ok_or(TypeError::ReceiverMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        inst.borrow::<T, _>(|payload| f(payload))
    })
}

/// Build a [`MutatorFn`] from a typed closure over the receiver payload
pub fn setter_fn<T, F>(f: F) -> MutatorFn
where
    T: Any + Send + Sync,
    F: Fn(&mut T, Value) -> Result<(), TypeError> + Send + Sync + 'static,
{
    Arc::new(move |receiver: &Value, value: Value| {
        let inst = receiver.as_instance().ok_or(TypeError::ReceiverMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        inst.borrow_mut::<T, _>(|payload| f(payload, value))?
    })
}

/// Build a [`CloneFn`] for a `Clone` payload type
pub fn value_clone_fn<T: Any + Clone + Send + Sync>() -> CloneFn {
    Arc::new(|payload| {
        payload
            .downcast_ref::<T>()
            .map(|p| Box::new(p.clone()) as Box<dyn Any + Send + Sync>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_members() {
        let desc = TypeDescriptor::builder("Sample", TypeKind::Reference)
            .method(
                "len",
                vec![],
                TypeId::I32,
                method_fn::<String, _>(|s, _| Ok(Value::I32(s.len() as i32))),
            )
            .property(
                "text",
                TypeId::STRING,
                Some(getter_fn::<String, _>(|s| Value::str(s.clone()))),
                None,
            )
            .build();
        assert_eq!(desc.members().len(), 2);
        assert_eq!(desc.members_named("len").count(), 1);
        assert!(desc.is_public());
    }

    #[test]
    fn test_method_fn_invokes_against_payload() {
        let invoke = method_fn::<String, _>(|s, _| Ok(Value::I32(s.len() as i32)));
        let value = Value::instance(TypeId::OBJECT, String::from("four"));
        let result = invoke(&value, &[]).unwrap();
        assert_eq!(result, Value::I32(4));
    }

    #[test]
    fn test_method_fn_rejects_wrong_receiver() {
        let invoke = method_fn::<String, _>(|s, _| Ok(Value::I32(s.len() as i32)));
        let err = invoke(&Value::I32(3), &[]).unwrap_err();
        assert!(matches!(err, TypeError::ReceiverMismatch { .. }));
    }
}
