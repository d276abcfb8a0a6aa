//! Type metadata for the CallTarget engine
//!
//! Runtime type descriptors, shape contracts, and the dynamic `Value`
//! representation shared by the duck-typing and trampoline layers.
//!
//! Concrete types are described once, at registration time, by a
//! [`TypeDescriptor`] whose members carry invoker function pointers. All
//! later binding work (structural matching, proxy synthesis, trampoline
//! generation) consumes this metadata and never inspects live values.

#![warn(missing_docs)]

pub mod assign;
pub mod error;
pub mod registry;
pub mod shape;
pub mod ty;
pub mod value;

pub use assign::{enum_convertible, is_assignable};
pub use error::TypeError;
pub use registry::TypeRegistry;
pub use shape::{
    Access, Shape, ShapeBuilder, ShapeId, ShapeMember, ShapeMemberKind, ShapeRegistry,
    ShapeTypeRef,
};
pub use ty::{
    getter_fn, method_fn, setter_fn, value_clone_fn, AccessorFn, CloneFn, FieldDescriptor,
    MemberDescriptor, MethodDescriptor, MethodFn, MutatorFn, PropertyDescriptor, TypeDescriptor,
    TypeDescriptorBuilder, TypeId, TypeKind,
};
pub use value::{InstanceRef, Value};
