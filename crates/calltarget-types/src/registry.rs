//! Type registry
//!
//! Maps [`TypeId`] to [`TypeDescriptor`]. Append-only: descriptors are
//! registered once (builtins at construction, everything else at load
//! time) and retained for the registry's lifetime. Lookups vastly
//! outnumber insertions after warm-up.

use crate::ty::{TypeDescriptor, TypeId, TypeKind};
use crate::value::{InstanceRef, Value};
use crate::TypeError;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Registry of concrete type descriptors
pub struct TypeRegistry {
    types: RwLock<Vec<Arc<TypeDescriptor>>>,
    by_name: DashMap<String, TypeId>,
}

impl TypeRegistry {
    /// Create a registry with the builtin types pre-registered
    pub fn new() -> Self {
        let registry = Self {
            types: RwLock::new(Vec::new()),
            by_name: DashMap::new(),
        };
        // Order must line up with the TypeId constants.
        for (name, kind) in [
            ("void", TypeKind::Reference),
            ("bool", TypeKind::ValueType),
            ("i32", TypeKind::ValueType),
            ("i64", TypeKind::ValueType),
            ("f64", TypeKind::ValueType),
            ("string", TypeKind::Reference),
            ("object", TypeKind::Reference),
            ("exception", TypeKind::Reference),
        ] {
            let id = registry
                .register(TypeDescriptor::builder(name, kind).build())
                .unwrap_or(TypeId(u32::MAX));
            debug_assert_eq!(registry.lookup(name), Some(id));
        }
        registry
    }

    /// Register a descriptor, assigning it an id
    pub fn register(&self, descriptor: TypeDescriptor) -> Result<TypeId, TypeError> {
        self.register_with(|_| descriptor)
    }

    /// Register a descriptor that needs its own id (self-referential
    /// member signatures)
    ///
    /// The closure receives the id the type will be registered under.
    pub fn register_with(
        &self,
        build: impl FnOnce(TypeId) -> TypeDescriptor,
    ) -> Result<TypeId, TypeError> {
        let mut types = self.types.write();
        let id = TypeId(types.len() as u32);
        let descriptor = build(id);
        if self.by_name.contains_key(descriptor.name()) {
            return Err(TypeError::DuplicateType {
                name: descriptor.name().to_string(),
            });
        }
        self.by_name.insert(descriptor.name().to_string(), id);
        types.push(Arc::new(descriptor));
        Ok(id)
    }

    /// Resolve a descriptor by id
    pub fn get(&self, id: TypeId) -> Result<Arc<TypeDescriptor>, TypeError> {
        self.types
            .read()
            .get(id.0 as usize)
            .cloned()
            .ok_or(TypeError::UnknownType { id: id.0 })
    }

    /// Resolve a type id by name
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).map(|entry| *entry)
    }

    /// Display name for an id, tolerating unknown ids in diagnostics
    pub fn name_of(&self, id: TypeId) -> String {
        match self.get(id) {
            Ok(desc) => desc.name().to_string(),
            Err(_) => id.to_string(),
        }
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Box a value
    ///
    /// For a value-type instance this copies the payload into a fresh slot
    /// via the descriptor's registered copy function: mutations through the
    /// boxed handle are visible to every holder of that handle and never to
    /// the original. For reference types and primitives boxing is the
    /// identity.
    pub fn box_value(&self, value: &Value) -> Result<Value, TypeError> {
        let inst = match value {
            Value::Instance(inst) => inst,
            other => return Ok(other.clone()),
        };
        let desc = self.get(inst.type_id())?;
        if desc.kind() != TypeKind::ValueType {
            return Ok(value.clone());
        }
        let clone_fn = desc.clone_fn().ok_or_else(|| TypeError::NotCloneable {
            name: desc.name().to_string(),
        })?;
        let copy = inst
            .with_payload(|payload| clone_fn(payload))
            .ok_or(TypeError::ReceiverMismatch {
                expected: "registered value type payload",
            })?;
        Ok(Value::Instance(InstanceRef::from_boxed(inst.type_id(), copy)))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{getter_fn, value_clone_fn};

    #[test]
    fn test_builtins_present() {
        let types = TypeRegistry::new();
        assert_eq!(types.lookup("i32"), Some(TypeId::I32));
        assert_eq!(types.lookup("object"), Some(TypeId::OBJECT));
        assert_eq!(types.get(TypeId::STRING).unwrap().name(), "string");
    }

    #[test]
    fn test_register_and_duplicate() {
        let types = TypeRegistry::new();
        let id = types
            .register(TypeDescriptor::builder("Widget", TypeKind::Reference).build())
            .unwrap();
        assert_eq!(types.lookup("Widget"), Some(id));
        let err = types
            .register(TypeDescriptor::builder("Widget", TypeKind::Reference).build())
            .unwrap_err();
        assert!(matches!(err, TypeError::DuplicateType { .. }));
    }

    #[test]
    fn test_box_value_copies_value_types() {
        #[derive(Clone)]
        struct Counter {
            count: i32,
        }

        let types = TypeRegistry::new();
        let id = types
            .register(
                TypeDescriptor::builder("Counter", TypeKind::ValueType)
                    .property(
                        "count",
                        TypeId::I32,
                        Some(getter_fn::<Counter, _>(|c| Value::I32(c.count))),
                        None,
                    )
                    .clone_with(value_clone_fn::<Counter>())
                    .build(),
            )
            .unwrap();

        let original = Value::instance(id, Counter { count: 1 });
        let boxed = types.box_value(&original).unwrap();

        // Distinct slots: mutating the boxed copy leaves the original alone.
        boxed
            .as_instance()
            .unwrap()
            .borrow_mut::<Counter, _>(|c| c.count = 99)
            .unwrap();
        let original_count = original
            .as_instance()
            .unwrap()
            .borrow::<Counter, _>(|c| c.count)
            .unwrap();
        let boxed_count = boxed
            .as_instance()
            .unwrap()
            .borrow::<Counter, _>(|c| c.count)
            .unwrap();
        assert_eq!(original_count, 1);
        assert_eq!(boxed_count, 99);
    }

    #[test]
    fn test_box_value_identity_for_reference_types() {
        let types = TypeRegistry::new();
        let id = types
            .register(TypeDescriptor::builder("Session", TypeKind::Reference).build())
            .unwrap();
        let original = Value::instance(id, String::from("payload"));
        let boxed = types.box_value(&original).unwrap();
        assert_eq!(original, boxed);
    }

    #[test]
    fn test_box_value_requires_clone_fn() {
        let types = TypeRegistry::new();
        let id = types
            .register(TypeDescriptor::builder("Opaque", TypeKind::ValueType).build())
            .unwrap();
        let value = Value::instance(id, 3u8);
        let err = types.box_value(&value).unwrap_err();
        assert!(matches!(err, TypeError::NotCloneable { .. }));
    }
}
