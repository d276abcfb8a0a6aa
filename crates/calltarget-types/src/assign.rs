//! Assignability rules
//!
//! Implements the relation "a value of type `from` can be used where
//! `to` is expected", driven by the supertype edges each descriptor
//! declares at registration time.

use crate::registry::TypeRegistry;
use crate::ty::{TypeId, TypeKind};
use rustc_hash::FxHashSet;

/// Check whether `from` is assignable to `to`
///
/// Reflexive; everything is assignable to `object`; declared
/// `assignable_to` edges are followed transitively.
pub fn is_assignable(types: &TypeRegistry, from: TypeId, to: TypeId) -> bool {
    // Reflexivity: T -> T
    if from == to {
        return true;
    }

    // Everything boxes to the root reference type.
    if to == TypeId::OBJECT {
        return true;
    }

    let mut visited = FxHashSet::default();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        let desc = match types.get(current) {
            Ok(desc) => desc,
            Err(_) => continue,
        };
        for &parent in desc.assignable_to() {
            if parent == to {
                return true;
            }
            stack.push(parent);
        }
    }
    false
}

/// Check whether a value of enum type `from` may be converted to enum
/// type `to`
///
/// Distinct enum types convert through their underlying integral value;
/// nothing else qualifies.
pub fn enum_convertible(types: &TypeRegistry, from: TypeId, to: TypeId) -> bool {
    let from_kind = types.get(from).map(|d| d.kind());
    let to_kind = types.get(to).map(|d| d.kind());
    matches!(
        (from_kind, to_kind),
        (Ok(TypeKind::Enum), Ok(TypeKind::Enum))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeDescriptor;

    fn registry_with_hierarchy() -> (TypeRegistry, TypeId, TypeId, TypeId) {
        let types = TypeRegistry::new();
        let base = types
            .register(TypeDescriptor::builder("IBase", TypeKind::Reference).build())
            .unwrap();
        let middle = types
            .register(
                TypeDescriptor::builder("Middle", TypeKind::Reference)
                    .assignable_to(base)
                    .build(),
            )
            .unwrap();
        let leaf = types
            .register(
                TypeDescriptor::builder("Leaf", TypeKind::Reference)
                    .assignable_to(middle)
                    .build(),
            )
            .unwrap();
        (types, base, middle, leaf)
    }

    #[test]
    fn test_reflexive() {
        let (types, base, _, _) = registry_with_hierarchy();
        assert!(is_assignable(&types, base, base));
    }

    #[test]
    fn test_transitive_edges() {
        let (types, base, middle, leaf) = registry_with_hierarchy();
        assert!(is_assignable(&types, leaf, middle));
        assert!(is_assignable(&types, leaf, base));
        assert!(!is_assignable(&types, base, leaf));
    }

    #[test]
    fn test_everything_assignable_to_object() {
        let (types, _, _, leaf) = registry_with_hierarchy();
        assert!(is_assignable(&types, leaf, TypeId::OBJECT));
        assert!(is_assignable(&types, TypeId::I32, TypeId::OBJECT));
    }

    #[test]
    fn test_enum_conversion_requires_two_enums() {
        let types = TypeRegistry::new();
        let color = types
            .register(TypeDescriptor::builder("Color", TypeKind::Enum).build())
            .unwrap();
        let status = types
            .register(TypeDescriptor::builder("Status", TypeKind::Enum).build())
            .unwrap();
        assert!(enum_convertible(&types, color, status));
        assert!(enum_convertible(&types, color, color));
        assert!(!enum_convertible(&types, color, TypeId::I32));
        assert!(!is_assignable(&types, color, status));
    }
}
