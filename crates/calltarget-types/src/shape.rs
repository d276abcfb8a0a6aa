//! Shape contracts
//!
//! A shape is a structural contract: the set of members an integration
//! expects a third-party type to expose. Shapes are author-defined,
//! registered once at load time, and matched against concrete type
//! descriptors by the duck-typing layer. Identity is the registered id.

use crate::ty::TypeId;
use crate::TypeError;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a registered shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(pub(crate) u32);

impl ShapeId {
    /// Raw index value (for diagnostics)
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShapeId({})", self.0)
    }
}

/// A type position inside a shape member signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeTypeRef {
    /// A concrete registered type
    Concrete(TypeId),
    /// Another shape; triggers recursive matching and nested proxies
    Shape(ShapeId),
    /// Accepts any value unchecked
    Any,
}

/// Requested access direction for a property member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Getter only
    Read,
    /// Setter only
    Write,
    /// Both
    ReadWrite,
}

impl Access {
    /// Whether the direction includes reads
    pub fn reads(&self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    /// Whether the direction includes writes
    pub fn writes(&self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Kind and signature of one required member
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeMemberKind {
    /// A method with the given parameter and return types
    Method {
        /// Parameter types in call order
        params: Vec<ShapeTypeRef>,
        /// Return type
        return_type: ShapeTypeRef,
    },
    /// A property with the given type and access direction
    Property {
        /// Property type
        ty: ShapeTypeRef,
        /// Requested direction
        access: Access,
    },
}

/// One required member of a shape
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMember {
    /// Required member name
    pub name: String,
    /// Required kind and signature
    pub kind: ShapeMemberKind,
}

/// A structural contract over a concrete type's members
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    name: String,
    is_public: bool,
    members: Vec<ShapeMember>,
}

impl Shape {
    /// Start building a shape
    pub fn builder(name: impl Into<String>) -> ShapeBuilder {
        ShapeBuilder {
            name: name.into(),
            is_public: true,
            members: Vec::new(),
        }
    }

    /// Shape name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the shape is visible to synthesized proxies
    pub fn is_public(&self) -> bool {
        self.is_public
    }

    /// Required members, in declaration order
    pub fn members(&self) -> &[ShapeMember] {
        &self.members
    }
}

/// Builder for [`Shape`]
pub struct ShapeBuilder {
    name: String,
    is_public: bool,
    members: Vec<ShapeMember>,
}

impl ShapeBuilder {
    /// Mark the shape as not publicly visible
    pub fn non_public(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// Require a method member
    pub fn method(
        mut self,
        name: impl Into<String>,
        params: Vec<ShapeTypeRef>,
        return_type: ShapeTypeRef,
    ) -> Self {
        self.members.push(ShapeMember {
            name: name.into(),
            kind: ShapeMemberKind::Method {
                params,
                return_type,
            },
        });
        self
    }

    /// Require a property member
    pub fn property(mut self, name: impl Into<String>, ty: ShapeTypeRef, access: Access) -> Self {
        self.members.push(ShapeMember {
            name: name.into(),
            kind: ShapeMemberKind::Property { ty, access },
        });
        self
    }

    /// Finish the shape
    pub fn build(self) -> Shape {
        Shape {
            name: self.name,
            is_public: self.is_public,
            members: self.members,
        }
    }
}

/// Registry of shape contracts
///
/// Append-only and thread-safe; shapes live for the registry's lifetime.
pub struct ShapeRegistry {
    shapes: RwLock<Vec<Arc<Shape>>>,
    by_name: DashMap<String, ShapeId>,
}

impl ShapeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            shapes: RwLock::new(Vec::new()),
            by_name: DashMap::new(),
        }
    }

    /// Register a shape, assigning it an id
    pub fn register(&self, shape: Shape) -> Result<ShapeId, TypeError> {
        self.register_with(|_| shape)
    }

    /// Register a shape that needs its own id (self-referential members)
    ///
    /// The closure receives the id the shape will be registered under.
    pub fn register_with(&self, build: impl FnOnce(ShapeId) -> Shape) -> Result<ShapeId, TypeError> {
        let mut shapes = self.shapes.write();
        let id = ShapeId(shapes.len() as u32);
        let shape = build(id);
        if self.by_name.contains_key(shape.name()) {
            return Err(TypeError::DuplicateShape {
                name: shape.name().to_string(),
            });
        }
        self.by_name.insert(shape.name().to_string(), id);
        shapes.push(Arc::new(shape));
        Ok(id)
    }

    /// Resolve a shape by id
    pub fn get(&self, id: ShapeId) -> Result<Arc<Shape>, TypeError> {
        self.shapes
            .read()
            .get(id.0 as usize)
            .cloned()
            .ok_or(TypeError::UnknownShape { id: id.0 })
    }

    /// Resolve a shape id by name
    pub fn lookup(&self, name: &str) -> Option<ShapeId> {
        self.by_name.get(name).map(|entry| *entry)
    }

    /// Number of registered shapes
    pub fn len(&self) -> usize {
        self.shapes.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
