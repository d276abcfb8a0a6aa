//! Dynamic value representation
//!
//! Values crossing the instrumentation boundary are untyped from the
//! caller's point of view: the native layer hands the engine an instance
//! and its arguments without knowing their Rust types. `Value` is the
//! carrier for that data. Primitives are stored inline; instances of
//! registered types are stored behind a shared, lockable slot so that
//! member invokers can borrow the payload mutably.
//!
//! Cloning a `Value` clones the handle, not the payload. Value-type copy
//! semantics are produced only at the explicit boxing boundary (see
//! [`crate::registry::TypeRegistry::box_value`]).

use crate::ty::TypeId;
use crate::TypeError;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared handle to an instance of a registered type
#[derive(Clone)]
pub struct InstanceRef {
    type_id: TypeId,
    slot: Arc<RwLock<Box<dyn Any + Send + Sync>>>,
}

impl InstanceRef {
    /// Wrap a payload in a fresh slot
    pub fn new<T: Any + Send + Sync>(type_id: TypeId, payload: T) -> Self {
        Self {
            type_id,
            slot: Arc::new(RwLock::new(Box::new(payload))),
        }
    }

    /// Wrap an already-boxed payload in a fresh slot
    pub(crate) fn from_boxed(type_id: TypeId, payload: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            type_id,
            slot: Arc::new(RwLock::new(payload)),
        }
    }

    /// The registered type of the payload
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Whether two handles refer to the same slot
    pub fn ptr_eq(&self, other: &InstanceRef) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Borrow the payload immutably
    pub fn borrow<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, TypeError> {
        let guard = self.slot.read();
        match (&**guard).downcast_ref::<T>() {
            Some(payload) => Ok(f(payload)),
            None => Err(TypeError::ReceiverMismatch {
                expected: std::any::type_name::<T>(),
            }),
        }
    }

    /// Borrow the payload mutably
    pub fn borrow_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, TypeError> {
        let mut guard = self.slot.write();
        match (&mut **guard).downcast_mut::<T>() {
            Some(payload) => Ok(f(payload)),
            None => Err(TypeError::ReceiverMismatch {
                expected: std::any::type_name::<T>(),
            }),
        }
    }

    /// Run a closure over the type-erased payload
    pub(crate) fn with_payload<R>(&self, f: impl FnOnce(&(dyn Any + Send + Sync)) -> R) -> R {
        let guard = self.slot.read();
        f(&**guard)
    }
}

impl fmt::Debug for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRef")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// A dynamic runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// The null reference
    Null,
    /// A boolean
    Bool(bool),
    /// A 32-bit integer
    I32(i32),
    /// A 64-bit integer
    I64(i64),
    /// A double-precision float
    F64(f64),
    /// An immutable string
    Str(Arc<str>),
    /// An enum constant: the declaring enum type plus the underlying
    /// integral value
    Enum {
        /// Declaring enum type
        type_id: TypeId,
        /// Underlying integral value
        raw: i64,
    },
    /// An instance of a registered type
    Instance(InstanceRef),
}

impl Value {
    /// Wrap a payload as an instance value of the given registered type
    pub fn instance<T: Any + Send + Sync>(type_id: TypeId, payload: T) -> Self {
        Value::Instance(InstanceRef::new(type_id, payload))
    }

    /// Build a string value
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Whether this is the null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The runtime type of this value, if it has one
    ///
    /// `Null` has no runtime type; the declared type of a null argument is
    /// supplied out of band by the caller.
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(TypeId::BOOL),
            Value::I32(_) => Some(TypeId::I32),
            Value::I64(_) => Some(TypeId::I64),
            Value::F64(_) => Some(TypeId::F64),
            Value::Str(_) => Some(TypeId::STRING),
            Value::Enum { type_id, .. } => Some(*type_id),
            Value::Instance(inst) => Some(inst.type_id()),
        }
    }

    /// Extract a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an i32
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract an i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract an f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract an instance handle
    pub fn as_instance(&self) -> Option<&InstanceRef> {
        match self {
            Value::Instance(inst) => Some(inst),
            _ => None,
        }
    }

    /// Extract the underlying integral value of an enum constant
    pub fn as_enum_raw(&self) -> Option<i64> {
        match self {
            Value::Enum { raw, .. } => Some(*raw),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Primitives compare by value; instances compare by slot identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (
                Value::Enum { type_id: t1, raw: r1 },
                Value::Enum { type_id: t2, raw: r2 },
            ) => t1 == t2 && r1 == r2,
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}
