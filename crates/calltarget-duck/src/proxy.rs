//! Proxy type synthesis
//!
//! A proxy type is the adapter produced for one `(shape, target type)`
//! pair: one compiled forwarding thunk per shape member, with every
//! conversion (enum re-tagging, nested proxy wrapping, unwrapping)
//! resolved at synthesis time. A proxy instance pairs the synthesized
//! type with the wrapped instance, which it holds as its only state.
//!
//! Nested proxies (members whose declared type is itself a shape) are
//! created lazily, through the owning cache, the first time the member
//! produces a value.

use crate::cache::ProxyCache;
use crate::error::DuckTypeError;
use crate::matcher::{match_shape, BoundMember, Conversion};
use calltarget_types::{
    AccessorFn, MemberDescriptor, MutatorFn, ShapeId, TypeId, TypeKind, TypeRegistry, Value,
};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A value flowing through a proxy member
#[derive(Debug, Clone)]
pub enum DuckValue {
    /// A raw runtime value
    Raw(Value),
    /// A proxied instance
    Proxy(ProxyInstance),
}

impl DuckValue {
    /// The underlying raw value: proxies yield their wrapped instance
    pub fn to_raw(&self) -> Value {
        match self {
            DuckValue::Raw(value) => value.clone(),
            DuckValue::Proxy(proxy) => proxy.raw().clone(),
        }
    }

    /// Borrow the raw value if this is not a proxy
    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            DuckValue::Raw(value) => Some(value),
            DuckValue::Proxy(_) => None,
        }
    }

    /// Borrow the proxy if this is one
    pub fn as_proxy(&self) -> Option<&ProxyInstance> {
        match self {
            DuckValue::Proxy(proxy) => Some(proxy),
            DuckValue::Raw(_) => None,
        }
    }
}

type MethodThunk = Box<dyn Fn(&Value, &[DuckValue]) -> Result<DuckValue, DuckTypeError> + Send + Sync>;
type GetThunk = Box<dyn Fn(&Value) -> Result<DuckValue, DuckTypeError> + Send + Sync>;
type SetThunk = Box<dyn Fn(&Value, DuckValue) -> Result<(), DuckTypeError> + Send + Sync>;

enum SlotKind {
    Method(MethodThunk),
    Property {
        get: Option<GetThunk>,
        set: Option<SetThunk>,
    },
}

/// A synthesized adapter type for one `(shape, target type)` pair
pub struct ProxyType {
    shape: ShapeId,
    target: TypeId,
    shape_name: String,
    target_name: String,
    target_is_value_type: bool,
    types: Arc<TypeRegistry>,
    slots: Vec<SlotKind>,
    by_name: FxHashMap<String, usize>,
}

impl ProxyType {
    /// The shape this type implements
    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    /// The concrete type it forwards to
    pub fn target(&self) -> TypeId {
        self.target
    }

    /// Construct a proxy over an instance
    ///
    /// The single-argument constructor of the synthesized type: the
    /// instance must be non-null and of (or assignable to) the target
    /// type.
    pub fn instantiate(self: &Arc<Self>, instance: Value) -> Result<ProxyInstance, DuckTypeError> {
        if instance.is_null() {
            return Err(DuckTypeError::TargetObjectInstanceIsNull);
        }
        match instance.type_id() {
            Some(id)
                if id == self.target
                    || calltarget_types::is_assignable(&self.types, id, self.target) => {}
            Some(id) => {
                return Err(DuckTypeError::InvalidTypeConversion {
                    from: self.types.name_of(id),
                    to: self.target_name.clone(),
                });
            }
            None => return Err(DuckTypeError::TargetObjectInstanceIsNull),
        }
        Ok(ProxyInstance {
            ty: self.clone(),
            instance,
        })
    }
}

impl fmt::Debug for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyType")
            .field("shape", &self.shape_name)
            .field("target", &self.target_name)
            .field("members", &self.slots.len())
            .finish()
    }
}

/// A proxy over one wrapped instance
#[derive(Clone)]
pub struct ProxyInstance {
    ty: Arc<ProxyType>,
    instance: Value,
}

impl ProxyInstance {
    /// The synthesized type backing this proxy
    pub fn proxy_type(&self) -> &Arc<ProxyType> {
        &self.ty
    }

    /// The wrapped instance
    pub fn raw(&self) -> &Value {
        &self.instance
    }

    /// Invoke a method member
    pub fn invoke(&self, member: &str, args: &[DuckValue]) -> Result<DuckValue, DuckTypeError> {
        match self.slot(member)? {
            SlotKind::Method(thunk) => thunk(&self.instance, args),
            SlotKind::Property { .. } => Err(DuckTypeError::MemberKindMismatch {
                member: member.to_string(),
                expected: "method",
            }),
        }
    }

    /// Read a property member
    pub fn get(&self, member: &str) -> Result<DuckValue, DuckTypeError> {
        match self.slot(member)? {
            SlotKind::Property { get: Some(thunk), .. } => thunk(&self.instance),
            SlotKind::Property { get: None, .. } => Err(DuckTypeError::DirectionMismatch {
                shape: self.ty.shape_name.clone(),
                member: member.to_string(),
                target: self.ty.target_name.clone(),
                direction: "read",
            }),
            SlotKind::Method(_) => Err(DuckTypeError::MemberKindMismatch {
                member: member.to_string(),
                expected: "property",
            }),
        }
    }

    /// Write a property member
    ///
    /// Writes through a proxy over a value type are rejected: the
    /// wrapped copy would be mutated, not the caller's value, so the
    /// operation is not supported at all.
    pub fn set(&self, member: &str, value: DuckValue) -> Result<(), DuckTypeError> {
        if self.ty.target_is_value_type {
            return Err(DuckTypeError::StructMembersCannotBeChanged {
                target: self.ty.target_name.clone(),
            });
        }
        match self.slot(member)? {
            SlotKind::Property { set: Some(thunk), .. } => thunk(&self.instance, value),
            SlotKind::Property { set: None, .. } => Err(DuckTypeError::DirectionMismatch {
                shape: self.ty.shape_name.clone(),
                member: member.to_string(),
                target: self.ty.target_name.clone(),
                direction: "write",
            }),
            SlotKind::Method(_) => Err(DuckTypeError::MemberKindMismatch {
                member: member.to_string(),
                expected: "property",
            }),
        }
    }

    fn slot(&self, member: &str) -> Result<&SlotKind, DuckTypeError> {
        self.ty
            .by_name
            .get(member)
            .and_then(|&index| self.ty.slots.get(index))
            .ok_or_else(|| DuckTypeError::MemberNotFound {
                shape: self.ty.shape_name.clone(),
                member: member.to_string(),
                target: self.ty.target_name.clone(),
            })
    }
}

impl fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("type", &self.ty.shape_name)
            .field("target", &self.ty.target_name)
            .finish()
    }
}

/// Synthesize the proxy type for a `(shape, target)` pair
///
/// Runs the matcher and compiles one forwarding thunk per bound member.
/// Called by the cache on a miss; a failure here publishes nothing.
pub(crate) fn synthesize(
    cache: &Arc<ProxyCache>,
    shape_id: ShapeId,
    target: TypeId,
) -> Result<ProxyType, DuckTypeError> {
    let types = cache.types();
    let shapes = cache.shapes();
    let shape = shapes
        .get(shape_id)
        .map_err(|_| DuckTypeError::ProxyTypeDefinitionIsNull {
            shape: shape_id.raw(),
        })?;
    let desc = types.get(target)?;

    if !shape.is_public() {
        return Err(DuckTypeError::TypeIsNotPublic {
            name: shape.name().to_string(),
            argument: "proxy definition",
        });
    }
    if !desc.is_public() {
        return Err(DuckTypeError::TypeIsNotPublic {
            name: desc.name().to_string(),
            argument: "target",
        });
    }

    let binding_set = match_shape(types, shapes, shape_id, target)?;
    debug!(
        shape = shape.name(),
        target = desc.name(),
        "synthesizing proxy type"
    );

    let weak = Arc::downgrade(cache);
    let mut slots = Vec::with_capacity(binding_set.bindings.len());
    let mut by_name = FxHashMap::default();
    for binding in &binding_set.bindings {
        let member_name = shape.members()[binding.shape_member].name.clone();
        let kind = match &binding.bound {
            BoundMember::Method {
                index,
                param_convs,
                return_conv,
            } => match desc.member(*index) {
                Some(MemberDescriptor::Method(m)) => SlotKind::Method(method_thunk(
                    types.clone(),
                    weak.clone(),
                    member_name.clone(),
                    m.invoke.clone(),
                    param_convs.clone(),
                    return_conv.clone(),
                )),
                _ => {
                    return Err(DuckTypeError::MemberKindMismatch {
                        member: member_name,
                        expected: "method",
                    })
                }
            },
            BoundMember::Property { index, read, write } => {
                let (getter, setter): (Option<AccessorFn>, Option<MutatorFn>) =
                    match desc.member(*index) {
                        Some(MemberDescriptor::Property(p)) => {
                            (p.getter.clone(), p.setter.clone())
                        }
                        Some(MemberDescriptor::Field(f)) => (Some(f.get.clone()), f.set.clone()),
                        _ => {
                            return Err(DuckTypeError::MemberKindMismatch {
                                member: member_name,
                                expected: "property",
                            })
                        }
                    };
                let get = match (read, getter) {
                    (Some(conv), Some(accessor)) => Some(get_thunk(
                        types.clone(),
                        weak.clone(),
                        member_name.clone(),
                        accessor,
                        conv.clone(),
                    )),
                    _ => None,
                };
                let set = match (write, setter) {
                    (Some(conv), Some(mutator)) => Some(set_thunk(
                        types.clone(),
                        member_name.clone(),
                        mutator,
                        conv.clone(),
                    )),
                    _ => None,
                };
                SlotKind::Property { get, set }
            }
        };
        by_name.insert(member_name, slots.len());
        slots.push(kind);
    }

    Ok(ProxyType {
        shape: shape_id,
        target,
        shape_name: shape.name().to_string(),
        target_name: desc.name().to_string(),
        target_is_value_type: desc.kind() == TypeKind::ValueType,
        types: types.clone(),
        slots,
        by_name,
    })
}

fn method_thunk(
    types: Arc<TypeRegistry>,
    cache: Weak<ProxyCache>,
    member: String,
    invoke: calltarget_types::MethodFn,
    param_convs: Vec<Conversion>,
    return_conv: Conversion,
) -> MethodThunk {
    Box::new(move |instance, args| {
        if args.len() != param_convs.len() {
            return Err(DuckTypeError::MemberArgumentCount {
                member: member.clone(),
                expected: param_convs.len(),
                provided: args.len(),
            });
        }
        let mut raw_args = Vec::with_capacity(args.len());
        for (arg, conv) in args.iter().zip(&param_convs) {
            raw_args.push(apply_in(&types, conv, arg, &member)?);
        }
        let result = invoke(instance, &raw_args)?;
        apply_out(&types, &return_conv, result, &cache, &member)
    })
}

fn get_thunk(
    types: Arc<TypeRegistry>,
    cache: Weak<ProxyCache>,
    member: String,
    accessor: AccessorFn,
    conv: Conversion,
) -> GetThunk {
    Box::new(move |instance| {
        let value = accessor(instance)?;
        apply_out(&types, &conv, value, &cache, &member)
    })
}

fn set_thunk(
    types: Arc<TypeRegistry>,
    member: String,
    mutator: MutatorFn,
    conv: Conversion,
) -> SetThunk {
    Box::new(move |instance, value| {
        let raw = apply_in(&types, &conv, &value, &member)?;
        mutator(instance, raw).map_err(DuckTypeError::from)
    })
}

/// Convert a value flowing into the concrete member
fn apply_in(
    types: &TypeRegistry,
    conv: &Conversion,
    arg: &DuckValue,
    member: &str,
) -> Result<Value, DuckTypeError> {
    match conv {
        Conversion::Identity | Conversion::Upcast => Ok(arg.to_raw()),
        Conversion::EnumCast { to } => match arg.to_raw() {
            Value::Enum { raw, .. } => Ok(Value::Enum { type_id: *to, raw }),
            other => Err(DuckTypeError::InvalidTypeConversion {
                from: runtime_type_name(types, &other),
                to: format!("{} (argument of '{}')", types.name_of(*to), member),
            }),
        },
        // Shape-typed arguments forward as their raw instance.
        Conversion::WrapShape(_) | Conversion::UnwrapShape(_) => Ok(arg.to_raw()),
    }
}

/// Convert a value flowing back out to the shape signature
fn apply_out(
    types: &TypeRegistry,
    conv: &Conversion,
    value: Value,
    cache: &Weak<ProxyCache>,
    member: &str,
) -> Result<DuckValue, DuckTypeError> {
    match conv {
        Conversion::Identity | Conversion::Upcast => Ok(DuckValue::Raw(value)),
        Conversion::EnumCast { to } => match value {
            Value::Enum { raw, .. } => Ok(DuckValue::Raw(Value::Enum { type_id: *to, raw })),
            other => Err(DuckTypeError::InvalidTypeConversion {
                from: runtime_type_name(types, &other),
                to: format!("{} (result of '{}')", types.name_of(*to), member),
            }),
        },
        Conversion::WrapShape(shape) | Conversion::UnwrapShape(shape) => {
            if value.is_null() {
                return Ok(DuckValue::Raw(Value::Null));
            }
            let cache = cache.upgrade().ok_or_else(|| DuckTypeError::CacheUnavailable {
                member: member.to_string(),
            })?;
            let type_id = match value.type_id() {
                Some(id) => id,
                None => return Ok(DuckValue::Raw(Value::Null)),
            };
            let proxy_type = cache.get_or_create(*shape, type_id)?;
            Ok(DuckValue::Proxy(proxy_type.instantiate(value)?))
        }
    }
}

fn runtime_type_name(types: &TypeRegistry, value: &Value) -> String {
    match value.type_id() {
        Some(id) => types.name_of(id),
        None => String::from("null"),
    }
}
