//! Generic signature reconciliation
//!
//! Decides, per call site, which concrete type or synthesized proxy
//! type substitutes for each of a callback's generic slots, and how
//! each value must be adapted (proxy-wrapped, boxed, enum-converted) on
//! its way into the callback. The resulting plan is transient: it is
//! consumed by trampoline generation and not retained.
//!
//! Conventions mirror the callback naming contract: generic slot 0 is
//! always the instance type; argument slots follow in positional order;
//! the last two parameters of an end callback are exactly the exception
//! and the call state.

use crate::callbacks::{CallbackDescriptor, CallbackParam};
use crate::error::CallTargetError;
use calltarget_duck::{ProxyCache, ProxyType};
use calltarget_types::{enum_convertible, is_assignable, ShapeId, TypeId, TypeKind};
use std::sync::Arc;

/// What a generic slot resolved to
#[derive(Debug, Clone)]
pub enum GenericBinding {
    /// The concrete type, bound directly
    Concrete(TypeId),
    /// A synthesized proxy type for the slot's shape constraint
    Proxy(Arc<ProxyType>),
}

/// How a value is prepared before reaching the callback
#[derive(Debug, Clone)]
pub enum ArgAdapter {
    /// Hand the value over unchanged
    PassThrough,
    /// Re-tag an enum constant to the declared enum type
    EnumCast(TypeId),
    /// Wrap the value in the slot's proxy type
    WrapProxy(Arc<ProxyType>),
    /// Box the value-type instance (exactly once), then wrap the boxed
    /// copy in the slot's proxy type
    BoxAndWrap(Arc<ProxyType>),
}

/// The resolved binding plan for one trampoline generation
#[derive(Debug, Clone)]
pub struct GenericBindingPlan {
    /// Resolved generic slots, instance first
    pub bindings: Vec<GenericBinding>,
    /// Whether the callback declares the leading instance parameter
    pub loads_instance: bool,
    /// Adapter for the instance parameter
    pub instance_adapter: ArgAdapter,
    /// Adapters for the declared argument parameters, in call order
    pub arg_adapters: Vec<ArgAdapter>,
    /// Adapter for the return-value parameter (end callbacks)
    pub return_adapter: Option<ArgAdapter>,
}

/// Resolve one generic slot against a concrete type
fn bind_generic(
    duck: &Arc<ProxyCache>,
    constraint: Option<ShapeId>,
    concrete: TypeId,
) -> Result<(GenericBinding, ArgAdapter), CallTargetError> {
    match constraint {
        Some(shape) => {
            let proxy = duck.get_or_create(shape, concrete)?;
            let kind = duck.types().get(concrete)?.kind();
            let adapter = if kind == TypeKind::ValueType {
                ArgAdapter::BoxAndWrap(proxy.clone())
            } else {
                ArgAdapter::WrapProxy(proxy.clone())
            };
            Ok((GenericBinding::Proxy(proxy), adapter))
        }
        None => Ok((GenericBinding::Concrete(concrete), ArgAdapter::PassThrough)),
    }
}

/// Reconcile a begin callback against a call site
///
/// The callback may declare `argc` or `argc + 1` parameters; the extra
/// leading parameter, when present, must bind generic slot 0 (the
/// instance).
pub fn reconcile_begin(
    duck: &Arc<ProxyCache>,
    integration: &str,
    callback: &'static str,
    cb: &CallbackDescriptor,
    target: TypeId,
    arg_types: &[TypeId],
) -> Result<GenericBindingPlan, CallTargetError> {
    if cb.generic_params.is_empty() {
        return Err(CallTargetError::MissingInstanceGeneric {
            integration: integration.to_string(),
            callback,
        });
    }

    let argc = arg_types.len();
    if cb.params.len() < argc || cb.params.len() > argc + 1 {
        return Err(CallTargetError::ArityMismatch {
            integration: integration.to_string(),
            callback,
            declared: cb.params.len(),
            minimum: argc,
            maximum: argc + 1,
        });
    }

    let loads_instance = cb.params.len() == argc + 1;
    if loads_instance && cb.params[0] != CallbackParam::Generic(0) {
        return Err(CallTargetError::ParameterSignatureMismatch {
            integration: integration.to_string(),
            callback,
            detail: String::from("the leading parameter must bind the instance generic (slot 0)"),
        });
    }

    let (instance_binding, instance_adapter) =
        bind_generic(duck, cb.generic_params[0].constraint, target)?;
    let mut bindings = vec![instance_binding];
    let mut arg_adapters = Vec::with_capacity(argc);

    let offset = usize::from(loads_instance);
    for (position, param) in cb.params.iter().enumerate().skip(offset) {
        let arg_ty = arg_types[position - offset];
        match param {
            CallbackParam::Generic(slot) => {
                let slot = *slot as usize;
                if slot != bindings.len() {
                    return Err(CallTargetError::ParameterSignatureMismatch {
                        integration: integration.to_string(),
                        callback,
                        detail: format!(
                            "parameter {position} binds generic slot {slot}, expected slot {}",
                            bindings.len()
                        ),
                    });
                }
                let declared = cb.generic_params.get(slot).ok_or_else(|| {
                    CallTargetError::GenericArityMismatch {
                        integration: integration.to_string(),
                        callback,
                        declared: cb.generic_params.len(),
                        bound: slot + 1,
                    }
                })?;
                let (binding, adapter) = bind_generic(duck, declared.constraint, arg_ty)?;
                bindings.push(binding);
                arg_adapters.push(adapter);
            }
            CallbackParam::Concrete(declared) => {
                let types = duck.types();
                if arg_ty == *declared || is_assignable(types, arg_ty, *declared) {
                    arg_adapters.push(ArgAdapter::PassThrough);
                } else if enum_convertible(types, arg_ty, *declared) {
                    arg_adapters.push(ArgAdapter::EnumCast(*declared));
                } else {
                    return Err(CallTargetError::ParameterSignatureMismatch {
                        integration: integration.to_string(),
                        callback,
                        detail: format!(
                            "the declared parameter type {} can't be assigned from {}",
                            types.name_of(*declared),
                            types.name_of(arg_ty)
                        ),
                    });
                }
            }
            CallbackParam::Exception | CallbackParam::State => {
                return Err(CallTargetError::ParameterSignatureMismatch {
                    integration: integration.to_string(),
                    callback,
                    detail: format!("parameter {position} is not valid in a begin callback"),
                });
            }
        }
    }

    if bindings.len() != cb.generic_params.len() {
        return Err(CallTargetError::GenericArityMismatch {
            integration: integration.to_string(),
            callback,
            declared: cb.generic_params.len(),
            bound: bindings.len(),
        });
    }

    Ok(GenericBindingPlan {
        bindings,
        loads_instance,
        instance_adapter,
        arg_adapters,
        return_adapter: None,
    })
}

/// Reconcile an end or async-end callback against a call site
///
/// `return_type` is `None` for void targets. The last two parameters
/// must be exactly the exception and the call state; a return-value
/// parameter, when the target returns one, sits immediately before them
/// (after the optional instance) and must either bind generic slot 1 or
/// name the return type exactly (no covariance).
pub fn reconcile_end(
    duck: &Arc<ProxyCache>,
    integration: &str,
    callback: &'static str,
    cb: &CallbackDescriptor,
    target: TypeId,
    return_type: Option<TypeId>,
) -> Result<GenericBindingPlan, CallTargetError> {
    if cb.generic_params.is_empty() {
        return Err(CallTargetError::MissingInstanceGeneric {
            integration: integration.to_string(),
            callback,
        });
    }

    let (minimum, maximum) = if return_type.is_some() { (3, 4) } else { (2, 3) };
    if cb.params.len() < minimum || cb.params.len() > maximum {
        return Err(CallTargetError::ArityMismatch {
            integration: integration.to_string(),
            callback,
            declared: cb.params.len(),
            minimum,
            maximum,
        });
    }

    let count = cb.params.len();
    if cb.params[count - 2] != CallbackParam::Exception {
        return Err(CallTargetError::MissingTrailingException {
            integration: integration.to_string(),
            callback,
        });
    }
    if cb.params[count - 1] != CallbackParam::State {
        return Err(CallTargetError::MissingTrailingState {
            integration: integration.to_string(),
            callback,
        });
    }

    let loads_instance = cb.params.len() == maximum;
    if loads_instance && cb.params[0] != CallbackParam::Generic(0) {
        return Err(CallTargetError::ParameterSignatureMismatch {
            integration: integration.to_string(),
            callback,
            detail: String::from("the leading parameter must bind the instance generic (slot 0)"),
        });
    }

    let (instance_binding, instance_adapter) =
        bind_generic(duck, cb.generic_params[0].constraint, target)?;
    let mut bindings = vec![instance_binding];
    let mut return_adapter = None;

    if let Some(ret_ty) = return_type {
        let return_index = usize::from(loads_instance);
        match cb.params[return_index] {
            CallbackParam::Generic(slot) => {
                if slot as usize != 1 {
                    return Err(CallTargetError::ParameterSignatureMismatch {
                        integration: integration.to_string(),
                        callback,
                        detail: format!(
                            "the return value parameter binds generic slot {slot}, expected slot 1"
                        ),
                    });
                }
                let declared = cb.generic_params.get(1).ok_or_else(|| {
                    CallTargetError::GenericArityMismatch {
                        integration: integration.to_string(),
                        callback,
                        declared: cb.generic_params.len(),
                        bound: 2,
                    }
                })?;
                let (binding, adapter) = bind_generic(duck, declared.constraint, ret_ty)?;
                bindings.push(binding);
                return_adapter = Some(adapter);
            }
            CallbackParam::Concrete(declared) => {
                if declared != ret_ty {
                    let types = duck.types();
                    return Err(CallTargetError::ReturnTypeMismatch {
                        integration: integration.to_string(),
                        callback,
                        detail: format!(
                            "the return value parameter is declared as {} but the instrumented method returns {}",
                            types.name_of(declared),
                            types.name_of(ret_ty)
                        ),
                    });
                }
                return_adapter = Some(ArgAdapter::PassThrough);
            }
            CallbackParam::Exception | CallbackParam::State => {
                return Err(CallTargetError::ParameterSignatureMismatch {
                    integration: integration.to_string(),
                    callback,
                    detail: String::from("the return value parameter is missing"),
                });
            }
        }
    }

    if bindings.len() != cb.generic_params.len() {
        return Err(CallTargetError::GenericArityMismatch {
            integration: integration.to_string(),
            callback,
            declared: cb.generic_params.len(),
            bound: bindings.len(),
        });
    }

    Ok(GenericBindingPlan {
        bindings,
        loads_instance,
        instance_adapter,
        arg_adapters: Vec::new(),
        return_adapter,
    })
}
