//! Trampoline generation
//!
//! The mapper turns an integration callback plus a concrete call-site
//! signature into an executable entry point: a closure, built once,
//! that adapts the instance and arguments per the generic binding plan,
//! invokes the callback, and normalizes the result. At call time the
//! entry point performs only direct calls; all matching, synthesis, and
//! validation happened at generation time.
//!
//! Entry points are cached per `(integration, session, target,
//! signature)` key with get-or-add semantics: a concurrent duplicate
//! generation is allowed, exactly one entry is published, and a failed
//! generation publishes nothing. A callback the integration does not
//! declare is cached as a no-op entry, not an error.

use crate::callbacks::{
    CallbackFn, CallbackResult, CallbackReturnKind, CallbackValue, IntegrationDescriptor,
};
use crate::error::CallTargetError;
use crate::reconciler::{reconcile_begin, reconcile_end, ArgAdapter, GenericBindingPlan};
use crate::registry::IntegrationId;
use crate::state::{CallTargetReturn, CallTargetState, ExceptionInfo};
use calltarget_duck::{DuckTypeError, ProxyCache};
use calltarget_types::{TypeId, TypeRegistry, Value};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const BEGIN_METHOD: &str = "on_method_begin";
const END_METHOD: &str = "on_method_end";
const ASYNC_END_METHOD: &str = "on_async_method_end";

/// Identifier for one profiler session
///
/// Part of every trampoline cache key: re-instrumenting a target under a
/// new session creates new entries instead of mutating published ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SessionId(
    /// Raw session number assigned by the profiler
    pub u32,
);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BeginKey {
    integration: IntegrationId,
    session: SessionId,
    target: TypeId,
    args: Vec<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EndKey {
    integration: IntegrationId,
    session: SessionId,
    target: TypeId,
    return_type: Option<TypeId>,
}

type BeginFn =
    Box<dyn Fn(&Value, &[Value]) -> Result<CallTargetState, CallTargetError> + Send + Sync>;
type EndFn = Box<
    dyn Fn(
            &Value,
            Option<&Value>,
            Option<&ExceptionInfo>,
            CallTargetState,
        ) -> Result<CallTargetReturn, CallTargetError>
        + Send
        + Sync,
>;

/// Executable entry point for a begin callback
pub struct BeginInvoker {
    entry: BeginFn,
}

impl BeginInvoker {
    /// Run the trampoline: `(instance, args…) -> CallTargetState`
    pub fn invoke(&self, instance: &Value, args: &[Value]) -> Result<CallTargetState, CallTargetError> {
        (self.entry)(instance, args)
    }
}

impl fmt::Debug for BeginInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeginInvoker").finish_non_exhaustive()
    }
}

/// Executable entry point for an end callback
pub struct EndInvoker {
    entry: EndFn,
}

impl EndInvoker {
    /// Run the trampoline:
    /// `(instance, return value, exception, state) -> CallTargetReturn`
    pub fn invoke(
        &self,
        instance: &Value,
        return_value: Option<&Value>,
        exception: Option<&ExceptionInfo>,
        state: CallTargetState,
    ) -> Result<CallTargetReturn, CallTargetError> {
        (self.entry)(instance, return_value, exception, state)
    }
}

impl fmt::Debug for EndInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndInvoker").finish_non_exhaustive()
    }
}

/// Executable entry point for an async end callback
pub struct AsyncEndInvoker {
    entry: EndFn,
    preserve_context: bool,
}

impl AsyncEndInvoker {
    /// Run the trampoline when the instrumented task completes
    pub fn invoke(
        &self,
        instance: &Value,
        return_value: Option<&Value>,
        exception: Option<&ExceptionInfo>,
        state: CallTargetState,
    ) -> Result<CallTargetReturn, CallTargetError> {
        (self.entry)(instance, return_value, exception, state)
    }

    /// Whether the continuation must run on the captured context
    pub fn preserve_context(&self) -> bool {
        self.preserve_context
    }
}

impl fmt::Debug for AsyncEndInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEndInvoker")
            .field("preserve_context", &self.preserve_context)
            .finish_non_exhaustive()
    }
}

/// Generates and caches trampolines for instrumented call sites
pub struct IntegrationMapper {
    duck: Arc<ProxyCache>,
    begin: DashMap<BeginKey, Option<Arc<BeginInvoker>>>,
    end: DashMap<EndKey, Option<Arc<EndInvoker>>>,
    async_end: DashMap<EndKey, Option<Arc<AsyncEndInvoker>>>,
}

impl IntegrationMapper {
    /// Create a mapper over the given duck-typing cache
    pub fn new(duck: Arc<ProxyCache>) -> Self {
        Self {
            duck,
            begin: DashMap::new(),
            end: DashMap::new(),
            async_end: DashMap::new(),
        }
    }

    /// The duck-typing cache the mapper resolves constraints against
    pub fn duck(&self) -> &Arc<ProxyCache> {
        &self.duck
    }

    /// Get or generate the begin trampoline for a call site
    ///
    /// `Ok(None)` means the integration does not hook this lifecycle
    /// point; the caller treats the site as uninstrumented.
    pub fn create_begin_invoker(
        &self,
        id: IntegrationId,
        descriptor: &IntegrationDescriptor,
        session: SessionId,
        target: TypeId,
        arg_types: &[TypeId],
    ) -> Result<Option<Arc<BeginInvoker>>, CallTargetError> {
        let key = BeginKey {
            integration: id,
            session,
            target,
            args: arg_types.to_vec(),
        };
        if let Some(entry) = self.begin.get(&key) {
            return Ok(entry.clone());
        }

        let cb = match descriptor.on_method_begin.as_ref() {
            Some(cb) => cb,
            None => {
                debug!(integration = %descriptor.name, "integration does not hook method begin");
                return Ok(self.begin.entry(key).or_insert(None).clone());
            }
        };
        if cb.returns != CallbackReturnKind::State {
            return Err(CallTargetError::ReturnTypeMismatch {
                integration: descriptor.name.clone(),
                callback: BEGIN_METHOD,
                detail: format!(
                    "a begin callback must return the call state, found {:?}",
                    cb.returns
                ),
            });
        }

        debug!(
            integration = %descriptor.name,
            target = %self.duck.types().name_of(target),
            "creating begin trampoline"
        );
        let plan = reconcile_begin(&self.duck, &descriptor.name, BEGIN_METHOD, cb, target, arg_types)?;
        let invoker = Arc::new(BeginInvoker {
            entry: begin_entry(
                self.duck.types().clone(),
                descriptor.name.clone(),
                cb.invoke.clone(),
                plan,
            ),
        });
        debug!(integration = %descriptor.name, "created begin trampoline");
        Ok(self.begin.entry(key).or_insert(Some(invoker)).clone())
    }

    /// Get or generate the end trampoline for a call site
    ///
    /// `return_type` is `None` when the instrumented method returns
    /// nothing; the callback's declared return wrapper must agree
    /// exactly.
    pub fn create_end_invoker(
        &self,
        id: IntegrationId,
        descriptor: &IntegrationDescriptor,
        session: SessionId,
        target: TypeId,
        return_type: Option<TypeId>,
    ) -> Result<Option<Arc<EndInvoker>>, CallTargetError> {
        let key = EndKey {
            integration: id,
            session,
            target,
            return_type,
        };
        if let Some(entry) = self.end.get(&key) {
            return Ok(entry.clone());
        }

        let cb = match descriptor.on_method_end.as_ref() {
            Some(cb) => cb,
            None => {
                debug!(integration = %descriptor.name, "integration does not hook method end");
                return Ok(self.end.entry(key).or_insert(None).clone());
            }
        };
        let expected = match return_type {
            Some(_) => CallbackReturnKind::WrappedReturn,
            None => CallbackReturnKind::Return,
        };
        if cb.returns != expected {
            return Err(CallTargetError::ReturnTypeMismatch {
                integration: descriptor.name.clone(),
                callback: END_METHOD,
                detail: format!(
                    "the declared return wrapper is {:?} but this call site requires {:?}",
                    cb.returns, expected
                ),
            });
        }

        debug!(
            integration = %descriptor.name,
            target = %self.duck.types().name_of(target),
            "creating end trampoline"
        );
        let plan = reconcile_end(&self.duck, &descriptor.name, END_METHOD, cb, target, return_type)?;
        let invoker = Arc::new(EndInvoker {
            entry: end_entry(
                self.duck.types().clone(),
                descriptor.name.clone(),
                END_METHOD,
                cb.invoke.clone(),
                plan,
                false,
            ),
        });
        debug!(integration = %descriptor.name, "created end trampoline");
        Ok(self.end.entry(key).or_insert(Some(invoker)).clone())
    }

    /// Get or generate the async end trampoline for a call site
    ///
    /// `return_type` is the completed task's value type; plain tasks use
    /// the root object type with a null value.
    pub fn create_async_end_invoker(
        &self,
        id: IntegrationId,
        descriptor: &IntegrationDescriptor,
        session: SessionId,
        target: TypeId,
        return_type: TypeId,
    ) -> Result<Option<Arc<AsyncEndInvoker>>, CallTargetError> {
        let key = EndKey {
            integration: id,
            session,
            target,
            return_type: Some(return_type),
        };
        if let Some(entry) = self.async_end.get(&key) {
            return Ok(entry.clone());
        }

        let cb = match descriptor.on_async_method_end.as_ref() {
            Some(cb) => cb,
            None => {
                debug!(integration = %descriptor.name, "integration does not hook async method end");
                return Ok(self.async_end.entry(key).or_insert(None).clone());
            }
        };
        if cb.returns != CallbackReturnKind::AsyncReturn {
            return Err(CallTargetError::ReturnTypeMismatch {
                integration: descriptor.name.clone(),
                callback: ASYNC_END_METHOD,
                detail: format!(
                    "an async end callback must return the continuation value, found {:?}",
                    cb.returns
                ),
            });
        }

        debug!(
            integration = %descriptor.name,
            target = %self.duck.types().name_of(target),
            "creating async end trampoline"
        );
        let plan = reconcile_end(
            &self.duck,
            &descriptor.name,
            ASYNC_END_METHOD,
            cb,
            target,
            Some(return_type),
        )?;
        let invoker = Arc::new(AsyncEndInvoker {
            entry: end_entry(
                self.duck.types().clone(),
                descriptor.name.clone(),
                ASYNC_END_METHOD,
                cb.invoke.clone(),
                plan,
                true,
            ),
            preserve_context: cb.preserve_context,
        });
        debug!(integration = %descriptor.name, "created async end trampoline");
        Ok(self.async_end.entry(key).or_insert(Some(invoker)).clone())
    }
}

/// Prepare one value per the plan's adapter
///
/// Null instances pass through unproxied: the callback observes the
/// null instead of a proxy over nothing, mirroring the exception path
/// where the return value never materialized.
fn adapt(
    types: &Arc<TypeRegistry>,
    adapter: &ArgAdapter,
    value: &Value,
) -> Result<CallbackValue, CallTargetError> {
    match adapter {
        ArgAdapter::PassThrough => Ok(CallbackValue::Raw(value.clone())),
        ArgAdapter::EnumCast(to) => match value {
            Value::Enum { raw, .. } => Ok(CallbackValue::Raw(Value::Enum {
                type_id: *to,
                raw: *raw,
            })),
            other => Err(DuckTypeError::InvalidTypeConversion {
                from: match other.type_id() {
                    Some(id) => types.name_of(id),
                    None => String::from("null"),
                },
                to: types.name_of(*to),
            }
            .into()),
        },
        ArgAdapter::WrapProxy(proxy_type) => {
            if value.is_null() {
                return Ok(CallbackValue::Raw(Value::Null));
            }
            Ok(CallbackValue::Proxy(proxy_type.instantiate(value.clone())?))
        }
        ArgAdapter::BoxAndWrap(proxy_type) => {
            if value.is_null() {
                return Ok(CallbackValue::Raw(Value::Null));
            }
            let boxed = types.box_value(value)?;
            Ok(CallbackValue::Proxy(proxy_type.instantiate(boxed)?))
        }
    }
}

/// Unwrap a callback's result value back to the raw return value
fn unwrap_result_value(
    integration: &str,
    callback: &'static str,
    value: CallbackValue,
) -> Result<Value, CallTargetError> {
    match value {
        CallbackValue::Raw(value) => Ok(value),
        // A proxied return value goes back to the caller as the original
        // instance, never as the proxy.
        CallbackValue::Proxy(proxy) => Ok(proxy.raw().clone()),
        CallbackValue::Exception(_) | CallbackValue::State(_) => {
            Err(CallTargetError::CallbackResultMismatch {
                integration: integration.to_string(),
                callback,
                expected: "return value",
            })
        }
    }
}

fn begin_entry(
    types: Arc<TypeRegistry>,
    integration: String,
    invoke: CallbackFn,
    plan: GenericBindingPlan,
) -> BeginFn {
    let GenericBindingPlan {
        loads_instance,
        instance_adapter,
        arg_adapters,
        ..
    } = plan;
    Box::new(move |instance, args| {
        if args.len() != arg_adapters.len() {
            return Err(CallTargetError::ArgumentCountMismatch {
                integration: integration.clone(),
                expected: arg_adapters.len(),
                provided: args.len(),
            });
        }
        let mut values = Vec::with_capacity(args.len() + 1);
        if loads_instance {
            values.push(adapt(&types, &instance_adapter, instance)?);
        }
        for (value, adapter) in args.iter().zip(&arg_adapters) {
            values.push(adapt(&types, adapter, value)?);
        }
        match invoke(&values) {
            CallbackResult::State(state) => Ok(state),
            _ => Err(CallTargetError::CallbackResultMismatch {
                integration: integration.clone(),
                callback: BEGIN_METHOD,
                expected: "call state",
            }),
        }
    })
}

fn end_entry(
    types: Arc<TypeRegistry>,
    integration: String,
    callback: &'static str,
    invoke: CallbackFn,
    plan: GenericBindingPlan,
    expect_async: bool,
) -> EndFn {
    let GenericBindingPlan {
        loads_instance,
        instance_adapter,
        return_adapter,
        ..
    } = plan;
    Box::new(move |instance, return_value, exception, state| {
        let mut values = Vec::with_capacity(4);
        if loads_instance {
            values.push(adapt(&types, &instance_adapter, instance)?);
        }
        if let Some(adapter) = &return_adapter {
            let raw = return_value.cloned().unwrap_or(Value::Null);
            values.push(adapt(&types, adapter, &raw)?);
        }
        values.push(CallbackValue::Exception(exception.cloned()));
        values.push(CallbackValue::State(state));
        let result = invoke(&values);
        if expect_async {
            match result {
                CallbackResult::AsyncReturn(value) => Ok(CallTargetReturn::new(
                    unwrap_result_value(&integration, callback, value)?,
                )),
                _ => Err(CallTargetError::CallbackResultMismatch {
                    integration: integration.clone(),
                    callback,
                    expected: "continuation value",
                }),
            }
        } else {
            match result {
                CallbackResult::Return(Some(value)) => Ok(CallTargetReturn::new(
                    unwrap_result_value(&integration, callback, value)?,
                )),
                CallbackResult::Return(None) => Ok(CallTargetReturn::unmodified()),
                _ => Err(CallTargetError::CallbackResultMismatch {
                    integration: integration.clone(),
                    callback,
                    expected: "return wrapper",
                }),
            }
        }
    })
}
