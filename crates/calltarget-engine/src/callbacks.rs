//! Integration callback descriptors
//!
//! An integration is a unit of instrumentation logic: up to three
//! statically named callbacks (`on_method_begin`, `on_method_end`,
//! `on_async_method_end`) whose declared generic parameters and shape
//! constraints drive trampoline generation. The descriptors here are
//! the load-time registration surface for integration authors.

use crate::state::{CallTargetState, ExceptionInfo};
use calltarget_duck::ProxyInstance;
use calltarget_types::{ShapeId, TypeId, Value};
use std::fmt;
use std::sync::Arc;

/// A value handed to an integration callback
#[derive(Debug, Clone)]
pub enum CallbackValue {
    /// A raw runtime value (unconstrained generic or concrete parameter)
    Raw(Value),
    /// A proxied value (shape-constrained generic parameter)
    Proxy(ProxyInstance),
    /// The exception observed at the call site, if any
    Exception(Option<ExceptionInfo>),
    /// The state produced by the begin callback
    State(CallTargetState),
}

impl CallbackValue {
    /// Borrow the raw value, if this is one
    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            CallbackValue::Raw(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the proxy, if this is one
    pub fn as_proxy(&self) -> Option<&ProxyInstance> {
        match self {
            CallbackValue::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Borrow the exception slot, if this is one
    pub fn as_exception(&self) -> Option<&Option<ExceptionInfo>> {
        match self {
            CallbackValue::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    /// Borrow the call state, if this is one
    pub fn as_state(&self) -> Option<&CallTargetState> {
        match self {
            CallbackValue::State(state) => Some(state),
            _ => None,
        }
    }
}

/// What a callback hands back to its trampoline
#[derive(Debug, Clone)]
pub enum CallbackResult {
    /// Begin callbacks produce the call state
    State(CallTargetState),
    /// End callbacks produce the (possibly proxied) return value, or
    /// `None` to leave the original untouched
    Return(Option<CallbackValue>),
    /// Async end callbacks produce the continuation's return value
    AsyncReturn(CallbackValue),
}

/// The body of an integration callback
pub type CallbackFn = Arc<dyn Fn(&[CallbackValue]) -> CallbackResult + Send + Sync>;

/// One declared generic parameter of a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericParam {
    /// Shape constraint, when the parameter requires duck typing
    pub constraint: Option<ShapeId>,
}

impl GenericParam {
    /// A generic parameter without constraints: binds the concrete type
    pub fn unconstrained() -> Self {
        Self { constraint: None }
    }

    /// A generic parameter constrained to a shape: binds a proxy type
    pub fn constrained(shape: ShapeId) -> Self {
        Self {
            constraint: Some(shape),
        }
    }
}

/// One declared positional parameter of a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackParam {
    /// Typed by the generic parameter at the given slot
    Generic(u8),
    /// Typed by a concrete registered type
    Concrete(TypeId),
    /// The call-site exception (end callbacks only)
    Exception,
    /// The call state (end callbacks only)
    State,
}

/// The declared return of a callback, one per lifecycle point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackReturnKind {
    /// `CallTargetState` (begin)
    State,
    /// Plain return wrapper for void targets (end)
    Return,
    /// Generic return wrapper carrying the return value (end)
    WrappedReturn,
    /// The return value itself (async end)
    AsyncReturn,
}

/// Declared signature and body of one integration callback
#[derive(Clone)]
pub struct CallbackDescriptor {
    /// Declared generic parameters; slot 0 is the instance type
    pub generic_params: Vec<GenericParam>,
    /// Declared positional parameters
    pub params: Vec<CallbackParam>,
    /// Declared return kind
    pub returns: CallbackReturnKind,
    /// Whether an async continuation must preserve the caller's context
    pub preserve_context: bool,
    /// Callback body
    pub invoke: CallbackFn,
}

impl CallbackDescriptor {
    /// A begin callback: produces the call state
    pub fn begin(
        generic_params: Vec<GenericParam>,
        params: Vec<CallbackParam>,
        invoke: CallbackFn,
    ) -> Self {
        Self {
            generic_params,
            params,
            returns: CallbackReturnKind::State,
            preserve_context: false,
            invoke,
        }
    }

    /// An end callback for void targets
    pub fn end_void(
        generic_params: Vec<GenericParam>,
        params: Vec<CallbackParam>,
        invoke: CallbackFn,
    ) -> Self {
        Self {
            generic_params,
            params,
            returns: CallbackReturnKind::Return,
            preserve_context: false,
            invoke,
        }
    }

    /// An end callback carrying the return value
    pub fn end(
        generic_params: Vec<GenericParam>,
        params: Vec<CallbackParam>,
        invoke: CallbackFn,
    ) -> Self {
        Self {
            generic_params,
            params,
            returns: CallbackReturnKind::WrappedReturn,
            preserve_context: false,
            invoke,
        }
    }

    /// An async end callback
    pub fn async_end(
        generic_params: Vec<GenericParam>,
        params: Vec<CallbackParam>,
        invoke: CallbackFn,
    ) -> Self {
        Self {
            generic_params,
            params,
            returns: CallbackReturnKind::AsyncReturn,
            preserve_context: false,
            invoke,
        }
    }

    /// Request that async continuations run on the captured context
    pub fn with_preserve_context(mut self) -> Self {
        self.preserve_context = true;
        self
    }
}

impl fmt::Debug for CallbackDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackDescriptor")
            .field("generic_params", &self.generic_params)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("preserve_context", &self.preserve_context)
            .finish_non_exhaustive()
    }
}

/// Declared callbacks of one integration
#[derive(Debug, Clone)]
pub struct IntegrationDescriptor {
    /// Integration name (configuration key)
    pub name: String,
    /// Name of the integration's declaring type, for diagnostics
    pub type_name: String,
    /// Hook invoked before the instrumented method body
    pub on_method_begin: Option<CallbackDescriptor>,
    /// Hook invoked after the instrumented method body
    pub on_method_end: Option<CallbackDescriptor>,
    /// Hook invoked when the instrumented method's task completes
    pub on_async_method_end: Option<CallbackDescriptor>,
}

impl IntegrationDescriptor {
    /// A descriptor with no hooks; attach callbacks with the `with_*`
    /// methods
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            on_method_begin: None,
            on_method_end: None,
            on_async_method_end: None,
        }
    }

    /// Attach the begin hook
    pub fn with_begin(mut self, callback: CallbackDescriptor) -> Self {
        self.on_method_begin = Some(callback);
        self
    }

    /// Attach the end hook
    pub fn with_end(mut self, callback: CallbackDescriptor) -> Self {
        self.on_method_end = Some(callback);
        self
    }

    /// Attach the async end hook
    pub fn with_async_end(mut self, callback: CallbackDescriptor) -> Self {
        self.on_async_method_end = Some(callback);
        self
    }
}
