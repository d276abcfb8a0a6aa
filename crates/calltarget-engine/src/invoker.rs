//! Call-site invoker facade
//!
//! The surface the native instrumentation layer talks to. On the first
//! encounter of a call site it generates (or fetches) the trampoline;
//! on every later call it goes straight to the cached entry point.
//!
//! Failure policy: a generation failure disables the offending
//! integration and the site behaves as if uninstrumented: the default
//! wrapper is returned and nothing is thrown into application code.
//! Errors from the generated trampoline body at call time are NOT
//! swallowed here; they propagate to the native caller, which decides
//! whether to disable the integration going forward.

use crate::callbacks::IntegrationDescriptor;
use crate::error::CallTargetError;
use crate::mapper::{AsyncEndInvoker, IntegrationMapper, SessionId};
use crate::registry::{IntegrationId, IntegrationRegistry};
use crate::settings::InstrumentationSettings;
use crate::state::{CallTargetReturn, CallTargetState, ExceptionInfo};
use calltarget_duck::ProxyCache;
use calltarget_types::{ShapeRegistry, TypeId, TypeRegistry, Value};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::warn;

static GLOBAL: Lazy<CallTargetInvoker> =
    Lazy::new(|| CallTargetInvoker::with_settings(InstrumentationSettings::from_env()));

/// Process-level entry point for instrumented call sites
pub struct CallTargetInvoker {
    duck: Arc<ProxyCache>,
    integrations: IntegrationRegistry,
    mapper: IntegrationMapper,
}

impl CallTargetInvoker {
    /// An invoker with fresh registries and default settings
    pub fn new() -> Self {
        Self::with_settings(InstrumentationSettings::default())
    }

    /// An invoker with fresh registries and the given settings
    pub fn with_settings(settings: InstrumentationSettings) -> Self {
        Self::with_registries(
            Arc::new(TypeRegistry::new()),
            Arc::new(ShapeRegistry::new()),
            settings,
        )
    }

    /// An invoker over shared registries
    pub fn with_registries(
        types: Arc<TypeRegistry>,
        shapes: Arc<ShapeRegistry>,
        settings: InstrumentationSettings,
    ) -> Self {
        let duck = ProxyCache::new(types, shapes);
        Self {
            mapper: IntegrationMapper::new(duck.clone()),
            integrations: IntegrationRegistry::with_settings(settings),
            duck,
        }
    }

    /// The shared process-wide invoker, configured from the environment
    pub fn global() -> &'static CallTargetInvoker {
        &GLOBAL
    }

    /// The type registry the engine resolves against
    pub fn types(&self) -> &Arc<TypeRegistry> {
        self.duck.types()
    }

    /// The shape registry the engine resolves against
    pub fn shapes(&self) -> &Arc<ShapeRegistry> {
        self.duck.shapes()
    }

    /// The duck-typing cache
    pub fn duck(&self) -> &Arc<ProxyCache> {
        &self.duck
    }

    /// The trampoline mapper
    pub fn mapper(&self) -> &IntegrationMapper {
        &self.mapper
    }

    /// The integration registry
    pub fn integrations(&self) -> &IntegrationRegistry {
        &self.integrations
    }

    /// Register an integration's callbacks
    pub fn register_integration(
        &self,
        descriptor: IntegrationDescriptor,
    ) -> Result<IntegrationId, CallTargetError> {
        self.integrations.register(descriptor)
    }

    /// Run the begin hook for a call site
    ///
    /// Returns the default state when the integration is disabled, does
    /// not hook this point, or failed generation (the integration is
    /// then disabled). Call-time errors propagate.
    pub fn begin(
        &self,
        id: IntegrationId,
        session: SessionId,
        target: TypeId,
        instance: &Value,
        args: &[Value],
        arg_types: &[TypeId],
    ) -> Result<CallTargetState, CallTargetError> {
        if !self.integrations.is_enabled(id) {
            return Ok(CallTargetState::default());
        }
        let descriptor = self.integrations.descriptor(id)?;
        match self
            .mapper
            .create_begin_invoker(id, &descriptor, session, target, arg_types)
        {
            Ok(Some(invoker)) => invoker.invoke(instance, args),
            Ok(None) => Ok(CallTargetState::default()),
            Err(error) => {
                self.disable_after_error(id, &descriptor.name, &error);
                Ok(CallTargetState::default())
            }
        }
    }

    /// Run the end hook for a call site
    pub fn end(
        &self,
        id: IntegrationId,
        session: SessionId,
        target: TypeId,
        return_type: Option<TypeId>,
        instance: &Value,
        return_value: Option<&Value>,
        exception: Option<&ExceptionInfo>,
        state: CallTargetState,
    ) -> Result<CallTargetReturn, CallTargetError> {
        if !self.integrations.is_enabled(id) {
            return Ok(CallTargetReturn::unmodified());
        }
        let descriptor = self.integrations.descriptor(id)?;
        match self
            .mapper
            .create_end_invoker(id, &descriptor, session, target, return_type)
        {
            Ok(Some(invoker)) => invoker.invoke(instance, return_value, exception, state),
            Ok(None) => Ok(CallTargetReturn::unmodified()),
            Err(error) => {
                self.disable_after_error(id, &descriptor.name, &error);
                Ok(CallTargetReturn::unmodified())
            }
        }
    }

    /// Run the async end hook when the instrumented task completes
    pub fn async_end(
        &self,
        id: IntegrationId,
        session: SessionId,
        target: TypeId,
        return_type: TypeId,
        instance: &Value,
        return_value: Option<&Value>,
        exception: Option<&ExceptionInfo>,
        state: CallTargetState,
    ) -> Result<CallTargetReturn, CallTargetError> {
        if !self.integrations.is_enabled(id) {
            return Ok(CallTargetReturn::unmodified());
        }
        let descriptor = self.integrations.descriptor(id)?;
        match self
            .mapper
            .create_async_end_invoker(id, &descriptor, session, target, return_type)
        {
            Ok(Some(invoker)) => invoker.invoke(instance, return_value, exception, state),
            Ok(None) => Ok(CallTargetReturn::unmodified()),
            Err(error) => {
                self.disable_after_error(id, &descriptor.name, &error);
                Ok(CallTargetReturn::unmodified())
            }
        }
    }

    /// The cached async-end entry, for callers that need the
    /// continuation flags before scheduling
    pub fn async_end_invoker(
        &self,
        id: IntegrationId,
        session: SessionId,
        target: TypeId,
        return_type: TypeId,
    ) -> Result<Option<Arc<AsyncEndInvoker>>, CallTargetError> {
        let descriptor = self.integrations.descriptor(id)?;
        self.mapper
            .create_async_end_invoker(id, &descriptor, session, target, return_type)
    }

    fn disable_after_error(&self, id: IntegrationId, name: &str, error: &CallTargetError) {
        warn!(
            integration = name,
            error = %error,
            "trampoline generation failed; disabling integration"
        );
        self.integrations.disable(id, &error.to_string());
    }
}

impl Default for CallTargetInvoker {
    fn default() -> Self {
        Self::new()
    }
}
