//! CallTarget trampoline engine
//!
//! Binds instrumented call sites to integration callbacks. Given an
//! integration's declared callbacks and a call site's concrete types,
//! the engine reconciles the callback's generic signature (resolving
//! shape constraints to synthesized proxy types), generates an
//! executable trampoline once, and caches it; every later call at the
//! site is a direct invocation with no reflection or synthesis.
//!
//! Generation failures disable only the offending integration: the
//! instrumented site then behaves exactly as if it had never been
//! instrumented.

#![warn(missing_docs)]

pub mod callbacks;
pub mod error;
pub mod invoker;
pub mod mapper;
pub mod reconciler;
pub mod registry;
pub mod settings;
pub mod state;

pub use callbacks::{
    CallbackDescriptor, CallbackFn, CallbackParam, CallbackResult, CallbackReturnKind,
    CallbackValue, GenericParam, IntegrationDescriptor,
};
pub use error::CallTargetError;
pub use invoker::CallTargetInvoker;
pub use mapper::{AsyncEndInvoker, BeginInvoker, EndInvoker, IntegrationMapper, SessionId};
pub use reconciler::{ArgAdapter, GenericBinding, GenericBindingPlan};
pub use registry::{IntegrationId, IntegrationRegistry, IntegrationState};
pub use settings::InstrumentationSettings;
pub use state::{CallTargetReturn, CallTargetState, ExceptionInfo};
