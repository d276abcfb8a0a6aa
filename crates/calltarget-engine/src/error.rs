//! Trampoline generation errors
//!
//! Generic-contract violations are integration-author bugs: they are
//! fatal to the single generation request and carry the integration and
//! callback names so the offending shim can be identified and disabled.

use calltarget_duck::DuckTypeError;
use calltarget_types::TypeError;
use thiserror::Error;

/// Errors raised while reconciling signatures and generating trampolines
#[derive(Debug, Clone, Error)]
pub enum CallTargetError {
    /// A duck-typing failure while resolving a shape constraint
    #[error(transparent)]
    Duck(#[from] DuckTypeError),

    /// An underlying type metadata error
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The callback declares the wrong number of parameters for the site
    #[error("The callback '{callback}' of integration '{integration}' declares {declared} parameters but between {minimum} and {maximum} are required")]
    ArityMismatch {
        /// Integration name
        integration: String,
        /// Callback name
        callback: &'static str,
        /// Parameters the callback declares
        declared: usize,
        /// Fewest parameters the site accepts
        minimum: usize,
        /// Most parameters the site accepts
        maximum: usize,
    },

    /// The callback does not declare the leading instance generic
    #[error("The callback '{callback}' of integration '{integration}' does not declare the generic parameter for the instance type")]
    MissingInstanceGeneric {
        /// Integration name
        integration: String,
        /// Callback name
        callback: &'static str,
    },

    /// Declared generic parameters do not line up with the bound slots
    #[error("The callback '{callback}' of integration '{integration}' declares {declared} generic parameters but {bound} were bound")]
    GenericArityMismatch {
        /// Integration name
        integration: String,
        /// Callback name
        callback: &'static str,
        /// Generic parameters the callback declares
        declared: usize,
        /// Slots the call site binds
        bound: usize,
    },

    /// A parameter cannot be bound to the call site's signature
    #[error("Parameter signature mismatch in callback '{callback}' of integration '{integration}': {detail}")]
    ParameterSignatureMismatch {
        /// Integration name
        integration: String,
        /// Callback name
        callback: &'static str,
        /// What failed to bind
        detail: String,
    },

    /// The second-to-last parameter of an end callback must be the
    /// exception
    #[error("The exception parameter of callback '{callback}' of integration '{integration}' is missing")]
    MissingTrailingException {
        /// Integration name
        integration: String,
        /// Callback name
        callback: &'static str,
    },

    /// The last parameter of an end callback must be the call state
    #[error("The call state parameter of callback '{callback}' of integration '{integration}' is missing")]
    MissingTrailingState {
        /// Integration name
        integration: String,
        /// Callback name
        callback: &'static str,
    },

    /// The callback's declared return does not match the lifecycle point
    #[error("Return type mismatch in callback '{callback}' of integration '{integration}': {detail}")]
    ReturnTypeMismatch {
        /// Integration name
        integration: String,
        /// Callback name
        callback: &'static str,
        /// What disagreed
        detail: String,
    },

    /// The callback returned the wrong result kind at call time
    #[error("The callback '{callback}' of integration '{integration}' returned the wrong result kind (expected {expected})")]
    CallbackResultMismatch {
        /// Integration name
        integration: String,
        /// Callback name
        callback: &'static str,
        /// Result kind the trampoline expected
        expected: &'static str,
    },

    /// An integration name did not resolve
    #[error("Unknown integration '{name}'")]
    UnknownIntegration {
        /// The unresolved name
        name: String,
    },

    /// An integration id did not resolve
    #[error("Unknown integration id {id}")]
    UnknownIntegrationId {
        /// The unresolved id
        id: u32,
    },

    /// An integration with the same name is already registered
    #[error("An integration named '{name}' is already registered")]
    DuplicateIntegration {
        /// Name of the conflicting integration
        name: String,
    },

    /// A trampoline was invoked with the wrong number of arguments
    #[error("The trampoline for integration '{integration}' expected {expected} arguments but received {provided}")]
    ArgumentCountMismatch {
        /// Integration name
        integration: String,
        /// Arguments the trampoline was generated for
        expected: usize,
        /// Arguments provided at the call
        provided: usize,
    },
}
