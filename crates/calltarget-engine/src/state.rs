//! Call-site carrier structs
//!
//! The wrappers exchanged with the native instrumentation layer. Both
//! are plain carriers with no behavior of their own: a begin trampoline
//! produces a [`CallTargetState`], an end trampoline consumes it and
//! produces a [`CallTargetReturn`].

use calltarget_types::Value;
use std::fmt;
use std::time::Instant;

/// State flowing from a begin callback to the matching end callback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallTargetState {
    scope: Option<Value>,
    state: Option<Value>,
    start_time: Option<Instant>,
}

impl CallTargetState {
    /// State carrying an opaque scope reference
    pub fn with_scope(scope: Value) -> Self {
        Self {
            scope: Some(scope),
            state: None,
            start_time: None,
        }
    }

    /// State carrying an opaque per-call value
    pub fn with_state(state: Value) -> Self {
        Self {
            scope: None,
            state: Some(state),
            start_time: None,
        }
    }

    /// State carrying both a scope and a per-call value
    pub fn new(scope: Option<Value>, state: Option<Value>) -> Self {
        Self {
            scope,
            state,
            start_time: None,
        }
    }

    /// Record the call start time
    pub fn with_start_time(mut self, start_time: Instant) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// The opaque scope reference, if any
    pub fn scope(&self) -> Option<&Value> {
        self.scope.as_ref()
    }

    /// The opaque per-call value, if any
    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    /// The recorded call start time, if any
    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }
}

/// Return-value wrapper produced by an end trampoline
///
/// `value` is the (possibly replaced) return value to hand back to the
/// instrumented caller; `None` leaves the original return value
/// untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallTargetReturn {
    value: Option<Value>,
}

impl CallTargetReturn {
    /// Keep the instrumented method's original return value
    pub fn unmodified() -> Self {
        Self { value: None }
    }

    /// Replace the return value
    pub fn new(value: Value) -> Self {
        Self { value: Some(value) }
    }

    /// The replacement return value, if any
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Consume the wrapper
    pub fn into_value(self) -> Option<Value> {
        self.value
    }
}

/// The exception observed at an instrumented call site, if any
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionInfo {
    /// Exception type name as reported by the caller
    pub type_name: String,
    /// Exception message
    pub message: String,
}

impl ExceptionInfo {
    /// Build an exception record
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}
