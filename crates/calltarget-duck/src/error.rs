//! Duck typing errors
//!
//! Every variant carries enough structural detail (shape name, member
//! name, concrete type name) to diagnose a library-version mismatch from
//! the message alone.

use calltarget_types::TypeError;
use thiserror::Error;

/// Errors raised while matching shapes or operating proxies
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DuckTypeError {
    /// An underlying type metadata error
    #[error(transparent)]
    Type(#[from] TypeError),

    /// A required member has no compatible counterpart in the target type
    #[error("The member '{member}' required by shape '{shape}' was not found in type '{target}'")]
    MemberNotFound {
        /// Shape requiring the member
        shape: String,
        /// Required member name
        member: String,
        /// Concrete type searched
        target: String,
    },

    /// The target member cannot satisfy the requested access direction
    #[error("The member '{member}' of type '{target}' cannot satisfy the {direction} access required by shape '{shape}'")]
    DirectionMismatch {
        /// Shape requiring the member
        shape: String,
        /// Required member name
        member: String,
        /// Concrete type searched
        target: String,
        /// Direction that could not be satisfied
        direction: &'static str,
    },

    /// Two target members satisfy one shape member equally well
    #[error("The member '{member}' required by shape '{shape}' matches at least two members in type '{target}': '{first}' and '{second}'")]
    AmbiguousMatch {
        /// Shape requiring the member
        shape: String,
        /// Required member name
        member: String,
        /// Concrete type searched
        target: String,
        /// First tied candidate
        first: String,
        /// Second tied candidate
        second: String,
    },

    /// The shape id does not resolve to a registered shape
    #[error("The proxy type definition is missing (shape id {shape})")]
    ProxyTypeDefinitionIsNull {
        /// The unresolved shape id
        shape: u32,
    },

    /// A proxy was constructed over the null value
    #[error("The target object instance is null")]
    TargetObjectInstanceIsNull,

    /// The shape or the target type is not publicly visible
    #[error("The type '{name}' must be public ({argument})")]
    TypeIsNotPublic {
        /// Offending type or shape name
        name: String,
        /// Which argument was not public
        argument: &'static str,
    },

    /// A write went through a proxy over a value type
    #[error("Modifying struct members is not supported [{target}]")]
    StructMembersCannotBeChanged {
        /// The value type behind the proxy
        target: String,
    },

    /// A value could not be converted to the bound member's type
    #[error("Invalid type conversion from {from} to {to}")]
    InvalidTypeConversion {
        /// Source type name
        from: String,
        /// Destination type name
        to: String,
    },

    /// A proxy method was called with the wrong number of arguments
    #[error("The member '{member}' expects {expected} arguments but {provided} were provided")]
    MemberArgumentCount {
        /// Member being invoked
        member: String,
        /// Declared parameter count
        expected: usize,
        /// Arguments provided at the call
        provided: usize,
    },

    /// A member was used as the wrong kind (method vs property)
    #[error("The member '{member}' is not a {expected}")]
    MemberKindMismatch {
        /// Member being used
        member: String,
        /// Kind the caller expected
        expected: &'static str,
    },

    /// The owning proxy cache was dropped before a nested proxy could be
    /// created
    #[error("The proxy cache was dropped before a nested proxy for '{member}' could be created")]
    CacheUnavailable {
        /// Member whose result needed the nested proxy
        member: String,
    },
}
