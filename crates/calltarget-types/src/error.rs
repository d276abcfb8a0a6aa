//! Type metadata errors

use thiserror::Error;

/// Errors raised by the type registry and by member invokers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeError {
    /// A type id does not resolve to a registered descriptor
    #[error("Unknown type id {id}")]
    UnknownType {
        /// The unresolved id
        id: u32,
    },

    /// A shape id does not resolve to a registered shape
    #[error("Unknown shape id {id}")]
    UnknownShape {
        /// The unresolved id
        id: u32,
    },

    /// A type with the same name is already registered
    #[error("A type named '{name}' is already registered")]
    DuplicateType {
        /// Name of the conflicting type
        name: String,
    },

    /// A shape with the same name is already registered
    #[error("A shape named '{name}' is already registered")]
    DuplicateShape {
        /// Name of the conflicting shape
        name: String,
    },

    /// Boxing was requested for a value type without a copy function
    #[error("The value type '{name}' does not provide a copy function")]
    NotCloneable {
        /// Name of the value type
        name: String,
    },

    /// A member invoker received a value whose payload is not the type it
    /// was registered for
    #[error("Receiver mismatch: expected an instance of {expected}")]
    ReceiverMismatch {
        /// Rust type the invoker expected
        expected: &'static str,
    },

    /// A member invoker received an argument it cannot interpret
    #[error("Invalid argument for member '{member}': {detail}")]
    InvalidArgument {
        /// Member the argument was passed to
        member: String,
        /// What was wrong with it
        detail: String,
    },
}
