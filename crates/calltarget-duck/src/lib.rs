//! Structural duck typing
//!
//! Matches shape contracts against concrete type descriptors and
//! synthesizes proxy types: adapter values whose members forward to the
//! bound members of a wrapped instance. Synthesis happens once per
//! `(shape, target type)` pair and the result is cached for the cache's
//! lifetime; after that, going through a proxy is a direct call through
//! a function-pointer table.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod matcher;
pub mod proxy;

pub use cache::ProxyCache;
pub use error::DuckTypeError;
pub use matcher::{match_shape, BoundMember, Conversion, MemberBinding, MemberBindingSet};
pub use proxy::{DuckValue, ProxyInstance, ProxyType};
