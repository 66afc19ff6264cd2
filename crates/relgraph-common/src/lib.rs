//! Common utilities shared across the relgraph crates: the error taxonomy,
//! the scalar `Property` coercion type, and connection resilience
//! primitives shared by every network-facing adapter.

pub mod error;
pub mod retry;
pub mod value;

pub use error::{RelGraphError, Result};
pub use retry::{OperationTimeouts, RetryConfig};
pub use value::{coerce, Coerced, Property, RawValue, DEFAULT_STRING_CAP};
