//! Chorus SDK
//!
//! Shared library providing the error type, wire types and stream decoder
//! used by the gateway engine and by clients of its HTTP API.

/// Error types and handling
pub mod errors;

/// Request, result and event types
pub mod types;

/// Incremental event stream decoding
pub mod stream;

// Re-export commonly used types
pub use errors::{GatewayError, GatewayErrorExt};
pub use stream::{decode_all, EventStreamDecoder};
pub use types::{ChatRequest, InvocationResult, StreamEvent, SynthesisOutcome};
