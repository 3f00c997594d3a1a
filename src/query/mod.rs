//! Query translation pipeline.
//!
//! Per execution: validate the operator chain, partially evaluate filter
//! expressions, build and merge the plan IR, extract server request
//! descriptors plus the client-only residual, stream the requests with
//! deduplication, then run the residual in memory.

/// Shared caching wrapper for re-enumerable result sequences.
pub mod cache;

/// Fluent operator chain types.
pub mod ops;

/// Parameter extraction: server descriptors and the client-only residual.
pub mod params;

/// Plan IR, plan building, and merging.
pub mod plan;

/// Provider orchestration and materializers.
pub mod provider;

/// Request descriptors and wire rendering.
pub mod request;

/// Sequential deduplicating result streamer.
pub mod stream;

/// Operator-chain validation.
pub mod validate;

pub use provider::{TableClient, TableQuery};
