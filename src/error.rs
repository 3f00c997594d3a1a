//! Crate-wide error type.
//!
//! Every fallible operation in the engine returns [`Result`]. Transport and
//! user-closure failures pass through verbatim as boxed errors; the engine
//! never retries, suppresses, or substitutes partial results for them.

use std::sync::Arc;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Boxed error produced by external collaborators (transport, user closures).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured errors emitted by the query engine.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A query operator outside the supported set was used in strict mode.
    /// Unrecoverable; the caller must rewrite the query.
    #[error("unsupported query operator '{kind}'; rewrite the query or run in lenient mode")]
    UnsupportedExpression {
        /// Name of the offending operator.
        kind: String,
    },
    /// A filtered or sorted property has no known remote column mapping.
    #[error("property '{property}' has no remote column mapping")]
    UnmappedProperty {
        /// The logical property name that failed to resolve.
        property: String,
    },
    /// The query chain was constructed incorrectly.
    #[error("invalid query: {0}")]
    Invalid(&'static str),
    /// An in-memory evaluation combined incompatible operand types.
    #[error("cannot apply {op} to {lhs} and {rhs}")]
    TypeMismatch {
        /// Operator being applied.
        op: &'static str,
        /// Type name of the left operand.
        lhs: &'static str,
        /// Type name of the right operand.
        rhs: &'static str,
    },
    /// Arithmetic that cannot produce a representable result.
    #[error("arithmetic error: {0}")]
    Arithmetic(&'static str),
    /// A locally-evaluated caller closure failed. Rethrown verbatim.
    #[error("{0}")]
    Local(BoxError),
    /// The transport layer failed to execute a request. Passed through
    /// unmodified; any descriptor failure aborts the combined enumeration.
    #[error("{0}")]
    Transport(BoxError),
    /// Enumeration was cancelled between descriptors.
    #[error("query cancelled")]
    Cancelled,
    /// A `single` materializer saw a row count other than one.
    #[error("expected exactly one row, found {found}")]
    NotSingle {
        /// Number of rows observed (zero, or two meaning "more than one").
        found: usize,
    },
    /// Terminal error replayed to late cursors of a shared cached sequence.
    #[error("{0}")]
    Shared(Arc<QueryError>),
}

impl QueryError {
    /// Wraps a caller-closure failure.
    pub fn local(err: impl Into<BoxError>) -> Self {
        QueryError::Local(err.into())
    }

    /// Wraps a transport failure.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        QueryError::Transport(err.into())
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::UnsupportedExpression { .. } => "UnsupportedExpression",
            QueryError::UnmappedProperty { .. } => "UnmappedProperty",
            QueryError::Invalid(_) => "Invalid",
            QueryError::TypeMismatch { .. } => "TypeMismatch",
            QueryError::Arithmetic(_) => "Arithmetic",
            QueryError::Local(_) => "Local",
            QueryError::Transport(_) => "Transport",
            QueryError::Cancelled => "Cancelled",
            QueryError::NotSingle { .. } => "NotSingle",
            QueryError::Shared(inner) => inner.code(),
        }
    }
}
