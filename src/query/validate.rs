//! Operator-chain validation, run before any other processing.

use crate::error::{QueryError, Result};

use super::ops::SourceOp;

/// How the engine treats operators outside the supported set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strictness {
    /// Reject unsupported operators up front.
    #[default]
    Strict,
    /// Leave unsupported operators in place; they run client-side after the
    /// fetch.
    Lenient,
}

/// Walks every operator in the chain. In strict mode an unsupported
/// operator fails with [`QueryError::UnsupportedExpression`] naming it. A
/// `then_by` that does not directly extend a sort is malformed in both
/// modes. No side effects.
pub fn validate<R>(ops: &[SourceOp<R>], strictness: Strictness) -> Result<()> {
    let mut in_sort_run = false;
    for op in ops {
        match op {
            SourceOp::Custom(custom) => {
                if strictness == Strictness::Strict {
                    return Err(QueryError::UnsupportedExpression {
                        kind: custom.name().to_owned(),
                    });
                }
                in_sort_run = false;
            }
            SourceOp::OrderBy(_) => in_sort_run = true,
            SourceOp::ThenBy(_) => {
                if !in_sort_run {
                    return Err(QueryError::Invalid(
                        "then_by must directly follow order_by or then_by",
                    ));
                }
            }
            _ => in_sort_run = false,
        }
    }
    Ok(())
}
