//! Operator chain built by the fluent query API, before planning.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// Sort direction for one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key: a logical property plus direction.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    /// Logical property to sort by.
    pub property: String,
    /// Direction for this key.
    pub direction: SortDirection,
}

impl SortKey {
    /// Convenience constructor.
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }
}

/// Projection selector.
///
/// `reshape_only` marks a selector that merely re-shapes fields already
/// present on the row: only then can the engine derive a minimal column
/// list. A selector that computes values the listed properties do not cover
/// disables column pruning.
#[derive(Clone, Debug, PartialEq)]
pub struct Selector {
    /// Logical properties the projection reads.
    pub properties: Vec<String>,
    /// Whether `properties` covers everything the projection reads.
    pub reshape_only: bool,
}

impl Selector {
    /// Selector that only re-shapes the listed properties.
    pub fn properties<I, P>(props: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            properties: props.into_iter().map(Into::into).collect(),
            reshape_only: true,
        }
    }

    /// Selector with reads the listed properties do not fully cover.
    pub fn computed<I, P>(props: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            properties: props.into_iter().map(Into::into).collect(),
            reshape_only: false,
        }
    }
}

type CustomFn<R> = dyn Fn(Vec<R>) -> Vec<R> + Send + Sync;

/// A named client-side sequence transform: the escape hatch for operators
/// the engine cannot translate. Strict mode rejects these outright; lenient
/// mode runs them in the residual after the fetch.
pub struct CustomOp<R> {
    name: Arc<str>,
    apply: Arc<CustomFn<R>>,
}

impl<R> CustomOp<R> {
    /// Wraps a whole-sequence transform under a diagnostic name.
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Vec<R>) -> Vec<R> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Arc::new(f),
        }
    }

    /// Operator name used in errors and explain output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the transform over materialized rows.
    pub fn apply(&self, rows: Vec<R>) -> Vec<R> {
        (self.apply)(rows)
    }
}

impl<R> Clone for CustomOp<R> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<R> PartialEq for CustomOp<R> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.apply, &other.apply)
    }
}

impl<R> fmt::Debug for CustomOp<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomOp({})", self.name)
    }
}

/// One operator in the caller's fluent chain. Terminal materializers are an
/// execution mode, not chain entries.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceOp<R> {
    /// Row predicate.
    Where(Expr),
    /// Projection.
    Select(Selector),
    /// Primary sort key.
    OrderBy(SortKey),
    /// Secondary sort key; must follow a sort operator.
    ThenBy(SortKey),
    /// Drop the first `n` rows.
    Skip(usize),
    /// Keep at most `n` rows.
    Take(usize),
    /// Untranslatable client-side operator.
    Custom(CustomOp<R>),
}

impl<R> SourceOp<R> {
    /// Operator name for diagnostics.
    pub fn kind(&self) -> &str {
        match self {
            SourceOp::Where(_) => "where",
            SourceOp::Select(_) => "select",
            SourceOp::OrderBy(_) => "order_by",
            SourceOp::ThenBy(_) => "then_by",
            SourceOp::Skip(_) => "skip",
            SourceOp::Take(_) => "take",
            SourceOp::Custom(op) => op.name(),
        }
    }
}
