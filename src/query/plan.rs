//! Plan IR: the ordered intermediate representation of a validated operator
//! chain, plus the merge pass that normalizes it.

use crate::expr::Expr;

use super::ops::{CustomOp, Selector, SortKey, SourceOp};

/// Multi-key sort specification. Always holds at least one key.
#[derive(Clone, Debug, PartialEq)]
pub struct SortSpec {
    /// Sort keys in priority order.
    pub keys: Vec<SortKey>,
}

impl SortSpec {
    /// Single-key sort.
    pub fn single(key: SortKey) -> Self {
        Self { keys: vec![key] }
    }
}

/// One IR node. Mirrors the supported operator set; terminal materializers
/// never appear here.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanOp<R> {
    /// Row predicate.
    Filter(Expr),
    /// Projection.
    Project(Selector),
    /// Sort; holds every key after merging.
    OrderBy(SortSpec),
    /// Secondary sort key awaiting merge into the preceding `OrderBy`.
    ThenBy(SortKey),
    /// Drop the first `n` rows.
    Skip(usize),
    /// Keep at most `n` rows.
    Take(usize),
    /// Untranslatable client-side operator (lenient mode only).
    Custom(CustomOp<R>),
}

impl<R> PlanOp<R> {
    /// Operator name for explain output.
    pub fn kind(&self) -> &str {
        match self {
            PlanOp::Filter(_) => "filter",
            PlanOp::Project(_) => "project",
            PlanOp::OrderBy(_) => "order_by",
            PlanOp::ThenBy(_) => "then_by",
            PlanOp::Skip(_) => "skip",
            PlanOp::Take(_) => "take",
            PlanOp::Custom(op) => op.name(),
        }
    }
}

/// Ordered sequence of IR nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan<R> {
    /// IR nodes in chain order.
    pub ops: Vec<PlanOp<R>>,
}

/// Lowers the operator chain into the IR, one node per operator.
pub fn build_plan<R>(ops: &[SourceOp<R>]) -> QueryPlan<R> {
    let ops = ops
        .iter()
        .map(|op| match op {
            SourceOp::Where(expr) => PlanOp::Filter(expr.clone()),
            SourceOp::Select(selector) => PlanOp::Project(selector.clone()),
            SourceOp::OrderBy(key) => PlanOp::OrderBy(SortSpec::single(key.clone())),
            SourceOp::ThenBy(key) => PlanOp::ThenBy(key.clone()),
            SourceOp::Skip(n) => PlanOp::Skip(*n),
            SourceOp::Take(n) => PlanOp::Take(*n),
            SourceOp::Custom(custom) => PlanOp::Custom(custom.clone()),
        })
        .collect();
    QueryPlan { ops }
}

/// Collapses adjacent compatible nodes: consecutive filters combine into one
/// AND (written order preserved, so short-circuit semantics hold), and
/// `ThenBy` runs fold into the preceding `OrderBy` key list.
///
/// Idempotent: merging a merged plan yields a structurally equal plan, and a
/// plan with nothing to merge is returned unchanged.
pub fn merge<R>(plan: QueryPlan<R>) -> QueryPlan<R> {
    if !has_adjacent_merge(&plan) {
        return plan;
    }
    let mut out: Vec<PlanOp<R>> = Vec::with_capacity(plan.ops.len());
    for op in plan.ops {
        match (out.last_mut(), op) {
            (Some(PlanOp::Filter(prev)), PlanOp::Filter(next)) => {
                let lhs = std::mem::replace(prev, Expr::Literal(crate::value::Value::Null));
                *prev = lhs.and(next);
            }
            (Some(PlanOp::OrderBy(spec)), PlanOp::ThenBy(key)) => {
                spec.keys.push(key);
            }
            (_, op) => out.push(op),
        }
    }
    QueryPlan { ops: out }
}

fn has_adjacent_merge<R>(plan: &QueryPlan<R>) -> bool {
    plan.ops.windows(2).any(|pair| {
        matches!(
            pair,
            [PlanOp::Filter(_), PlanOp::Filter(_)] | [PlanOp::OrderBy(_), PlanOp::ThenBy(_)]
        )
    })
}
