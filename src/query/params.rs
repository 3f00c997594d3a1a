//! Parameter extraction: split the merged plan into one or more server
//! request descriptors plus the client-only residual plan.
//!
//! The walk is strictly ordered. The first op that cannot be pushed
//! server-side flips the builder into residual mode and every later op joins
//! the residual at its original position, so operator ordering semantics are
//! preserved exactly.

use tracing::debug;

use crate::error::{QueryError, Result};
use crate::expr::{CompareOp, Expr};
use crate::types::ColumnMap;
use crate::value::Value;

use super::ops::Selector;
use super::plan::{PlanOp, QueryPlan};
use super::request::{Filter, FilterOperator, FilterSet, SortDirective, TableRequest};

/// Options influencing descriptor construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParamOptions {
    /// The streamer will deduplicate by full-row identity rather than the
    /// identifier column; column pruning must not hide compared fields.
    pub full_row_identity: bool,
}

/// Output of parameter extraction.
#[derive(Debug)]
pub struct QueryParameters<R> {
    /// One descriptor per physical request, OR'd across filter sets.
    pub requests: Vec<TableRequest>,
    /// Client-only plan fragment, in original op order.
    pub residual: Vec<PlanOp<R>>,
}

#[derive(Clone, Copy, PartialEq, PartialOrd)]
enum Phase {
    Filtering,
    Shaping,
    Paging,
}

/// Accumulated server-side parameter state.
struct BuilderState {
    filter_sets: Vec<FilterSet>,
    properties: Option<Vec<String>>,
    prune: bool,
    sort: Option<SortDirective>,
    start: Option<usize>,
    count: Option<usize>,
    has_illegal_server_filters: bool,
}

impl BuilderState {
    fn new() -> Self {
        Self {
            filter_sets: Vec::new(),
            properties: None,
            prune: true,
            sort: None,
            start: None,
            count: None,
            has_illegal_server_filters: false,
        }
    }
}

/// Consumes the merged plan and returns the request descriptors plus the
/// residual plan.
pub fn build_parameters<R>(
    plan: QueryPlan<R>,
    columns: &dyn ColumnMap,
    options: ParamOptions,
) -> Result<QueryParameters<R>> {
    let mut state = BuilderState::new();
    let mut residual: Vec<PlanOp<R>> = Vec::new();
    let mut deferred = false;
    let mut custom_seen = false;
    let mut phase = Phase::Filtering;

    let ops = plan.ops;
    // Lookahead used by the take push rule: whether any later op filters.
    let mut filtering_after = vec![false; ops.len()];
    let mut seen = false;
    for index in (0..ops.len()).rev() {
        filtering_after[index] = seen;
        if matches!(ops[index], PlanOp::Filter(_) | PlanOp::Custom(_)) {
            seen = true;
        }
    }

    for (index, op) in ops.into_iter().enumerate() {
        let rest_filters = filtering_after[index];
        match op {
            PlanOp::Filter(expr) => {
                if deferred || phase > Phase::Filtering || !state.filter_sets.is_empty() {
                    residual.push(PlanOp::Filter(expr));
                    deferred = true;
                    continue;
                }
                if let Some(fragment) = decompose(&expr, columns, &mut state)? {
                    state.has_illegal_server_filters = true;
                    residual.push(PlanOp::Filter(fragment));
                    deferred = true;
                }
            }
            PlanOp::Project(selector) => {
                apply_projection(&mut state, &selector);
                if phase < Phase::Shaping {
                    phase = Phase::Shaping;
                }
            }
            PlanOp::OrderBy(spec) => {
                let single_set = state.filter_sets.len() <= 1;
                if deferred || phase == Phase::Paging || spec.keys.len() != 1 || !single_set {
                    residual.push(PlanOp::OrderBy(spec));
                    deferred = true;
                    continue;
                }
                let key = &spec.keys[0];
                let column = resolve_column(columns, &key.property)?;
                state.sort = Some(SortDirective {
                    column,
                    direction: key.direction,
                });
                phase = Phase::Shaping;
            }
            PlanOp::ThenBy(_) => {
                return Err(QueryError::Invalid("unmerged then_by in plan"));
            }
            PlanOp::Skip(n) => {
                if !deferred
                    && state.filter_sets.len() <= 1
                    && state.start.is_none()
                    && state.count.is_none()
                {
                    state.start = Some(n);
                    phase = Phase::Paging;
                } else {
                    residual.push(PlanOp::Skip(n));
                    deferred = true;
                }
            }
            PlanOp::Take(n) => {
                if !deferred
                    && !state.has_illegal_server_filters
                    && state.filter_sets.len() <= 1
                    && state.count.is_none()
                    && !rest_filters
                {
                    state.count = Some(n);
                    phase = Phase::Paging;
                } else {
                    residual.push(PlanOp::Take(n));
                    deferred = true;
                }
            }
            PlanOp::Custom(custom) => {
                residual.push(PlanOp::Custom(custom));
                deferred = true;
                custom_seen = true;
            }
        }
    }

    if state.filter_sets.is_empty() {
        state.filter_sets.push(FilterSet::default());
    }
    let fan_out = state.filter_sets.len() > 1;

    // A client-side transform may read any column; so may an opaque residual
    // predicate. Either disables pruning, as does full-row dedup identity
    // across requests.
    if custom_seen || (fan_out && options.full_row_identity) {
        state.prune = false;
    }
    let columns_list = resolve_columns(&state, &residual, columns, fan_out);

    let requests: Vec<TableRequest> = state
        .filter_sets
        .iter()
        .map(|set| TableRequest {
            filters: set.clone(),
            columns: columns_list.clone(),
            sort: state.sort.clone(),
            start: state.start,
            count: state.count,
        })
        .collect();

    debug!(
        requests = requests.len(),
        residual_ops = residual.len(),
        illegal_server_filters = state.has_illegal_server_filters,
        "extracted query parameters"
    );

    Ok(QueryParameters { requests, residual })
}

/// Derives the final `columns=` list, or `None` when pruning is off.
fn resolve_columns<R>(
    state: &BuilderState,
    residual: &[PlanOp<R>],
    columns: &dyn ColumnMap,
    fan_out: bool,
) -> Option<Vec<String>> {
    if !state.prune {
        return None;
    }
    let properties = state.properties.as_ref()?;

    // Residual ops read properties the projection may not list; those must
    // still come back from the server.
    let mut needed: Vec<String> = properties.clone();
    for op in residual {
        match op {
            PlanOp::Filter(expr) => {
                if expr_has_opaque(expr) {
                    return None;
                }
                expr.referenced_properties(&mut needed);
            }
            PlanOp::OrderBy(spec) => {
                for key in &spec.keys {
                    if !needed.iter().any(|p| p == &key.property) {
                        needed.push(key.property.clone());
                    }
                }
            }
            _ => {}
        }
    }

    let mut out: Vec<String> = Vec::with_capacity(needed.len() + 1);
    if fan_out {
        // Cross-request dedup always needs the identifier column.
        out.push(columns.id_column().to_owned());
    }
    for property in &needed {
        let Some(column) = columns.column(property) else {
            // No mapping means the column cannot be requested by name;
            // fall back to fetching everything.
            return None;
        };
        if !out.iter().any(|c| c == column) {
            out.push(column.to_owned());
        }
    }
    Some(out)
}

fn apply_projection(state: &mut BuilderState, selector: &Selector) {
    if !selector.reshape_only {
        state.prune = false;
    }
    match &mut state.properties {
        Some(existing) => {
            for property in &selector.properties {
                if !existing.iter().any(|p| p == property) {
                    existing.push(property.clone());
                }
            }
        }
        None => state.properties = Some(selector.properties.clone()),
    }
}

fn resolve_column(columns: &dyn ColumnMap, property: &str) -> Result<String> {
    columns
        .column(property)
        .map(str::to_owned)
        .ok_or_else(|| QueryError::UnmappedProperty {
            property: property.to_owned(),
        })
}

fn expr_has_opaque(expr: &Expr) -> bool {
    match expr {
        Expr::Opaque(_) => true,
        Expr::Property(_) | Expr::Literal(_) | Expr::Thunk(_) => false,
        Expr::Compare { lhs, rhs, .. } | Expr::Arith { lhs, rhs, .. } => {
            expr_has_opaque(lhs) || expr_has_opaque(rhs)
        }
        Expr::Contains { haystack, needle } => {
            expr_has_opaque(haystack) || expr_has_opaque(needle)
        }
        Expr::And(a, b) | Expr::Or(a, b) => expr_has_opaque(a) || expr_has_opaque(b),
        Expr::Not(inner) | Expr::Boxed(inner) => expr_has_opaque(inner),
        Expr::List(items) => items.iter().any(expr_has_opaque),
    }
}

/// Splits one filter expression into server filters and a residual fragment.
///
/// AND-conjuncts decompose independently: translatable atoms join every
/// filter set, the first OR-of-equalities on a single property fans out into
/// one set per distinct branch value, and everything else is folded back
/// into a residual conjunction in written order.
fn decompose(
    expr: &Expr,
    columns: &dyn ColumnMap,
    state: &mut BuilderState,
) -> Result<Option<Expr>> {
    let mut conjuncts = Vec::new();
    split_and(expr, &mut conjuncts);

    let mut atoms: Vec<Filter> = Vec::new();
    let mut or_group: Option<(String, String, Vec<Value>)> = None;
    let mut residual: Option<Expr> = None;

    for conjunct in conjuncts {
        if let Some(filter) = translate_atom(conjunct, columns)? {
            atoms.push(filter);
            continue;
        }
        if or_group.is_none() {
            if let Some((property, values)) = match_or_equalities(conjunct) {
                let column = resolve_column(columns, &property)?;
                or_group = Some((property, column, values));
                continue;
            }
        }
        residual = Some(match residual {
            Some(prev) => prev.and(conjunct.clone()),
            None => conjunct.clone(),
        });
    }

    let mut base = FilterSet::default();
    for filter in atoms {
        base.push(filter);
    }
    state.filter_sets = match or_group {
        None => vec![base],
        Some((property, column, values)) => values
            .into_iter()
            .map(|value| {
                let mut set = base.clone();
                set.push(Filter {
                    property: property.clone(),
                    column: column.clone(),
                    op: FilterOperator::Equals,
                    value,
                });
                set
            })
            .collect(),
    };
    Ok(residual)
}

fn split_and<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match unbox(expr) {
        Expr::And(a, b) => {
            split_and(a, out);
            split_and(b, out);
        }
        other => out.push(other),
    }
}

fn unbox(expr: &Expr) -> &Expr {
    match expr {
        Expr::Boxed(inner) => unbox(inner),
        other => other,
    }
}

/// Translates one conjunct into an atomic server filter, if its shape and
/// operator allow. Inclusive comparisons and inequality have no wire form
/// and stay client-side; a translatable shape naming an unmapped property is
/// a fatal configuration error.
fn translate_atom(expr: &Expr, columns: &dyn ColumnMap) -> Result<Option<Filter>> {
    match unbox(expr) {
        Expr::Compare { op, lhs, rhs } => {
            let Some((property, value, swapped)) = prop_and_literal(lhs, rhs) else {
                return Ok(None);
            };
            let op = match (*op, swapped) {
                (CompareOp::Eq, _) => FilterOperator::Equals,
                (CompareOp::Gt, false) | (CompareOp::Lt, true) => FilterOperator::GreaterThan,
                (CompareOp::Lt, false) | (CompareOp::Gt, true) => FilterOperator::LessThan,
                _ => return Ok(None),
            };
            let column = resolve_column(columns, property)?;
            Ok(Some(Filter {
                property: property.to_owned(),
                column,
                op,
                value: value.clone(),
            }))
        }
        Expr::Contains { haystack, needle } => {
            match (unbox(haystack), unbox(needle)) {
                (Expr::Property(property), Expr::Literal(value)) => {
                    let column = resolve_column(columns, property)?;
                    Ok(Some(Filter {
                        property: property.clone(),
                        column,
                        op: FilterOperator::Contains,
                        value: value.clone(),
                    }))
                }
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

fn prop_and_literal<'a>(lhs: &'a Expr, rhs: &'a Expr) -> Option<(&'a str, &'a Value, bool)> {
    match (unbox(lhs), unbox(rhs)) {
        (Expr::Property(property), Expr::Literal(value)) => Some((property, value, false)),
        (Expr::Literal(value), Expr::Property(property)) => Some((property, value, true)),
        _ => None,
    }
}

/// Recognizes an OR tree whose every leaf is an equality of the same
/// property against a literal. Returns the property and the distinct branch
/// values in first-occurrence order.
fn match_or_equalities(expr: &Expr) -> Option<(String, Vec<Value>)> {
    if !matches!(unbox(expr), Expr::Or(_, _)) {
        return None;
    }
    let mut property: Option<String> = None;
    let mut values: Vec<Value> = Vec::new();
    if !collect_or(expr, &mut property, &mut values) {
        return None;
    }
    let property = property?;
    let mut distinct: Vec<Value> = Vec::new();
    for value in values {
        if !distinct.iter().any(|v| v.loose_eq(&value)) {
            distinct.push(value);
        }
    }
    Some((property, distinct))
}

fn collect_or(expr: &Expr, property: &mut Option<String>, values: &mut Vec<Value>) -> bool {
    match unbox(expr) {
        Expr::Or(a, b) => collect_or(a, property, values) && collect_or(b, property, values),
        Expr::Compare {
            op: CompareOp::Eq,
            lhs,
            rhs,
        } => {
            let Some((leaf_property, value, _)) = prop_and_literal(lhs, rhs) else {
                return false;
            };
            match property {
                Some(existing) if existing != leaf_property => return false,
                Some(_) => {}
                None => *property = Some(leaf_property.to_owned()),
            }
            values.push(value.clone());
            true
        }
        _ => false,
    }
}
