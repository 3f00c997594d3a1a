//! Provider orchestration: the fluent query builder, the execution
//! pipeline, and the terminal materializers.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;
use xxhash_rust::xxh64::xxh64;

use crate::error::{QueryError, Result};
use crate::expr::eval::eval_predicate;
use crate::expr::partial::partial_eval;
use crate::expr::Expr;
use crate::source::{CancelToken, TableSource};
use crate::types::{ColumnMap, RowAccess};
use crate::value::Value;

use super::ops::{CustomOp, Selector, SortDirection, SortKey, SourceOp};
use super::params::{build_parameters, ParamOptions, QueryParameters};
use super::plan::{build_plan, merge, PlanOp};
use super::request::TableRequest;
use super::stream::{MergedRows, RowIdentity};
use super::validate::{validate, Strictness};

/// Engine-wide execution options.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineOptions {
    /// How operators outside the supported set are treated.
    pub strictness: Strictness,
}

/// Entry point binding a transport source and a column catalogue.
pub struct TableClient<S: TableSource> {
    source: S,
    columns: Arc<dyn ColumnMap>,
    options: EngineOptions,
}

impl<S: TableSource> TableClient<S> {
    /// Client with default options (strict mode).
    pub fn new(source: S, columns: Arc<dyn ColumnMap>) -> Self {
        Self::with_options(source, columns, EngineOptions::default())
    }

    /// Client with explicit options.
    pub fn with_options(source: S, columns: Arc<dyn ColumnMap>, options: EngineOptions) -> Self {
        Self {
            source,
            columns,
            options,
        }
    }

    /// Starts an empty query over the source's table.
    pub fn query(&self) -> TableQuery<'_, S> {
        TableQuery {
            client: self,
            ops: Vec::new(),
            identity: RowIdentity::ById,
            cancel: None,
            error: None,
        }
    }
}

/// Translation summary for diagnostics: what goes to the server, what runs
/// locally, and a stable fingerprint of the whole shape.
#[derive(Debug)]
pub struct QueryExplain {
    /// Request descriptors in dispatch order.
    pub requests: Vec<TableRequest>,
    /// Residual operator names in execution order.
    pub residual: Vec<String>,
    /// Deterministic hash of the translated shape.
    pub fingerprint: u64,
}

impl QueryExplain {
    /// JSON rendering for logs and tooling.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests": self.requests,
            "residual": self.residual,
            "fingerprint": self.fingerprint,
        })
    }
}

/// Fluent query over one remote table.
///
/// Construction never fails; the first builder error is recorded and
/// surfaced by whichever terminal method runs the query.
pub struct TableQuery<'a, S: TableSource> {
    client: &'a TableClient<S>,
    ops: Vec<SourceOp<S::Row>>,
    identity: RowIdentity<S::Row>,
    cancel: Option<CancelToken>,
    error: Option<QueryError>,
}

impl<'a, S: TableSource> TableQuery<'a, S> {
    /// Appends a predicate. The expression is partially evaluated here:
    /// row-independent subtrees collapse to constants before translation.
    pub fn filter(mut self, predicate: Expr) -> Self {
        if self.error.is_some() {
            return self;
        }
        match partial_eval(predicate) {
            Ok(expr) => self.ops.push(SourceOp::Where(expr)),
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Appends a projection.
    pub fn select(mut self, selector: Selector) -> Self {
        self.ops.push(SourceOp::Select(selector));
        self
    }

    /// Appends a primary sort key.
    pub fn order_by(mut self, property: impl Into<String>, direction: SortDirection) -> Self {
        self.ops.push(SourceOp::OrderBy(SortKey::new(property, direction)));
        self
    }

    /// Appends a secondary sort key; must directly follow a sort.
    pub fn then_by(mut self, property: impl Into<String>, direction: SortDirection) -> Self {
        self.ops.push(SourceOp::ThenBy(SortKey::new(property, direction)));
        self
    }

    /// Drops the first `n` rows.
    pub fn skip(mut self, n: usize) -> Self {
        self.ops.push(SourceOp::Skip(n));
        self
    }

    /// Keeps at most `n` rows.
    pub fn take(mut self, n: usize) -> Self {
        self.ops.push(SourceOp::Take(n));
        self
    }

    /// Appends a named client-side transform. Rejected up front in strict
    /// mode.
    pub fn custom<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<S::Row>) -> Vec<S::Row> + Send + Sync + 'static,
    {
        self.ops.push(SourceOp::Custom(CustomOp::new(name, f)));
        self
    }

    /// Overrides cross-request duplicate detection.
    pub fn with_identity(mut self, identity: RowIdentity<S::Row>) -> Self {
        self.identity = identity;
        self
    }

    /// Attaches a cancellation token, observed between requests.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn prepare(self) -> Result<Prepared<'a, S>> {
        let Self {
            client,
            ops,
            identity,
            cancel,
            error,
        } = self;
        if let Some(err) = error {
            return Err(err);
        }
        validate(&ops, client.options.strictness)?;
        let plan = merge(build_plan(&ops));
        let options = ParamOptions {
            full_row_identity: matches!(identity, RowIdentity::ByKey(_)),
        };
        let params = build_parameters(plan, client.columns.as_ref(), options)?;
        debug!(
            requests = params.requests.len(),
            residual_ops = params.residual.len(),
            "prepared query"
        );
        Ok(Prepared {
            client,
            params,
            identity,
            cancel,
        })
    }

    /// Executes the query and returns the lazy logical row sequence.
    ///
    /// Translation errors surface here; transport and residual-evaluation
    /// errors surface as stream items, after which the stream fuses.
    pub fn rows(self) -> Result<LocalRows<'a, S::Row>> {
        let prepared = self.prepare()?;
        Ok(prepared.into_rows())
    }

    /// Materializes every row.
    pub fn to_vec(self) -> Result<Vec<S::Row>> {
        self.rows()?.collect()
    }

    /// Counts the rows without keeping them.
    pub fn count(self) -> Result<usize> {
        let mut n = 0;
        for item in self.rows()? {
            item?;
            n += 1;
        }
        Ok(n)
    }

    /// First row, if any.
    pub fn first(self) -> Result<Option<S::Row>> {
        self.rows()?.next().transpose()
    }

    /// Exactly one row; anything else is [`QueryError::NotSingle`].
    pub fn single(self) -> Result<S::Row> {
        let mut rows = self.rows()?;
        let first = match rows.next() {
            Some(row) => row?,
            None => return Err(QueryError::NotSingle { found: 0 }),
        };
        if let Some(item) = rows.next() {
            item?;
            return Err(QueryError::NotSingle { found: 2 });
        }
        Ok(first)
    }

    /// Whether any row matches.
    pub fn any(self) -> Result<bool> {
        Ok(self.rows()?.next().transpose()?.is_some())
    }

    /// Translates without executing and reports the resulting shape.
    pub fn explain(self) -> Result<QueryExplain> {
        let prepared = self.prepare()?;
        let requests = prepared.params.requests;
        let residual: Vec<String> = prepared
            .params
            .residual
            .iter()
            .map(|op| op.kind().to_owned())
            .collect();
        let mut shape = String::new();
        for request in &requests {
            shape.push_str(&request.query_string());
            shape.push('\n');
        }
        shape.push_str(&residual.join(","));
        Ok(QueryExplain {
            requests,
            residual,
            fingerprint: xxh64(shape.as_bytes(), 0),
        })
    }
}

/// Fully-translated query ready to stream.
struct Prepared<'a, S: TableSource> {
    client: &'a TableClient<S>,
    params: QueryParameters<S::Row>,
    identity: RowIdentity<S::Row>,
    cancel: Option<CancelToken>,
}

/// Boxed lazy row sequence tied to the client borrow.
pub type LocalRows<'a, R> = Box<dyn Iterator<Item = Result<R>> + 'a>;

impl<'a, S: TableSource> Prepared<'a, S> {
    fn into_rows(self) -> LocalRows<'a, S::Row> {
        let Prepared {
            client,
            params,
            identity,
            cancel,
        } = self;
        let merged = MergedRows::new(params.requests, identity, cancel, move |request| {
            client.source.fetch(request)
        });
        let mut rows: LocalRows<'a, S::Row> = Box::new(merged);
        for op in params.residual {
            rows = apply_residual(rows, op);
        }
        Box::new(FuseOnError {
            inner: rows,
            done: false,
        })
    }
}

/// Applies one client-only operator to the row sequence, preserving
/// laziness where the operator allows it.
fn apply_residual<'a, R: RowAccess + Clone + 'a>(
    rows: LocalRows<'a, R>,
    op: PlanOp<R>,
) -> LocalRows<'a, R> {
    match op {
        PlanOp::Filter(expr) => Box::new(rows.filter_map(move |item| match item {
            Ok(row) => match eval_predicate(&expr, &row) {
                Ok(true) => Some(Ok(row)),
                Ok(false) => None,
                Err(err) => Some(Err(err)),
            },
            Err(err) => Some(Err(err)),
        })),
        PlanOp::Skip(n) => {
            let mut remaining = n;
            Box::new(rows.filter_map(move |item| match item {
                Ok(row) => {
                    if remaining > 0 {
                        remaining -= 1;
                        None
                    } else {
                        Some(Ok(row))
                    }
                }
                Err(err) => Some(Err(err)),
            }))
        }
        PlanOp::Take(n) => Box::new(rows.scan(n, |left, item| match item {
            Ok(row) => {
                if *left == 0 {
                    None
                } else {
                    *left -= 1;
                    Some(Ok(row))
                }
            }
            Err(err) => Some(Err(err)),
        })),
        PlanOp::OrderBy(spec) => Box::new(LazyIter::new(move || -> LocalRows<'a, R> {
            let rows = match collect_rows(rows) {
                Ok(rows) => rows,
                Err(err) => return Box::new(std::iter::once(Err(err))),
            };
            let mut keyed: Vec<(Vec<Value>, R)> = rows
                .into_iter()
                .map(|row| {
                    let keys = spec
                        .keys
                        .iter()
                        .map(|key| row.get(&key.property).unwrap_or(Value::Null))
                        .collect();
                    (keys, row)
                })
                .collect();
            // stable sort keeps the fetched order among ties
            keyed.sort_by(|a, b| compare_keys(&spec.keys, &a.0, &b.0));
            Box::new(keyed.into_iter().map(|(_, row)| Ok(row)))
        })),
        PlanOp::Custom(custom) => Box::new(LazyIter::new(move || -> LocalRows<'a, R> {
            let rows = match collect_rows(rows) {
                Ok(rows) => rows,
                Err(err) => return Box::new(std::iter::once(Err(err))),
            };
            Box::new(custom.apply(rows).into_iter().map(Ok))
        })),
        // projection is a column-selection concern and never reaches the
        // residual; a surviving then_by cannot pass validation
        PlanOp::Project(_) | PlanOp::ThenBy(_) => rows,
    }
}

fn collect_rows<'a, R: 'a>(rows: LocalRows<'a, R>) -> Result<Vec<R>> {
    let mut out = Vec::new();
    for item in rows {
        out.push(item?);
    }
    Ok(out)
}

/// Multi-key comparison with numeric coercion. Incomparable pairs tie.
fn compare_keys(keys: &[SortKey], a: &[Value], b: &[Value]) -> Ordering {
    for (index, key) in keys.iter().enumerate() {
        let ord = a[index]
            .partial_cmp_value(&b[index])
            .unwrap_or(Ordering::Equal);
        let ord = match key.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Defers building the inner iterator until the first pull, so terminal
/// materialization stays the only forcing point.
struct LazyIter<'a, R, F>
where
    F: FnOnce() -> LocalRows<'a, R>,
{
    make: Option<F>,
    active: Option<LocalRows<'a, R>>,
}

impl<'a, R, F> LazyIter<'a, R, F>
where
    F: FnOnce() -> LocalRows<'a, R>,
{
    fn new(make: F) -> Self {
        Self {
            make: Some(make),
            active: None,
        }
    }
}

impl<'a, R, F> Iterator for LazyIter<'a, R, F>
where
    F: FnOnce() -> LocalRows<'a, R>,
{
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.active.is_none() {
            self.active = Some((self.make.take()?)());
        }
        self.active.as_mut()?.next()
    }
}

/// Stops the sequence permanently after the first error item.
struct FuseOnError<I> {
    inner: I,
    done: bool,
}

impl<R, I: Iterator<Item = Result<R>>> Iterator for FuseOnError<I> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(Err(err)) => {
                self.done = true;
                Some(Err(err))
            }
            other => other,
        }
    }
}
