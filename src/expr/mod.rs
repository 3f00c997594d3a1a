//! Closed expression tree for row predicates and selectors.
//!
//! The engine never inspects host-language closures; everything it can
//! translate is expressed through this tagged union, and everything it
//! cannot is carried as an opaque row function that runs client-side.

pub mod eval;
pub mod partial;

use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, QueryError, Result};
use crate::types::RowAccess;
use crate::value::Value;

/// Comparison operators available in predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl CompareOp {
    /// Display symbol for explain output and error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Arithmetic operators usable inside selector and predicate expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    /// Addition; also string concatenation.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

type ThunkFn = dyn Fn() -> std::result::Result<Value, BoxError> + Send + Sync;

/// Row-independent captured computation, e.g. a local variable or a call
/// into caller code that does not touch the row. Collapsed to a constant by
/// the partial evaluator; evaluation failures propagate to the caller
/// unchanged.
#[derive(Clone)]
pub struct Thunk {
    f: Arc<ThunkFn>,
}

impl Thunk {
    /// Wraps a fallible closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Evaluates the captured computation.
    pub fn call(&self) -> Result<Value> {
        (self.f)().map_err(QueryError::Local)
    }
}

impl PartialEq for Thunk {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Thunk(..)")
    }
}

type RowFnInner = dyn Fn(&dyn RowAccess) -> std::result::Result<Value, BoxError> + Send + Sync;

/// Row-dependent caller code with no server-side translation. Always ends up
/// in the residual expression and runs per row after the fetch.
#[derive(Clone)]
pub struct RowFn {
    name: Arc<str>,
    f: Arc<RowFnInner>,
}

impl RowFn {
    /// Wraps a fallible per-row closure under a diagnostic name.
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&dyn RowAccess) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// Diagnostic name supplied at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the closure against one row.
    pub fn call(&self, row: &dyn RowAccess) -> Result<Value> {
        (self.f)(row).map_err(QueryError::Local)
    }
}

impl PartialEq for RowFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl fmt::Debug for RowFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowFn({})", self.name)
    }
}

/// Expression tree node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Access of a logical property on the row binding.
    Property(String),
    /// Literal constant.
    Literal(Value),
    /// Binary comparison.
    Compare {
        /// Comparison operator.
        op: CompareOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Substring containment test.
    Contains {
        /// Value searched within.
        haystack: Box<Expr>,
        /// Value searched for.
        needle: Box<Expr>,
    },
    /// Arithmetic combination.
    Arith {
        /// Arithmetic operator.
        op: ArithOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Short-circuit conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Passthrough boxing conversion; never blocks local evaluation.
    Boxed(Box<Expr>),
    /// Composite construction (array/list initializer).
    List(Vec<Expr>),
    /// Row-independent captured computation.
    Thunk(Thunk),
    /// Row-dependent caller code with no server translation.
    Opaque(RowFn),
}

impl Expr {
    /// Property access.
    pub fn prop(name: impl Into<String>) -> Expr {
        Expr::Property(name.into())
    }

    /// Literal constant.
    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    /// Row-independent captured computation.
    pub fn thunk<F>(f: F) -> Expr
    where
        F: Fn() -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Expr::Thunk(Thunk::new(f))
    }

    /// Captured local value, the common case of [`Expr::thunk`].
    pub fn captured(value: impl Into<Value>) -> Expr {
        let value = value.into();
        Expr::Thunk(Thunk::new(move || Ok(value.clone())))
    }

    /// Opaque per-row caller code.
    pub fn opaque<F>(name: impl Into<Arc<str>>, f: F) -> Expr
    where
        F: Fn(&dyn RowAccess) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Expr::Opaque(RowFn::new(name, f))
    }

    fn compare(self, op: CompareOp, rhs: Expr) -> Expr {
        Expr::Compare {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    /// `self == rhs`.
    pub fn eq(self, rhs: Expr) -> Expr {
        self.compare(CompareOp::Eq, rhs)
    }

    /// `self != rhs`.
    pub fn ne(self, rhs: Expr) -> Expr {
        self.compare(CompareOp::Ne, rhs)
    }

    /// `self < rhs`.
    pub fn lt(self, rhs: Expr) -> Expr {
        self.compare(CompareOp::Lt, rhs)
    }

    /// `self <= rhs`.
    pub fn le(self, rhs: Expr) -> Expr {
        self.compare(CompareOp::Le, rhs)
    }

    /// `self > rhs`.
    pub fn gt(self, rhs: Expr) -> Expr {
        self.compare(CompareOp::Gt, rhs)
    }

    /// `self >= rhs`.
    pub fn ge(self, rhs: Expr) -> Expr {
        self.compare(CompareOp::Ge, rhs)
    }

    /// Substring test: `self` contains `needle`.
    pub fn contains(self, needle: Expr) -> Expr {
        Expr::Contains {
            haystack: Box::new(self),
            needle: Box::new(needle),
        }
    }

    /// Short-circuit conjunction.
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    /// Short-circuit disjunction.
    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    /// Logical negation.
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Passthrough boxing conversion.
    pub fn boxed(self) -> Expr {
        Expr::Boxed(Box::new(self))
    }

    /// Whether any node in the tree references the row binding.
    pub fn depends_on_row(&self) -> bool {
        match self {
            Expr::Property(_) | Expr::Opaque(_) => true,
            Expr::Literal(_) | Expr::Thunk(_) => false,
            Expr::Compare { lhs, rhs, .. } | Expr::Arith { lhs, rhs, .. } => {
                lhs.depends_on_row() || rhs.depends_on_row()
            }
            Expr::Contains { haystack, needle } => {
                haystack.depends_on_row() || needle.depends_on_row()
            }
            Expr::And(a, b) | Expr::Or(a, b) => a.depends_on_row() || b.depends_on_row(),
            Expr::Not(inner) | Expr::Boxed(inner) => inner.depends_on_row(),
            Expr::List(items) => items.iter().any(Expr::depends_on_row),
        }
    }

    /// Collects the property names referenced anywhere in the tree.
    pub fn referenced_properties(&self, out: &mut Vec<String>) {
        match self {
            Expr::Property(name) => {
                if !out.iter().any(|p| p == name) {
                    out.push(name.clone());
                }
            }
            Expr::Literal(_) | Expr::Thunk(_) | Expr::Opaque(_) => {}
            Expr::Compare { lhs, rhs, .. } | Expr::Arith { lhs, rhs, .. } => {
                lhs.referenced_properties(out);
                rhs.referenced_properties(out);
            }
            Expr::Contains { haystack, needle } => {
                haystack.referenced_properties(out);
                needle.referenced_properties(out);
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.referenced_properties(out);
                b.referenced_properties(out);
            }
            Expr::Not(inner) | Expr::Boxed(inner) => inner.referenced_properties(out),
            Expr::List(items) => {
                for item in items {
                    item.referenced_properties(out);
                }
            }
        }
    }
}

fn fmt_value(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "{s:?}"),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Property(name) => write!(f, "{name}"),
            Expr::Literal(value) => fmt_value(value, f),
            Expr::Compare { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Expr::Contains { haystack, needle } => write!(f, "contains({haystack}, {needle})"),
            Expr::Arith { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Expr::And(a, b) => write!(f, "({a} && {b})"),
            Expr::Or(a, b) => write!(f, "({a} || {b})"),
            Expr::Not(inner) => write!(f, "!{inner}"),
            Expr::Boxed(inner) => write!(f, "{inner}"),
            Expr::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Expr::Thunk(_) => f.write_str("<captured>"),
            Expr::Opaque(func) => write!(f, "<{}>", func.name()),
        }
    }
}
