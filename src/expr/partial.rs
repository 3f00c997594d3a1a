//! Partial evaluation: collapse every maximal row-independent subtree into a
//! literal before translation.
//!
//! Eligibility is decided bottom-up. A node is pure when nothing beneath it
//! references the row binding; when a pure child sits under an impure parent
//! it is the maximal pure subtree and gets evaluated in place. Composite
//! constructions collapse only as a whole: one row-dependent element keeps
//! the initializer (and every ancestor) un-evaluated, because folding a
//! per-row expression into one constant would silently compute the same
//! value for every row. Evaluation failures propagate to the caller
//! unchanged.

use crate::error::Result;

use super::eval::eval_const;
use super::Expr;

/// Rewrites the tree with all maximal row-independent subtrees replaced by
/// their constant values.
pub fn partial_eval(expr: Expr) -> Result<Expr> {
    let folded = fold(expr)?;
    if folded.pure {
        collapse(folded.expr)
    } else {
        Ok(folded.expr)
    }
}

struct Folded {
    expr: Expr,
    pure: bool,
}

impl Folded {
    fn pure(expr: Expr) -> Self {
        Self { expr, pure: true }
    }

    fn impure(expr: Expr) -> Self {
        Self { expr, pure: false }
    }

    /// Collapses this subtree if it is pure; used when the parent is impure,
    /// making this child a maximal pure subtree.
    fn finish(self) -> Result<Expr> {
        if self.pure {
            collapse(self.expr)
        } else {
            Ok(self.expr)
        }
    }
}

fn collapse(expr: Expr) -> Result<Expr> {
    match expr {
        already @ Expr::Literal(_) => Ok(already),
        other => Ok(Expr::Literal(eval_const(&other)?)),
    }
}

fn fold(expr: Expr) -> Result<Folded> {
    match expr {
        leaf @ (Expr::Property(_) | Expr::Opaque(_)) => Ok(Folded::impure(leaf)),
        leaf @ (Expr::Literal(_) | Expr::Thunk(_)) => Ok(Folded::pure(leaf)),
        Expr::Compare { op, lhs, rhs } => fold_binary(*lhs, *rhs, |lhs, rhs| Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }),
        Expr::Contains { haystack, needle } => {
            fold_binary(*haystack, *needle, |haystack, needle| Expr::Contains {
                haystack: Box::new(haystack),
                needle: Box::new(needle),
            })
        }
        Expr::Arith { op, lhs, rhs } => fold_binary(*lhs, *rhs, |lhs, rhs| Expr::Arith {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }),
        Expr::And(a, b) => fold_binary(*a, *b, |a, b| Expr::And(Box::new(a), Box::new(b))),
        Expr::Or(a, b) => fold_binary(*a, *b, |a, b| Expr::Or(Box::new(a), Box::new(b))),
        Expr::Not(inner) => fold_unary(*inner, |inner| Expr::Not(Box::new(inner))),
        // Boxing is a passthrough: it never blocks candidacy by itself.
        Expr::Boxed(inner) => fold_unary(*inner, |inner| Expr::Boxed(Box::new(inner))),
        Expr::List(items) => {
            let folded: Vec<Folded> = items.into_iter().map(fold).collect::<Result<_>>()?;
            if folded.iter().all(|f| f.pure) {
                let items = folded.into_iter().map(|f| f.expr).collect();
                Ok(Folded::pure(Expr::List(items)))
            } else {
                // Pure siblings still collapse individually.
                let items = folded
                    .into_iter()
                    .map(Folded::finish)
                    .collect::<Result<_>>()?;
                Ok(Folded::impure(Expr::List(items)))
            }
        }
    }
}

fn fold_unary(inner: Expr, rebuild: impl FnOnce(Expr) -> Expr) -> Result<Folded> {
    let inner = fold(inner)?;
    if inner.pure {
        Ok(Folded::pure(rebuild(inner.expr)))
    } else {
        Ok(Folded::impure(rebuild(inner.expr)))
    }
}

fn fold_binary(
    lhs: Expr,
    rhs: Expr,
    rebuild: impl FnOnce(Expr, Expr) -> Expr,
) -> Result<Folded> {
    let lhs = fold(lhs)?;
    let rhs = fold(rhs)?;
    if lhs.pure && rhs.pure {
        Ok(Folded::pure(rebuild(lhs.expr, rhs.expr)))
    } else {
        Ok(Folded::impure(rebuild(lhs.finish()?, rhs.finish()?)))
    }
}
