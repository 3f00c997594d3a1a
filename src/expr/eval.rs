//! In-memory expression evaluation.
//!
//! Used twice: by the partial evaluator to collapse row-independent subtrees
//! into constants, and by the residual executor to run client-only predicate
//! fragments against fetched rows.

use crate::error::{QueryError, Result};
use crate::types::RowAccess;
use crate::value::Value;

use super::{ArithOp, CompareOp, Expr};

/// Evaluates a row-independent tree. Property access outside a row context
/// is a construction bug and reported as such.
pub fn eval_const(expr: &Expr) -> Result<Value> {
    eval(expr, None)
}

/// Evaluates a tree against one row. Missing properties read as null.
pub fn eval_row(expr: &Expr, row: &dyn RowAccess) -> Result<Value> {
    eval(expr, Some(row))
}

/// Evaluates a predicate tree against one row. Null is falsy; any other
/// non-boolean result is a type error.
pub fn eval_predicate(expr: &Expr, row: &dyn RowAccess) -> Result<bool> {
    truthy(&eval_row(expr, row)?)
}

fn truthy(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(QueryError::TypeMismatch {
            op: "predicate",
            lhs: other.type_name(),
            rhs: "bool",
        }),
    }
}

fn eval(expr: &Expr, row: Option<&dyn RowAccess>) -> Result<Value> {
    match expr {
        Expr::Property(name) => match row {
            Some(row) => Ok(row.get(name).unwrap_or(Value::Null)),
            None => Err(QueryError::Invalid("property access outside a row context")),
        },
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Compare { op, lhs, rhs } => {
            let lhs = eval(lhs, row)?;
            let rhs = eval(rhs, row)?;
            compare(*op, &lhs, &rhs).map(Value::Bool)
        }
        Expr::Contains { haystack, needle } => {
            let haystack = eval(haystack, row)?;
            let needle = eval(needle, row)?;
            Ok(Value::Bool(contains(&haystack, &needle)))
        }
        Expr::Arith { op, lhs, rhs } => {
            let lhs = eval(lhs, row)?;
            let rhs = eval(rhs, row)?;
            arith(*op, &lhs, &rhs)
        }
        // Short-circuit order matches the caller's written order.
        Expr::And(a, b) => {
            if !truthy(&eval(a, row)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(b, row)?)?))
        }
        Expr::Or(a, b) => {
            if truthy(&eval(a, row)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(b, row)?)?))
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, row)?)?)),
        Expr::Boxed(inner) => eval(inner, row),
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, row)?);
            }
            Ok(Value::List(out))
        }
        Expr::Thunk(thunk) => thunk.call(),
        Expr::Opaque(func) => match row {
            Some(row) => func.call(row),
            None => Err(QueryError::Invalid("opaque row function outside a row context")),
        },
    }
}

/// Comparison semantics: equality coerces int/float and treats two nulls as
/// equal; ordered comparisons against null are false; incomparable types are
/// a structured error.
pub fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    match op {
        CompareOp::Eq => Ok(lhs.loose_eq(rhs)),
        CompareOp::Ne => Ok(!lhs.loose_eq(rhs)),
        _ => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(false);
            }
            let ord = lhs
                .partial_cmp_value(rhs)
                .ok_or_else(|| QueryError::TypeMismatch {
                    op: op.symbol(),
                    lhs: lhs.type_name(),
                    rhs: rhs.type_name(),
                })?;
            Ok(match op {
                CompareOp::Lt => ord.is_lt(),
                CompareOp::Le => ord.is_le(),
                CompareOp::Gt => ord.is_gt(),
                CompareOp::Ge => ord.is_ge(),
                CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
            })
        }
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    if haystack.is_null() || needle.is_null() {
        return false;
    }
    haystack.to_wire_string().contains(&needle.to_wire_string())
}

fn arith(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    let mismatch = || QueryError::TypeMismatch {
        op: op.symbol(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    };
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => match op {
            ArithOp::Add => a.checked_add(*b).map(Value::Int).ok_or(QueryError::Arithmetic("integer overflow")),
            ArithOp::Sub => a.checked_sub(*b).map(Value::Int).ok_or(QueryError::Arithmetic("integer overflow")),
            ArithOp::Mul => a.checked_mul(*b).map(Value::Int).ok_or(QueryError::Arithmetic("integer overflow")),
            ArithOp::Div => a.checked_div(*b).map(Value::Int).ok_or(QueryError::Arithmetic("division by zero")),
        },
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            let a = as_float(lhs).ok_or_else(mismatch)?;
            let b = as_float(rhs).ok_or_else(mismatch)?;
            Ok(Value::Float(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
            }))
        }
        (Value::String(a), Value::String(b)) if op == ArithOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        _ => Err(mismatch()),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}
