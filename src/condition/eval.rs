//! Pure interpreter over [`Expr`] trees.

use std::cmp::Ordering;

use serde_json::Value;

use super::parser::{CompareOp, Expr};

/// Evaluate `expr` against a JSON row. Missing fields are `null`.
pub fn eval(expr: &Expr, row: &Value) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Field(path) => lookup(row, path).cloned().unwrap_or(Value::Null),
        Expr::Not(inner) => Value::Bool(!truthy(&eval(inner, row))),
        Expr::And(lhs, rhs) => Value::Bool(truthy(&eval(lhs, row)) && truthy(&eval(rhs, row))),
        Expr::Or(lhs, rhs) => Value::Bool(truthy(&eval(lhs, row)) || truthy(&eval(rhs, row))),
        Expr::Compare(lhs, op, rhs) => Value::Bool(compare(&eval(lhs, row), *op, &eval(rhs, row))),
    }
}

fn lookup<'a>(row: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(row, |v, key| v.as_object()?.get(key))
}

/// `null`, `false`, `0`, `""` and empty containers are false.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> bool {
    match op {
        CompareOp::Eq => equals(lhs, rhs),
        CompareOp::Ne => !equals(lhs, rhs),
        _ => match order(lhs, rhs) {
            Some(ord) => match op {
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Le => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            },
            None => false,
        },
    }
}

fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

/// Ordering is only defined between two numbers or two strings.
fn order(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
