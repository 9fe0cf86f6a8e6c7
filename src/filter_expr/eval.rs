//! Column-vector evaluation of a parsed filter expression with three-valued
//! logic.
//!
//! The evaluator never builds a per-row map; it resolves each column
//! reference directly against a closure the caller supplies (backed by
//! column storage, or by a single row's values for view maintenance).

use crate::error::LiveTableError;
use crate::filter_expr::parser::{CmpOp, Comparison, Expr, Operand};
use crate::value::Value;

/// Whether two non-null values can be meaningfully ordered/compared.
/// Numerics compare against each other via coercion; strings and bools
/// compare only against their own kind.
fn comparable(a: &Value, b: &Value) -> bool {
    (a.is_numeric() && b.is_numeric())
        || matches!((a, b), (Value::String(_), Value::String(_)))
        || matches!((a, b), (Value::Bool(_), Value::Bool(_)))
}

/// Evaluates `expr` for one row, given a column resolver. Unknown column
/// names resolve to `Value::Null` — that is the resolver's
/// responsibility, not this function's.
pub fn eval_row(expr: &Expr, resolve: &dyn Fn(&str) -> Value) -> Result<Option<bool>, LiveTableError> {
    match expr {
        Expr::And(l, r) => {
            let l = eval_row(l, resolve)?;
            let r = eval_row(r, resolve)?;
            Ok(three_valued_and(l, r))
        }
        Expr::Or(l, r) => {
            let l = eval_row(l, resolve)?;
            let r = eval_row(r, resolve)?;
            Ok(three_valued_or(l, r))
        }
        Expr::Not(inner) => Ok(eval_row(inner, resolve)?.map(|b| !b)),
        Expr::Leaf(Comparison::IsNull { col, negated }) => {
            let v = resolve(col);
            Ok(Some(v.is_null() != *negated))
        }
        Expr::Leaf(Comparison::Cmp { col, op, rhs }) => {
            let lhs = resolve(col);
            let rhs = match rhs {
                Operand::Literal(v) => v.clone(),
                Operand::Column(name) => resolve(name),
            };
            if lhs.is_null() || rhs.is_null() {
                return Ok(None);
            }
            if !comparable(&lhs, &rhs) {
                return Err(LiveTableError::TypeMismatch(format!(
                    "cannot compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                )));
            }
            let result = match op {
                CmpOp::Eq => lhs.sql_eq(&rhs),
                CmpOp::Neq => !lhs.sql_eq(&rhs),
                CmpOp::Lt => lhs.cmp_non_null(&rhs).is_lt(),
                CmpOp::Lte => lhs.cmp_non_null(&rhs).is_le(),
                CmpOp::Gt => lhs.cmp_non_null(&rhs).is_gt(),
                CmpOp::Gte => lhs.cmp_non_null(&rhs).is_ge(),
            };
            Ok(Some(result))
        }
    }
}

fn three_valued_and(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn three_valued_or(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}
