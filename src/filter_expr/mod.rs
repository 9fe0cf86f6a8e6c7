//! Restricted SQL-like predicate grammar: lexer, parser, and column-vector
//! evaluator.

pub mod eval;
pub mod lexer;
pub mod parser;

pub use parser::Expr;

use crate::column::Column;
use crate::error::LiveTableError;
use crate::schema::Schema;
use crate::value::Value;

/// Parses `expr` and evaluates it against every row of `columns`, returning
/// the indices of rows for which the expression is `Some(true)`. Used by
/// `Table::filter_expr` — a one-shot evaluation, no view is registered.
pub fn eval_str(expr: &str, columns: &[Column], schema: &Schema) -> Result<Vec<usize>, LiveTableError> {
    let ast = parser::parse(expr)?;
    let row_count = columns.first().map(Column::len).unwrap_or(0);
    let mut matches = Vec::new();
    for row in 0..row_count {
        if eval_at(&ast, columns, schema, row)?.unwrap_or(false) {
            matches.push(row);
        }
    }
    Ok(matches)
}

/// Evaluates `ast` against parent row `row`, resolving column references by
/// index through `schema`. Unknown names resolve to `Value::Null`.
pub fn eval_at(ast: &Expr, columns: &[Column], schema: &Schema, row: usize) -> Result<Option<bool>, LiveTableError> {
    let resolve = |name: &str| -> Value {
        match schema.index_of(name) {
            Some(idx) => columns[idx].get(row).clone(),
            None => Value::Null,
        }
    };
    eval::eval_row(ast, &resolve)
}
