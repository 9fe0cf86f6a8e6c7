//! Incrementally-maintained filter view.
//!
//! Keeps a sorted vector of parent row indices whose row currently
//! satisfies the view's predicate — either a parsed filter expression or an
//! opaque host callback with three-valued semantics.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::changelog::{ChangeKind, ChangeLog, CursorId};
use crate::column::Column;
use crate::error::LiveTableError;
use crate::filter_expr::{self, Expr};
use crate::row::{resolve_index, resolve_slice, Row};
use crate::schema::Schema;
use crate::table::{Table, TableInner};
use crate::views::{read_parent_row, upgrade_parent, ViewSync};

/// Either a parsed filter expression or a host-supplied three-valued
/// predicate closure over a full row.
enum Predicate {
    Expr(Expr),
    Callback(Box<dyn Fn(&Row) -> Option<bool>>),
}

impl Predicate {
    fn eval(&self, columns: &[Column], schema: &Schema, row: usize) -> Result<Option<bool>, LiveTableError> {
        match self {
            Predicate::Expr(ast) => filter_expr::eval_at(ast, columns, schema, row),
            Predicate::Callback(f) => Ok(f(&read_parent_row(columns, schema, row))),
        }
    }

    /// Whether reevaluation is needed when `column` changes. Callback
    /// predicates are opaque, so every update is treated as relevant.
    fn references(&self, column: &str) -> bool {
        match self {
            Predicate::Expr(ast) => {
                let mut cols = std::collections::HashSet::new();
                ast.referenced_columns(&mut cols);
                cols.contains(column)
            }
            Predicate::Callback(_) => true,
        }
    }
}

struct FilterViewState {
    parent: Weak<RefCell<TableInner>>,
    cursor: CursorId,
    predicate: Predicate,
    kept: Vec<usize>,
}

impl FilterViewState {
    fn membership_index(&self, row: usize) -> Result<usize, usize> {
        self.kept.binary_search(&row)
    }

    fn insert_kept(&mut self, row: usize) {
        if let Err(pos) = self.membership_index(row) {
            self.kept.insert(pos, row);
        }
    }

    fn remove_kept(&mut self, row: usize) {
        if let Ok(pos) = self.membership_index(row) {
            self.kept.remove(pos);
        }
    }

    fn shift_up_from(&mut self, from: usize) {
        for idx in self.kept.iter_mut() {
            if *idx >= from {
                *idx += 1;
            }
        }
        // Re-establish sortedness: shifting preserves relative order so a
        // plain pass suffices, no re-sort needed.
    }

    fn shift_down_after(&mut self, after: usize) {
        for idx in self.kept.iter_mut() {
            if *idx > after {
                *idx -= 1;
            }
        }
    }
}

impl ViewSync for FilterViewState {
    fn parent_cursor(&self) -> CursorId {
        self.cursor
    }

    fn apply_pending(
        &mut self,
        log: &ChangeLog,
        columns: &[Column],
        schema: &Schema,
    ) -> Result<u64, LiveTableError> {
        let mut caught_up_to = log.cursor_position(self.cursor);
        for change in log.iter_from(self.cursor) {
            match change.kind {
                ChangeKind::Insert => {
                    self.shift_up_from(change.row);
                    if self.predicate.eval(columns, schema, change.row)?.unwrap_or(false) {
                        self.insert_kept(change.row);
                    }
                }
                ChangeKind::Delete => {
                    self.remove_kept(change.row);
                    self.shift_down_after(change.row);
                }
                ChangeKind::Update => {
                    let col = change.column.as_deref().unwrap_or("");
                    if self.predicate.references(col) {
                        let passes = self.predicate.eval(columns, schema, change.row)?.unwrap_or(false);
                        if passes {
                            self.insert_kept(change.row);
                        } else {
                            self.remove_kept(change.row);
                        }
                    }
                }
            }
            caught_up_to = change.seq + 1;
        }
        Ok(caught_up_to)
    }
}

/// Public handle to a filter view. Cheaply cloneable; every clone shares
/// the same maintained state.
#[derive(Clone)]
pub struct FilterView(Rc<RefCell<FilterViewState>>);

impl FilterView {
    fn build(table: &Table, predicate: Predicate) -> Result<Self, LiveTableError> {
        let inner_rc = table.inner_rc();
        let mut inner = inner_rc.borrow_mut();
        let row_count = inner.row_count();
        let cursor = inner.changelog.register_cursor();

        let mut kept = Vec::new();
        for row in 0..row_count {
            if predicate.eval(&inner.columns, &inner.schema, row)?.unwrap_or(false) {
                kept.push(row);
            }
        }

        let state = Rc::new(RefCell::new(FilterViewState {
            parent: table.weak(),
            cursor,
            predicate,
            kept,
        }));
        inner.views.push((cursor, Rc::downgrade(&state)));
        drop(inner);
        Ok(FilterView(state))
    }

    pub fn new_with_callback(table: &Table, f: Box<dyn Fn(&Row) -> Option<bool>>) -> Result<Self, LiveTableError> {
        FilterView::build(table, Predicate::Callback(f))
    }

    pub fn new_with_expr(table: &Table, expr: &str) -> Result<Self, LiveTableError> {
        let ast = filter_expr::parser::parse(expr)?;
        FilterView::build(table, Predicate::Expr(ast))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_parent_index(&self, view_row: usize) -> Result<usize, LiveTableError> {
        let state = self.0.borrow();
        state.kept.get(view_row).copied().ok_or_else(|| {
            LiveTableError::OutOfRange(format!("view row {view_row} out of range for length {}", state.kept.len()))
        })
    }

    pub fn get_row(&self, view_row: usize) -> Result<Row, LiveTableError> {
        let parent_row = self.get_parent_index(view_row)?;
        let state = self.0.borrow();
        let parent = upgrade_parent(&state.parent)?;
        let parent = parent.borrow();
        Ok(read_parent_row(&parent.columns, &parent.schema, parent_row))
    }

    pub fn get(&self, index: i64) -> Result<Row, LiveTableError> {
        let len = self.len();
        let row = resolve_index(index, len)?;
        self.get_row(row)
    }

    pub fn slice(&self, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Vec<Row>, LiveTableError> {
        let len = self.len();
        resolve_slice(start, stop, step, len)?.into_iter().map(|i| self.get_row(i)).collect()
    }

    pub fn iter(&self) -> Result<Vec<Row>, LiveTableError> {
        (0..self.len()).map(|i| self.get_row(i)).collect()
    }
}

impl IntoIterator for &FilterView {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().expect("parent table still alive").into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::value::{ColumnType, Value};

    fn seeded_table() -> Table {
        let schema = Schema::new([
            ("id", ColumnType::Int32, false),
            ("active", ColumnType::Bool, false),
        ])
        .unwrap();
        let t = Table::new("t", schema).unwrap();
        for (id, active) in [(1, true), (2, false), (3, true), (4, false)] {
            t.append_row([("id", Value::Int32(id)), ("active", Value::Bool(active))]).unwrap();
        }
        t
    }

    #[test]
    fn test_initial_scan_keeps_matching_rows() {
        let t = seeded_table();
        let view = t.filter(|row| row[1].1.as_bool()).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.get_parent_index(0).unwrap(), 0);
        assert_eq!(view.get_parent_index(1).unwrap(), 2);
    }

    #[test]
    fn test_insert_shifts_and_reevaluates() {
        let t = seeded_table();
        let view = t.filter(|row| row[1].1.as_bool()).unwrap();
        t.append_row([("id", Value::Int32(5)), ("active", Value::Bool(true))]).unwrap();
        t.tick().unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.get_parent_index(2).unwrap(), 4);
    }

    #[test]
    fn test_delete_removes_and_shifts() {
        let t = seeded_table();
        let view = t.filter(|row| row[1].1.as_bool()).unwrap();
        t.delete_row(0).unwrap(); // removes a kept row
        t.tick().unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view.get_parent_index(0).unwrap(), 1); // row 2 (active) shifted to index 1
    }

    #[test]
    fn test_update_toggles_membership() {
        let t = seeded_table();
        let view = t.filter(|row| row[1].1.as_bool()).unwrap();
        t.set_value(1, "active", Value::Bool(true)).unwrap();
        t.tick().unwrap();
        assert_eq!(view.len(), 3);
        t.set_value(0, "active", Value::Bool(false)).unwrap();
        t.tick().unwrap();
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_expr_predicate() {
        let t = seeded_table();
        let view = t.filter_view_expr("id >= 3").unwrap();
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_dropping_table_invalidates_view_read() {
        let t = seeded_table();
        let view = t.filter(|row| row[1].1.as_bool()).unwrap();
        drop(t);
        let err = view.get_row(0).unwrap_err();
        assert!(matches!(err, LiveTableError::InvalidState(_)));
    }

    #[test]
    fn test_pythonic_negative_index() {
        let t = seeded_table();
        let view = t.filter(|row| row[1].1.as_bool()).unwrap();
        let last = view.get(-1).unwrap();
        assert_eq!(last[0], ("id".to_string(), Value::Int32(3)));
    }

    #[test]
    fn test_reverse_slice_with_step() {
        let t = seeded_table();
        let view = t.filter_view_expr("id >= 1").unwrap(); // keeps all 4 rows
        let rows = view.slice(None, None, Some(-2)).unwrap();
        let ids: Vec<Value> = rows.iter().map(|r| r[0].1.clone()).collect();
        assert_eq!(ids, vec![Value::Int32(4), Value::Int32(2)]);
    }

    #[test]
    fn test_slice_zero_step_is_out_of_range() {
        let t = seeded_table();
        let view = t.filter(|row| row[1].1.as_bool()).unwrap();
        let err = view.slice(None, None, Some(0)).unwrap_err();
        assert!(matches!(err, LiveTableError::OutOfRange(_)));
    }
}
