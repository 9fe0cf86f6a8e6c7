//! Projection and computed views.
//!
//! Both read through to the parent's row storage rather than materializing
//! a copy: `ProjectionView` exposes a constant subset of columns,
//! `ComputedView` exposes every base column plus one function-derived
//! column recomputed on every read (never cached, never incrementally
//! maintained — see DESIGN.md's Open Question resolution).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::changelog::{ChangeLog, CursorId};
use crate::column::Column;
use crate::error::LiveTableError;
use crate::row::{resolve_index, resolve_slice, Row};
use crate::schema::Schema;
use crate::table::{Table, TableInner};
use crate::views::{read_parent_row, upgrade_parent, ViewSync};

struct ProjectionViewState {
    parent: Weak<RefCell<TableInner>>,
    cursor: CursorId,
    columns: Vec<String>,
}

impl ViewSync for ProjectionViewState {
    fn parent_cursor(&self) -> CursorId {
        self.cursor
    }

    /// Row count tracks the parent directly through reads; there is no
    /// local state to advance beyond the cursor itself.
    fn apply_pending(&mut self, log: &ChangeLog, _columns: &[Column], _schema: &Schema) -> Result<u64, LiveTableError> {
        Ok(log.tail_seq())
    }
}

/// A constant-column-subset read-through view.
#[derive(Clone)]
pub struct ProjectionView(Rc<RefCell<ProjectionViewState>>);

impl ProjectionView {
    pub(crate) fn new(table: &Table, columns: Vec<String>) -> Result<Self, LiveTableError> {
        let inner_rc = table.inner_rc();
        let mut inner = inner_rc.borrow_mut();
        for name in &columns {
            if !inner.schema.contains(name) {
                return Err(LiveTableError::SchemaViolation(format!("unknown column {name:?}")));
            }
        }
        let cursor = inner.changelog.register_cursor();
        let state = Rc::new(RefCell::new(ProjectionViewState { parent: table.weak(), cursor, columns }));
        inner.views.push((cursor, Rc::downgrade(&state)));
        drop(inner);
        Ok(ProjectionView(state))
    }

    pub fn len(&self) -> Result<usize, LiveTableError> {
        let state = self.0.borrow();
        let parent = upgrade_parent(&state.parent)?;
        Ok(parent.borrow().row_count())
    }

    pub fn is_empty(&self) -> Result<bool, LiveTableError> {
        Ok(self.len()? == 0)
    }

    pub fn get_row(&self, row: usize) -> Result<Row, LiveTableError> {
        let state = self.0.borrow();
        let parent = upgrade_parent(&state.parent)?;
        let parent = parent.borrow();
        let row_count = parent.row_count();
        if row >= row_count {
            return Err(LiveTableError::OutOfRange(format!("row {row} out of range for length {row_count}")));
        }
        state
            .columns
            .iter()
            .map(|name| {
                let idx = parent.schema.index_of(name).expect("validated at construction");
                Ok((name.clone(), parent.columns[idx].get(row).clone()))
            })
            .collect()
    }

    pub fn get(&self, index: i64) -> Result<Row, LiveTableError> {
        let len = self.len()?;
        let row = resolve_index(index, len)?;
        self.get_row(row)
    }

    pub fn slice(&self, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Vec<Row>, LiveTableError> {
        let len = self.len()?;
        resolve_slice(start, stop, step, len)?.into_iter().map(|i| self.get_row(i)).collect()
    }

    pub fn iter(&self) -> Result<Vec<Row>, LiveTableError> {
        (0..self.len()?).map(|i| self.get_row(i)).collect()
    }
}

impl IntoIterator for &ProjectionView {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().expect("parent table still alive").into_iter()
    }
}

struct ComputedViewState {
    parent: Weak<RefCell<TableInner>>,
    cursor: CursorId,
    output_name: String,
    compute: Box<dyn Fn(&Row) -> crate::value::Value>,
}

impl ViewSync for ComputedViewState {
    fn parent_cursor(&self) -> CursorId {
        self.cursor
    }

    fn apply_pending(&mut self, log: &ChangeLog, _columns: &[Column], _schema: &Schema) -> Result<u64, LiveTableError> {
        Ok(log.tail_seq())
    }
}

/// Every base column plus one function-computed column, recomputed fresh
/// on every read.
#[derive(Clone)]
pub struct ComputedView(Rc<RefCell<ComputedViewState>>);

impl ComputedView {
    pub(crate) fn new(
        table: &Table,
        output_name: String,
        compute: Box<dyn Fn(&Row) -> crate::value::Value>,
    ) -> Result<Self, LiveTableError> {
        let inner_rc = table.inner_rc();
        let mut inner = inner_rc.borrow_mut();
        if inner.schema.contains(&output_name) {
            return Err(LiveTableError::SchemaViolation(format!(
                "computed column {output_name:?} collides with an existing base column"
            )));
        }
        let cursor = inner.changelog.register_cursor();
        let state = Rc::new(RefCell::new(ComputedViewState {
            parent: table.weak(),
            cursor,
            output_name,
            compute,
        }));
        inner.views.push((cursor, Rc::downgrade(&state)));
        drop(inner);
        Ok(ComputedView(state))
    }

    pub fn len(&self) -> Result<usize, LiveTableError> {
        let state = self.0.borrow();
        let parent = upgrade_parent(&state.parent)?;
        Ok(parent.borrow().row_count())
    }

    pub fn get_row(&self, row: usize) -> Result<Row, LiveTableError> {
        let state = self.0.borrow();
        let parent = upgrade_parent(&state.parent)?;
        let parent = parent.borrow();
        let row_count = parent.row_count();
        if row >= row_count {
            return Err(LiveTableError::OutOfRange(format!("row {row} out of range for length {row_count}")));
        }
        let mut base = read_parent_row(&parent.columns, &parent.schema, row);
        let computed = (state.compute)(&base);
        base.push((state.output_name.clone(), computed));
        Ok(base)
    }

    pub fn get(&self, index: i64) -> Result<Row, LiveTableError> {
        let len = self.len()?;
        let row = resolve_index(index, len)?;
        self.get_row(row)
    }

    pub fn slice(&self, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Vec<Row>, LiveTableError> {
        let len = self.len()?;
        resolve_slice(start, stop, step, len)?.into_iter().map(|i| self.get_row(i)).collect()
    }

    pub fn iter(&self) -> Result<Vec<Row>, LiveTableError> {
        (0..self.len()?).map(|i| self.get_row(i)).collect()
    }
}

impl IntoIterator for &ComputedView {
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
            ("price", ColumnType::Float64, false),
            ("qty", ColumnType::Int32, false),
        ])
        .unwrap();
        let t = Table::new("t", schema).unwrap();
        t.append_row([("id", Value::Int32(1)), ("price", Value::Float64(10.0)), ("qty", Value::Int32(2))])
            .unwrap();
        t
    }

    #[test]
    fn test_projection_subset_columns() {
        let t = seeded_table();
        let view = t.project(vec!["id".to_string(), "price".to_string()]).unwrap();
        let row = view.get_row(0).unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row[0].0, "id");
        assert_eq!(row[1].0, "price");
    }

    #[test]
    fn test_projection_unknown_column_rejected() {
        let t = seeded_table();
        let err = t.project(vec!["missing".to_string()]).unwrap_err();
        assert!(matches!(err, LiveTableError::SchemaViolation(_)));
    }

    #[test]
    fn test_projection_reads_through_after_mutation() {
        let t = seeded_table();
        let view = t.project(vec!["price".to_string()]).unwrap();
        t.set_value(0, "price", Value::Float64(20.0)).unwrap();
        assert_eq!(view.get_row(0).unwrap()[0].1, Value::Float64(20.0));
    }

    #[test]
    fn test_computed_view_recomputes_on_read() {
        let t = seeded_table();
        let view = t
            .compute("total", |row| {
                let price = row.iter().find(|(n, _)| n == "price").unwrap().1.as_f64().unwrap();
                let qty = row.iter().find(|(n, _)| n == "qty").unwrap().1.as_f64().unwrap();
                Value::Float64(price * qty)
            })
            .unwrap();
        assert_eq!(view.get_row(0).unwrap().last().unwrap().1, Value::Float64(20.0));
        t.set_value(0, "qty", Value::Int32(5)).unwrap();
        assert_eq!(view.get_row(0).unwrap().last().unwrap().1, Value::Float64(50.0));
    }

    #[test]
    fn test_computed_view_rejects_name_collision() {
        let t = seeded_table();
        let err = t.compute("price", |_| Value::Int32(0)).unwrap_err();
        assert!(matches!(err, LiveTableError::SchemaViolation(_)));
    }

    fn five_row_table() -> Table {
        let schema = Schema::new([("id", ColumnType::Int32, false)]).unwrap();
        let t = Table::new("t", schema).unwrap();
        for id in 1..=5 {
            t.append_row([("id", Value::Int32(id))]).unwrap();
        }
        t
    }

    #[test]
    fn test_projection_view_reverse_slice_with_step() {
        let t = five_row_table();
        let view = t.project(vec!["id".to_string()]).unwrap();
        let rows = view.slice(None, None, Some(-2)).unwrap();
        let ids: Vec<i32> = rows.iter().map(|r| match r[0].1 {
            Value::Int32(v) => v,
            _ => unreachable!(),
        }).collect();
        assert_eq!(ids, vec![5, 3, 1]);
    }

    #[test]
    fn test_computed_view_reverse_slice_with_step() {
        let t = five_row_table();
        let view = t
            .compute("double_id", |row| {
                let id = row[0].1.as_f64().unwrap();
                Value::Int32((id * 2.0) as i32)
            })
            .unwrap();
        let rows = view.slice(None, None, Some(-2)).unwrap();
        let ids: Vec<i32> = rows.iter().map(|r| match r[0].1 {
            Value::Int32(v) => v,
            _ => unreachable!(),
        }).collect();
        let doubled: Vec<i32> = rows.iter().map(|r| match r[1].1 {
            Value::Int32(v) => v,
            _ => unreachable!(),
        }).collect();
        assert_eq!(ids, vec![5, 3, 1]);
        assert_eq!(doubled, vec![10, 6, 2]);
    }
}
