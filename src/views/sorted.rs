//! Incrementally-maintained sorted view.
//!
//! Maintains an ordered sequence of parent row indices under a multi-column
//! key spec. Construction extracts every row's key tuple once and does a
//! single stable sort; after that, each change does a binary-search
//! insert/remove rather than resorting.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use crate::changelog::{ChangeKind, ChangeLog, CursorId};
use crate::column::Column;
use crate::error::LiveTableError;
use crate::row::{resolve_index, resolve_slice, Row};
use crate::schema::Schema;
use crate::table::{Table, TableInner};
use crate::value::{NullOrdering, Value};
use crate::views::{read_parent_row, upgrade_parent, ViewSync};

/// One component of a multi-column sort key.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
    /// `None` uses the per-direction default: nulls-last for ascending,
    /// nulls-first for descending.
    pub nulls_first: Option<bool>,
}

impl SortKey {
    pub fn ascending(column: impl Into<String>) -> Self {
        SortKey { column: column.into(), descending: false, nulls_first: None }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        SortKey { column: column.into(), descending: true, nulls_first: None }
    }

    /// Shorthand for [`SortKey::ascending`].
    pub fn asc(column: impl Into<String>) -> Self {
        SortKey::ascending(column)
    }

    /// Shorthand for [`SortKey::descending`].
    pub fn desc(column: impl Into<String>) -> Self {
        SortKey::descending(column)
    }

    pub fn nulls_first(mut self, yes: bool) -> Self {
        self.nulls_first = Some(yes);
        self
    }

    fn null_ordering(&self) -> NullOrdering {
        let first = self.nulls_first.unwrap_or(self.descending);
        if first {
            NullOrdering::NullsFirst
        } else {
            NullOrdering::NullsLast
        }
    }
}

struct SortedViewState {
    parent: Weak<RefCell<TableInner>>,
    cursor: CursorId,
    keys: Vec<SortKey>,
    key_indices: Vec<usize>,
    /// Parent row indices, in sorted order.
    order: Vec<usize>,
    /// Insertion sequence number per parent row, used to break ties
    /// (stable sort semantics even as rows are inserted/removed later).
    insertion_seq: Vec<u64>,
    next_insertion_seq: u64,
}

impl SortedViewState {
    fn key_tuple(&self, columns: &[Column], row: usize) -> Vec<Value> {
        self.key_indices.iter().map(|&idx| columns[idx].get(row).clone()).collect()
    }

    fn compare(&self, a: &[Value], a_seq: u64, b: &[Value], b_seq: u64) -> Ordering {
        for (key, (va, vb)) in self.keys.iter().zip(a.iter().zip(b.iter())) {
            let ord = va.cmp_with_nulls(vb, key.null_ordering());
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a_seq.cmp(&b_seq)
    }

    fn position_for(&self, columns: &[Column], key: &[Value], seq: u64) -> usize {
        self.order.partition_point(|&row| {
            let other = self.key_tuple(columns, row);
            self.compare(&other, self.insertion_seq[row], key, seq) == Ordering::Less
        })
    }

    fn shift_up_from(&mut self, from: usize) {
        for idx in self.order.iter_mut() {
            if *idx >= from {
                *idx += 1;
            }
        }
    }

    fn shift_down_after(&mut self, after: usize) {
        for idx in self.order.iter_mut() {
            if *idx > after {
                *idx -= 1;
            }
        }
    }

    fn remove_from_order(&mut self, row: usize) {
        if let Some(pos) = self.order.iter().position(|&r| r == row) {
            self.order.remove(pos);
        }
    }
}

impl ViewSync for SortedViewState {
    fn parent_cursor(&self) -> CursorId {
        self.cursor
    }

    fn apply_pending(
        &mut self,
        log: &ChangeLog,
        columns: &[Column],
        _schema: &Schema,
    ) -> Result<u64, LiveTableError> {
        let mut caught_up_to = log.cursor_position(self.cursor);
        for change in log.iter_from(self.cursor) {
            match change.kind {
                ChangeKind::Insert => {
                    self.shift_up_from(change.row);
                    // insertion_seq/key bookkeeping vectors grow in lockstep
                    // with column storage, which has already observed this
                    // insert by the time views sync.
                    while self.insertion_seq.len() <= change.row {
                        self.insertion_seq.push(0);
                    }
                    let seq = self.next_insertion_seq;
                    self.next_insertion_seq += 1;
                    self.insertion_seq[change.row] = seq;
                    let key = self.key_tuple(columns, change.row);
                    let pos = self.position_for(columns, &key, seq);
                    self.order.insert(pos, change.row);
                }
                ChangeKind::Delete => {
                    self.remove_from_order(change.row);
                    self.insertion_seq.remove(change.row);
                    self.shift_down_after(change.row);
                }
                ChangeKind::Update => {
                    let col = change.column.as_deref().unwrap_or("");
                    if self.keys.iter().any(|k| k.column == col) {
                        self.remove_from_order(change.row);
                        let seq = self.insertion_seq[change.row];
                        let key = self.key_tuple(columns, change.row);
                        let pos = self.position_for(columns, &key, seq);
                        self.order.insert(pos, change.row);
                    }
                }
            }
            caught_up_to = change.seq + 1;
        }
        Ok(caught_up_to)
    }
}

/// Public handle to a sorted view.
#[derive(Clone)]
pub struct SortedView(Rc<RefCell<SortedViewState>>);

impl SortedView {
    pub(crate) fn new(table: &Table, keys: Vec<SortKey>) -> Result<Self, LiveTableError> {
        if keys.is_empty() {
            return Err(LiveTableError::ShapeMismatch("sort requires at least one key".into()));
        }
        let inner_rc = table.inner_rc();
        let mut inner = inner_rc.borrow_mut();

        let mut key_indices = Vec::with_capacity(keys.len());
        for key in &keys {
            let idx = inner.schema.index_of(&key.column).ok_or_else(|| {
                LiveTableError::SchemaViolation(format!("unknown sort column {:?}", key.column))
            })?;
            key_indices.push(idx);
        }

        let row_count = inner.row_count();
        let cursor = inner.changelog.register_cursor();

        let mut state = SortedViewState {
            parent: table.weak(),
            cursor,
            keys,
            key_indices,
            order: (0..row_count).collect(),
            insertion_seq: (0..row_count as u64).collect(),
            next_insertion_seq: row_count as u64,
        };

        state.order.sort_by(|&a, &b| {
            let ka = state.key_tuple(&inner.columns, a);
            let kb = state.key_tuple(&inner.columns, b);
            state.compare(&ka, state.insertion_seq[a], &kb, state.insertion_seq[b])
        });

        let state = Rc::new(RefCell::new(state));
        inner.views.push((cursor, Rc::downgrade(&state)));
        drop(inner);
        Ok(SortedView(state))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_parent_index(&self, view_row: usize) -> Result<usize, LiveTableError> {
        let state = self.0.borrow();
        state.order.get(view_row).copied().ok_or_else(|| {
            LiveTableError::OutOfRange(format!("view row {view_row} out of range for length {}", state.order.len()))
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

impl IntoIterator for &SortedView {
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
        let schema = Schema::new([("id", ColumnType::Int32, false), ("score", ColumnType::Int32, true)]).unwrap();
        let t = Table::new("t", schema).unwrap();
        for (id, score) in [(1, Some(30)), (2, None), (3, Some(10)), (4, Some(20))] {
            t.append_row([
                ("id", Value::Int32(id)),
                ("score", score.map(Value::Int32).unwrap_or(Value::Null)),
            ])
            .unwrap();
        }
        t
    }

    #[test]
    fn test_construction_sorts_ascending_nulls_last() {
        let t = seeded_table();
        let view = t.sort(vec![SortKey::asc("score")]).unwrap();
        let ids: Vec<Value> = (0..view.len()).map(|i| view.get_row(i).unwrap()[0].1.clone()).collect();
        assert_eq!(ids, vec![Value::Int32(3), Value::Int32(4), Value::Int32(1), Value::Int32(2)]);
    }

    #[test]
    fn test_construction_sorts_descending_nulls_first() {
        let t = seeded_table();
        let view = t.sort(vec![SortKey::desc("score")]).unwrap();
        let ids: Vec<Value> = (0..view.len()).map(|i| view.get_row(i).unwrap()[0].1.clone()).collect();
        assert_eq!(ids, vec![Value::Int32(2), Value::Int32(1), Value::Int32(4), Value::Int32(3)]);
    }

    #[test]
    fn test_insert_places_row_in_order() {
        let t = seeded_table();
        let view = t.sort(vec![SortKey::asc("score")]).unwrap();
        t.append_row([("id", Value::Int32(5)), ("score", Value::Int32(15))]).unwrap();
        t.tick().unwrap();
        let ids: Vec<Value> = (0..view.len()).map(|i| view.get_row(i).unwrap()[0].1.clone()).collect();
        assert_eq!(
            ids,
            vec![Value::Int32(3), Value::Int32(5), Value::Int32(4), Value::Int32(1), Value::Int32(2)]
        );
    }

    #[test]
    fn test_update_on_key_column_reorders() {
        let t = seeded_table();
        let view = t.sort(vec![SortKey::asc("score")]).unwrap();
        t.set_value(0, "score", Value::Int32(5)).unwrap(); // id=1 moves to front
        t.tick().unwrap();
        assert_eq!(view.get_row(0).unwrap()[0].1, Value::Int32(1));
    }

    #[test]
    fn test_delete_removes_row() {
        let t = seeded_table();
        let view = t.sort(vec![SortKey::asc("score")]).unwrap();
        t.delete_row(2).unwrap(); // id=3, score=10
        t.tick().unwrap();
        assert_eq!(view.len(), 3);
        let ids: Vec<Value> = (0..view.len()).map(|i| view.get_row(i).unwrap()[0].1.clone()).collect();
        assert!(!ids.contains(&Value::Int32(3)));
    }

    #[test]
    fn test_reverse_slice_with_step() {
        let schema = Schema::new([("id", ColumnType::Int32, false)]).unwrap();
        let t = Table::new("t", schema).unwrap();
        for id in 1..=5 {
            t.append_row([("id", Value::Int32(id))]).unwrap();
        }
        let view = t.sort(vec![SortKey::ascending("id")]).unwrap();
        let rows = view.slice(None, None, Some(-2)).unwrap();
        let ids: Vec<Value> = rows.iter().map(|r| r[0].1.clone()).collect();
        assert_eq!(ids, vec![Value::Int32(5), Value::Int32(3), Value::Int32(1)]);
    }
}
