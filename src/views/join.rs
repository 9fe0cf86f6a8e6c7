//! Incrementally-maintained hash join view.
//!
//! Only equi-joins on one or more key columns are supported, INNER or LEFT.
//! The right side is always the build side, regardless of which table is
//! larger, so that maintenance cost is predictable under either side's
//! mutation stream (grounded in the build-side-multimap shape used by
//! `examples/other_examples/.../differential-dataflow/.../join.rs` and
//! `.../risingwave/.../managed_state/join/mod.rs`, per DESIGN.md).
//!
//! A join view depends on *two* parent tables, so unlike every other view it
//! registers one cursor per side and holds two small [`ViewSync`] adapters —
//! [`JoinSide`] — rather than implementing the trait on the shared state
//! directly; `Table::tick` only ever drives the side whose log it owns.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::changelog::{ChangeKind, ChangeLog, CursorId};
use crate::column::Column;
use crate::error::LiveTableError;
use crate::row::{resolve_index, resolve_slice, Row};
use crate::schema::Schema;
use crate::table::{Table, TableInner};
use crate::value::{KeyTuple, Value};
use crate::views::{upgrade_parent, ViewSync};

/// Which join semantics to apply to left rows with no matching right row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// One emitted output row: a left parent row index and, for a match, the
/// matching right parent row index.
#[derive(Debug, Clone, Copy)]
struct OutputRow {
    left: usize,
    right: Option<usize>,
}

struct HashJoinViewState {
    left_parent: Weak<RefCell<TableInner>>,
    right_parent: Weak<RefCell<TableInner>>,
    left_cursor: CursorId,
    right_cursor: CursorId,
    left_key_names: Vec<String>,
    right_key_names: Vec<String>,
    left_key_indices: Vec<usize>,
    right_key_indices: Vec<usize>,
    kind: JoinKind,
    /// Non-null-keyed rows only — a null key component excludes a row from
    /// both build and probe sides.
    left_index: HashMap<KeyTuple, Vec<usize>>,
    right_index: HashMap<KeyTuple, Vec<usize>>,
    output: Vec<OutputRow>,
}

impl HashJoinViewState {
    fn key_tuple(columns: &[Column], indices: &[usize], row: usize) -> KeyTuple {
        KeyTuple::new(indices.iter().map(|&i| columns[i].get(row).clone()).collect())
    }

    fn key_tuple_from_image(image: &[(String, Value)], names: &[String]) -> KeyTuple {
        KeyTuple::new(
            names
                .iter()
                .map(|name| image.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()).unwrap_or(Value::Null))
                .collect(),
        )
    }

    fn has_right_match(&self, left_row: usize) -> bool {
        self.output.iter().any(|o| o.left == left_row && o.right.is_some())
    }

    fn remove_output_for_left(&mut self, left_row: usize) {
        self.output.retain(|o| o.left != left_row);
    }

    /// Removes every output row referencing `right_row`, returning the
    /// left rows that were affected (so LEFT semantics can re-emit a
    /// fallback for any that now have zero remaining matches).
    fn remove_output_for_right(&mut self, right_row: usize) -> Vec<usize> {
        let affected: Vec<usize> = self.output.iter().filter(|o| o.right == Some(right_row)).map(|o| o.left).collect();
        self.output.retain(|o| o.right != Some(right_row));
        affected
    }

    fn shift_output_left(&mut self, from: usize, delta: i64) {
        for o in self.output.iter_mut() {
            if delta > 0 {
                if o.left >= from {
                    o.left += 1;
                }
            } else if o.left > from {
                o.left -= 1;
            }
        }
    }

    fn shift_output_right(&mut self, from: usize, delta: i64) {
        for o in self.output.iter_mut() {
            if let Some(r) = o.right.as_mut() {
                if delta > 0 {
                    if *r >= from {
                        *r += 1;
                    }
                } else if *r > from {
                    *r -= 1;
                }
            }
        }
    }

    fn shift_index(index: &mut HashMap<KeyTuple, Vec<usize>>, from: usize, delta: i64) {
        for bucket in index.values_mut() {
            for v in bucket.iter_mut() {
                if delta > 0 {
                    if *v >= from {
                        *v += 1;
                    }
                } else if *v > from {
                    *v -= 1;
                }
            }
        }
    }

    fn remove_from_bucket(index: &mut HashMap<KeyTuple, Vec<usize>>, key: &KeyTuple, row: usize) {
        if let Some(bucket) = index.get_mut(key) {
            if let Some(pos) = bucket.iter().position(|&r| r == row) {
                bucket.remove(pos);
            }
            if bucket.is_empty() {
                index.remove(key);
            }
        }
    }

    /// Adds a left row to the probe side: registers it in `left_index` (if
    /// its key is non-null) and emits matches against the current build
    /// side, or a LEFT fallback if there are none.
    fn left_probe_insert(&mut self, row: usize, key: KeyTuple) {
        if key.has_null() {
            if self.kind == JoinKind::Left {
                self.output.push(OutputRow { left: row, right: None });
            }
            return;
        }
        let matches = self.right_index.get(&key).cloned();
        self.left_index.entry(key).or_default().push(row);
        match matches {
            Some(rows) if !rows.is_empty() => {
                for r in rows {
                    self.output.push(OutputRow { left: row, right: Some(r) });
                }
            }
            _ => {
                if self.kind == JoinKind::Left {
                    self.output.push(OutputRow { left: row, right: None });
                }
            }
        }
    }

    /// Adds a right row to the build side: registers it in `right_index`
    /// (if its key is non-null) and emits a match for every existing left
    /// row whose key agrees, clearing any LEFT fallback those rows held.
    fn right_build_insert(&mut self, row: usize, key: KeyTuple) {
        if key.has_null() {
            return;
        }
        let matching_left = self.left_index.get(&key).cloned();
        self.right_index.entry(key).or_default().push(row);
        if let Some(lefts) = matching_left {
            for l in lefts {
                if let Some(pos) = self.output.iter().position(|o| o.left == l && o.right.is_none()) {
                    self.output.remove(pos);
                }
                self.output.push(OutputRow { left: l, right: Some(row) });
            }
        }
    }

    fn apply_left_change(&mut self, columns: &[Column], kind: ChangeKind, row: usize, column: Option<&str>, before: Option<&Value>, row_image: Option<&[(String, Value)]>) {
        match kind {
            ChangeKind::Insert => {
                self.shift_output_left(row, 1);
                Self::shift_index(&mut self.left_index, row, 1);
                let key = Self::key_tuple(columns, &self.left_key_indices, row);
                self.left_probe_insert(row, key);
            }
            ChangeKind::Delete => {
                let image = row_image.expect("delete change carries row image");
                let key = Self::key_tuple_from_image(image, &self.left_key_names);
                Self::remove_from_bucket(&mut self.left_index, &key, row);
                self.remove_output_for_left(row);
                self.shift_output_left(row, -1);
                Self::shift_index(&mut self.left_index, row, -1);
            }
            ChangeKind::Update => {
                let col = column.unwrap_or("");
                if !self.left_key_names.iter().any(|n| n == col) {
                    return;
                }
                let mut old_values = Self::key_tuple(columns, &self.left_key_indices, row).0;
                if let Some(pos) = self.left_key_names.iter().position(|n| n == col) {
                    old_values[pos] = before.cloned().unwrap_or(Value::Null);
                }
                let old_key = KeyTuple::new(old_values);
                Self::remove_from_bucket(&mut self.left_index, &old_key, row);
                self.remove_output_for_left(row);
                let new_key = Self::key_tuple(columns, &self.left_key_indices, row);
                self.left_probe_insert(row, new_key);
            }
        }
    }

    fn apply_right_change(&mut self, columns: &[Column], kind: ChangeKind, row: usize, column: Option<&str>, before: Option<&Value>, row_image: Option<&[(String, Value)]>) {
        match kind {
            ChangeKind::Insert => {
                self.shift_output_right(row, 1);
                Self::shift_index(&mut self.right_index, row, 1);
                let key = Self::key_tuple(columns, &self.right_key_indices, row);
                self.right_build_insert(row, key);
            }
            ChangeKind::Delete => {
                let image = row_image.expect("delete change carries row image");
                let key = Self::key_tuple_from_image(image, &self.right_key_names);
                Self::remove_from_bucket(&mut self.right_index, &key, row);
                let affected = self.remove_output_for_right(row);
                self.shift_output_right(row, -1);
                Self::shift_index(&mut self.right_index, row, -1);
                if self.kind == JoinKind::Left {
                    for l in affected {
                        if !self.has_right_match(l) {
                            self.output.push(OutputRow { left: l, right: None });
                        }
                    }
                }
            }
            ChangeKind::Update => {
                let col = column.unwrap_or("");
                if !self.right_key_names.iter().any(|n| n == col) {
                    return;
                }
                let mut old_values = Self::key_tuple(columns, &self.right_key_indices, row).0;
                if let Some(pos) = self.right_key_names.iter().position(|n| n == col) {
                    old_values[pos] = before.cloned().unwrap_or(Value::Null);
                }
                let old_key = KeyTuple::new(old_values);
                Self::remove_from_bucket(&mut self.right_index, &old_key, row);
                let affected = self.remove_output_for_right(row);
                let new_key = Self::key_tuple(columns, &self.right_key_indices, row);
                self.right_build_insert(row, new_key);
                if self.kind == JoinKind::Left {
                    for l in affected {
                        if !self.has_right_match(l) {
                            self.output.push(OutputRow { left: l, right: None });
                        }
                    }
                }
            }
        }
    }
}

/// Forwards `Table::tick` on one side of a join to the shared join state.
/// The join registers one of these on each parent table's view registry.
enum Side {
    Left,
    Right,
}

struct JoinSide {
    shared: Rc<RefCell<HashJoinViewState>>,
    side: Side,
}

impl ViewSync for JoinSide {
    fn parent_cursor(&self) -> CursorId {
        let state = self.shared.borrow();
        match self.side {
            Side::Left => state.left_cursor,
            Side::Right => state.right_cursor,
        }
    }

    fn apply_pending(&mut self, log: &ChangeLog, columns: &[Column], _schema: &Schema) -> Result<u64, LiveTableError> {
        let mut state = self.shared.borrow_mut();
        let cursor = match self.side {
            Side::Left => state.left_cursor,
            Side::Right => state.right_cursor,
        };
        let mut caught_up_to = log.cursor_position(cursor);
        for change in log.iter_from(cursor) {
            match self.side {
                Side::Left => state.apply_left_change(
                    columns,
                    change.kind,
                    change.row,
                    change.column.as_deref(),
                    change.before.as_ref(),
                    change.row_image.as_deref(),
                ),
                Side::Right => state.apply_right_change(
                    columns,
                    change.kind,
                    change.row,
                    change.column.as_deref(),
                    change.before.as_ref(),
                    change.row_image.as_deref(),
                ),
            }
            caught_up_to = change.seq + 1;
        }
        Ok(caught_up_to)
    }
}

/// Public handle to a hash join view.
///
/// Owns the shared join state plus both [`JoinSide`] adapters strongly, so
/// that each parent table's weak view-registry entry upgrades only while
/// this handle (or a clone of it) is alive; dropping the last handle drops
/// the join state and both sides together, with no reference cycle back up
/// to the handle.
#[derive(Clone)]
pub struct HashJoinView {
    shared: Rc<RefCell<HashJoinViewState>>,
    left_side: Rc<RefCell<JoinSide>>,
    right_side: Rc<RefCell<JoinSide>>,
}

impl HashJoinView {
    pub(crate) fn new(
        left: &Table,
        right: &Table,
        left_keys: Vec<String>,
        right_keys: Vec<String>,
        kind: JoinKind,
    ) -> Result<Self, LiveTableError> {
        if left_keys.is_empty() || right_keys.is_empty() {
            return Err(LiveTableError::ShapeMismatch("join requires at least one key column per side".into()));
        }
        if left_keys.len() != right_keys.len() {
            return Err(LiveTableError::ShapeMismatch(format!(
                "left key arity {} does not match right key arity {}",
                left_keys.len(),
                right_keys.len()
            )));
        }

        let left_rc = left.inner_rc().clone();
        let right_rc = right.inner_rc().clone();

        let (left_key_indices, right_key_indices, left_row_count, right_row_count) = {
            let left_inner = left_rc.borrow();
            let right_inner = right_rc.borrow();
            let left_key_indices: Vec<usize> = left_keys
                .iter()
                .map(|name| {
                    left_inner
                        .schema
                        .index_of(name)
                        .ok_or_else(|| LiveTableError::SchemaViolation(format!("unknown left join column {name:?}")))
                })
                .collect::<Result<_, _>>()?;
            let right_key_indices: Vec<usize> = right_keys
                .iter()
                .map(|name| {
                    right_inner
                        .schema
                        .index_of(name)
                        .ok_or_else(|| LiveTableError::SchemaViolation(format!("unknown right join column {name:?}")))
                })
                .collect::<Result<_, _>>()?;
            (left_key_indices, right_key_indices, left_inner.row_count(), right_inner.row_count())
        };

        let left_cursor = left_rc.borrow_mut().changelog.register_cursor();
        let right_cursor = right_rc.borrow_mut().changelog.register_cursor();

        let mut state = HashJoinViewState {
            left_parent: left.weak(),
            right_parent: right.weak(),
            left_cursor,
            right_cursor,
            left_key_names: left_keys,
            right_key_names: right_keys,
            left_key_indices,
            right_key_indices,
            kind,
            left_index: HashMap::new(),
            right_index: HashMap::new(),
            output: Vec::new(),
        };

        // Build the right (build) side fully before probing with the left
        // side, so construction reproduces the same cross-product-per-key
        // shape the incremental path produces.
        {
            let right_inner = right_rc.borrow();
            for row in 0..right_row_count {
                let key = HashJoinViewState::key_tuple(&right_inner.columns, &state.right_key_indices, row);
                state.right_build_insert(row, key);
            }
        }
        {
            let left_inner = left_rc.borrow();
            for row in 0..left_row_count {
                let key = HashJoinViewState::key_tuple(&left_inner.columns, &state.left_key_indices, row);
                state.left_probe_insert(row, key);
            }
        }

        let shared = Rc::new(RefCell::new(state));
        let left_side = Rc::new(RefCell::new(JoinSide { shared: shared.clone(), side: Side::Left }));
        let right_side = Rc::new(RefCell::new(JoinSide { shared: shared.clone(), side: Side::Right }));
        left_rc.borrow_mut().views.push((left_cursor, Rc::downgrade(&left_side)));
        right_rc.borrow_mut().views.push((right_cursor, Rc::downgrade(&right_side)));

        Ok(HashJoinView { shared, left_side, right_side })
    }

    pub fn len(&self) -> usize {
        self.shared.borrow().output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_row(&self, view_row: usize) -> Result<Row, LiveTableError> {
        let state = self.shared.borrow();
        let out = state.output.get(view_row).copied().ok_or_else(|| {
            LiveTableError::OutOfRange(format!("view row {view_row} out of range for length {}", state.output.len()))
        })?;

        let left_parent = upgrade_parent(&state.left_parent)?;
        let left_inner = left_parent.borrow();
        let mut row = crate::views::read_parent_row(&left_inner.columns, &left_inner.schema, out.left);

        let right_parent = upgrade_parent(&state.right_parent)?;
        let right_inner = right_parent.borrow();
        let right_names = right_inner.schema.column_names();
        match out.right {
            Some(r) => {
                for (name, col) in right_names.iter().zip(right_inner.columns.iter()) {
                    row.push((format!("right_{name}"), col.get(r).clone()));
                }
            }
            None => {
                for name in &right_names {
                    row.push((format!("right_{name}"), Value::Null));
                }
            }
        }
        Ok(row)
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

impl IntoIterator for &HashJoinView {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().expect("parent tables still alive").into_iter()
    }
}
