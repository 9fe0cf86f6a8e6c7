//! The base table: schema + columns + change log + registered views.
//!
//! A [`Table`] is a cheap handle (`Rc<RefCell<TableInner>>`) so that views
//! can hold a [`Weak`] back-reference for on-demand row reads while the
//! table itself drives all mutation and all view synchronization through
//! [`Table::tick`].

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::changelog::{Change, ChangeKind, ChangeLog, CursorId};
use crate::column::Column;
use crate::error::LiveTableError;
use crate::filter_expr;
use crate::interner::{InternerStats, StringInterner};
use crate::row::{resolve_index, resolve_slice, Row};
use crate::schema::Schema;
use crate::value::Value;
use crate::views::ViewSync;

/// Construction-time options. One immutable bundle consumed at
/// construction, no global mutable configuration afterward.
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    pub use_tiered_vector: bool,
    pub use_string_interning: bool,
}

/// Builder for [`TableOptions`] plus the table name/schema, so call sites
/// read `TableBuilder::new("orders", schema).use_tiered_vector(true).build()`
/// instead of constructing the options struct by hand.
pub struct TableBuilder {
    name: String,
    schema: Schema,
    options: TableOptions,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        TableBuilder {
            name: name.into(),
            schema,
            options: TableOptions::default(),
        }
    }

    pub fn use_tiered_vector(mut self, yes: bool) -> Self {
        self.options.use_tiered_vector = yes;
        self
    }

    pub fn use_string_interning(mut self, yes: bool) -> Self {
        self.options.use_string_interning = yes;
        self
    }

    pub fn build(self) -> Result<Table, LiveTableError> {
        Table::with_options(self.name, self.schema, self.options)
    }
}

/// Shared mutable table state. Never exposed directly; reached either
/// through the owning [`Table`] handle or a view's [`Weak`] back-reference.
pub struct TableInner {
    pub(crate) name: String,
    pub(crate) schema: Schema,
    pub(crate) columns: Vec<Column>,
    pub(crate) changelog: ChangeLog,
    pub(crate) interner: Option<Rc<RefCell<StringInterner>>>,
    /// Weak so that dropping the host's view handle actually drops the
    /// view state; the cursor is deregistered the next time `tick` or
    /// `clear_changeset` notices the weak reference no longer upgrades
    /// (spec.md §3: "destroyed by host release; destruction deregisters
    /// the cursor and may trigger compaction").
    pub(crate) views: Vec<(CursorId, Weak<RefCell<dyn ViewSync>>)>,
}

impl TableInner {
    pub(crate) fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }
}

/// A columnar, incrementally-maintained base table.
#[derive(Clone)]
pub struct Table(Rc<RefCell<TableInner>>);

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema) -> Result<Self, LiveTableError> {
        Table::with_options(name, schema, TableOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        schema: Schema,
        options: TableOptions,
    ) -> Result<Self, LiveTableError> {
        let interner = if options.use_string_interning {
            Some(Rc::new(RefCell::new(StringInterner::new())))
        } else {
            None
        };

        let columns = schema
            .columns()
            .iter()
            .map(|def| {
                let col = Column::new(def.name.clone(), def.ty, def.nullable, options.use_tiered_vector);
                match (&interner, def.ty) {
                    (Some(interner), crate::value::ColumnType::String) => {
                        col.with_interner(interner.clone())
                    }
                    _ => col,
                }
            })
            .collect();

        let inner = TableInner {
            name: name.into(),
            schema,
            columns,
            changelog: ChangeLog::new(),
            interner,
            views: Vec::new(),
        };
        Ok(Table(Rc::new(RefCell::new(inner))))
    }

    pub(crate) fn weak(&self) -> Weak<RefCell<TableInner>> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn inner_rc(&self) -> &Rc<RefCell<TableInner>> {
        &self.0
    }

    pub(crate) fn register_view(&self, cursor: CursorId, view: Weak<RefCell<dyn ViewSync>>) {
        self.0.borrow_mut().views.push((cursor, view));
    }

    /// Drops any view entry whose host handle no longer exists, deregistering
    /// its cursor so a released view cannot hold back compaction forever.
    fn prune_dead_views(inner: &mut TableInner) {
        let mut alive = Vec::with_capacity(inner.views.len());
        for (cursor, weak) in inner.views.drain(..) {
            if weak.upgrade().is_some() {
                alive.push((cursor, weak));
            } else {
                inner.changelog.drop_cursor(cursor);
            }
        }
        inner.views = alive;
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn schema(&self) -> Schema {
        self.0.borrow().schema.clone()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.0.borrow().schema.column_names()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn uses_string_interning(&self) -> bool {
        self.0.borrow().interner.is_some()
    }

    pub fn interner_stats(&self) -> Option<InternerStats> {
        self.0.borrow().interner.as_ref().map(|i| i.borrow().stats())
    }

    /// Validates a candidate row map against the schema without mutating
    /// anything. Returns values in schema column order.
    fn validate_row(
        schema: &Schema,
        row: &[(String, Value)],
    ) -> Result<Vec<Value>, LiveTableError> {
        if row.len() != schema.column_count() {
            return Err(LiveTableError::SchemaViolation(format!(
                "expected {} columns, got {}",
                schema.column_count(),
                row.len()
            )));
        }
        let mut ordered: Vec<Option<Value>> = vec![None; schema.column_count()];
        for (name, value) in row {
            let Some(idx) = schema.index_of(name) else {
                return Err(LiveTableError::SchemaViolation(format!(
                    "unknown column {name:?}"
                )));
            };
            if ordered[idx].is_some() {
                return Err(LiveTableError::SchemaViolation(format!(
                    "duplicate column {name:?} in row"
                )));
            }
            ordered[idx] = Some(value.clone());
        }
        let mut values = Vec::with_capacity(ordered.len());
        for (def, slot) in schema.columns().iter().zip(ordered.into_iter()) {
            let Some(value) = slot else {
                return Err(LiveTableError::SchemaViolation(format!(
                    "missing column {:?}",
                    def.name
                )));
            };
            value.check_against(&def.name, def.ty, def.nullable)?;
            values.push(value);
        }
        Ok(values)
    }

    /// Appends one row, given as an arbitrary-order set of `(column, value)`
    /// pairs. Fails with `SchemaViolation`/`TypeMismatch`/`NullViolation`
    /// without mutating any column.
    pub fn append_row(
        &self,
        row: impl IntoIterator<Item = (impl Into<String>, Value)>,
    ) -> Result<usize, LiveTableError> {
        let pairs: Vec<(String, Value)> = row.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let mut inner = self.0.borrow_mut();
        let values = Table::validate_row(&inner.schema, &pairs)?;
        let new_row = inner.row_count();
        for (col, value) in inner.columns.iter_mut().zip(values.into_iter()) {
            col.append(value).expect("validated above");
        }
        inner.changelog.append(Change {
            seq: 0,
            kind: ChangeKind::Insert,
            row: new_row,
            column: None,
            before: None,
            after: None,
            row_image: None,
        });
        log::trace!("appended row {new_row} to table {:?}", inner.name);
        Ok(new_row)
    }

    /// Appends many rows. Validates every row before mutating any column
    /// (all-or-nothing); emits one `Insert` per row on success.
    pub fn append_rows(
        &self,
        rows: impl IntoIterator<Item = Vec<(impl Into<String>, Value)>>,
    ) -> Result<Vec<usize>, LiveTableError> {
        let rows: Vec<Vec<(String, Value)>> = rows
            .into_iter()
            .map(|r| r.into_iter().map(|(k, v)| (k.into(), v)).collect())
            .collect();

        let mut inner = self.0.borrow_mut();
        let mut all_values = Vec::with_capacity(rows.len());
        for row in &rows {
            all_values.push(Table::validate_row(&inner.schema, row)?);
        }

        let mut indices = Vec::with_capacity(all_values.len());
        for values in all_values {
            let new_row = inner.row_count();
            for (col, value) in inner.columns.iter_mut().zip(values.into_iter()) {
                col.append(value).expect("validated above");
            }
            inner.changelog.append(Change {
                seq: 0,
                kind: ChangeKind::Insert,
                row: new_row,
                column: None,
                before: None,
                after: None,
                row_image: None,
            });
            indices.push(new_row);
        }
        Ok(indices)
    }

    /// Sets a single cell. A no-op (no change emitted) if the new value
    /// equals the current one under `Value`'s structural equality.
    pub fn set_value(&self, row: usize, column: &str, value: Value) -> Result<(), LiveTableError> {
        let mut inner = self.0.borrow_mut();
        let row_count = inner.row_count();
        if row >= row_count {
            return Err(LiveTableError::OutOfRange(format!(
                "row {row} out of range for length {row_count}"
            )));
        }
        let Some(idx) = inner.schema.index_of(column) else {
            return Err(LiveTableError::SchemaViolation(format!(
                "unknown column {column:?}"
            )));
        };
        let def = inner.schema.columns()[idx].clone();
        value.check_against(&def.name, def.ty, def.nullable)?;

        let before = inner.columns[idx].get(row).clone();
        if before == value {
            return Ok(());
        }
        let after = value.clone();
        inner.columns[idx].set(row, value)?;
        inner.changelog.append(Change {
            seq: 0,
            kind: ChangeKind::Update,
            row,
            column: Some(column.to_string()),
            before: Some(before),
            after: Some(after),
            row_image: None,
        });
        Ok(())
    }

    /// Removes a row from every column, emitting a `Delete` carrying the
    /// full pre-image so views can apply incremental updates without
    /// reading back through the (now-shrunk) table.
    pub fn delete_row(&self, row: usize) -> Result<(), LiveTableError> {
        let mut inner = self.0.borrow_mut();
        let row_count = inner.row_count();
        if row >= row_count {
            return Err(LiveTableError::OutOfRange(format!(
                "row {row} out of range for length {row_count}"
            )));
        }
        let names = inner.schema.column_names();
        let image: Vec<(String, Value)> = names
            .into_iter()
            .zip(inner.columns.iter())
            .map(|(name, col)| (name, col.get(row).clone()))
            .collect();
        for col in inner.columns.iter_mut() {
            col.remove(row);
        }
        inner.changelog.append(Change {
            seq: 0,
            kind: ChangeKind::Delete,
            row,
            column: None,
            before: None,
            after: None,
            row_image: Some(image),
        });
        Ok(())
    }

    pub fn get_row(&self, row: usize) -> Result<Row, LiveTableError> {
        let inner = self.0.borrow();
        let row_count = inner.row_count();
        if row >= row_count {
            return Err(LiveTableError::OutOfRange(format!(
                "row {row} out of range for length {row_count}"
            )));
        }
        Ok(crate::views::read_parent_row(&inner.columns, &inner.schema, row))
    }

    pub fn get_value(&self, row: usize, column: &str) -> Result<Value, LiveTableError> {
        let inner = self.0.borrow();
        let row_count = inner.row_count();
        if row >= row_count {
            return Err(LiveTableError::OutOfRange(format!(
                "row {row} out of range for length {row_count}"
            )));
        }
        let idx = inner.schema.index_of(column).ok_or_else(|| {
            LiveTableError::SchemaViolation(format!("unknown column {column:?}"))
        })?;
        Ok(inner.columns[idx].get(row).clone())
    }

    /// Python-style indexing: `table.get(-1)` is the last row.
    pub fn get(&self, index: i64) -> Result<Row, LiveTableError> {
        let len = self.len();
        let row = resolve_index(index, len)?;
        self.get_row(row)
    }

    /// Python-style slicing: `table.slice(Some(2), None, None)` is "from
    /// row 2 to the end"; a negative `step` walks the table back to front.
    /// Out-of-range bounds clamp rather than error; a zero step errors.
    pub fn slice(&self, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Vec<Row>, LiveTableError> {
        let len = self.len();
        resolve_slice(start, stop, step, len)?.into_iter().map(|i| self.get_row(i)).collect()
    }

    /// Advances every registered cursor to the tail and compacts. Intended
    /// for test setup, so a table can be seeded without leaving views to
    /// catch up later.
    pub fn clear_changeset(&self) {
        let mut inner = self.0.borrow_mut();
        Table::prune_dead_views(&mut inner);
        let tail = inner.changelog.tail_seq();
        let cursor_ids: Vec<_> = inner.views.iter().map(|(c, _)| *c).collect();
        for id in cursor_ids {
            inner.changelog.advance_cursor(id, tail);
        }
        inner.changelog.compact();
    }

    /// Drives every registered view's incremental update, then compacts the
    /// change log. Returns the number of views synced — every still-live
    /// registered view counts, even ones with nothing pending. A view whose
    /// host handle has been dropped since the last tick is pruned first and
    /// does not count toward the returned total.
    pub fn tick(&self) -> Result<usize, LiveTableError> {
        let mut inner = self.0.borrow_mut();
        Table::prune_dead_views(&mut inner);
        let views: Vec<(CursorId, Rc<RefCell<dyn ViewSync>>)> = inner
            .views
            .iter()
            .filter_map(|(c, w)| w.upgrade().map(|v| (*c, v)))
            .collect();
        for (cursor_id, view) in &views {
            let new_pos = view
                .borrow_mut()
                .apply_pending(&inner.changelog, &inner.columns, &inner.schema)?;
            inner.changelog.advance_cursor(*cursor_id, new_pos);
        }
        inner.changelog.compact();
        log::debug!("tick synced {} views, log now {} entries", views.len(), inner.changelog.len());
        Ok(views.len())
    }

    fn column_index(&self, column: &str) -> Result<usize, LiveTableError> {
        self.0
            .borrow()
            .schema
            .index_of(column)
            .ok_or_else(|| LiveTableError::SchemaViolation(format!("unknown column {column:?}")))
    }

    /// Sum of non-null values, coerced via `as_f64`. `0.0` over an
    /// all-null or empty column.
    pub fn sum(&self, column: &str) -> Result<f64, LiveTableError> {
        let idx = self.column_index(column)?;
        let inner = self.0.borrow();
        Ok((0..inner.columns[idx].len())
            .filter_map(|i| inner.columns[idx].get(i).as_f64())
            .sum())
    }

    pub fn avg(&self, column: &str) -> Result<Option<f64>, LiveTableError> {
        let idx = self.column_index(column)?;
        let inner = self.0.borrow();
        let values: Vec<f64> = (0..inner.columns[idx].len())
            .filter_map(|i| inner.columns[idx].get(i).as_f64())
            .collect();
        if values.is_empty() {
            Ok(None)
        } else {
            Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
        }
    }

    pub fn min(&self, column: &str) -> Result<Option<f64>, LiveTableError> {
        let idx = self.column_index(column)?;
        let inner = self.0.borrow();
        Ok((0..inner.columns[idx].len())
            .filter_map(|i| inner.columns[idx].get(i).as_f64())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v)))))
    }

    pub fn max(&self, column: &str) -> Result<Option<f64>, LiveTableError> {
        let idx = self.column_index(column)?;
        let inner = self.0.borrow();
        Ok((0..inner.columns[idx].len())
            .filter_map(|i| inner.columns[idx].get(i).as_f64())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v)))))
    }

    pub fn count_non_null(&self, column: &str) -> Result<usize, LiveTableError> {
        let idx = self.column_index(column)?;
        let inner = self.0.borrow();
        Ok((0..inner.columns[idx].len())
            .filter(|&i| !inner.columns[idx].get(i).is_null())
            .count())
    }

    /// Evaluates a restricted SQL-like predicate against the table's
    /// current state and returns the matching row indices, without
    /// registering a view.
    pub fn filter_expr(&self, expr: &str) -> Result<Vec<usize>, LiveTableError> {
        let inner = self.0.borrow();
        filter_expr::eval_str(expr, &inner.columns, &inner.schema)
    }

    // ── simplified construction API ──────────────────────────────────────

    /// Builds a `FilterView` from a host predicate closure returning
    /// three-valued `Option<bool>` (`None` meaning unknown/null).
    pub fn filter<F>(&self, predicate: F) -> Result<crate::views::filter::FilterView, LiveTableError>
    where
        F: Fn(&Row) -> Option<bool> + 'static,
    {
        crate::views::filter::FilterView::new_with_callback(self, Box::new(predicate))
    }

    pub fn filter_view_expr(&self, expr: &str) -> Result<crate::views::filter::FilterView, LiveTableError> {
        crate::views::filter::FilterView::new_with_expr(self, expr)
    }

    pub fn sort(
        &self,
        keys: Vec<crate::views::sorted::SortKey>,
    ) -> Result<crate::views::sorted::SortedView, LiveTableError> {
        crate::views::sorted::SortedView::new(self, keys)
    }

    pub fn group_by(
        &self,
        group_columns: Vec<String>,
        aggregates: Vec<crate::views::aggregate::AggregateSpec>,
    ) -> Result<crate::views::aggregate::AggregateView, LiveTableError> {
        crate::views::aggregate::AggregateView::new(self, group_columns, aggregates)
    }

    pub fn join(
        &self,
        right: &Table,
        left_keys: Vec<String>,
        right_keys: Vec<String>,
        kind: crate::views::join::JoinKind,
    ) -> Result<crate::views::join::HashJoinView, LiveTableError> {
        crate::views::join::HashJoinView::new(self, right, left_keys, right_keys, kind)
    }

    pub fn project(
        &self,
        columns: Vec<String>,
    ) -> Result<crate::views::projection::ProjectionView, LiveTableError> {
        crate::views::projection::ProjectionView::new(self, columns)
    }

    pub fn compute<F>(
        &self,
        output_name: impl Into<String>,
        f: F,
    ) -> Result<crate::views::projection::ComputedView, LiveTableError>
    where
        F: Fn(&Row) -> Value + 'static,
    {
        crate::views::projection::ComputedView::new(self, output_name.into(), Box::new(f))
    }

    /// Iterates every row in order as an owned [`Row`].
    pub fn iter(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.len()).map(move |i| self.get_row(i).expect("index within bounds"))
    }
}

impl IntoIterator for &Table {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}
