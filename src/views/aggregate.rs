//! Incrementally-maintained group-by/aggregate view.
//!
//! Each group is a `KeyTuple` of the group-by columns mapped to a row of
//! accumulator state, one [`Accumulator`] per requested [`AggregateSpec`].
//! `Sum`/`Avg`/`Count` maintain running totals in O(1) per change. `Min`/`Max`
//! do too, except on deletion of the current extremum, where the accumulator
//! signals a rescan and the view does one linear pass over the group's
//! member rows (see DESIGN.md for the rationale).
//! `Median`/`Percentile` keep a `BTreeMap`-backed count-multiset of the
//! source column's values (`O(log d)` insert/delete in the group's distinct
//! value count `d`) and answer by linear-interpolation rank.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use crate::changelog::{ChangeKind, ChangeLog, CursorId};
use crate::column::Column;
use crate::error::LiveTableError;
use crate::row::Row;
use crate::schema::Schema;
use crate::table::{Table, TableInner};
use crate::value::{KeyTuple, Value};
use crate::views::{upgrade_parent, ViewSync};

/// Which aggregate function to compute for an [`AggregateSpec`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateFunction {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    Median,
    /// `q` in `[0.0, 1.0]`.
    Percentile(f64),
}

/// One requested output column: `source` aggregated by `function`, exposed
/// under `output_name`.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub source: String,
    pub function: AggregateFunction,
    pub output_name: String,
}

impl AggregateSpec {
    pub fn new(source: impl Into<String>, function: AggregateFunction, output_name: impl Into<String>) -> Self {
        AggregateSpec { source: source.into(), function, output_name: output_name.into() }
    }

    /// Builds a spec from one of the shorthand function strings: `"sum" | "avg" | "count" | "min" | "max" | "median" |
    /// "p25" | "p50" | "p75" | "p90" | "p95" | "p99" | "percentile(q)"`.
    pub fn shorthand(
        source: impl Into<String>,
        function: &str,
        output_name: impl Into<String>,
    ) -> Result<Self, LiveTableError> {
        Ok(AggregateSpec {
            source: source.into(),
            function: AggregateFunction::parse(function)?,
            output_name: output_name.into(),
        })
    }
}

impl AggregateFunction {
    /// Recognizes the fixed shorthand strings from spec.md §4.M/§6.
    /// `UnknownAggregate` for anything else, including a `percentile(q)`
    /// whose `q` parses but falls outside `[0, 1]`.
    pub fn parse(s: &str) -> Result<Self, LiveTableError> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        match lower.as_str() {
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "count" => Ok(AggregateFunction::Count),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            "median" => Ok(AggregateFunction::Median),
            "p25" => Ok(AggregateFunction::Percentile(0.25)),
            "p50" => Ok(AggregateFunction::Percentile(0.50)),
            "p75" => Ok(AggregateFunction::Percentile(0.75)),
            "p90" => Ok(AggregateFunction::Percentile(0.90)),
            "p95" => Ok(AggregateFunction::Percentile(0.95)),
            "p99" => Ok(AggregateFunction::Percentile(0.99)),
            _ if lower.starts_with("percentile(") && lower.ends_with(')') => {
                let arg = &lower["percentile(".len()..lower.len() - 1];
                let q: f64 = arg
                    .parse()
                    .map_err(|_| LiveTableError::UnknownAggregate(format!("invalid percentile argument {trimmed:?}")))?;
                AggregateFunction::Percentile(q).validate()?;
                Ok(AggregateFunction::Percentile(q))
            }
            _ => Err(LiveTableError::UnknownAggregate(format!("unrecognized aggregate function {trimmed:?}"))),
        }
    }

    /// Rejects a structurally-constructed `Percentile(q)` with `q` outside
    /// `[0, 1]`.
    pub fn validate(&self) -> Result<(), LiveTableError> {
        if let AggregateFunction::Percentile(q) = self {
            if !(0.0..=1.0).contains(q) {
                return Err(LiveTableError::UnknownAggregate(format!(
                    "percentile q={q} out of [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// Total order over `f64` so it can key a [`BTreeMap`]. Aggregate inputs
/// come from [`Value::as_f64`], which never produces `NaN` for any value
/// this engine can store; `total_cmp` is used anyway so the ordering stays
/// well-defined even if it did.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedF64(f64);

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Per-group, per-spec running state.
enum Accumulator {
    Sum { total: f64, non_null_count: u64 },
    Avg { total: f64, non_null_count: u64 },
    Count { non_null_count: u64 },
    /// `Min`/`Max` via a shared generic-extremum implementation: `smaller`
    /// selects whether `a` should replace `b` as the running extremum.
    Extremum { current: Option<f64>, is_min: bool },
    /// Median/percentile keep a count-multiset of every non-null value seen,
    /// keyed in sorted order. Insert and delete touch one `BTreeMap` entry
    /// (`O(log d)` in the group's distinct value count `d`) and never shift
    /// elements, unlike a flat sorted `Vec`. `q` is `0.5` for Median.
    Ordered { counts: BTreeMap<OrderedF64, u64>, len: u64, q: f64 },
}

impl Accumulator {
    fn for_function(function: AggregateFunction) -> Self {
        match function {
            AggregateFunction::Sum => Accumulator::Sum { total: 0.0, non_null_count: 0 },
            AggregateFunction::Avg => Accumulator::Avg { total: 0.0, non_null_count: 0 },
            AggregateFunction::Count => Accumulator::Count { non_null_count: 0 },
            AggregateFunction::Min => Accumulator::Extremum { current: None, is_min: true },
            AggregateFunction::Max => Accumulator::Extremum { current: None, is_min: false },
            AggregateFunction::Median => Accumulator::Ordered { counts: BTreeMap::new(), len: 0, q: 0.5 },
            AggregateFunction::Percentile(q) => Accumulator::Ordered { counts: BTreeMap::new(), len: 0, q },
        }
    }

    fn add(&mut self, value: &Value) {
        let Some(n) = value.as_f64() else { return };
        match self {
            Accumulator::Sum { total, non_null_count } | Accumulator::Avg { total, non_null_count } => {
                *total += n;
                *non_null_count += 1;
            }
            Accumulator::Count { non_null_count } => *non_null_count += 1,
            Accumulator::Extremum { current, is_min } => {
                *current = Some(match current {
                    None => n,
                    Some(c) => {
                        if (*is_min && n < *c) || (!*is_min && n > *c) {
                            n
                        } else {
                            *c
                        }
                    }
                });
            }
            Accumulator::Ordered { counts, len, .. } => {
                *counts.entry(OrderedF64(n)).or_insert(0) += 1;
                *len += 1;
            }
        }
    }

    /// Removes one occurrence of `value`. Returns `true` if the accumulator
    /// needs a full-group rescan to remain correct (only `Extremum`, and
    /// only when the removed value *was* the current extremum).
    fn remove(&mut self, value: &Value) -> bool {
        let Some(n) = value.as_f64() else { return false };
        match self {
            Accumulator::Sum { total, non_null_count } | Accumulator::Avg { total, non_null_count } => {
                *total -= n;
                *non_null_count -= 1;
                false
            }
            Accumulator::Count { non_null_count } => {
                *non_null_count -= 1;
                false
            }
            Accumulator::Extremum { current, .. } => current.map(|c| c == n).unwrap_or(false),
            Accumulator::Ordered { counts, len, .. } => {
                let key = OrderedF64(n);
                if let Some(count) = counts.get_mut(&key) {
                    *count -= 1;
                    if *count == 0 {
                        counts.remove(&key);
                    }
                    *len -= 1;
                }
                false
            }
        }
    }

    /// Full recomputation from every non-null value currently in the group,
    /// used after `remove` signals a rescan is needed.
    fn rescan(&mut self, values: impl Iterator<Item = f64>) {
        match self {
            Accumulator::Extremum { current, is_min } => {
                *current = values.fold(None, |acc, n| match acc {
                    None => Some(n),
                    Some(c) => Some(if (*is_min && n < c) || (!*is_min && n > c) { n } else { c }),
                });
            }
            _ => unreachable!("rescan is only requested by Extremum::remove"),
        }
    }

    fn value(&self) -> Value {
        match self {
            Accumulator::Sum { total, non_null_count } => {
                if *non_null_count == 0 {
                    Value::Null
                } else {
                    Value::Float64(*total)
                }
            }
            Accumulator::Avg { total, non_null_count } => {
                if *non_null_count == 0 {
                    Value::Null
                } else {
                    Value::Float64(*total / *non_null_count as f64)
                }
            }
            Accumulator::Count { non_null_count } => Value::Int64(*non_null_count as i64),
            Accumulator::Extremum { current, .. } => current.map(Value::Float64).unwrap_or(Value::Null),
            Accumulator::Ordered { counts, len, q } => percentile(counts, *len, *q),
        }
    }
}

/// Returns the value at 0-indexed rank `target` in the multiset's sorted
/// order by walking its distinct keys in ascending order, accumulating
/// each key's count. Bounded by the number of distinct keys below the
/// target rank, not by the total element count.
fn nth(counts: &BTreeMap<OrderedF64, u64>, target: u64) -> f64 {
    let mut seen = 0u64;
    for (key, count) in counts {
        seen += count;
        if seen > target {
            return key.0;
        }
    }
    unreachable!("target rank must be within the multiset's length")
}

/// Linear-interpolation percentile over a count-multiset of values: rank
/// `r = q * (n - 1)`, interpolating between the floor and ceiling ranks.
fn percentile(counts: &BTreeMap<OrderedF64, u64>, len: u64, q: f64) -> Value {
    if len == 0 {
        return Value::Null;
    }
    if len == 1 {
        return Value::Float64(nth(counts, 0));
    }
    let rank = q * (len - 1) as f64;
    let lo = rank.floor() as u64;
    let hi = rank.ceil() as u64;
    if lo == hi {
        return Value::Float64(nth(counts, lo));
    }
    let frac = rank - lo as f64;
    let lo_val = nth(counts, lo);
    let hi_val = nth(counts, hi);
    Value::Float64(lo_val + (hi_val - lo_val) * frac)
}

struct Group {
    key: KeyTuple,
    /// Parent row indices currently belonging to this group, needed for
    /// `Extremum` rescans and for `row_count`-driven group removal.
    members: Vec<usize>,
    accumulators: Vec<Accumulator>,
}

struct AggregateViewState {
    parent: Weak<RefCell<TableInner>>,
    cursor: CursorId,
    group_columns: Vec<String>,
    group_indices: Vec<usize>,
    specs: Vec<AggregateSpec>,
    source_indices: Vec<usize>,
    groups: HashMap<KeyTuple, Group>,
    /// Stable output ordering: first-seen order of each distinct key.
    order: Vec<KeyTuple>,
}

impl AggregateViewState {
    fn key_tuple(&self, columns: &[Column], row: usize) -> KeyTuple {
        KeyTuple::new(self.group_indices.iter().map(|&i| columns[i].get(row).clone()).collect())
    }

    fn key_tuple_from_image(&self, image: &[(String, Value)]) -> KeyTuple {
        KeyTuple::new(
            self.group_columns
                .iter()
                .map(|name| image.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()).unwrap_or(Value::Null))
                .collect(),
        )
    }

    fn add_row_to_group(&mut self, key: KeyTuple, row: usize, columns: &[Column]) {
        if !self.groups.contains_key(&key) {
            self.order.push(key.clone());
            let accumulators = self.specs.iter().map(|s| Accumulator::for_function(s.function)).collect();
            self.groups.insert(key.clone(), Group { key: key.clone(), members: Vec::new(), accumulators });
        }
        let group = self.groups.get_mut(&key).expect("just inserted");
        group.members.push(row);
        for (spec_idx, &src_idx) in self.source_indices.iter().enumerate() {
            group.accumulators[spec_idx].add(columns[src_idx].get(row));
        }
    }

    /// Removes `row` from its group by `key`, rescanning any `Extremum`
    /// accumulator that lost its current value, and drops the group
    /// entirely once it has no remaining members.
    fn remove_row_from_group(&mut self, key: &KeyTuple, row: usize, columns: &[Column]) {
        let Some(group) = self.groups.get_mut(key) else { return };
        if let Some(pos) = group.members.iter().position(|&r| r == row) {
            group.members.remove(pos);
        }
        let mut needs_rescan = Vec::new();
        for (spec_idx, &src_idx) in self.source_indices.iter().enumerate() {
            let value = columns.get(src_idx).map(|c| c.get(row).clone()).unwrap_or(Value::Null);
            if group.accumulators[spec_idx].remove(&value) {
                needs_rescan.push(spec_idx);
            }
        }
        if group.members.is_empty() {
            self.groups.remove(key);
            self.order.retain(|k| k != key);
            return;
        }
        if !needs_rescan.is_empty() {
            let members = group.members.clone();
            for spec_idx in needs_rescan {
                let src_idx = self.source_indices[spec_idx];
                let group = self.groups.get_mut(key).expect("checked above");
                let vals: Vec<f64> = members.iter().filter_map(|&r| columns[src_idx].get(r).as_f64()).collect();
                group.accumulators[spec_idx].rescan(vals.into_iter());
            }
        }
    }

    /// Removes `row` from its group using a pre-mutation row image (used on
    /// delete, since by then the row is already gone from column storage).
    /// Returns the spec indices whose `Extremum` accumulator lost its
    /// current value and must be rescanned by the caller, or `None` if the
    /// group was removed entirely (no remaining members).
    fn remove_row_from_group_via_image(
        &mut self,
        key: &KeyTuple,
        row: usize,
        image: &[(String, Value)],
    ) -> Option<Vec<usize>> {
        let group = self.groups.get_mut(key)?;
        if let Some(pos) = group.members.iter().position(|&r| r == row) {
            group.members.remove(pos);
        }
        let mut needs_rescan = Vec::new();
        for (spec_idx, spec) in self.specs.iter().enumerate() {
            let value = image.iter().find(|(n, _)| *n == spec.source).map(|(_, v)| v.clone()).unwrap_or(Value::Null);
            if group.accumulators[spec_idx].remove(&value) {
                needs_rescan.push(spec_idx);
            }
        }
        if group.members.is_empty() {
            self.groups.remove(key);
            self.order.retain(|k| k != key);
            return None;
        }
        Some(needs_rescan)
    }

    fn shift_members_up(&mut self, from: usize) {
        for group in self.groups.values_mut() {
            for m in group.members.iter_mut() {
                if *m >= from {
                    *m += 1;
                }
            }
        }
    }

    fn shift_members_down(&mut self, after: usize) {
        for group in self.groups.values_mut() {
            for m in group.members.iter_mut() {
                if *m > after {
                    *m -= 1;
                }
            }
        }
    }
}

impl ViewSync for AggregateViewState {
    fn parent_cursor(&self) -> CursorId {
        self.cursor
    }

    fn apply_pending(&mut self, log: &ChangeLog, columns: &[Column], _schema: &Schema) -> Result<u64, LiveTableError> {
        let mut caught_up_to = log.cursor_position(self.cursor);
        for change in log.iter_from(self.cursor) {
            match change.kind {
                ChangeKind::Insert => {
                    self.shift_members_up(change.row);
                    let key = self.key_tuple(columns, change.row);
                    self.add_row_to_group(key, change.row, columns);
                }
                ChangeKind::Delete => {
                    let image = change.row_image.as_deref().expect("delete change carries row image");
                    let key = self.key_tuple_from_image(image);
                    if let Some(rescan) = self.remove_row_from_group_via_image(&key, change.row, image) {
                        if !rescan.is_empty() {
                            let members = self.groups[&key].members.clone();
                            for spec_idx in rescan {
                                let src_idx = self.source_indices[spec_idx];
                                let vals: Vec<f64> =
                                    members.iter().filter_map(|&r| columns[src_idx].get(r).as_f64()).collect();
                                self.groups.get_mut(&key).unwrap().accumulators[spec_idx].rescan(vals.into_iter());
                            }
                        }
                    }
                    self.shift_members_down(change.row);
                }
                ChangeKind::Update => {
                    let col = change.column.as_deref().unwrap_or("");
                    let is_group_col = self.group_columns.iter().any(|n| n == col);
                    let spec_positions: Vec<usize> =
                        self.specs.iter().enumerate().filter(|(_, s)| s.source == col).map(|(i, _)| i).collect();

                    if is_group_col {
                        let mut old_values = self.key_tuple(columns, change.row).0;
                        if let Some(pos) = self.group_columns.iter().position(|n| n == col) {
                            old_values[pos] = change.before.clone().unwrap_or(Value::Null);
                        }
                        let old_key = KeyTuple::new(old_values);
                        let new_key = self.key_tuple(columns, change.row);
                        if old_key != new_key {
                            self.remove_row_from_group(&old_key, change.row, columns);
                            self.add_row_to_group(new_key, change.row, columns);
                        }
                    } else if !spec_positions.is_empty() {
                        let key = self.key_tuple(columns, change.row);
                        if let Some(group) = self.groups.get_mut(&key) {
                            let mut rescan_positions = Vec::new();
                            for &spec_idx in &spec_positions {
                                let before = change.before.clone().unwrap_or(Value::Null);
                                if group.accumulators[spec_idx].remove(&before) {
                                    rescan_positions.push(spec_idx);
                                }
                            }
                            for &spec_idx in &spec_positions {
                                let src_idx = self.source_indices[spec_idx];
                                let after = columns[src_idx].get(change.row).clone();
                                self.groups.get_mut(&key).unwrap().accumulators[spec_idx].add(&after);
                            }
                            if !rescan_positions.is_empty() {
                                let members = self.groups[&key].members.clone();
                                for spec_idx in rescan_positions {
                                    let src_idx = self.source_indices[spec_idx];
                                    let vals: Vec<f64> =
                                        members.iter().filter_map(|&r| columns[src_idx].get(r).as_f64()).collect();
                                    self.groups.get_mut(&key).unwrap().accumulators[spec_idx].rescan(vals.into_iter());
                                }
                            }
                        }
                    }
                }
            }
            caught_up_to = change.seq + 1;
        }
        Ok(caught_up_to)
    }
}

/// Public handle to an aggregate (group-by) view.
#[derive(Clone)]
pub struct AggregateView(Rc<RefCell<AggregateViewState>>);

impl AggregateView {
    pub(crate) fn new(
        table: &Table,
        group_columns: Vec<String>,
        specs: Vec<AggregateSpec>,
    ) -> Result<Self, LiveTableError> {
        if group_columns.is_empty() {
            return Err(LiveTableError::ShapeMismatch("group_by requires at least one group column".into()));
        }
        if specs.is_empty() {
            return Err(LiveTableError::ShapeMismatch("group_by requires at least one aggregate spec".into()));
        }

        let inner_rc = table.inner_rc();
        let mut inner = inner_rc.borrow_mut();

        let group_indices: Vec<usize> = group_columns
            .iter()
            .map(|name| {
                inner
                    .schema
                    .index_of(name)
                    .ok_or_else(|| LiveTableError::SchemaViolation(format!("unknown group column {name:?}")))
            })
            .collect::<Result<_, _>>()?;

        let source_indices: Vec<usize> = specs
            .iter()
            .map(|spec| {
                inner.schema.index_of(&spec.source).ok_or_else(|| {
                    LiveTableError::SchemaViolation(format!("unknown aggregate source column {:?}", spec.source))
                })
            })
            .collect::<Result<_, _>>()?;

        {
            let mut seen = std::collections::HashSet::new();
            for spec in &specs {
                spec.function.validate()?;
                if !seen.insert(spec.output_name.as_str()) {
                    return Err(LiveTableError::ShapeMismatch(format!(
                        "duplicate aggregate output name {:?}",
                        spec.output_name
                    )));
                }
            }
        }

        let row_count = inner.row_count();
        let cursor = inner.changelog.register_cursor();

        let mut state = AggregateViewState {
            parent: table.weak(),
            cursor,
            group_columns,
            group_indices,
            specs,
            source_indices,
            groups: HashMap::new(),
            order: Vec::new(),
        };

        for row in 0..row_count {
            let key = state.key_tuple(&inner.columns, row);
            state.add_row_to_group(key, row, &inner.columns);
        }

        let state = Rc::new(RefCell::new(state));
        inner.views.push((cursor, Rc::downgrade(&state)));
        drop(inner);
        Ok(AggregateView(state))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_row(&self, view_row: usize) -> Result<Row, LiveTableError> {
        let state = self.0.borrow();
        let key = state.order.get(view_row).ok_or_else(|| {
            LiveTableError::OutOfRange(format!("view row {view_row} out of range for length {}", state.order.len()))
        })?;
        let group = &state.groups[key];
        let mut row = Row::new();
        for (name, value) in state.group_columns.iter().zip(group.key.0.iter()) {
            row.push((name.clone(), value.clone()));
        }
        for (spec, acc) in state.specs.iter().zip(group.accumulators.iter()) {
            row.push((spec.output_name.clone(), acc.value()));
        }
        Ok(row)
    }

    pub fn get(&self, index: i64) -> Result<Row, LiveTableError> {
        let len = self.len();
        let row = crate::row::resolve_index(index, len)?;
        self.get_row(row)
    }

    pub fn iter(&self) -> Result<Vec<Row>, LiveTableError> {
        (0..self.len()).map(|i| self.get_row(i)).collect()
    }

    /// Row count currently contributing to `key`'s group, or `None` if no
    /// such group exists. Exposed for callers verifying group membership
    /// rather than reading through the full output row.
    pub fn group_row_count(&self, key: &[Value]) -> Option<usize> {
        let state = self.0.borrow();
        state.groups.get(&KeyTuple::new(key.to_vec())).map(|g| g.members.len())
    }

    /// Validates that the parent table still exists; read methods otherwise
    /// fail softly by treating a dropped parent as zero groups, so callers
    /// that want the `InvalidState` error explicitly can call this first.
    pub fn check_parent(&self) -> Result<(), LiveTableError> {
        let state = self.0.borrow();
        upgrade_parent(&state.parent).map(|_| ())
    }
}

impl IntoIterator for &AggregateView {
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
    use crate::value::ColumnType;

    fn sales_table() -> Table {
        let schema = Schema::new([
            ("region", ColumnType::String, false),
            ("amount", ColumnType::Float64, true),
        ])
        .unwrap();
        let t = Table::new("sales", schema).unwrap();
        for (region, amount) in [("West", 100.0), ("West", 450.0), ("East", 200.0), ("North", 150.0)] {
            t.append_row([("region", Value::String(region.into())), ("amount", Value::Float64(amount))]).unwrap();
        }
        t
    }

    #[test]
    fn test_sum_grouped_by_region() {
        let t = sales_table();
        let view = t
            .group_by(vec!["region".into()], vec![AggregateSpec::new("amount", AggregateFunction::Sum, "total")])
            .unwrap();
        let rows = view.iter().unwrap();
        let west = rows.iter().find(|r| r[0].1 == Value::String("West".into())).unwrap();
        assert_eq!(west[1].1, Value::Float64(550.0));
        let east = rows.iter().find(|r| r[0].1 == Value::String("East".into())).unwrap();
        assert_eq!(east[1].1, Value::Float64(200.0));
        let north = rows.iter().find(|r| r[0].1 == Value::String("North".into())).unwrap();
        assert_eq!(north[1].1, Value::Float64(150.0));
    }

    #[test]
    fn test_insert_into_existing_group_updates_sum() {
        let t = sales_table();
        let view = t
            .group_by(vec!["region".into()], vec![AggregateSpec::new("amount", AggregateFunction::Sum, "total")])
            .unwrap();
        t.append_row([("region", Value::String("East".into())), ("amount", Value::Float64(50.0))]).unwrap();
        t.tick().unwrap();
        let east = view.iter().unwrap().into_iter().find(|r| r[0].1 == Value::String("East".into())).unwrap();
        assert_eq!(east[1].1, Value::Float64(250.0));
    }

    #[test]
    fn test_delete_only_member_removes_group() {
        let t = sales_table();
        let view = t
            .group_by(vec!["region".into()], vec![AggregateSpec::new("amount", AggregateFunction::Sum, "total")])
            .unwrap();
        t.delete_row(3).unwrap(); // North's only row
        t.tick().unwrap();
        assert!(view.iter().unwrap().iter().all(|r| r[0].1 != Value::String("North".into())));
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_min_max_rescan_on_delete_of_extremum() {
        let t = sales_table();
        let view = t
            .group_by(
                vec!["region".into()],
                vec![AggregateSpec::new("amount", AggregateFunction::Max, "max_amount")],
            )
            .unwrap();
        let west = view.iter().unwrap().into_iter().find(|r| r[0].1 == Value::String("West".into())).unwrap();
        assert_eq!(west[1].1, Value::Float64(450.0));
        t.delete_row(1).unwrap(); // West's 450.0 row, the current max
        t.tick().unwrap();
        let west = view.iter().unwrap().into_iter().find(|r| r[0].1 == Value::String("West".into())).unwrap();
        assert_eq!(west[1].1, Value::Float64(100.0));
    }

    #[test]
    fn test_median_and_percentile_linear_interpolation() {
        let schema = Schema::new([("k", ColumnType::Int32, false), ("v", ColumnType::Float64, false)]).unwrap();
        let t = Table::new("t", schema).unwrap();
        for v in [10.0, 20.0, 30.0, 40.0] {
            t.append_row([("k", Value::Int32(1)), ("v", Value::Float64(v))]).unwrap();
        }
        let view = t
            .group_by(
                vec!["k".into()],
                vec![
                    AggregateSpec::new("v", AggregateFunction::Median, "median"),
                    AggregateSpec::new("v", AggregateFunction::Percentile(0.25), "p25"),
                ],
            )
            .unwrap();
        let row = view.get_row(0).unwrap();
        assert_eq!(row[1].1, Value::Float64(25.0));
        assert_eq!(row[2].1, Value::Float64(17.5));

        t.append_row([("k", Value::Int32(1)), ("v", Value::Float64(50.0))]).unwrap();
        t.tick().unwrap();
        let row = view.get_row(0).unwrap();
        assert_eq!(row[1].1, Value::Float64(30.0));
        assert_eq!(row[2].1, Value::Float64(20.0));
    }

    #[test]
    fn test_update_changes_group_membership() {
        let t = sales_table();
        let view = t
            .group_by(vec!["region".into()], vec![AggregateSpec::new("amount", AggregateFunction::Sum, "total")])
            .unwrap();
        t.set_value(2, "region", Value::String("West".into())).unwrap(); // East's row moves to West
        t.tick().unwrap();
        let rows = view.iter().unwrap();
        assert!(rows.iter().all(|r| r[0].1 != Value::String("East".into())));
        let west = rows.iter().find(|r| r[0].1 == Value::String("West".into())).unwrap();
        assert_eq!(west[1].1, Value::Float64(750.0));
    }

    #[test]
    fn test_null_source_values_excluded_from_sum_but_counted_in_count() {
        let schema = Schema::new([("k", ColumnType::Int32, false), ("v", ColumnType::Float64, true)]).unwrap();
        let t = Table::new("t", schema).unwrap();
        t.append_row([("k", Value::Int32(1)), ("v", Value::Float64(10.0))]).unwrap();
        t.append_row([("k", Value::Int32(1)), ("v", Value::Null)]).unwrap();
        let view = t
            .group_by(
                vec!["k".into()],
                vec![
                    AggregateSpec::new("v", AggregateFunction::Sum, "total"),
                    AggregateSpec::new("v", AggregateFunction::Count, "count"),
                ],
            )
            .unwrap();
        let row = view.get_row(0).unwrap();
        assert_eq!(row[1].1, Value::Float64(10.0));
        assert_eq!(row[2].1, Value::Int64(1));
    }

    #[test]
    fn test_shorthand_function_strings_recognized() {
        assert!(matches!(AggregateFunction::parse("sum").unwrap(), AggregateFunction::Sum));
        assert!(matches!(AggregateFunction::parse("AVG").unwrap(), AggregateFunction::Avg));
        assert!(matches!(AggregateFunction::parse("p25").unwrap(), AggregateFunction::Percentile(q) if q == 0.25));
        assert!(matches!(AggregateFunction::parse("p99").unwrap(), AggregateFunction::Percentile(q) if q == 0.99));
        assert!(
            matches!(AggregateFunction::parse("percentile(0.33)").unwrap(), AggregateFunction::Percentile(q) if q == 0.33)
        );
    }

    #[test]
    fn test_shorthand_unrecognized_function_is_unknown_aggregate() {
        let err = AggregateFunction::parse("stddev").unwrap_err();
        assert!(matches!(err, LiveTableError::UnknownAggregate(_)));
    }

    #[test]
    fn test_shorthand_percentile_out_of_range_is_unknown_aggregate() {
        let err = AggregateFunction::parse("percentile(1.5)").unwrap_err();
        assert!(matches!(err, LiveTableError::UnknownAggregate(_)));
    }

    #[test]
    fn test_group_by_with_shorthand_spec() {
        let t = sales_table();
        let spec = AggregateSpec::shorthand("amount", "sum", "total").unwrap();
        let view = t.group_by(vec!["region".into()], vec![spec]).unwrap();
        let west = view.iter().unwrap().into_iter().find(|r| r[0].1 == Value::String("West".into())).unwrap();
        assert_eq!(west[1].1, Value::Float64(550.0));
    }

    #[test]
    fn test_duplicate_output_name_rejected() {
        let t = sales_table();
        let err = t
            .group_by(
                vec!["region".into()],
                vec![
                    AggregateSpec::new("amount", AggregateFunction::Sum, "total"),
                    AggregateSpec::new("amount", AggregateFunction::Avg, "total"),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, LiveTableError::ShapeMismatch(_)));
    }
}
