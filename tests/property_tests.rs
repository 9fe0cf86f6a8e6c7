//! Black-box invariants, round-trip laws, and boundary behaviors from
//! spec.md §8, exercised through the public `Table`/view API the way an
//! external caller would (everything internal — cursor/log bookkeeping —
//! already has its own coverage inside `changelog.rs` and `table.rs`).

use livetable::{ColumnType, LiveTableError, Schema, Table, TableBuilder, Value};
use proptest::prelude::*;

fn orders_table() -> Table {
    let schema = Schema::new([
        ("id", ColumnType::Int32, false),
        ("amount", ColumnType::Float64, true),
    ])
    .unwrap();
    Table::new("orders", schema).unwrap()
}

// ── invariant 9: string interner stats track live references ───────────

#[test]
fn invariant_interner_stats_track_references() {
    let schema = Schema::new([("category", ColumnType::String, false)]).unwrap();
    let t = TableBuilder::new("items", schema).use_string_interning(true).build().unwrap();

    t.append_row([("category", Value::String("Electronics".into()))]).unwrap();
    t.append_row([("category", Value::String("Clothing".into()))]).unwrap();
    t.append_row([("category", Value::String("Electronics".into()))]).unwrap();

    let stats = t.interner_stats().unwrap();
    assert_eq!(stats.unique_strings, 2);
    assert_eq!(stats.total_references, 3);

    t.delete_row(0).unwrap();
    let stats = t.interner_stats().unwrap();
    assert_eq!(stats.unique_strings, 2);
    assert_eq!(stats.total_references, 2);

    t.delete_row(1).unwrap(); // the remaining "Electronics" row (shifted to index 1)
    let stats = t.interner_stats().unwrap();
    assert_eq!(stats.unique_strings, 1);
    assert_eq!(stats.total_references, 1);
}

// ── round-trip / idempotence laws ───────────────────────────────────────

#[test]
fn round_trip_append_then_delete_restores_state() {
    let t = orders_table();
    t.append_row([("id", Value::Int32(1)), ("amount", Value::Float64(10.0))]).unwrap();
    let len_before = t.len();

    let new_row = t.append_row([("id", Value::Int32(2)), ("amount", Value::Float64(20.0))]).unwrap();
    t.delete_row(new_row).unwrap();

    assert_eq!(t.len(), len_before);
    assert_eq!(t.get_value(0, "id").unwrap(), Value::Int32(1));
}

#[test]
fn round_trip_net_identity_updates_leave_views_unchanged() {
    let t = orders_table();
    t.append_row([("id", Value::Int32(1)), ("amount", Value::Float64(10.0))]).unwrap();
    let view = t.filter(|row| row[1].1.as_f64().map(|v| v > 5.0)).unwrap();
    t.tick().unwrap();
    let before = view.iter().unwrap();

    t.set_value(0, "amount", Value::Float64(99.0)).unwrap();
    t.set_value(0, "amount", Value::Float64(10.0)).unwrap();
    t.tick().unwrap();

    let after = view.iter().unwrap();
    assert_eq!(before, after);
}

#[test]
fn two_successive_ticks_with_no_mutation_are_idempotent() {
    let t = orders_table();
    t.append_row([("id", Value::Int32(1)), ("amount", Value::Float64(1.0))]).unwrap();
    let _f = t.filter(|row| row[1].1.as_f64().map(|v| v > 0.0)).unwrap();
    let _s = t.sort(vec![livetable::SortKey::asc("id")]).unwrap();

    let first = t.tick().unwrap();
    let second = t.tick().unwrap();
    assert_eq!(first, 2);
    assert_eq!(second, 2);
}

// ── boundary behaviors ───────────────────────────────────────────────────

#[test]
fn append_rows_empty_is_a_noop() {
    let t = orders_table();
    let indices = t.append_rows(Vec::<Vec<(&str, Value)>>::new()).unwrap();
    assert!(indices.is_empty());
    assert_eq!(t.len(), 0);
}

#[test]
fn negative_index_boundary() {
    let t = orders_table();
    for id in 0..3 {
        t.append_row([("id", Value::Int32(id)), ("amount", Value::Null)]).unwrap();
    }
    let len = t.len() as i64;
    assert_eq!(t.get(-len).unwrap()[0].1, Value::Int32(0));
    let err = t.get(-len - 1).unwrap_err();
    assert!(matches!(err, LiveTableError::OutOfRange(_)));
}

#[test]
fn slice_with_start_at_or_past_stop_is_empty() {
    let t = orders_table();
    for id in 0..5 {
        t.append_row([("id", Value::Int32(id)), ("amount", Value::Null)]).unwrap();
    }
    assert!(t.slice(Some(3), Some(3), None).unwrap().is_empty());
    assert!(t.slice(Some(4), Some(1), None).unwrap().is_empty());
}

#[test]
fn percentile_empty_group_is_null_singleton_is_the_element() {
    let schema = Schema::new([("k", ColumnType::Int32, false), ("v", ColumnType::Float64, true)]).unwrap();
    let t = Table::new("t", schema).unwrap();
    t.append_row([("k", Value::Int32(1)), ("v", Value::Null)]).unwrap();
    t.append_row([("k", Value::Int32(2)), ("v", Value::Float64(42.0))]).unwrap();

    let spec = livetable::AggregateSpec::new("v", livetable::AggregateFunction::Median, "median");
    let view = t.group_by(vec!["k".into()], vec![spec]).unwrap();
    let rows = view.iter().unwrap();

    let empty_group = rows.iter().find(|r| r[0].1 == Value::Int32(1)).unwrap();
    assert_eq!(empty_group[1].1, Value::Null);
    let singleton_group = rows.iter().find(|r| r[0].1 == Value::Int32(2)).unwrap();
    assert_eq!(singleton_group[1].1, Value::Float64(42.0));
}

// ── property: row count always matches every column's length ───────────

proptest! {
    #[test]
    fn row_count_matches_table_len_after_random_mutations(
        ops in prop::collection::vec(0i32..4, 1..60),
        seed_amount in 1i64..1000,
    ) {
        let t = orders_table();
        let mut next_id = 0i32;
        for op in ops {
            match op {
                0 => {
                    t.append_row([("id", Value::Int32(next_id)), ("amount", Value::Float64(seed_amount as f64))]).unwrap();
                    next_id += 1;
                }
                1 if t.len() > 0 => {
                    let row = (next_id as usize) % t.len();
                    t.delete_row(row).unwrap();
                }
                2 if t.len() > 0 => {
                    let row = (next_id as usize) % t.len();
                    t.set_value(row, "amount", Value::Float64((seed_amount + 1) as f64)).unwrap();
                }
                _ => {}
            }
        }
        prop_assert_eq!(t.get_row(0).is_ok(), t.len() > 0);
        if t.len() > 0 {
            prop_assert!(t.get_value(0, "id").is_ok());
        }
    }
}
