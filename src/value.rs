//! Scalar value representation.
//!
//! [`Value`] is a tagged union over every type a column can hold, plus
//! `Null`. Ordering, equality, hashing, and numeric coercion all live here
//! so that every other component (columns, the filter evaluator, sort
//! comparators, aggregate accumulators) shares one definition of "what a
//! value is" instead of re-deriving it.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::error::LiveTableError;

/// The declared type of a column. Distinct from [`Value`] because a column
/// can declare `String` while its cells hold either inline or interned-id
/// storage — see `column.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ColumnType {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    String,
    Date,
    DateTime,
}

impl ColumnType {
    /// Whether a [`Value`] of this variant may be stored in a column
    /// declared with this type (Null is checked separately against
    /// nullability, not type).
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ColumnType::Int32, Value::Int32(_))
                | (ColumnType::Int64, Value::Int64(_))
                | (ColumnType::Float32, Value::Float32(_))
                | (ColumnType::Float64, Value::Float64(_))
                | (ColumnType::Bool, Value::Bool(_))
                | (ColumnType::String, Value::String(_))
                | (ColumnType::Date, Value::Date(_))
                | (ColumnType::DateTime, Value::DateTime(_))
        ) || matches!(value, Value::Null)
    }
}

/// A tagged scalar value.
///
/// `Date` is days since 1970-01-01 (signed so pre-epoch dates are
/// representable); `DateTime` is milliseconds since
/// 1970-01-01T00:00:00Z.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
    Date(i32),
    DateTime(i64),
    Null,
}

/// Whether nulls sort before or after non-null values. Used by
/// [`Value::cmp_with_nulls`] and by `SortedView` key comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

/// Days since 1970-01-01 for a proleptic-Gregorian `(year, month, day)`.
/// Howard Hinnant's `days_from_civil`; avoids pulling in a calendar crate
/// for the one conversion this engine needs.
fn days_from_civil(year: i32, month: u32, day: u32) -> i32 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64; // [0, 399]
    let mp = (month as i64 + 9) % 12; // [0, 11], Mar=0 .. Feb=11
    let doy = (153 * mp + 2) / 5 + day as i64 - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    (era as i64 * 146097 + doe - 719468) as i32
}

impl Value {
    /// Builds a [`Value::Date`] from a proleptic-Gregorian calendar date.
    pub fn date_ymd(year: i32, month: u32, day: u32) -> Value {
        Value::Date(days_from_civil(year, month, day))
    }

    /// Builds a [`Value::DateTime`] from a calendar date plus a
    /// time-of-day, in milliseconds since 1970-01-01T00:00:00Z.
    pub fn datetime_ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Value {
        let days = days_from_civil(year, month, day) as i64;
        let secs_of_day = (hour as i64) * 3600 + (min as i64) * 60 + sec as i64;
        Value::DateTime(days * 86_400_000 + secs_of_day * 1000)
    }

    /// Returns the value as `f64` for numeric types, or `None` for non-numeric
    /// or `Null` values. Aggregate and sort hot paths must use this rather
    /// than matching on the tagged union directly.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Date(v) => Some(*v as f64),
            Value::DateTime(v) => Some(*v as f64),
            Value::Bool(_) | Value::String(_) | Value::Null => None,
        }
    }

    /// Whether this value is `Null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is a numeric variant (`Int32`/`Int64`/`Float32`/
    /// `Float64`/`Date`/`DateTime`; `Bool` does not count).
    #[inline]
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Value::Bool(_) | Value::String(_) | Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// SQL-style equality: `Null` never equals anything, including another
    /// `Null`. Numeric variants compare via widened-to-`f64` coercion
    ///; strings and bools compare directly.
    pub fn sql_eq(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.raw_eq(other)
    }

    /// Group-by key equality: unlike [`Value::sql_eq`], `Null == Null` here
    /// so that a group may have a null key.
    pub fn key_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            _ => self.raw_eq(other),
        }
    }

    fn raw_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Three-valued comparison for sorting, with configurable null
    /// placement. `Ordering::Equal` between two nulls, or between a value
    /// and itself under the coercion rules.
    pub fn cmp_with_nulls(&self, other: &Value, nulls: NullOrdering) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match nulls {
                NullOrdering::NullsFirst => Ordering::Less,
                NullOrdering::NullsLast => Ordering::Greater,
            },
            (false, true) => match nulls {
                NullOrdering::NullsFirst => Ordering::Greater,
                NullOrdering::NullsLast => Ordering::Less,
            },
            (false, false) => self.cmp_non_null(other),
        }
    }

    /// Compares two known-non-null values. Strings compare lexicographically,
    /// bools compare `false < true`, numerics coerce to `f64` per spec.md
    /// §4.A. Mixed incomparable types (e.g. string vs number) fall back to
    /// `Ordering::Equal` — callers that need strictness should reject such
    /// comparisons earlier (the filter evaluator does, via `TypeMismatch`).
    pub fn cmp_non_null(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::Bool(_) => "Bool",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::Null => "Null",
        }
    }

    /// Validates this value against a column's declared type and
    /// nullability, returning a descriptive error on mismatch.
    pub fn check_against(&self, column_name: &str, ty: ColumnType, nullable: bool) -> Result<(), LiveTableError> {
        if self.is_null() {
            return if nullable {
                Ok(())
            } else {
                Err(LiveTableError::NullViolation(column_name.to_string()))
            };
        }
        if ty.accepts(self) {
            Ok(())
        } else {
            Err(LiveTableError::TypeMismatch(format!(
                "column {column_name:?} expects {ty:?}, got {}",
                self.type_name()
            )))
        }
    }
}

impl PartialEq for Value {
    /// Structural equality (distinct from [`Value::sql_eq`]/[`Value::key_eq`]):
    /// `Null == Null` here, matching `#[derive(PartialEq)]` expectations for
    /// use as plain Rust data (e.g. in assertions and `HashMap` keys via
    /// [`Hash`]).
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            _ => self.raw_eq(other),
        }
    }
}
impl Eq for Value {}

/// Numerics hash by their canonical wider type so that `Int32(1)` and
/// `Int64(1)` (and `Float64(1.0)`) hash equal, matching spec.md §4.A.
/// Floats are hashed via their bit pattern after normalizing `-0.0` to
/// `0.0` and rejecting `NaN` semantics the same way equality does (`NaN`
/// is never produced by this engine's arithmetic-free value model, so this
/// is purely defensive).
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::String(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Null => {
                2u8.hash(state);
            }
            _ => {
                // Canonical numeric hash: widen to f64, normalize -0.0.
                3u8.hash(state);
                let f = self.as_f64().unwrap_or(0.0);
                let f = if f == 0.0 { 0.0 } else { f };
                f.to_bits().hash(state);
            }
        }
    }
}

/// A key-tuple wrapper so `Vec<Value>` can be used as a `HashMap` key with
/// the group-by/join null-equality semantics ([`Value::key_eq`]) rather than
/// `Value`'s SQL-flavored `PartialEq`. `Value`'s own `PartialEq`/`Hash` already
/// treat `Null == Null`, so this is a thin newtype for readability at call
/// sites (`views/aggregate.rs`, `views/join.rs`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyTuple(pub Vec<Value>);

impl KeyTuple {
    pub fn new(values: Vec<Value>) -> Self {
        KeyTuple(values)
    }

    /// Whether any component of this key tuple is null. Used by the join
    /// view to exclude null-keyed rows from both build and probe sides.
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }
}
