//! Shared row type and pythonic index/slice resolution.
//!
//! `Table` and every view expose rows as an ordered list of `(column name,
//! Value)` pairs, and all of them accept negative indices and slices the
//! way Python sequences do: `-1` is the last row, `table[2:]` means "from
//! row 2 to the end", `table[::-1]` walks the table back to front, an
//! out-of-range slice bound clamps rather than errors, but a zero step or
//! an out-of-range scalar index is an [`LiveTableError::OutOfRange`].

use crate::error::LiveTableError;
use crate::value::Value;

pub type Row = Vec<(String, Value)>;

/// Resolves a possibly-negative index against a collection of length `len`,
/// rejecting anything that still falls outside `0..len` after adjustment.
pub fn resolve_index(index: i64, len: usize) -> Result<usize, LiveTableError> {
    let len_i = len as i64;
    let resolved = if index < 0 { index + len_i } else { index };
    if resolved < 0 || resolved >= len_i {
        Err(LiveTableError::OutOfRange(format!(
            "index {index} out of range for length {len}"
        )))
    } else {
        Ok(resolved as usize)
    }
}

/// Resolves a Python-style `[start:stop:step]` slice against a collection
/// of length `len`, returning the resulting row indices in traversal order
/// (reversed when `step` is negative). Unlike [`resolve_index`],
/// out-of-range bounds clamp to the nearest valid edge instead of erroring,
/// matching Python's own slicing; `None` bounds default to the natural
/// start/end for the slice's direction. `step` defaults to `1` and a
/// `step` of `0` is an [`LiveTableError::OutOfRange`].
pub fn resolve_slice(
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
    len: usize,
) -> Result<Vec<usize>, LiveTableError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(LiveTableError::OutOfRange("slice step cannot be zero".into()));
    }
    let len_i = len as i64;

    // Python's `slice.indices()`: ascending slices clamp to `0..len`,
    // descending slices clamp to `-1..len-1` so a negative step can still
    // walk all the way down to index 0.
    let (lower, upper) = if step > 0 { (0, len_i) } else { (-1, len_i - 1) };

    let clamp = |i: i64| -> i64 {
        let i = if i < 0 { i + len_i } else { i };
        i.max(lower).min(upper)
    };

    let start = start.map(clamp).unwrap_or(if step > 0 { lower } else { upper });
    let stop = stop.map(clamp).unwrap_or(if step > 0 { upper } else { lower });

    let mut indices = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            indices.push(i as usize);
            i += step;
        }
    } else {
        while i > stop {
            indices.push(i as usize);
            i += step;
        }
    }
    Ok(indices)
}
