//! Append-only change log with multi-cursor compaction.
//!
//! Every mutation to a [`Table`](crate::table::Table) appends one [`Change`]
//! here with a monotonic `seq`. Each registered view holds a [`CursorId`]
//! into the log; `iter_from` lets a view consume changes at its own pace,
//! and `compact` reclaims the prefix that every cursor has already passed.
//! Each cursor is a per-consumer position advanced independently and used
//! to bound how much history must be retained — one sequence cursor per
//! registered view.

use std::collections::{HashMap, VecDeque};

use crate::value::Value;

/// What kind of mutation a [`Change`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
    Update,
}

/// One entry in the change log.
///
/// `row` is the post-operation index for `Insert`, the pre-operation index
/// for `Delete`/`Update`. `column`/`before`/`after` are only populated for
/// `Update` entries that carry a single-column delta; `before_row`/`after_row`
/// carry the full pre/post row image for `Delete`/`Insert` so that views
/// (e.g. aggregates, joins) that need more than the touched column can
/// still do O(1) incremental work instead of reading back through the
/// table (which, for a `Delete`, has already happened by the time views
/// observe the change).
#[derive(Debug, Clone)]
pub struct Change {
    pub seq: u64,
    pub kind: ChangeKind,
    pub row: usize,
    pub column: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    /// Full row image. For `Insert`, the inserted row. For `Delete`, the
    /// row as it was just before removal. `None` for `Update` (views that
    /// need the full row re-read it from the table, which still holds the
    /// post-update state at the time the change is observed).
    pub row_image: Option<Vec<(String, Value)>>,
}

pub type CursorId = u64;

#[derive(Debug, Default)]
pub struct ChangeLog {
    base_seq: u64,
    entries: VecDeque<Change>,
    next_seq: u64,
    cursors: HashMap<CursorId, u64>,
    next_cursor_id: CursorId,
}

impl ChangeLog {
    pub fn new() -> Self {
        ChangeLog::default()
    }

    /// Appends a change, assigning it the next sequence number.
    pub fn append(&mut self, mut change: Change) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        change.seq = seq;
        self.entries.push_back(change);
        seq
    }

    /// Registers a new cursor positioned at the current tail: it will only
    /// observe changes appended *after* this call.
    pub fn register_cursor(&mut self) -> CursorId {
        let id = self.next_cursor_id;
        self.next_cursor_id += 1;
        self.cursors.insert(id, self.next_seq);
        id
    }

    pub fn drop_cursor(&mut self, id: CursorId) {
        self.cursors.remove(&id);
    }

    /// Returns every change with `seq >= cursor`'s current position, in
    /// order, without advancing the cursor. Callers advance explicitly via
    /// [`ChangeLog::advance_cursor`] once they've applied the changes.
    pub fn iter_from(&self, id: CursorId) -> impl Iterator<Item = &Change> {
        let start = *self.cursors.get(&id).unwrap_or(&self.next_seq);
        let skip = start.saturating_sub(self.base_seq) as usize;
        self.entries.iter().skip(skip)
    }

    pub fn cursor_position(&self, id: CursorId) -> u64 {
        *self.cursors.get(&id).unwrap_or(&self.next_seq)
    }

    pub fn advance_cursor(&mut self, id: CursorId, to_seq: u64) {
        if let Some(pos) = self.cursors.get_mut(&id) {
            *pos = to_seq.max(*pos);
        }
    }

    pub fn advance_cursor_to_tail(&mut self, id: CursorId) {
        let tail = self.next_seq;
        self.advance_cursor(id, tail);
    }

    /// The lowest cursor position across all registered cursors, or the
    /// tail if there are none registered (nothing is held back).
    pub fn min_cursor_next_seq(&self) -> u64 {
        self.cursors.values().copied().min().unwrap_or(self.next_seq)
    }

    /// Discards the log prefix strictly below the slowest cursor.
    pub fn compact(&mut self) {
        let floor = self.min_cursor_next_seq();
        while let Some(front) = self.entries.front() {
            if front.seq < floor {
                self.entries.pop_front();
                self.base_seq += 1;
            } else {
                break;
            }
        }
        // base_seq tracks discarded count, but the true invariant is
        // base_seq == seq of the first retained entry (or next_seq if
        // empty); recompute directly to avoid drift.
        self.base_seq = self.entries.front().map(|c| c.seq).unwrap_or(self.next_seq);
        log::trace!("compacted changelog to {} entries, base_seq {}", self.entries.len(), self.base_seq);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn base_seq(&self) -> u64 {
        self.base_seq
    }

    pub fn tail_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(kind: ChangeKind, row: usize) -> Change {
        Change {
            seq: 0,
            kind,
            row,
            column: None,
            before: None,
            after: None,
            row_image: None,
        }
    }

    #[test]
    fn test_append_assigns_monotonic_seq() {
        let mut log = ChangeLog::new();
        let s0 = log.append(change(ChangeKind::Insert, 0));
        let s1 = log.append(change(ChangeKind::Insert, 1));
        assert_eq!(s0, 0);
        assert_eq!(s1, 1);
    }

    #[test]
    fn test_new_cursor_sees_only_future_changes() {
        let mut log = ChangeLog::new();
        log.append(change(ChangeKind::Insert, 0));
        let cursor = log.register_cursor();
        assert_eq!(log.iter_from(cursor).count(), 0);
        log.append(change(ChangeKind::Insert, 1));
        assert_eq!(log.iter_from(cursor).count(), 1);
    }

    #[test]
    fn test_compact_only_below_slowest_cursor() {
        let mut log = ChangeLog::new();
        let c1 = log.register_cursor();
        let c2 = log.register_cursor();
        for i in 0..5 {
            log.append(change(ChangeKind::Insert, i));
        }
        log.advance_cursor(c1, 5);
        log.advance_cursor(c2, 2);
        log.compact();
        // c2 is the slowest; only entries with seq < 2 are discarded.
        assert_eq!(log.len(), 3);
        assert_eq!(log.base_seq(), 2);
    }

    #[test]
    fn test_compact_with_no_cursors_clears_everything() {
        let mut log = ChangeLog::new();
        for i in 0..5 {
            log.append(change(ChangeKind::Insert, i));
        }
        log.compact();
        assert_eq!(log.len(), 0);
        assert_eq!(log.base_seq(), log.tail_seq());
    }

    #[test]
    fn test_dropped_cursor_no_longer_blocks_compaction() {
        let mut log = ChangeLog::new();
        let slow = log.register_cursor();
        let fast = log.register_cursor();
        for i in 0..3 {
            log.append(change(ChangeKind::Insert, i));
        }
        log.advance_cursor(fast, 3);
        log.drop_cursor(slow);
        log.compact();
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn test_invariant_base_le_cursor_le_tail() {
        let mut log = ChangeLog::new();
        let c = log.register_cursor();
        for i in 0..10 {
            log.append(change(ChangeKind::Insert, i));
        }
        log.advance_cursor(c, 4);
        log.compact();
        let pos = log.cursor_position(c);
        assert!(log.base_seq() <= pos);
        assert!(pos <= log.base_seq() + log.len() as u64);
    }

    #[test]
    fn test_advance_cursor_to_tail() {
        let mut log = ChangeLog::new();
        let c = log.register_cursor();
        for i in 0..4 {
            log.append(change(ChangeKind::Insert, i));
        }
        log.advance_cursor_to_tail(c);
        assert_eq!(log.cursor_position(c), log.tail_seq());
        log.compact();
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn test_compaction_safety_with_lagging_view() {
        // S6: two cursors, one syncs, one doesn't, across two batches.
        let mut log = ChangeLog::new();
        let c1 = log.register_cursor();
        let c2 = log.register_cursor();
        for i in 0..1000 {
            log.append(change(ChangeKind::Insert, i));
        }
        log.advance_cursor(c1, log.tail_seq());
        log.compact();
        for i in 1000..2000 {
            log.append(change(ChangeKind::Insert, i));
        }
        log.advance_cursor(c1, log.tail_seq());
        log.advance_cursor(c2, log.tail_seq());
        log.compact();
        assert_eq!(log.len(), 0);
        assert_eq!(log.cursor_position(c1), log.tail_seq());
        assert_eq!(log.cursor_position(c2), log.tail_seq());
    }
}
