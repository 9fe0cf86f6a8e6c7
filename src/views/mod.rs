//! Shared contract for the five reactive view kinds.
//!
//! Every view (`filter`, `projection`/`computed`, `sorted`, `join`,
//! `aggregate`) maintains its own derived state incrementally from the
//! parent [`Table`](crate::table::Table)'s change log rather than
//! rescanning on every read. A view registers one [`ChangeLog`] cursor at
//! construction time (positioned at the tail, so it never replays rows it
//! already saw during its initial full scan) and advances that cursor only
//! when [`Table::tick`](crate::table::Table::tick) drives
//! [`ViewSync::apply_pending`].
//!
//! Views hold a [`Weak`] reference to the parent table's shared state, not
//! a strong one — a view must never keep a dropped table's storage alive,
//! and any read through a dangling parent must fail with
//! [`LiveTableError::InvalidState`] rather than panic.

use std::rc::Weak;

use crate::changelog::{ChangeLog, CursorId};
use crate::column::Column;
use crate::error::LiveTableError;
use crate::row::Row;
use crate::schema::Schema;
use crate::table::TableInner;

/// Implemented by every concrete view state. Driven exclusively by
/// `Table::tick`; views never call this on themselves and never reach back
/// into the parent table while it runs, so there is no risk of re-entering
/// the parent's `RefCell` borrow that `tick` already holds.
pub trait ViewSync {
    /// The cursor this view registered at construction.
    fn parent_cursor(&self) -> CursorId;

    /// Applies every change from `parent_cursor()` through the log's tail,
    /// using the explicitly passed snapshot of parent state (not the weak
    /// back-reference — `tick` already holds the parent's single exclusive
    /// borrow while calling this). Returns the sequence number the view has
    /// now caught up to, which the caller advances the cursor to.
    fn apply_pending(
        &mut self,
        log: &ChangeLog,
        columns: &[Column],
        schema: &Schema,
    ) -> Result<u64, LiveTableError>;
}

/// Upgrades a view's weak parent handle, translating a dropped table into
/// `InvalidState` rather than a panic.
pub(crate) fn upgrade_parent(
    parent: &Weak<std::cell::RefCell<TableInner>>,
) -> Result<std::rc::Rc<std::cell::RefCell<TableInner>>, LiveTableError> {
    parent.upgrade().ok_or_else(|| {
        LiveTableError::InvalidState("parent table has been dropped".to_string())
    })
}

/// Reads one full row (in schema column order) out of the parent's column
/// storage by parent row index. Shared by every view's `get_row`.
pub(crate) fn read_parent_row(columns: &[Column], schema: &Schema, parent_row: usize) -> Row {
    schema
        .columns()
        .iter()
        .zip(columns.iter())
        .map(|(def, col)| (def.name.clone(), col.get(parent_row).clone()))
        .collect()
}

pub mod aggregate;
pub mod filter;
pub mod join;
pub mod projection;
pub mod sorted;
