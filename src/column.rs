//! Typed, nullable column storage.
//!
//! A [`Column`] pairs a [`Sequence`] of cell storage with a validity bitmap.
//! String columns optionally route through a shared
//! [`StringInterner`](crate::interner::StringInterner) instead of storing
//! inline text; this is the only place in the crate that distinguishes
//! "the value the host sees" (always a [`Value::String`]) from "how the
//! column stores it" (inline `Value::String`, or an interned id translated
//! back on read).

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::LiveTableError;
use crate::interner::StringInterner;
use crate::sequence::{GrowArray, Sequence, TieredVector};
use crate::value::{ColumnType, Value};

/// Either sequence backend, chosen once at table construction.
#[derive(Debug, Clone)]
pub enum SequenceBackend {
    Grow(GrowArray),
    Tiered(TieredVector),
}

impl SequenceBackend {
    pub fn new(use_tiered: bool) -> Self {
        if use_tiered {
            SequenceBackend::Tiered(TieredVector::new())
        } else {
            SequenceBackend::Grow(GrowArray::new())
        }
    }
}

impl Sequence for SequenceBackend {
    fn append(&mut self, v: Value) {
        match self {
            SequenceBackend::Grow(s) => s.append(v),
            SequenceBackend::Tiered(s) => s.append(v),
        }
    }
    fn get(&self, i: usize) -> &Value {
        match self {
            SequenceBackend::Grow(s) => s.get(i),
            SequenceBackend::Tiered(s) => s.get(i),
        }
    }
    fn set(&mut self, i: usize, v: Value) {
        match self {
            SequenceBackend::Grow(s) => s.set(i, v),
            SequenceBackend::Tiered(s) => s.set(i, v),
        }
    }
    fn insert(&mut self, i: usize, v: Value) {
        match self {
            SequenceBackend::Grow(s) => s.insert(i, v),
            SequenceBackend::Tiered(s) => s.insert(i, v),
        }
    }
    fn remove(&mut self, i: usize) -> Value {
        match self {
            SequenceBackend::Grow(s) => s.remove(i),
            SequenceBackend::Tiered(s) => s.remove(i),
        }
    }
    fn len(&self) -> usize {
        match self {
            SequenceBackend::Grow(s) => s.len(),
            SequenceBackend::Tiered(s) => s.len(),
        }
    }
}

/// A typed, nullable column.
///
/// Cells are stored as `Value`s directly. When `interner` is set and
/// `ty == ColumnType::String`, string cells are still exposed to callers as
/// `Value::String`, but the column additionally tracks the interned id for
/// each row so it can release it on overwrite/remove.
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    data: SequenceBackend,
    valid: Vec<bool>,
    interner: Option<Rc<RefCell<StringInterner>>>,
    interned_ids: Vec<Option<u32>>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType, nullable: bool, use_tiered: bool) -> Self {
        Column {
            name: name.into(),
            ty,
            nullable,
            data: SequenceBackend::new(use_tiered),
            valid: Vec::new(),
            interner: None,
            interned_ids: Vec::new(),
        }
    }

    pub fn with_interner(mut self, interner: Rc<RefCell<StringInterner>>) -> Self {
        self.interner = Some(interner);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn validate(&self, v: &Value) -> Result<(), LiveTableError> {
        v.check_against(&self.name, self.ty, self.nullable)
    }

    fn intern_if_needed(&mut self, v: &Value) -> Option<u32> {
        match (&self.interner, v) {
            (Some(interner), Value::String(s)) => Some(interner.borrow_mut().intern(s)),
            _ => None,
        }
    }

    fn release_if_needed(&mut self, id: Option<u32>) {
        if let (Some(interner), Some(id)) = (&self.interner, id) {
            interner.borrow_mut().release(id);
        }
    }

    pub fn append(&mut self, v: Value) -> Result<(), LiveTableError> {
        self.validate(&v)?;
        let is_valid = !v.is_null();
        let id = self.intern_if_needed(&v);
        self.data.append(v);
        self.valid.push(is_valid);
        self.interned_ids.push(id);
        Ok(())
    }

    pub fn get(&self, i: usize) -> &Value {
        self.data.get(i)
    }

    /// Sets row `i` to `v`. When the column is interned, the new value is
    /// interned *before* the old id is released, so assigning the same
    /// string back to itself is a refcount no-op.
    pub fn set(&mut self, i: usize, v: Value) -> Result<(), LiveTableError> {
        self.validate(&v)?;
        let is_valid = !v.is_null();
        let new_id = self.intern_if_needed(&v);
        let old_id = self.interned_ids[i];
        self.data.set(i, v);
        self.valid[i] = is_valid;
        self.interned_ids[i] = new_id;
        self.release_if_needed(old_id);
        Ok(())
    }

    pub fn insert(&mut self, i: usize, v: Value) -> Result<(), LiveTableError> {
        self.validate(&v)?;
        let is_valid = !v.is_null();
        let id = self.intern_if_needed(&v);
        self.data.insert(i, v);
        self.valid.insert(i, is_valid);
        self.interned_ids.insert(i, id);
        Ok(())
    }

    pub fn remove(&mut self, i: usize) -> Value {
        let v = self.data.remove(i);
        self.valid.remove(i);
        let id = self.interned_ids.remove(i);
        self.release_if_needed(id);
        v
    }

    pub fn bulk_append(&mut self, values: impl IntoIterator<Item = Value>) -> Result<(), LiveTableError> {
        for v in values {
            self.append(v)?;
        }
        Ok(())
    }
}
