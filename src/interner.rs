//! Optional reference-counted string interning.
//!
//! A [`StringInterner`] maps each distinct string to a stable 32-bit id with
//! a reference count. `intern` increments the refcount (creating the id on
//! first sight); `release` decrements it and, at zero, unmaps the id. Ids
//! are never reused within one interner's lifetime — this
//! keeps column storage simple, since a stale id can never silently start
//! referring to a different string.
//!
//! Not thread-safe. Single-writer discipline is the responsibility of the
//! owning [`Table`](crate::table::Table).

use std::collections::HashMap;

/// Statistics surfaced to hosts via `Table::interner_stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InternerStats {
    pub unique_strings: usize,
    pub total_references: u64,
}

#[derive(Debug, Default)]
pub struct StringInterner {
    to_id: HashMap<String, u32>,
    strings: HashMap<u32, String>,
    refcounts: HashMap<u32, u64>,
    next_id: u32,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner::default()
    }

    /// Interns `s`, returning its id and incrementing its refcount. Reuses
    /// the existing id if `s` has been seen before.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.to_id.get(s) {
            *self.refcounts.get_mut(&id).unwrap() += 1;
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.to_id.insert(s.to_string(), id);
        self.strings.insert(id, s.to_string());
        self.refcounts.insert(id, 1);
        id
    }

    /// Decrements the refcount for `id`; at zero, unmaps it entirely.
    pub fn release(&mut self, id: u32) {
        let Some(count) = self.refcounts.get_mut(&id) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.refcounts.remove(&id);
            if let Some(s) = self.strings.remove(&id) {
                self.to_id.remove(&s);
            }
        }
    }

    pub fn resolve(&self, id: u32) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    pub fn stats(&self) -> InternerStats {
        InternerStats {
            unique_strings: self.strings.len(),
            total_references: self.refcounts.values().sum(),
        }
    }
}
