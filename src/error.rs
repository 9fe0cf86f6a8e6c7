//! Error types for livetable.
//!
//! All errors that can occur within the engine are represented by
//! [`LiveTableError`]. Errors are propagated via `Result<T, LiveTableError>`
//! throughout the crate; no public operation partially mutates a table or
//! view before returning an error.
//!
//! # Error Classification
//!
//! - **Caller errors** — bad schema, bad types, bad indices, bad grammar.
//!   Never the engine's fault; the table/view is left untouched.
//! - **Invalid-state errors** — the host used a view after its parent table
//!   was released. Also a caller error in the sense that nothing in the
//!   engine is corrupted, but distinguished because it is a usage-lifetime
//!   bug rather than a single bad call.
//!
//! There is no retry classification here: the engine is synchronous and
//! single-threaded, so there is nothing to back off from.
//! Internal invariant violations (a corrupted cursor, compaction below a
//! live cursor) are programming bugs and `debug_assert!`/`unreachable!`,
//! not `LiveTableError` variants — see spec.md §7.

/// Primary error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum LiveTableError {
    // ── Schema / validation errors ───────────────────────────────────────
    /// A row map was missing a non-nullable column, or carried unknown keys.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// A value did not match its column's declared type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A null value was supplied for a non-nullable column.
    #[error("null violation: column {0:?} is not nullable")]
    NullViolation(String),

    /// A row or column index (or a slice step) was out of range.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A filter expression failed to parse.
    #[error("filter syntax error: {0}")]
    FilterSyntax(String),

    /// Join key arities disagreed, or a join/group-by key list was empty.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An aggregate function name was unrecognized, or `percentile(q)` had
    /// `q` outside `[0, 1]`.
    #[error("unknown aggregate: {0}")]
    UnknownAggregate(String),

    /// An operation was attempted on a view whose parent table has been
    /// released, or some other usage-lifetime violation.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl LiveTableError {
    /// Whether this error reflects a caller mistake (bad input) rather than
    /// an engine-lifetime issue (`InvalidState`).
    ///
    /// Hosts building interactive tooling can use this to decide whether
    /// retrying with corrected arguments is sensible (caller errors) versus
    /// needing to recreate the view/table (`InvalidState`).
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, LiveTableError::InvalidState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages_include_payload() {
        let err = LiveTableError::SchemaViolation("missing column \"age\"".into());
        assert_eq!(err.to_string(), "schema violation: missing column \"age\"");
    }

    #[test]
    fn test_null_violation_quotes_column() {
        let err = LiveTableError::NullViolation("age".into());
        assert_eq!(err.to_string(), "null violation: column \"age\" is not nullable");
    }

    #[test]
    fn test_is_caller_error_classification() {
        assert!(LiveTableError::SchemaViolation("x".into()).is_caller_error());
        assert!(LiveTableError::TypeMismatch("x".into()).is_caller_error());
        assert!(LiveTableError::OutOfRange("x".into()).is_caller_error());
        assert!(LiveTableError::FilterSyntax("x".into()).is_caller_error());
        assert!(LiveTableError::ShapeMismatch("x".into()).is_caller_error());
        assert!(LiveTableError::UnknownAggregate("x".into()).is_caller_error());
        assert!(!LiveTableError::InvalidState("x".into()).is_caller_error());
    }
}
