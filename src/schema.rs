//! Table schema: an ordered, fixed list of (name, type, nullable) columns.
//!
//! Fixed at table creation — a [`Schema`] cannot be altered once a
//! [`Table`](crate::table::Table) is built from it.

use std::collections::HashMap;

use crate::error::LiveTableError;
use crate::value::ColumnType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<ColumnDef>,
    index_of: HashMap<String, usize>,
}

impl Schema {
    /// Builds a schema from `(name, type, nullable)` triples. Errors if any
    /// column name repeats.
    pub fn new(columns: impl IntoIterator<Item = (impl Into<String>, ColumnType, bool)>) -> Result<Self, LiveTableError> {
        let mut defs = Vec::new();
        let mut index_of = HashMap::new();
        for (name, ty, nullable) in columns {
            let name = name.into();
            if index_of.contains_key(&name) {
                return Err(LiveTableError::SchemaViolation(format!(
                    "duplicate column name {name:?}"
                )));
            }
            index_of.insert(name.clone(), defs.len());
            defs.push(ColumnDef { name, ty, nullable });
        }
        Ok(Schema { columns: defs, index_of })
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index_of.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_preserves_declaration_order() {
        let schema = Schema::new([
            ("id", ColumnType::Int32, false),
            ("name", ColumnType::String, false),
        ])
        .unwrap();
        assert_eq!(schema.column_names(), vec!["id".to_string(), "name".to_string()]);
        assert_eq!(schema.index_of("id"), Some(0));
        assert_eq!(schema.index_of("name"), Some(1));
    }

    #[test]
    fn test_schema_rejects_duplicate_names() {
        let err = Schema::new([
            ("id", ColumnType::Int32, false),
            ("id", ColumnType::String, false),
        ])
        .unwrap_err();
        assert!(matches!(err, LiveTableError::SchemaViolation(_)));
    }

    #[test]
    fn test_schema_unknown_column_lookup() {
        let schema = Schema::new([("id", ColumnType::Int32, false)]).unwrap();
        assert_eq!(schema.index_of("missing"), None);
        assert!(!schema.contains("missing"));
    }

    #[test]
    fn test_schema_get_returns_def() {
        let schema = Schema::new([("age", ColumnType::Int32, true)]).unwrap();
        let def = schema.get("age").unwrap();
        assert_eq!(def.ty, ColumnType::Int32);
        assert!(def.nullable);
    }
}
