use tessera_error::{DbError, Result};

use super::Column;
use crate::ast::ColumnName;

/// Output columns of a plan node, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Schema { columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Schema with `other`'s columns appended.
    pub fn merge(&self, other: &Schema) -> Schema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Schema { columns }
    }

    pub fn append(&mut self, col: Column) {
        self.columns.push(col);
    }

    pub fn last(&self) -> Option<&Column> {
        self.columns.last()
    }

    pub fn column_index(&self, unique_id: u64) -> Option<usize> {
        self.columns.iter().position(|c| c.unique_id == unique_id)
    }

    pub fn contains(&self, unique_id: u64) -> bool {
        self.column_index(unique_id).is_some()
    }

    /// Resolve a possibly qualified column name.
    ///
    /// Returns `Ok(None)` if nothing matches and an ambiguity error if more
    /// than one column does. Schema qualifiers are matched against `db` when
    /// the column has one.
    pub fn find_column(&self, name: &ColumnName, clause: &str) -> Result<Option<&Column>> {
        let mut found: Option<&Column> = None;
        for col in &self.columns {
            if !col.name.eq_ignore_ascii_case(&name.name) {
                continue;
            }
            if let Some(table) = &name.table {
                if !col
                    .table
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(table))
                {
                    continue;
                }
            }
            if let (Some(schema), Some(db)) = (&name.schema, &col.db) {
                if !db.eq_ignore_ascii_case(schema) {
                    continue;
                }
            }
            if found.is_some() {
                return Err(DbError::ambiguous_column(name, clause));
            }
            found = Some(col);
        }
        Ok(found)
    }
}
