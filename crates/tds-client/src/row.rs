//! Result rows and column metadata.

use std::sync::Arc;

use tds_values::SqlValue;
use tds_wire::token::{Collation, ColumnData};

/// Metadata for one result-set column.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// 0-based position within the result set.
    pub index: usize,
    /// SQL type name, e.g. `INT` or `NVARCHAR`.
    pub type_name: &'static str,
    /// Whether the column allows NULLs.
    pub nullable: bool,
    /// Maximum length for variable-length types.
    pub max_length: Option<u32>,
    /// Precision for numeric types.
    pub precision: Option<u8>,
    /// Scale for numeric and time types.
    pub scale: Option<u8>,
    /// Collation for character types.
    pub collation: Option<Collation>,
}

impl Column {
    /// Build a column from wire metadata.
    pub(crate) fn from_wire(index: usize, data: &ColumnData) -> Self {
        Self {
            name: data.name.clone(),
            index,
            type_name: data.type_id.name(),
            nullable: data.is_nullable(),
            max_length: data.type_info.max_length,
            precision: data.type_info.precision,
            scale: data.type_info.scale,
            collation: data.type_info.collation,
        }
    }
}

/// One decoded result row.
///
/// Values are positionally aligned with the result set's columns. Rows own
/// their values; the client does not retain them after handing them out.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column metadata for this row.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Value at the given position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Value of the named column (case-insensitive).
    #[must_use]
    pub fn get_named(&self, name: &str) -> Option<&SqlValue> {
        let index = self
            .columns
            .iter()
            .find(|col| col.name.eq_ignore_ascii_case(name))?
            .index;
        self.values.get(index)
    }

    /// All values, in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consume the row, yielding its values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        let columns: Arc<[Column]> = Arc::from(vec![
            Column {
                name: "id".to_string(),
                index: 0,
                type_name: "INT",
                nullable: false,
                max_length: None,
                precision: None,
                scale: None,
                collation: None,
            },
            Column {
                name: "Name".to_string(),
                index: 1,
                type_name: "NVARCHAR",
                nullable: true,
                max_length: Some(100),
                precision: None,
                scale: None,
                collation: None,
            },
        ]);
        Row::new(
            columns,
            vec![SqlValue::Int(7), SqlValue::String("bolt".to_string())],
        )
    }

    #[test]
    fn positional_access() {
        let row = sample_row();
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&SqlValue::Int(7)));
        assert_eq!(row.get(2), None);
    }

    #[test]
    fn named_access_is_case_insensitive() {
        let row = sample_row();
        assert_eq!(
            row.get_named("name").and_then(|v| v.as_str()),
            Some("bolt")
        );
        assert!(row.get_named("missing").is_none());
    }
}
