use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::data_type::DataType;
use crate::error::ExecutionError;
use crate::value::Value;

/// Column definition in the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    /// A nullable column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// `FOREIGN KEY (columns) REFERENCES table (referenced)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub table: String,
    pub referenced: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub schema: Schema,
    pub columns: Vec<Column>,
    pub row_count: usize,
    /// Positions of the primary key columns in the schema.
    key_positions: Vec<usize>,
    /// Primary keys currently stored, for uniqueness and foreign key checks.
    keys: HashSet<Vec<Value>>,
    /// Next value handed out for a generated primary key, `None` once the
    /// largest integer key is taken.
    next_id: Option<i64>,
}

impl Table {
    pub fn new(name: String, schema: Schema) -> Self {
        let columns = schema
            .columns
            .iter()
            .map(|column| Column::new(column.name.clone(), column.data_type))
            .collect();
        let key_positions = schema
            .primary_key
            .iter()
            .filter_map(|key| schema.column_index(key))
            .collect();
        Self {
            name,
            schema,
            columns,
            row_count: 0,
            key_positions,
            keys: HashSet::new(),
            next_id: Some(1),
        }
    }

    /// The column whose value is generated when it is inserted as `NULL`:
    /// a primary key made of a single integer column.
    fn identity_position(&self) -> Option<usize> {
        match self.key_positions.as_slice() {
            [position] if self.schema.columns[*position].data_type.is_integer() => Some(*position),
            _ => None,
        }
    }

    /// insert a new row
    ///
    /// Values are coerced to the column types first. Returns the generated
    /// primary key when the row did not carry one.
    ///
    /// # Errors
    /// The table is left unchanged when the row has the wrong size, a value does
    /// not fit its column, a not-null column gets `NULL`, or the primary key
    /// already exists.
    pub fn insert(&mut self, values: Vec<Value>) -> Result<Option<Value>, ExecutionError> {
        // different sizes
        if values.len() != self.schema.columns.len() {
            return Err(ExecutionError::Syntax(format!(
                "row has {} values but table {} has {} columns",
                values.len(),
                self.name,
                self.schema.columns.len()
            )));
        }

        let identity = self.identity_position();
        let mut generated = None;
        let mut row = Vec::with_capacity(values.len());
        for (i, value) in values.into_iter().enumerate() {
            let def = &self.schema.columns[i];
            let Some(mut coerced) = value.coerce_to(def.data_type) else {
                return Err(ExecutionError::TypeMismatch(format!(
                    "value {} does not fit column {}.{} of type {}",
                    value.to_sql_literal(),
                    self.name,
                    def.name,
                    def.data_type
                )));
            };
            if coerced.is_null() && identity == Some(i) {
                let next = self
                    .next_id
                    .ok_or_else(|| ExecutionError::KeyExhausted(self.name.clone()))?;
                coerced = Value::Int(next).cast(def.data_type)?;
                generated = Some(coerced.clone());
            }
            if coerced.is_null() && (!def.nullable || self.key_positions.contains(&i)) {
                return Err(ExecutionError::NotNullViolation {
                    table: self.name.clone(),
                    column: def.name.clone(),
                });
            }
            row.push(coerced);
        }

        let key: Vec<Value> = self.key_positions.iter().map(|&i| row[i].clone()).collect();
        if !key.is_empty() && self.keys.contains(&key) {
            return Err(ExecutionError::PrimaryKeyViolation {
                table: self.name.clone(),
                key: render_key(&key),
            });
        }

        if let (Some(id), Some(next)) = (identity.and_then(|i| row[i].as_int()), self.next_id)
            && id >= next
        {
            self.next_id = id.checked_add(1);
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value)?;
        }
        if !key.is_empty() {
            self.keys.insert(key);
        }
        self.row_count += 1;
        Ok(generated)
    }

    /// Removes every row from `len` onwards.
    pub fn truncate(&mut self, len: usize) {
        for row_idx in len..self.row_count {
            let key: Vec<Value> = self
                .key_positions
                .iter()
                .filter_map(|&i| self.columns[i].get(row_idx))
                .collect();
            self.keys.remove(&key);
        }
        for column in &mut self.columns {
            column.truncate(len);
        }
        self.row_count = self.row_count.min(len);
    }

    /// Whether a row with this primary key exists.
    pub fn contains_key(&self, key: &[Value]) -> bool {
        self.keys.contains(key)
    }

    pub fn get_row(&self, row_idx: usize) -> Option<Vec<Value>> {
        if self.row_count <= row_idx {
            return None;
        }
        self.columns
            .iter()
            .map(|col| col.get(row_idx)) // -> Option<Value>
            .collect()
    }

    /// Pivots the columnar storage into rows, in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.row_count).filter_map(|row_idx| self.get_row(row_idx))
    }

    pub fn get_col(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }
}

pub(crate) fn render_key(key: &[Value]) -> String {
    key.iter()
        .map(Value::to_sql_literal)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn film_schema() -> Schema {
        Schema {
            columns: vec![
                ColumnDef::new("film_id", DataType::Int).not_null(),
                ColumnDef::new("title", DataType::Text).not_null(),
                ColumnDef::new("length", DataType::SmallInt),
            ],
            primary_key: vec!["film_id".into()],
            foreign_keys: vec![],
        }
    }

    #[test]
    fn test_table_creation() {
        let table = Table::new("film".into(), film_schema());
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.row_count, 0);
    }

    #[test]
    fn test_table_insert_and_get() {
        let mut table = Table::new("film".into(), film_schema());

        table
            .insert(vec![Value::Int(1), Value::Text("ACADEMY DINOSAUR".into()), Value::Int(86)])
            .unwrap();
        table
            .insert(vec![Value::Int(2), Value::Text("ACE GOLDFINGER".into()), Value::Null])
            .unwrap();

        assert_eq!(table.row_count, 2);

        let row0 = table.get_row(0).unwrap();
        // the length was coerced to the SMALLINT storage type
        assert_eq!(
            row0,
            vec![Value::Int(1), Value::Text("ACADEMY DINOSAUR".into()), Value::SmallInt(86)]
        );
        assert_eq!(table.rows().count(), 2);
    }

    #[test]
    fn test_column_count_mismatch() {
        let mut table = Table::new("film".into(), film_schema());

        assert!(table.insert(vec![Value::Int(1)]).is_err());
        assert!(table.insert(vec![]).is_err());
        assert_eq!(table.row_count, 0);
    }

    #[test]
    fn test_type_mismatch_error() {
        let mut table = Table::new("film".into(), film_schema());

        let result = table.insert(vec![Value::Text("one".into()), Value::Text("x".into()), Value::Null]);
        assert!(matches!(result, Err(ExecutionError::TypeMismatch(_))));
        assert_eq!(table.columns[1].len(), 0);
    }

    #[test]
    fn test_generated_key() {
        let mut table = Table::new("film".into(), film_schema());

        table
            .insert(vec![Value::Int(41), Value::Text("A".into()), Value::Null])
            .unwrap();
        let generated = table
            .insert(vec![Value::Null, Value::Text("B".into()), Value::Null])
            .unwrap();

        assert_eq!(generated, Some(Value::Int(42)));
        assert_eq!(table.get_row(1).unwrap()[0], Value::Int(42));
    }

    #[test]
    fn test_largest_key_stops_generation() {
        let mut table = Table::new("film".into(), film_schema());

        table
            .insert(vec![Value::Int(i64::MAX), Value::Text("A".into()), Value::Null])
            .unwrap();
        let result = table.insert(vec![Value::Null, Value::Text("B".into()), Value::Null]);

        assert_eq!(result, Err(ExecutionError::KeyExhausted("film".into())));
        assert_eq!(table.row_count, 1);
        // explicit keys are still accepted
        table
            .insert(vec![Value::Int(7), Value::Text("C".into()), Value::Null])
            .unwrap();
        assert_eq!(table.row_count, 2);
    }

    #[test]
    fn test_not_null_violation() {
        let mut table = Table::new("film".into(), film_schema());

        let result = table.insert(vec![Value::Int(1), Value::Null, Value::Null]);
        assert_eq!(
            result,
            Err(ExecutionError::NotNullViolation {
                table: "film".into(),
                column: "title".into()
            })
        );
    }

    #[test]
    fn test_duplicate_key() {
        let mut table = Table::new("film".into(), film_schema());
        table
            .insert(vec![Value::Int(1), Value::Text("A".into()), Value::Null])
            .unwrap();

        let result = table.insert(vec![Value::Int(1), Value::Text("B".into()), Value::Null]);
        assert!(matches!(result, Err(ExecutionError::PrimaryKeyViolation { .. })));
        assert!(table.contains_key(&[Value::Int(1)]));
        assert_eq!(table.row_count, 1);
    }

    #[test]
    fn test_truncate_releases_keys() {
        let mut table = Table::new("film".into(), film_schema());
        table
            .insert(vec![Value::Int(1), Value::Text("A".into()), Value::Null])
            .unwrap();
        table
            .insert(vec![Value::Int(2), Value::Text("B".into()), Value::Null])
            .unwrap();

        table.truncate(1);

        assert_eq!(table.row_count, 1);
        assert!(!table.contains_key(&[Value::Int(2)]));
        table
            .insert(vec![Value::Int(2), Value::Text("C".into()), Value::Null])
            .unwrap();
    }

    #[test]
    fn test_get_col() {
        let table = Table::new("film".into(), film_schema());

        assert!(table.get_col("film_id").is_some());
        assert!(table.get_col("title").is_some());
        assert!(table.get_col("rating").is_none());
    }
}
