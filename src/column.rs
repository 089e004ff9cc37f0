use std::sync::Arc;

use crate::data_type::DataType;
use crate::error::ExecutionError;
use crate::value::Value;
use bitvec::prelude::*;

/// Typed, contiguous storage behind a [Column].
///
/// `NULL` slots hold a placeholder so every vector stays the length of the
/// column; the column's null mask says which slots are real.
#[derive(Debug, Clone)]
pub enum Storage {
    SmallInt(Vec<i16>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<Arc<str>>),
    /// Booleans packed one bit per row.
    Bool(BitVec),
}

impl Storage {
    fn for_type(data_type: DataType) -> Self {
        match data_type {
            DataType::SmallInt => Storage::SmallInt(Vec::new()),
            DataType::Int => Storage::Int(Vec::new()),
            DataType::Float => Storage::Float(Vec::new()),
            DataType::Text => Storage::Text(Vec::new()),
            DataType::Bool => Storage::Bool(BitVec::new()),
        }
    }

    fn push_placeholder(&mut self) {
        match self {
            Storage::SmallInt(v) => v.push(0),
            Storage::Int(v) => v.push(0),
            Storage::Float(v) => v.push(0.0),
            Storage::Text(v) => v.push(Arc::from("")),
            Storage::Bool(v) => v.push(false),
        }
    }

    /// Stores `value` if it has the storage's type, handing it back otherwise.
    fn push_value(&mut self, value: Value) -> Result<(), Value> {
        match (self, value) {
            (Storage::SmallInt(v), Value::SmallInt(x)) => v.push(x),
            (Storage::Int(v), Value::Int(x)) => v.push(x),
            (Storage::Float(v), Value::Float(x)) => v.push(x),
            (Storage::Text(v), Value::Text(x)) => v.push(x),
            (Storage::Bool(v), Value::Bool(x)) => v.push(x),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    fn value_at(&self, row: usize) -> Value {
        match self {
            Storage::SmallInt(v) => Value::SmallInt(v[row]),
            Storage::Int(v) => Value::Int(v[row]),
            Storage::Float(v) => Value::Float(v[row]),
            Storage::Text(v) => Value::Text(Arc::clone(&v[row])),
            Storage::Bool(v) => Value::Bool(v[row]),
        }
    }

    fn truncate(&mut self, len: usize) {
        match self {
            Storage::SmallInt(v) => v.truncate(len),
            Storage::Int(v) => v.truncate(len),
            Storage::Float(v) => v.truncate(len),
            Storage::Text(v) => v.truncate(len),
            Storage::Bool(v) => v.truncate(len),
        }
    }
}

/// One column of a backend table: its declared type, the typed values and a
/// null mask (a set bit marks a `NULL` row).
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub storage: Storage,
    pub nulls: BitVec,
}

impl Column {
    pub fn new(name: String, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            storage: Storage::for_type(data_type),
            nulls: BitVec::new(),
        }
    }

    /// Appends a value that is already coerced to the column type.
    ///
    /// # Errors
    /// `TypeMismatch` when the value has another type; the column is unchanged.
    ///
    /// # Example
    /// ```
    /// # use filmdb::column::Column;
    /// # use filmdb::data_type::DataType;
    /// # use filmdb::value::Value;
    /// let mut col = Column::new("film_id".into(), DataType::SmallInt);
    /// col.push(Value::SmallInt(30)).unwrap();
    /// col.push(Value::Null).unwrap();
    ///
    /// assert_eq!(col.len(), 2);
    /// assert!(col.get(1).unwrap().is_null());
    /// ```
    pub fn push(&mut self, value: Value) -> Result<(), ExecutionError> {
        if value.is_null() {
            self.storage.push_placeholder();
            self.nulls.push(true);
            return Ok(());
        }
        self.storage.push_value(value).map_err(|rejected| {
            ExecutionError::TypeMismatch(format!(
                "value {} of type {:?} does not fit column {} of type {}",
                rejected.to_sql_literal(),
                rejected.data_type(),
                self.name,
                self.data_type
            ))
        })?;
        self.nulls.push(false);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nulls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }

    /// The value of row `row`, `None` past the end.
    pub fn get(&self, row: usize) -> Option<Value> {
        match self.nulls.get(row).map(|null| *null) {
            None => None,
            Some(true) => Some(Value::Null),
            Some(false) => Some(self.storage.value_at(row)),
        }
    }

    /// Drops every row from `len` onwards. Used to undo a failed statement.
    pub fn truncate(&mut self, len: usize) {
        self.storage.truncate(len);
        self.nulls.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(data_type: DataType, values: impl IntoIterator<Item = Value>) -> Column {
        let mut col = Column::new("c".into(), data_type);
        for value in values {
            col.push(value).unwrap();
        }
        col
    }

    #[test]
    fn test_new_column_is_empty() {
        let col = Column::new("title".into(), DataType::Text);

        assert_eq!(col.name, "title");
        assert!(col.is_empty());
        assert!(matches!(col.storage, Storage::Text(ref v) if v.is_empty()));
        assert_eq!(col.get(0), None);
    }

    #[test]
    fn test_nulls_keep_rows_aligned() {
        let col = column(DataType::Int, [Value::Int(10), Value::Null, Value::Int(20)]);

        assert_eq!(col.len(), 3);
        assert_eq!(
            (0..4).map(|row| col.get(row)).collect::<Vec<_>>(),
            vec![Some(Value::Int(10)), Some(Value::Null), Some(Value::Int(20)), None]
        );
        assert_eq!(col.nulls, bitvec![0, 1, 0]);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let mut col = column(DataType::SmallInt, [Value::SmallInt(1)]);

        let result = col.push(Value::Text("ACADEMY DINOSAUR".into()));

        assert!(matches!(result, Err(ExecutionError::TypeMismatch(_))));
        assert_eq!(col.len(), 1);
        // no implicit widening at this level
        assert!(col.push(Value::Int(2)).is_err());
    }

    #[test]
    fn test_bools_are_packed() {
        let col = column(DataType::Bool, [Value::Bool(true), Value::Null, Value::Bool(false)]);

        assert_eq!(col.get(0), Some(Value::Bool(true)));
        assert_eq!(col.get(1), Some(Value::Null));
        assert_eq!(col.get(2), Some(Value::Bool(false)));
    }

    #[test]
    fn test_truncate_then_push() {
        let mut col = column(
            DataType::Text,
            [
                Value::Text("ACADEMY DINOSAUR".into()),
                Value::Null,
                Value::Text("ACE GOLDFINGER".into()),
            ],
        );

        col.truncate(1);
        col.push(Value::Null).unwrap();

        assert_eq!(col.len(), 2);
        assert_eq!(col.get(0), Some(Value::Text("ACADEMY DINOSAUR".into())));
        assert_eq!(col.get(1), Some(Value::Null));
    }

    #[test]
    fn test_many_rows() {
        let col = column(DataType::Float, (0..1_000).map(|i| Value::Float(f64::from(i) + 0.5)));

        assert_eq!(col.len(), 1_000);
        assert_eq!(col.get(999), Some(Value::Float(999.5)));
    }
}
