//! Rows handed back to callers and the conversions out of them.

use std::sync::Arc;

use bitvec::prelude::*;

use crate::ast::InsertInto;
use crate::data_type::DataType;
use crate::database::ColumnLabel;
use crate::error::{SchemaError, ShapeMismatch};
use crate::field::{Field, IntoSql, SqlType};
use crate::query::check_literal;
use crate::schema::TableHandle;
use crate::table::ColumnDef;
use crate::value::Value;

/// A cell of a record: a plain value or a nested collection of records.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(Value),
    Multiset(Vec<Record>),
}

impl Cell {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Cell::Value(value) => Some(value),
            Cell::Multiset(_) => None,
        }
    }

    pub fn as_multiset(&self) -> Option<&[Record]> {
        match self {
            Cell::Multiset(records) => Some(records),
            Cell::Value(_) => None,
        }
    }
}

/// A result row. Records of the same result share their column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[ColumnLabel]>,
    cells: Vec<Cell>,
}

impl Record {
    pub fn new(columns: Arc<[ColumnLabel]>, cells: Vec<Cell>) -> Self {
        debug_assert_eq!(columns.len(), cells.len());
        Self { columns, cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn columns(&self) -> &[ColumnLabel] {
        &self.columns
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// The plain value at `index`; `None` for a multiset or out of range.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.cells.get(index).and_then(Cell::as_value)
    }

    /// Position of `field`: an exact match on table and column first, then the
    /// only column carrying its name.
    pub fn index_of<T: SqlType>(&self, field: &Field<T>) -> Option<usize> {
        let reference = field.table().reference();
        let exact = self
            .columns
            .iter()
            .position(|label| label.table.as_deref() == Some(reference) && label.name == field.name());
        exact.or_else(|| {
            let mut named = self.columns.iter().enumerate().filter(|(_, label)| label.name == field.name());
            match (named.next(), named.next()) {
                (Some((i, _)), None) => Some(i),
                _ => None,
            }
        })
    }

    /// Index of the column labelled `name`, such as an alias.
    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|label| label.name == name)
    }

    /// The value of `field`, converted to its Rust type.
    pub fn get<T: SqlType + FromCell>(&self, field: &Field<T>) -> Result<T, ShapeMismatch> {
        let index = self
            .index_of(field)
            .ok_or_else(|| ShapeMismatch::UnknownColumn(format!("{}.{}", field.table(), field.name())))?;
        T::from_cell(self.cells[index].clone(), &self.columns[index])
    }

    /// Like [Record::get], for nullable columns.
    pub fn get_opt<T: SqlType + FromCell>(&self, field: &Field<T>) -> Result<Option<T>, ShapeMismatch> {
        let index = self
            .index_of(field)
            .ok_or_else(|| ShapeMismatch::UnknownColumn(format!("{}.{}", field.table(), field.name())))?;
        Option::<T>::from_cell(self.cells[index].clone(), &self.columns[index])
    }

    /// The cell labelled `name`, converted to any supported type.
    pub fn get_named<T: FromCell>(&self, name: &str) -> Result<T, ShapeMismatch> {
        let index = self
            .index_of_name(name)
            .ok_or_else(|| ShapeMismatch::UnknownColumn(name.to_string()))?;
        T::from_cell(self.cells[index].clone(), &self.columns[index])
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    pub fn into_row<R: FromRow>(self) -> Result<R, ShapeMismatch> {
        R::from_row(self)
    }
}

/// Conversion of one cell into a Rust value.
pub trait FromCell: Sized {
    fn from_cell(cell: Cell, column: &ColumnLabel) -> Result<Self, ShapeMismatch>;
}

fn mismatch(cell: &Cell, column: &ColumnLabel, expected: &'static str) -> ShapeMismatch {
    let found = match cell {
        Cell::Value(Value::Null) => "NULL".to_string(),
        Cell::Value(value) => value.data_type().map_or_else(String::new, |t| t.to_string()),
        Cell::Multiset(_) => "multiset".to_string(),
    };
    ShapeMismatch::Type {
        column: column.to_string(),
        expected,
        found,
    }
}

impl FromCell for Value {
    fn from_cell(cell: Cell, column: &ColumnLabel) -> Result<Self, ShapeMismatch> {
        match cell {
            Cell::Value(value) => Ok(value),
            other => Err(mismatch(&other, column, "a value")),
        }
    }
}

impl FromCell for String {
    fn from_cell(cell: Cell, column: &ColumnLabel) -> Result<Self, ShapeMismatch> {
        match &cell {
            Cell::Value(Value::Text(text)) => Ok(text.to_string()),
            _ => Err(mismatch(&cell, column, DataType::Text.sql_name())),
        }
    }
}

macro_rules! integer_cell {
    ($($rust:ty => $sql:expr),+) => {
        $(
            impl FromCell for $rust {
                fn from_cell(cell: Cell, column: &ColumnLabel) -> Result<Self, ShapeMismatch> {
                    match &cell {
                        Cell::Value(value @ (Value::SmallInt(_) | Value::Int(_))) => value
                            .as_int()
                            .and_then(|i| <$rust>::try_from(i).ok())
                            .ok_or_else(|| mismatch(&cell, column, $sql.sql_name())),
                        _ => Err(mismatch(&cell, column, $sql.sql_name())),
                    }
                }
            }
        )+
    };
}

integer_cell!(i16 => DataType::SmallInt, i32 => DataType::Int, i64 => DataType::Int);

impl FromCell for f64 {
    fn from_cell(cell: Cell, column: &ColumnLabel) -> Result<Self, ShapeMismatch> {
        match &cell {
            Cell::Value(Value::Float(f)) => Ok(*f),
            Cell::Value(value @ (Value::SmallInt(_) | Value::Int(_))) => value
                .as_int()
                .map(|i| i as f64)
                .ok_or_else(|| mismatch(&cell, column, DataType::Float.sql_name())),
            _ => Err(mismatch(&cell, column, DataType::Float.sql_name())),
        }
    }
}

impl FromCell for bool {
    fn from_cell(cell: Cell, column: &ColumnLabel) -> Result<Self, ShapeMismatch> {
        match &cell {
            Cell::Value(Value::Bool(b)) => Ok(*b),
            _ => Err(mismatch(&cell, column, DataType::Bool.sql_name())),
        }
    }
}

impl<T: FromCell> FromCell for Option<T> {
    fn from_cell(cell: Cell, column: &ColumnLabel) -> Result<Self, ShapeMismatch> {
        match cell {
            Cell::Value(Value::Null) => Ok(None),
            other => T::from_cell(other, column).map(Some),
        }
    }
}

impl<T: FromRow> FromCell for Vec<T> {
    fn from_cell(cell: Cell, column: &ColumnLabel) -> Result<Self, ShapeMismatch> {
        match cell {
            Cell::Multiset(records) => records.into_iter().map(T::from_row).collect(),
            other => Err(mismatch(&other, column, "multiset")),
        }
    }
}

/// Conversion of a whole record, such as into a tuple or a user type.
pub trait FromRow: Sized {
    fn from_row(record: Record) -> Result<Self, ShapeMismatch>;
}

impl FromRow for Record {
    fn from_row(record: Record) -> Result<Self, ShapeMismatch> {
        Ok(record)
    }
}

macro_rules! tuple_row {
    ($len:literal; $($name:ident),+) => {
        impl<$($name: FromCell),+> FromRow for ($($name,)+) {
            fn from_row(record: Record) -> Result<Self, ShapeMismatch> {
                if record.len() != $len {
                    return Err(ShapeMismatch::Arity {
                        expected: $len,
                        found: record.len(),
                    });
                }
                let Record { columns, cells } = record;
                let mut cells = cells.into_iter().zip(columns.iter());
                Ok(($(
                    {
                        let (cell, column) = cells.next().ok_or(ShapeMismatch::Arity {
                            expected: $len,
                            found: columns.len(),
                        })?;
                        $name::from_cell(cell, column)?
                    },
                )+))
            }
        }
    };
}

tuple_row!(1; A);
tuple_row!(2; A, B);
tuple_row!(3; A, B, C);
tuple_row!(4; A, B, C, D);
tuple_row!(5; A, B, C, D, E);
tuple_row!(6; A, B, C, D, E, F);
tuple_row!(7; A, B, C, D, E, F, G);
tuple_row!(8; A, B, C, D, E, F, G, H);

/// A row of one table being built for insertion. Only the columns that were
/// set are written, so the engine fills the others with `NULL` or a
/// generated key.
#[derive(Debug, Clone)]
pub struct TableRecord {
    table: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    values: Vec<Value>,
    changed: BitVec,
}

impl TableRecord {
    pub fn new(table: TableHandle<'_>) -> Self {
        let width = table.columns().len();
        Self {
            table: table.name().to_string(),
            columns: table.columns().to_vec(),
            primary_key: table.primary_key().to_vec(),
            values: vec![Value::Null; width],
            changed: bitvec![0; width],
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn position(&self, name: &str) -> Result<usize, SchemaError> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: self.table.clone(),
                column: name.to_string(),
            })
    }

    /// Sets a column and marks it as changed.
    pub fn set<T: SqlType, V: IntoSql<T>>(&mut self, field: &Field<T>, value: V) -> Result<&mut Self, SchemaError> {
        if field.table().name() != self.table || field.table().path().is_some() {
            return Err(SchemaError::InvalidQuery(format!(
                "{}.{} is not a column of a {} record",
                field.table(),
                field.name(),
                self.table
            )));
        }
        let i = self.position(field.name())?;
        let declared = self.columns[i].data_type;
        if declared != T::DATA_TYPE {
            return Err(SchemaError::TypeMismatch {
                table: self.table.clone(),
                column: field.name().to_string(),
                expected: T::DATA_TYPE,
                found: declared,
            });
        }
        let value = value.into_value();
        check_literal(&value)?;
        self.values[i] = value;
        self.changed.set(i, true);
        Ok(self)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        let i = self.columns.iter().position(|c| c.name == name)?;
        self.values.get(i)
    }

    pub fn get<T: SqlType + FromCell>(&self, field: &Field<T>) -> Result<Option<T>, ShapeMismatch> {
        let i = self
            .columns
            .iter()
            .position(|c| c.name == field.name())
            .ok_or_else(|| ShapeMismatch::UnknownColumn(field.name().to_string()))?;
        let label = ColumnLabel {
            table: Some(self.table.clone()),
            name: self.columns[i].name.clone(),
        };
        Option::<T>::from_cell(Cell::Value(self.values[i].clone()), &label)
    }

    pub fn changed(&self, name: &str) -> bool {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .is_some_and(|i| self.changed[i])
    }

    pub fn is_changed(&self) -> bool {
        self.changed.any()
    }

    /// The `INSERT` writing the changed columns.
    pub fn insert_query(&self) -> Result<InsertInto, SchemaError> {
        if !self.is_changed() {
            return Err(SchemaError::InvalidQuery(format!("no column of the {} record is set", self.table)));
        }
        let changed: Vec<usize> = self.changed.iter_ones().collect();
        Ok(InsertInto {
            table: self.table.clone(),
            columns: Some(changed.iter().map(|&i| self.columns[i].name.clone()).collect()),
            rows: vec![changed.iter().map(|&i| self.values[i].clone()).collect()],
        })
    }

    /// Marks the record as stored: fills in a generated key and clears the
    /// changed flags.
    pub(crate) fn stored(&mut self, generated_key: Option<Value>) {
        if let (Some(key), [pk]) = (generated_key, self.primary_key.as_slice())
            && let Some(i) = self.columns.iter().position(|c| &c.name == pk)
        {
            self.values[i] = key;
        }
        self.changed.fill(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::tables::{actor, film, film_actor};

    fn labels(names: &[(&str, &str)]) -> Arc<[ColumnLabel]> {
        names
            .iter()
            .map(|(table, name)| ColumnLabel {
                table: (!table.is_empty()).then(|| table.to_string()),
                name: name.to_string(),
            })
            .collect()
    }

    fn actor_record() -> Record {
        Record::new(
            labels(&[("actor", "actor_id"), ("actor", "first_name"), ("film_actor__actor", "first_name")]),
            vec![
                Cell::Value(Value::Int(7)),
                Cell::Value(Value::Text("GRACE".into())),
                Cell::Value(Value::Null),
            ],
        )
    }

    #[test]
    fn test_get_by_field() {
        let record = actor_record();
        let a = actor();

        assert_eq!(record.get(&a.actor_id), Ok(7));
        assert_eq!(record.get(&a.first_name), Ok("GRACE".to_string()));
        assert_eq!(record.get_opt(&film_actor().actor().first_name), Ok(None));
    }

    #[test]
    fn test_get_reports_shape_mismatch() {
        let record = actor_record();

        let err = record.get(&film_actor().actor().first_name).unwrap_err();
        assert_eq!(
            err,
            ShapeMismatch::Type {
                column: "film_actor__actor.first_name".into(),
                expected: "TEXT",
                found: "NULL".into(),
            }
        );
        assert!(matches!(record.get(&actor().last_name), Err(ShapeMismatch::UnknownColumn(_))));
        assert!(matches!(
            record.get_named::<bool>("actor_id"),
            Err(ShapeMismatch::Type { .. })
        ));
    }

    #[test]
    fn test_into_tuple() {
        let record = actor_record();

        let (id, first, other): (i64, String, Option<String>) = record.clone().into_row().unwrap();
        assert_eq!((id, first.as_str(), other), (7, "GRACE", None));

        let result: Result<(i32, String), _> = record.into_row();
        assert_eq!(result, Err(ShapeMismatch::Arity { expected: 2, found: 3 }));
    }

    #[test]
    fn test_integer_widths() {
        let label = ColumnLabel {
            table: None,
            name: "n".into(),
        };

        assert_eq!(i16::from_cell(Cell::Value(Value::Int(12)), &label), Ok(12));
        assert!(i16::from_cell(Cell::Value(Value::Int(100_000)), &label).is_err());
        assert_eq!(f64::from_cell(Cell::Value(Value::SmallInt(3)), &label), Ok(3.0));
        assert!(String::from_cell(Cell::Value(Value::Int(1)), &label).is_err());
    }

    #[test]
    fn test_multiset_cells() {
        let nested = Record::new(labels(&[("film", "title")]), vec![Cell::Value(Value::Text("A".into()))]);
        let record = Record::new(
            labels(&[("", "first_name"), ("", "films")]),
            vec![Cell::Value(Value::Text("GRACE".into())), Cell::Multiset(vec![nested.clone(), nested])],
        );

        let (name, titles): (String, Vec<(String,)>) = record.clone().into_row().unwrap();
        assert_eq!(name, "GRACE");
        assert_eq!(titles, vec![("A".to_string(),), ("A".to_string(),)]);

        let err = record.get_named::<Vec<(String,)>>("first_name").unwrap_err();
        assert!(matches!(err, ShapeMismatch::Type { expected: "multiset", .. }));
        assert_eq!(record.cell(1).and_then(Cell::as_multiset).map(<[Record]>::len), Some(2));
    }

    #[test]
    fn test_table_record() {
        let registry = SchemaRegistry::bundled().unwrap();
        let f = film();
        let mut record = TableRecord::new(registry.table("film").unwrap());

        record.set(&f.title, "Test").unwrap().set(&f.language_id, 1_i16).unwrap();
        assert!(record.changed("title"));
        assert!(!record.changed("film_id"));

        let insert = record.insert_query().unwrap();
        assert_eq!(insert.to_string(), "INSERT INTO film (title, language_id) VALUES ('Test', 1)");

        record.stored(Some(Value::Int(1001)));
        assert_eq!(record.get(&f.film_id), Ok(Some(1001)));
        assert!(!record.is_changed());
        assert!(record.insert_query().is_err());
    }

    #[test]
    fn test_table_record_rejects_foreign_fields() {
        let registry = SchemaRegistry::bundled().unwrap();
        let mut record = TableRecord::new(registry.table("film").unwrap());

        let result = record.set(&actor().first_name, "X");
        assert!(matches!(result, Err(SchemaError::InvalidQuery(_))));

        let result = record.set(&film_actor().film().title, "X");
        assert!(matches!(result, Err(SchemaError::InvalidQuery(_))));

        let result = record.set(&film().rental_rate, f64::NAN);
        assert!(matches!(result, Err(SchemaError::InvalidQuery(_))));
        assert!(!record.is_changed());
    }
}
