use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::data_type::DataType;
use crate::error::ExecutionError;

/// Represents a single data value stored in the database.
///
/// This enum wraps all supported Rust types into a single type that can be
/// passed around the engine. It includes support for SQL `NULL` values.
///
/// Integer variants compare and hash by their numeric value, so
/// `Value::SmallInt(7) == Value::Int(7)`. This lets a `SMALLINT` foreign key
/// be matched against an `INT` primary key in joins and constraint checks.
#[derive(Debug, Clone)]
pub enum Value {
    /// represents an empty or missing value.
    Null,
    /// A 16-bit signed integer value.
    SmallInt(i16),
    /// A 64-bit signed integer value.
    Int(i64),
    /// A 64-bit floating-point value.
    Float(f64),
    /// A UTF-8 string value, wrapped in an [Arc] for efficient,
    /// thread-safe sharing and cheap cloning.
    Text(Arc<str>),
    /// A boolean value.
    Bool(bool),
}

impl Value {
    /// Returns `true` if the value is [Value::Null].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer value if this is a [Value::Int] or a [Value::SmallInt].
    /// Otherwise, returns `None`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::SmallInt(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    /// Returns the inner float value if this is a [Value::Float].
    /// Otherwise, returns `None`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns a reference to the inner string slice if this is a [Value::Text].
    /// Otherwise, returns `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the inner boolean value if this is a [Value::Bool].
    /// Otherwise, returns `None`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the logical [DataType] corresponding to this value.
    ///
    /// Returns `None` if the value is [Value::Null], because in this database
    /// engine, a standalone NULL value is untyped until it is placed in a column.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::SmallInt(_) => Some(DataType::SmallInt),
            Self::Int(_) => Some(DataType::Int),
            Self::Float(_) => Some(DataType::Float),
            Self::Text(_) => Some(DataType::Text),
            Self::Bool(_) => Some(DataType::Bool),
        }
    }

    /// Converts the value to the storage type of a column without losing information.
    ///
    /// Returns `None` when the conversion is not an implicit one (text into an
    /// integer column, a float into an integer column, an out of range integer, ...).
    /// `NULL` converts to every type.
    pub fn coerce_to(&self, data_type: DataType) -> Option<Value> {
        match (self, data_type) {
            (Self::Null, _) => Some(Self::Null),
            (Self::SmallInt(i), DataType::SmallInt) => Some(Self::SmallInt(*i)),
            (Self::SmallInt(i), DataType::Int) => Some(Self::Int(i64::from(*i))),
            (Self::SmallInt(i), DataType::Float) => Some(Self::Float(f64::from(*i))),
            (Self::Int(i), DataType::SmallInt) => i16::try_from(*i).ok().map(Self::SmallInt),
            (Self::Int(i), DataType::Int) => Some(Self::Int(*i)),
            (Self::Int(i), DataType::Float) => Some(Self::Float(*i as f64)),
            (Self::Float(f), DataType::Float) => Some(Self::Float(*f)),
            (Self::Text(s), DataType::Text) => Some(Self::Text(Arc::clone(s))),
            (Self::Bool(b), DataType::Bool) => Some(Self::Bool(*b)),
            _ => None,
        }
    }

    /// Explicit `CAST(value AS data_type)`.
    ///
    /// On top of [Value::coerce_to] this accepts lossy and textual conversions:
    /// floats are truncated into integers, numbers and booleans render to text,
    /// and text is parsed into numbers or booleans.
    pub fn cast(&self, data_type: DataType) -> Result<Value, ExecutionError> {
        if let Some(value) = self.coerce_to(data_type) {
            return Ok(value);
        }
        let converted = match (self, data_type) {
            (Self::Float(f), DataType::Int) if f.is_finite() => Some(Self::Int(f.trunc() as i64)),
            (Self::Float(f), DataType::SmallInt) if f.is_finite() => {
                i16::try_from(f.trunc() as i64).ok().map(Self::SmallInt)
            }
            (Self::SmallInt(_) | Self::Int(_) | Self::Float(_) | Self::Bool(_), DataType::Text) => {
                Some(Self::Text(Arc::from(self.to_string())))
            }
            (Self::Text(s), DataType::Int) => s.trim().parse::<i64>().ok().map(Self::Int),
            (Self::Text(s), DataType::SmallInt) => s.trim().parse::<i16>().ok().map(Self::SmallInt),
            (Self::Text(s), DataType::Float) => s.trim().parse::<f64>().ok().map(Self::Float),
            (Self::Text(s), DataType::Bool) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Some(Self::Bool(true)),
                "false" | "f" | "0" => Some(Self::Bool(false)),
                _ => None,
            },
            (Self::Int(i), DataType::Bool) => Some(Self::Bool(*i != 0)),
            (Self::SmallInt(i), DataType::Bool) => Some(Self::Bool(*i != 0)),
            _ => None,
        };
        converted.ok_or_else(|| {
            ExecutionError::TypeMismatch(format!("cannot cast {} to {}", self.to_sql_literal(), data_type))
        })
    }

    /// Renders the value as a SQL literal that the tokenizer reads back unchanged.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::SmallInt(i) => i.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => {
                let text = f.to_string();
                if text.contains('.') {
                    text
                } else {
                    format!("{text}.0")
                }
            }
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::SmallInt(_) | Self::Int(_) | Self::Float(_) => 2,
            Self::Text(_) => 3,
        }
    }
}

/// Total order used for sorting and grouping: `NULL` first, then booleans,
/// numbers (compared across widths), and text.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            // -0.0 equals 0.0, NaN sorts by its bits
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Self::Float(f), _) => match other.as_int() {
                Some(i) => cmp_int_float(i, *f).reverse(),
                None => self.rank().cmp(&other.rank()),
            },
            (_, Self::Float(f)) => match self.as_int() {
                Some(i) => cmp_int_float(i, *f),
                None => self.rank().cmp(&other.rank()),
            },
            _ => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

/// 2^63, the first float above every `i64`.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer with a float, without rounding the integer.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        // same place total_cmp gives NaN among floats
        return if f.is_sign_negative() { Ordering::Greater } else { Ordering::Less };
    }
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    // in range, so the truncation is exact
    let whole = f.trunc() as i64;
    i.cmp(&whole)
        .then_with(|| 0.0_f64.partial_cmp(&f.fract()).unwrap_or(Ordering::Equal))
}

/// Whether `f` is equal to some `i64`, and so must hash like it.
fn is_integral(f: f64) -> bool {
    f.fract() == 0.0 && (-TWO_POW_63..TWO_POW_63).contains(&f)
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => 0u8.hash(state),
            Self::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Self::SmallInt(i) => {
                2u8.hash(state);
                i64::from(*i).hash(state);
            }
            Self::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            // whole floats must hash like the integer they are equal to
            Self::Float(f) if is_integral(*f) => {
                2u8.hash(state);
                (*f as i64).hash(state);
            }
            Self::Float(f) => {
                3u8.hash(state);
                f.to_bits().hash(state);
            }
            Self::Text(s) => {
                4u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            other => f.write_str(&other.to_sql_literal()),
        }
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(Arc::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_film_row_accessors() {
        let row = [
            Value::Int(1),
            Value::Text("ACADEMY DINOSAUR".into()),
            Value::SmallInt(86),
            Value::Float(0.99),
            Value::Null,
        ];

        assert_eq!(row.iter().map(Value::as_int).collect::<Vec<_>>(), vec![Some(1), None, Some(86), None, None]);
        assert_eq!(row[1].as_str(), Some("ACADEMY DINOSAUR"));
        assert_eq!(row[3].as_float(), Some(0.99));
        assert_eq!(row[0].as_float(), None);
        assert!(row[4].is_null() && !row[2].is_null());
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(row[1].as_bool(), None);
    }

    #[test]
    fn test_data_type() {
        let types: Vec<_> = [
            Value::SmallInt(1),
            Value::Int(1),
            Value::Float(1.0),
            Value::Text("x".into()),
            Value::Bool(true),
            Value::Null,
        ]
        .iter()
        .map(Value::data_type)
        .collect();

        assert_eq!(
            types,
            vec![
                Some(DataType::SmallInt),
                Some(DataType::Int),
                Some(DataType::Float),
                Some(DataType::Text),
                Some(DataType::Bool),
                None
            ]
        );
    }

    // equality and hashing across integer widths
    #[test]
    fn test_cross_width_equality() {
        assert_eq!(Value::SmallInt(7), Value::Int(7));
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(10), Value::Int(20));
        assert_ne!(Value::Int(1), Value::Text("1".into()));

        let set: HashSet<Value> = [Value::SmallInt(7), Value::Int(7), Value::Float(7.0)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_float_integer_boundary() {
        let two_pow_63 = Value::Float(9_223_372_036_854_775_808.0);

        assert!(Value::Int(i64::MAX) < two_pow_63);
        assert_eq!(Value::Int(i64::MIN), Value::Float(-9_223_372_036_854_775_808.0));
        assert!(Value::Int(i64::MIN) > Value::Float(-1e19));
        assert!(Value::Int(2) < Value::Float(2.5));
        assert!(Value::Int(-2) > Value::Float(-2.5));
        assert_eq!(Value::Float(-0.0), Value::Float(0.0));
        assert_eq!(Value::Float(-0.0), Value::Int(0));
        assert!(Value::Int(i64::MAX) < Value::Float(f64::INFINITY));
        assert!(Value::Int(i64::MIN) > Value::Float(f64::NEG_INFINITY));

        // equal values land in one bucket, unequal ones stay apart
        let set: HashSet<Value> = [
            Value::Int(i64::MAX),
            two_pow_63.clone(),
            Value::Int(i64::MIN),
            Value::Float(-9_223_372_036_854_775_808.0),
            Value::Float(-0.0),
            Value::Float(0.0),
            Value::SmallInt(0),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 4);
    }

    // ordering puts NULL first
    #[test]
    fn test_ordering() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Int(3),
            Value::Null,
            Value::SmallInt(1),
            Value::Text("a".into()),
            Value::Float(2.5),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::SmallInt(1),
                Value::Float(2.5),
                Value::Int(3),
                Value::Text("a".into()),
                Value::Text("b".into()),
            ]
        );
    }

    // implicit coercion into column types
    #[test]
    fn test_coerce_to() {
        assert_eq!(
            Value::Int(12).coerce_to(DataType::SmallInt),
            Some(Value::SmallInt(12))
        );
        assert_eq!(Value::Int(70_000).coerce_to(DataType::SmallInt), None);
        assert_eq!(Value::SmallInt(5).coerce_to(DataType::Int), Some(Value::Int(5)));
        assert_eq!(Value::Null.coerce_to(DataType::Text), Some(Value::Null));
        assert_eq!(Value::Text("1".into()).coerce_to(DataType::Int), None);
        assert_eq!(Value::Float(1.5).coerce_to(DataType::Int), None);
    }

    // explicit casts
    #[test]
    fn test_cast() {
        assert_eq!(
            Value::Int(1).cast(DataType::SmallInt),
            Ok(Value::SmallInt(1))
        );
        assert_eq!(Value::Float(3.9).cast(DataType::Int), Ok(Value::Int(3)));
        assert_eq!(
            Value::Text(" 42 ".into()).cast(DataType::Int),
            Ok(Value::Int(42))
        );
        assert_eq!(
            Value::Int(42).cast(DataType::Text),
            Ok(Value::Text("42".into()))
        );
        assert!(Value::Text("abc".into()).cast(DataType::Int).is_err());
        assert!(Value::Int(100_000).cast(DataType::SmallInt).is_err());
    }

    // SQL literals
    #[test]
    fn test_sql_literal() {
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
        assert_eq!(Value::Int(-4).to_sql_literal(), "-4");
        assert_eq!(Value::Float(2.0).to_sql_literal(), "2.0");
        assert_eq!(Value::Float(0.25).to_sql_literal(), "0.25");
        assert_eq!(Value::Text("O'Brien".into()).to_sql_literal(), "'O''Brien'");
        assert_eq!(Value::Bool(true).to_sql_literal(), "TRUE");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }
}
