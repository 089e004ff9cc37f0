use std::fmt;

use serde::{Deserialize, Serialize};

/// Represents the supported data types in the database schema.
/// These types define the structure of columns and the expected format of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// A 16-bit signed integer. The link tables use it for their key columns.
    SmallInt,
    /// A 64-bit signed integer.
    Int,
    /// A 64-bit floating-point number.
    Float,
    /// A variable-length UTF-8 character string.
    Text,
    /// A boolean value (true or false).
    Bool,
}

impl DataType {
    /// The SQL spelling used in `CREATE TABLE` and `CAST`.
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Text => "TEXT",
            Self::Bool => "BOOL",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::SmallInt | Self::Int)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}
