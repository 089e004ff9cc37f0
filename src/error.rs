//! Error types for schema resolution, statement execution and result mapping.

use thiserror::Error;

use crate::data_type::DataType;

/// Raised while loading the schema registry or while building a query against it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// The table is not declared in the registry.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The column is not declared on the table.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("table {0} is already defined")]
    DuplicateTable(String),

    #[error("column {column} is defined twice in table {table}")]
    DuplicateColumn { table: String, column: String },

    /// Names must stay usable as bare SQL identifiers.
    #[error("{0:?} is a reserved word and cannot be used as a name")]
    ReservedName(String),

    #[error("{0:?} is not a valid identifier")]
    InvalidName(String),

    #[error("invalid relationship {name} on table {table}: {reason}")]
    InvalidRelationship {
        table: String,
        name: String,
        reason: String,
    },

    /// No relationship leads from `from` to `to`.
    #[error("no relationship from {from} to {to}")]
    UnknownRelationship { from: String, to: String },

    /// Several relationships lead from `from` to `to`; one must be picked by name.
    #[error("relationship from {from} to {to} is ambiguous, candidates: {}", .candidates.join(", "))]
    AmbiguousRelationship {
        from: String,
        to: String,
        candidates: Vec<String>,
    },

    /// A column refers to a table that is neither a source nor reachable through a path.
    #[error("column {column} refers to table {alias} which is not part of the query")]
    UnresolvedTable { alias: String, column: String },

    #[error("table alias {0} is used twice in the same query")]
    DuplicateAlias(String),

    /// The Rust type of a typed field disagrees with the registry.
    #[error("column {table}.{column} is declared as {found} but was used as {expected}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: DataType,
        found: DataType,
    },

    #[error("invalid grouping: {0}")]
    InvalidGrouping(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Raised by the backend when it rejects a statement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("column {0} does not exist")]
    ColumnNotFound(String),

    #[error("column reference {0} is ambiguous")]
    AmbiguousColumn(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid table definition: {0}")]
    InvalidDefinition(String),

    #[error("null value in column {column} of table {table} violates not-null constraint")]
    NotNullViolation { table: String, column: String },

    #[error("duplicate key ({key}) in table {table}")]
    PrimaryKeyViolation { table: String, key: String },

    #[error("no key left to generate in table {0}")]
    KeyExhausted(String),

    #[error("insert into {table} violates foreign key to {referenced}: key ({key}) is not present")]
    ForeignKeyViolation {
        table: String,
        referenced: String,
        key: String,
    },

    #[error("invalid grouping: {0}")]
    Grouping(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

/// Raised when a result does not fit the shape it is mapped into.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeMismatch {
    #[error("expected {expected} columns, the result has {found}")]
    Arity { expected: usize, found: usize },

    #[error("column {column}: cannot read {found} as {expected}")]
    Type {
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("column {0} is not part of the result")]
    UnknownColumn(String),

    #[error("expected at most one row, the query returned {0}")]
    TooManyRows(usize),
}

/// Main error type of the crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("result shape mismatch: {0}")]
    Shape(#[from] ShapeMismatch),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
