//! A typed relational query layer over a small embedded SQL engine.
//!
//! Queries are composed from typed [field::Field]s of the tables in
//! [tables], checked against a [SchemaRegistry], rendered to plain SQL and
//! run through an [Executor]. Results come back as [Record]s, optionally
//! holding nested collections, and map into tuples or application types.

pub mod ast;
pub mod column;
pub mod config;
pub mod connection;
pub mod data_type;
pub mod database;
pub mod error;
pub mod executor;
pub mod field;
pub mod mapper;
pub mod model;
pub mod parser;
pub mod query;
pub mod record;
pub mod sample;
pub mod schema;
pub mod table;
pub mod tables;
pub mod tokenizer;
pub mod value;

pub use column::Column;
pub use config::Config;
pub use connection::{Connection, DataSource, Transaction};
pub use data_type::DataType;
pub use database::{ColumnLabel, Database, QueryResult, StatementOutcome};
pub use error::{Error, ExecutionError, Result, SchemaError, ShapeMismatch};
pub use executor::Executor;
pub use field::{Condition, Field, count};
pub use query::{InsertQuery, SelectQuery, insert_into, multiset, select, select_from};
pub use record::{Cell, FromCell, FromRow, Record, TableRecord};
pub use schema::SchemaRegistry;
pub use table::{ColumnDef, Schema, Table};
pub use value::Value;
