//! Data sources, connections and transactions.
//!
//! A [DataSource] owns the in-memory database and the registry describing
//! it. Connections share both; an open [Transaction] holds the database
//! exclusively until it commits or rolls back.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::ast::Statement;
use crate::config::DatabaseConfig;
use crate::database::{Database, QueryResult, StatementOutcome};
use crate::error::{ExecutionError, Result};
use crate::executor::Executor;
use crate::parser::Parser;
use crate::sample;
use crate::schema::SchemaRegistry;

#[derive(Debug, Clone)]
pub struct DataSource {
    name: String,
    database: Arc<Mutex<Database>>,
    registry: Arc<SchemaRegistry>,
}

impl DataSource {
    /// Creates the configured schema, filled with the sample rows when asked to.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let registry = match &config.schema {
            Some(path) => Arc::new(SchemaRegistry::load(path)?),
            None => SchemaRegistry::bundled()?,
        };
        let source = Self::with_registry(&config.name, registry)?;
        if config.sample_data {
            source.connect().transaction(|tx| sample::populate(tx))?;
        }
        Ok(source)
    }

    /// An empty database with a table for every table of `registry`.
    pub fn with_registry(name: &str, registry: Arc<SchemaRegistry>) -> Result<Self> {
        let mut database = Database::new();
        for create in registry.create_statements() {
            debug!(table = %create.name, "creating table");
            database.execute_statement(Statement::CreateTable(create))?;
        }
        info!(source = name, tables = database.list_tables().len(), "data source ready");
        Ok(Self {
            name: name.to_string(),
            database: Arc::new(Mutex::new(database)),
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn connect(&self) -> Connection {
        Connection {
            database: Arc::clone(&self.database),
            registry: Arc::clone(&self.registry),
        }
    }
}

/// A handle on a data source. Statements run outside of a transaction are
/// applied immediately.
#[derive(Debug, Clone)]
pub struct Connection {
    database: Arc<Mutex<Database>>,
    registry: Arc<SchemaRegistry>,
}

impl Connection {
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let mut guard = self.database.lock();
        guard.begin()?;
        Ok(Transaction {
            guard,
            registry: &self.registry,
            open: true,
        })
    }

    /// Runs `f` in a transaction, committed when `f` succeeds and rolled back
    /// when it fails.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut tx = self.begin()?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback()?;
                Err(e)
            }
        }
    }

    /// Runs `f` in a transaction that is always rolled back.
    pub fn rollback_after<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut tx = self.begin()?;
        let result = f(&mut tx);
        tx.rollback()?;
        result
    }
}

/// Parses a data-modifying statement; transaction control goes through the
/// [Connection] and [Transaction] methods instead.
fn parse_statement(sql: &str) -> std::result::Result<Statement, ExecutionError> {
    match Parser::parse_sql(sql)? {
        Statement::Begin | Statement::Commit | Statement::Rollback => Err(ExecutionError::Transaction(
            format!("{sql} cannot be run as a statement, use begin, commit or rollback"),
        )),
        statement => Ok(statement),
    }
}

impl Executor for Connection {
    fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn run_query(&mut self, sql: &str) -> std::result::Result<QueryResult, ExecutionError> {
        debug!(sql, "query");
        self.database.lock().query(sql)
    }

    fn run_statement(&mut self, sql: &str) -> std::result::Result<StatementOutcome, ExecutionError> {
        debug!(sql, "statement");
        let statement = parse_statement(sql)?;
        self.database.lock().execute_statement(statement)
    }
}

/// An open transaction. Dropping it without committing rolls it back.
pub struct Transaction<'c> {
    guard: MutexGuard<'c, Database>,
    registry: &'c SchemaRegistry,
    open: bool,
}

impl Transaction<'_> {
    pub fn commit(mut self) -> Result<()> {
        self.open = false;
        Ok(self.guard.commit()?)
    }

    pub fn rollback(mut self) -> Result<()> {
        self.open = false;
        Ok(self.guard.rollback()?)
    }
}

impl Executor for Transaction<'_> {
    fn registry(&self) -> &SchemaRegistry {
        self.registry
    }

    fn run_query(&mut self, sql: &str) -> std::result::Result<QueryResult, ExecutionError> {
        debug!(sql, "query");
        self.guard.query(sql)
    }

    fn run_statement(&mut self, sql: &str) -> std::result::Result<StatementOutcome, ExecutionError> {
        debug!(sql, "statement");
        let statement = parse_statement(sql)?;
        self.guard.execute_statement(statement)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!("transaction dropped without commit, rolling back");
            if let Err(e) = self.guard.rollback() {
                warn!(error = %e, "rollback failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{insert_into, select_from};
    use crate::tables::category;

    fn source() -> DataSource {
        DataSource::with_registry("test", SchemaRegistry::bundled().unwrap()).unwrap()
    }

    fn count_categories(conn: &mut Connection) -> usize {
        conn.fetch(&select_from(&category())).unwrap().len()
    }

    fn insert_category(tx: &mut Transaction<'_>) -> Result<StatementOutcome> {
        let c = category();
        tx.insert(&insert_into(&c).set(&c.name, "Horror"))
    }

    #[test]
    fn test_tables_are_created() {
        let source = source();

        let mut conn = source.connect();
        assert_eq!(count_categories(&mut conn), 0);
        assert_eq!(source.name(), "test");
    }

    #[test]
    fn test_commit_keeps_changes() {
        let source = source();
        let mut conn = source.connect();

        let outcome = conn.transaction(insert_category).unwrap();

        assert_eq!(outcome.generated_keys, vec![crate::Value::Int(1)]);
        assert_eq!(count_categories(&mut conn), 1);
    }

    #[test]
    fn test_rollback_discards_changes() {
        let source = source();
        let mut conn = source.connect();

        conn.rollback_after(insert_category).unwrap();
        assert_eq!(count_categories(&mut conn), 0);

        let result: Result<()> = conn.transaction(|tx| {
            insert_category(tx)?;
            Err(crate::Error::Config("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(count_categories(&mut conn), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let source = source();
        let mut conn = source.connect();

        {
            let mut tx = conn.begin().unwrap();
            insert_category(&mut tx).unwrap();
            assert_eq!(tx.fetch(&select_from(&category())).unwrap().len(), 1);
        }
        assert_eq!(count_categories(&mut conn), 0);
    }

    #[test]
    fn test_transaction_control_is_not_a_statement() {
        let source = source();
        let mut conn = source.connect();

        let result = conn.run_statement("BEGIN");
        assert!(matches!(result, Err(ExecutionError::Transaction(_))));
    }
}
