use crate::database::{QueryResult, StatementOutcome};
use crate::error::{ExecutionError, Result, ShapeMismatch};
use crate::field::TypedTable;
use crate::mapper::{fetch_records, map_rows};
use crate::query::{InsertQuery, SelectQuery};
use crate::record::{FromRow, Record, TableRecord};
use crate::schema::SchemaRegistry;

/// Something queries run against: a connection or an open transaction.
///
/// Implementors provide raw SQL execution and the registry queries are
/// checked against; the typed fetch and insert operations build on them.
pub trait Executor {
    fn registry(&self) -> &SchemaRegistry;

    /// Runs a `SELECT`.
    fn run_query(&mut self, sql: &str) -> std::result::Result<QueryResult, ExecutionError>;

    /// Runs a data-modifying statement.
    fn run_statement(&mut self, sql: &str) -> std::result::Result<StatementOutcome, ExecutionError>;

    fn fetch(&mut self, query: &SelectQuery) -> Result<Vec<Record>> {
        let plan = query.build(self.registry())?;
        fetch_records(self, &plan)
    }

    /// The only record of `query`, `None` when there is none.
    fn fetch_one(&mut self, query: &SelectQuery) -> Result<Option<Record>> {
        let mut records = self.fetch(query)?;
        match records.len() {
            0 | 1 => Ok(records.pop()),
            n => Err(ShapeMismatch::TooManyRows(n).into()),
        }
    }

    fn fetch_into<R: FromRow>(&mut self, query: &SelectQuery) -> Result<Vec<R>> {
        Ok(map_rows(self.fetch(query)?)?)
    }

    fn fetch_one_into<R: FromRow>(&mut self, query: &SelectQuery) -> Result<Option<R>> {
        Ok(self.fetch_one(query)?.map(R::from_row).transpose()?)
    }

    /// Maps every row, read as `A`, through `f`.
    fn fetch_mapped<A: FromRow, R>(&mut self, query: &SelectQuery, f: impl FnMut(A) -> R) -> Result<Vec<R>> {
        Ok(self.fetch_into::<A>(query)?.into_iter().map(f).collect())
    }

    /// Runs hand-written SQL, bypassing the builder's checks.
    fn fetch_raw(&mut self, sql: &str) -> Result<QueryResult> {
        Ok(self.run_query(sql)?)
    }

    fn insert(&mut self, query: &InsertQuery) -> Result<StatementOutcome> {
        let sql = query.to_sql(self.registry())?;
        Ok(self.run_statement(&sql)?)
    }

    /// An empty record of `table`, to be filled and passed to [Executor::store].
    fn new_record(&self, table: &impl TypedTable) -> Result<TableRecord> {
        let handle = self.registry().table(table.table_ref().name())?;
        Ok(TableRecord::new(handle))
    }

    /// Inserts the changed columns of `record` and returns the number of rows
    /// written. A generated key is copied back into the record.
    fn store(&mut self, record: &mut TableRecord) -> Result<usize> {
        let sql = record.insert_query()?.to_string();
        let outcome = self.run_statement(&sql)?;
        record.stored(outcome.generated_keys.into_iter().next());
        Ok(outcome.rows_affected)
    }
}
