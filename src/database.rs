use crate::{
    DataType, Value,
    ast::{
        ColumnRef, ComparisonOp, Expr, InsertInto, Join, JoinKind, Select, SelectItem, SortDirection,
        Statement, TableFactor,
    },
    error::ExecutionError,
    parser::Parser,
    table::{ForeignKey, Schema, Table, render_key},
};
use std::{cmp::Ordering, collections::HashMap, collections::HashSet, fmt};
use tracing::debug;

/// The main entry point for the in-memory database engine.
/// It manages a collection of tables and orchestrates query execution.
#[derive(Debug, Default)]
pub struct Database {
    /// A map of table names to their respective [Table] structures.
    tables: HashMap<String, Table>,
    /// Copy of the tables taken by `BEGIN`, restored by `ROLLBACK`.
    snapshot: Option<HashMap<String, Table>>,
}

/// Name of a result column: the table reference it was read from, if any,
/// and the column name or alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnLabel {
    pub table: Option<String>,
    pub name: String,
}

impl fmt::Display for ColumnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Represents the result of a successful `SELECT` query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// The labels of the columns included in the result set.
    pub columns: Vec<ColumnLabel>,
    /// The actual data, returned as a vector of rows, where each row is a vector of [Value].
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// What a data-modifying statement did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutcome {
    pub rows_affected: usize,
    /// Primary keys generated for rows inserted without one, in insertion order.
    pub generated_keys: Vec<Value>,
}

impl Database {
    /// Creates a new, empty database instance.
    pub fn new() -> Self {
        Self {
            tables: HashMap::default(),
            snapshot: None,
        }
    }

    /// Creates a new table in the database.
    ///
    /// Foreign keys must reference the primary key of an existing table (or of
    /// the table itself). A foreign key declared without referenced columns
    /// points at that primary key.
    ///
    /// # Errors
    /// Returns an error if a table with the same name already exists or if the
    /// schema is inconsistent.
    pub fn create_table(&mut self, name: String, mut schema: Schema) -> Result<(), ExecutionError> {
        if self.tables.contains_key(&name) {
            return Err(ExecutionError::TableExists(name));
        }
        if schema.columns.is_empty() {
            return Err(ExecutionError::InvalidDefinition(format!(
                "table {name} has no columns"
            )));
        }
        let mut seen = HashSet::new();
        for column in &schema.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ExecutionError::InvalidDefinition(format!(
                    "column {} is defined twice in table {name}",
                    column.name
                )));
            }
        }
        for key in &schema.primary_key {
            if schema.column_index(key).is_none() {
                return Err(ExecutionError::InvalidDefinition(format!(
                    "primary key column {key} does not exist in table {name}"
                )));
            }
        }

        let mut foreign_keys = Vec::with_capacity(schema.foreign_keys.len());
        for fk in &schema.foreign_keys {
            foreign_keys.push(self.normalize_foreign_key(&name, &schema, fk)?);
        }
        schema.foreign_keys = foreign_keys;

        let table = Table::new(name.clone(), schema);
        self.tables.insert(name, table);
        Ok(())
    }

    /// Checks a foreign key and orders its columns like the referenced primary key.
    fn normalize_foreign_key(
        &self,
        name: &str,
        schema: &Schema,
        fk: &ForeignKey,
    ) -> Result<ForeignKey, ExecutionError> {
        let invalid = |reason: String| {
            ExecutionError::InvalidDefinition(format!(
                "foreign key ({}) of table {name}: {reason}",
                fk.columns.join(", ")
            ))
        };
        let target = if fk.table == name {
            schema
        } else {
            &self
                .get_table(&fk.table)
                .ok_or_else(|| ExecutionError::TableNotFound(fk.table.clone()))?
                .schema
        };
        let referenced = if fk.referenced.is_empty() {
            target.primary_key.clone()
        } else {
            fk.referenced.clone()
        };
        if referenced.len() != fk.columns.len() {
            return Err(invalid(format!(
                "{} columns reference {} columns",
                fk.columns.len(),
                referenced.len()
            )));
        }
        let same_key = referenced.len() == target.primary_key.len()
            && referenced.iter().all(|c| target.primary_key.contains(c));
        if !same_key {
            return Err(invalid(format!(
                "({}) is not the primary key of {}",
                referenced.join(", "),
                fk.table
            )));
        }

        let mut columns = Vec::with_capacity(referenced.len());
        for key in &target.primary_key {
            let Some(pos) = referenced.iter().position(|r| r == key) else {
                return Err(invalid(format!("{key} is not referenced")));
            };
            let local = &fk.columns[pos];
            let local_def = schema
                .column_index(local)
                .map(|i| &schema.columns[i])
                .ok_or_else(|| invalid(format!("column {local} does not exist")))?;
            let target_def = target
                .column_index(key)
                .map(|i| &target.columns[i])
                .ok_or_else(|| invalid(format!("column {key} does not exist in {}", fk.table)))?;
            let compatible = local_def.data_type == target_def.data_type
                || (local_def.data_type.is_integer() && target_def.data_type.is_integer());
            if !compatible {
                return Err(invalid(format!(
                    "{local} has type {} but {}.{key} has type {}",
                    local_def.data_type, fk.table, target_def.data_type
                )));
            }
            columns.push(local.clone());
        }
        Ok(ForeignKey {
            columns,
            table: fk.table.clone(),
            referenced: target.primary_key.clone(),
        })
    }

    /// Retrieves a reference to a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    fn table(&self, name: &str) -> Result<&Table, ExecutionError> {
        self.get_table(name)
            .ok_or_else(|| ExecutionError::TableNotFound(name.to_string()))
    }

    /// Returns a list of all table names currently stored in the database.
    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.iter().map(|m| m.0.as_str()).collect()
    }

    /// Whether `BEGIN` was executed without a matching `COMMIT` or `ROLLBACK`.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Executes a SQL statement that modifies the database state (DDL/DML) or
    /// controls a transaction.
    ///
    /// This handles `CREATE TABLE`, `INSERT INTO`, `BEGIN`, `COMMIT` and `ROLLBACK`.
    /// For data retrieval, use [Database::query] instead.
    ///
    /// # Errors
    /// Returns an error if tokenization, parsing, or execution fails. A failing
    /// statement leaves the database unchanged.
    ///
    /// # Example
    /// ```
    /// use filmdb::{Database, Value};
    /// let mut db = Database::new();
    /// db.execute("CREATE TABLE language (language_id INT PRIMARY KEY, name TEXT NOT NULL)").unwrap();
    /// let outcome = db.execute("INSERT INTO language (name) VALUES ('English'), ('Italian')").unwrap();
    /// assert_eq!(outcome.rows_affected, 2);
    /// assert_eq!(outcome.generated_keys, vec![Value::Int(1), Value::Int(2)]);
    /// ```
    pub fn execute(&mut self, sql: &str) -> Result<StatementOutcome, ExecutionError> {
        let statement = Parser::parse_sql(sql)?;
        self.execute_statement(statement)
    }

    /// Executes an already parsed statement, see [Database::execute].
    pub fn execute_statement(&mut self, statement: Statement) -> Result<StatementOutcome, ExecutionError> {
        match statement {
            Statement::CreateTable(create) => {
                self.create_table(
                    create.name,
                    Schema {
                        columns: create.columns,
                        primary_key: create.primary_key,
                        foreign_keys: create.foreign_keys,
                    },
                )?;
                Ok(StatementOutcome::default())
            }
            Statement::InsertInto(insert) => self.insert(insert),
            Statement::Begin => self.begin().map(|_| StatementOutcome::default()),
            Statement::Commit => self.commit().map(|_| StatementOutcome::default()),
            Statement::Rollback => self.rollback().map(|_| StatementOutcome::default()),
            Statement::Select(_) => Err(ExecutionError::Syntax(format!(
                "Statement {statement} is not an executable statement"
            ))),
        }
    }

    /// Starts a transaction by taking a snapshot of every table.
    pub fn begin(&mut self) -> Result<(), ExecutionError> {
        if self.snapshot.is_some() {
            return Err(ExecutionError::Transaction(
                "a transaction is already in progress".into(),
            ));
        }
        self.snapshot = Some(self.tables.clone());
        debug!(tables = self.tables.len(), "transaction started");
        Ok(())
    }

    /// Keeps every change made since `BEGIN`.
    pub fn commit(&mut self) -> Result<(), ExecutionError> {
        self.snapshot
            .take()
            .ok_or_else(|| ExecutionError::Transaction("no transaction in progress".into()))?;
        debug!("transaction committed");
        Ok(())
    }

    /// Restores the tables as they were at `BEGIN`.
    pub fn rollback(&mut self) -> Result<(), ExecutionError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| ExecutionError::Transaction("no transaction in progress".into()))?;
        self.tables = snapshot;
        debug!("transaction rolled back");
        Ok(())
    }

    /// Internal helper to handle row insertion logic.
    ///
    /// It maps provided values to the correct columns, handling cases where:
    /// 1. Columns are not specified (positional insertion).
    /// 2. Columns are specified in a different order than the schema.
    /// 3. Some columns are missing (filling them with `NULL`).
    ///
    /// Foreign keys are checked before the first row is written. If any row is
    /// rejected, the rows already written by this statement are removed.
    fn insert(&mut self, insert: InsertInto) -> Result<StatementOutcome, ExecutionError> {
        let table = self.table(&insert.table)?;

        let rows: Vec<Vec<Value>> = match insert.columns {
            None => insert.rows,
            Some(columns) => {
                // Validate that all specified columns exist in the schema
                let mut positions = Vec::with_capacity(columns.len());
                for col_name in &columns {
                    let position = table.schema.column_index(col_name).ok_or_else(|| {
                        ExecutionError::ColumnNotFound(format!("{}.{}", insert.table, col_name))
                    })?;
                    if positions.contains(&position) {
                        return Err(ExecutionError::Syntax(format!(
                            "column {col_name} is specified more than once"
                        )));
                    }
                    positions.push(position);
                }

                let mut rows = Vec::with_capacity(insert.rows.len());
                for values in insert.rows {
                    if values.len() != positions.len() {
                        return Err(ExecutionError::Syntax(format!(
                            "{} columns were listed but a row has {} values",
                            positions.len(),
                            values.len()
                        )));
                    }
                    // Build the final row by following the schema's column order
                    let mut row = vec![Value::Null; table.schema.columns.len()];
                    for (&position, value) in positions.iter().zip(values) {
                        row[position] = value;
                    }
                    rows.push(row);
                }
                rows
            }
        };

        // references to the table itself are checked row by row, while inserting
        let mut self_references = vec![];
        for fk in &table.schema.foreign_keys {
            let positions: Vec<usize> = fk
                .columns
                .iter()
                .filter_map(|c| table.schema.column_index(c))
                .collect();
            if fk.table == insert.table {
                self_references.push(positions);
                continue;
            }
            let referenced = self.table(&fk.table)?;
            for row in &rows {
                let Some(key) = foreign_key_value(row, &positions) else {
                    continue;
                };
                if !referenced.contains_key(&key) {
                    return Err(ExecutionError::ForeignKeyViolation {
                        table: insert.table.clone(),
                        referenced: fk.table.clone(),
                        key: render_key(&key),
                    });
                }
            }
        }

        let table = self
            .tables
            .get_mut(&insert.table)
            .ok_or_else(|| ExecutionError::TableNotFound(insert.table.clone()))?;
        let start = table.row_count;
        let mut outcome = StatementOutcome::default();
        for row in rows {
            let result = check_self_references(table, &row, &self_references)
                .and_then(|_| table.insert(row));
            match result {
                Ok(generated) => {
                    outcome.rows_affected += 1;
                    outcome.generated_keys.extend(generated);
                }
                Err(e) => {
                    table.truncate(start);
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    /// Executes a `SELECT` query and returns the resulting data set.
    ///
    /// This method performs the full query lifecycle:
    /// 1. **Parses** the SQL string into a `Select` AST node.
    /// 2. **Joins** the `FROM` table with every `JOIN`, left to right.
    /// 3. **Filters** rows based on the `WHERE` clause.
    /// 4. **Groups** rows when the query has a `GROUP BY` clause or an aggregate.
    /// 5. **Sorts** the remaining rows based on the `ORDER BY` clause.
    /// 6. **Limits** the number of rows returned.
    /// 7. **Projects** only the requested columns.
    ///
    /// # Example
    ///
    /// ```
    /// use filmdb::{Database, Value};
    ///
    /// let mut db = Database::new();
    /// db.execute("CREATE TABLE category (category_id INT PRIMARY KEY, name TEXT)").unwrap();
    /// db.execute("INSERT INTO category VALUES (1, 'Action'), (11, 'Horror')").unwrap();
    ///
    /// let result = db.query("SELECT c.name FROM category AS c WHERE c.category_id > 1").unwrap();
    ///
    /// assert_eq!(result.column_names(), vec!["name"]);
    /// assert_eq!(result.rows, vec![vec![Value::Text("Horror".into())]]);
    /// ```
    ///
    /// # Errors
    /// Returns an error if:
    /// - The SQL is not a valid `SELECT` statement.
    /// - A table or column does not exist, or an unqualified column is ambiguous.
    /// - A projected column is neither grouped nor aggregated.
    /// - Values of incompatible types are compared.
    pub fn query(&self, sql: &str) -> Result<QueryResult, ExecutionError> {
        let statement = Parser::parse_sql(sql)?;

        let Statement::Select(select) = statement else {
            return Err(ExecutionError::Syntax(format!(
                "Statement {statement} is not a queryable statement"
            )));
        };

        self.select(&select)
    }

    fn select(&self, select: &Select) -> Result<QueryResult, ExecutionError> {
        let (scope, rows) = self.scan(select)?;

        let items = scope.expand(&select.projection)?;
        let (labels, projected): (Vec<ColumnLabel>, Vec<Expr>) =
            items.into_iter().map(|(expr, label)| (label, expr)).unzip();

        // ORDER BY may name a projection alias
        let ordering: Vec<&Expr> = select
            .order_by
            .iter()
            .map(|clause| match &clause.expr {
                Expr::Column(column) if column.table.is_none() => labels
                    .iter()
                    .zip(&projected)
                    .find(|(label, _)| label.table.is_none() && label.name == column.name)
                    .map_or(&clause.expr, |(_, expr)| expr),
                expr => expr,
            })
            .collect();
        let directions: Vec<SortDirection> =
            select.order_by.iter().map(|clause| clause.direction).collect();

        let grouped = !select.group_by.is_empty()
            || projected.iter().any(Expr::has_aggregate)
            || ordering.iter().any(|expr| expr.has_aggregate());

        // (sort keys, output row)
        let mut results: Vec<(Vec<Value>, Vec<Value>)> = Vec::new();
        if grouped {
            let keys = scope.bind_all(select.group_by.iter(), Context::Row)?;
            let projections = scope.bind_all(projected.iter(), Context::Grouped(&keys))?;
            let orders = scope.bind_all(ordering.iter().copied(), Context::Grouped(&keys))?;
            for group in group_rows(rows, &keys)? {
                let frame = Frame::Group {
                    keys: &group.keys,
                    rows: &group.rows,
                };
                results.push((eval_all(&orders, &frame)?, eval_all(&projections, &frame)?));
            }
        } else {
            let projections = scope.bind_all(projected.iter(), Context::Row)?;
            let orders = scope.bind_all(ordering.iter().copied(), Context::Row)?;
            for row in &rows {
                let frame = Frame::Row(row);
                results.push((eval_all(&orders, &frame)?, eval_all(&projections, &frame)?));
            }
        }

        if !directions.is_empty() {
            sort(&mut results, &directions);
        }

        let rows = results
            .into_iter()
            .map(|(_, row)| row)
            .take(select.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(QueryResult {
            columns: labels,
            rows,
        })
    }

    /// Builds the rows of the `FROM` clause with its joins, filtered by `WHERE`.
    fn scan<'a>(&'a self, select: &Select) -> Result<(Scope<'a>, Vec<Vec<Value>>), ExecutionError> {
        let mut scope = Scope::default();
        let base = self.table(&select.from.name)?;
        scope.push(&select.from, base)?;
        let mut rows: Vec<Vec<Value>> = base.rows().collect();

        for join in &select.joins {
            let table = self.table(&join.table.name)?;
            rows = join_rows(rows, &mut scope, join, table)?;
        }

        if let Some(where_clause) = &select.where_clause {
            let predicate = scope.bind(where_clause, Context::Row)?;
            let mut filtered = Vec::with_capacity(rows.len());
            for row in rows {
                if is_true(&eval(&predicate, &Frame::Row(&row))?)? {
                    filtered.push(row);
                }
            }
            rows = filtered;
        }

        Ok((scope, rows))
    }
}

/// The key a row holds for a foreign key, or `None` when part of it is `NULL`.
fn foreign_key_value(row: &[Value], positions: &[usize]) -> Option<Vec<Value>> {
    let key: Vec<Value> = positions.iter().map(|&i| row[i].clone()).collect();
    if key.iter().any(Value::is_null) {
        None
    } else {
        Some(key)
    }
}

fn check_self_references(
    table: &Table,
    row: &[Value],
    references: &[Vec<usize>],
) -> Result<(), ExecutionError> {
    for positions in references {
        let Some(key) = foreign_key_value(row, positions) else {
            continue;
        };
        if !table.contains_key(&key) {
            return Err(ExecutionError::ForeignKeyViolation {
                table: table.name.clone(),
                referenced: table.name.clone(),
                key: render_key(&key),
            });
        }
    }
    Ok(())
}

/// Joins the rows built so far with `table`.
///
/// Equality conditions with one side reading only the rows built so far and
/// the other only the new table are executed as a hash join; the rest of the
/// `ON` clause is checked on each candidate pair. Without such a condition
/// every pair is a candidate.
fn join_rows<'a>(
    left_rows: Vec<Vec<Value>>,
    scope: &mut Scope<'a>,
    join: &Join,
    table: &'a Table,
) -> Result<Vec<Vec<Value>>, ExecutionError> {
    let left_width = scope.width;
    scope.push(&join.table, table)?;
    let right_width = table.schema.columns.len();
    let right_rows: Vec<Vec<Value>> = table.rows().collect();

    let mut left_keys = vec![];
    let mut right_keys = vec![];
    let mut residual = vec![];
    for conjunct in join.on.conjuncts() {
        let bound = scope.bind(conjunct, Context::Row)?;
        if let Bound::Comparison {
            left,
            op: ComparisonOp::Eq,
            right,
        } = &bound
        {
            let side = |bound: &Bound| {
                let mut positions = vec![];
                bound.columns(&mut positions);
                match (positions.iter().all(|&p| p < left_width), positions.iter().all(|&p| p >= left_width)) {
                    _ if positions.is_empty() => None,
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                }
            };
            match (side(left), side(right)) {
                (Some(true), Some(false)) => {
                    left_keys.push(left.as_ref().clone());
                    right_keys.push(right.shifted(left_width));
                    continue;
                }
                (Some(false), Some(true)) => {
                    left_keys.push(right.as_ref().clone());
                    right_keys.push(left.shifted(left_width));
                    continue;
                }
                _ => {}
            }
        }
        residual.push(bound);
    }
    let residual = residual.into_iter().reduce(|a, b| Bound::And(Box::new(a), Box::new(b)));

    let mut index: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
    if !right_keys.is_empty() {
        for (i, row) in right_rows.iter().enumerate() {
            if let Some(key) = join_key(&right_keys, row)? {
                index.entry(key).or_default().push(i);
            }
        }
    }
    let all: Vec<usize> = if right_keys.is_empty() {
        (0..right_rows.len()).collect()
    } else {
        vec![]
    };

    let mut output = Vec::new();
    for left in left_rows {
        let candidates: &[usize] = if left_keys.is_empty() {
            &all
        } else {
            join_key(&left_keys, &left)?
                .and_then(|key| index.get(&key))
                .map(Vec::as_slice)
                .unwrap_or(&[])
        };

        let mut matched = false;
        for &i in candidates {
            let mut row = left.clone();
            row.extend(right_rows[i].iter().cloned());
            let keep = match &residual {
                Some(predicate) => is_true(&eval(predicate, &Frame::Row(&row))?)?,
                None => true,
            };
            if keep {
                matched = true;
                output.push(row);
            }
        }

        if !matched && join.kind == JoinKind::Left {
            let mut row = left;
            row.extend(std::iter::repeat_n(Value::Null, right_width));
            output.push(row);
        }
    }
    Ok(output)
}

/// Evaluates the join key of a row, `None` when part of it is `NULL`.
fn join_key(keys: &[Bound], row: &[Value]) -> Result<Option<Vec<Value>>, ExecutionError> {
    let key = eval_all(keys, &Frame::Row(row))?;
    Ok(if key.iter().any(Value::is_null) {
        None
    } else {
        Some(key)
    })
}

/// Sorts the provided rows in-place based on the SQL `ORDER BY` clauses.
///
/// This method supports multi-column sorting. For each row comparison, it
/// iterates through the sort keys: if the first key results in an
/// equal comparison, it moves to the next one, and so on. Rows that compare
/// equal keep their relative order.
fn sort(rows: &mut [(Vec<Value>, Vec<Value>)], directions: &[SortDirection]) {
    rows.sort_by(|(a, _), (b, _)| {
        for ((left, right), direction) in a.iter().zip(b).zip(directions) {
            let mut ord = left.cmp(right);

            if *direction == SortDirection::Desc {
                ord = ord.reverse();
            }
            // if it's not equal no need to compare more
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

struct Group {
    keys: Vec<Value>,
    rows: Vec<Vec<Value>>,
}

/// Splits rows into groups of equal keys, in the order groups are first seen.
/// Without keys every row belongs to one group, even when there is no row.
fn group_rows(rows: Vec<Vec<Value>>, keys: &[Bound]) -> Result<Vec<Group>, ExecutionError> {
    if keys.is_empty() {
        return Ok(vec![Group { keys: vec![], rows }]);
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    for row in rows {
        let key = eval_all(keys, &Frame::Row(&row))?;
        match index.get(&key) {
            Some(&i) => groups[i].rows.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    keys: key,
                    rows: vec![row],
                });
            }
        }
    }
    Ok(groups)
}

// --- Name resolution ---

/// A table of the `FROM` clause and where its columns start in a joined row.
struct ScopeEntry<'a> {
    reference: String,
    table: &'a Table,
    offset: usize,
}

/// The tables visible to expressions, in join order.
#[derive(Default)]
struct Scope<'a> {
    entries: Vec<ScopeEntry<'a>>,
    width: usize,
}

impl<'a> Scope<'a> {
    fn push(&mut self, factor: &TableFactor, table: &'a Table) -> Result<(), ExecutionError> {
        let reference = factor.reference();
        if self.entries.iter().any(|e| e.reference == reference) {
            return Err(ExecutionError::Syntax(format!(
                "table name {reference} is specified more than once"
            )));
        }
        self.entries.push(ScopeEntry {
            reference: reference.to_string(),
            table,
            offset: self.width,
        });
        self.width += table.schema.columns.len();
        Ok(())
    }

    fn entry(&self, reference: &str) -> Result<&ScopeEntry<'a>, ExecutionError> {
        self.entries
            .iter()
            .find(|e| e.reference == reference)
            .ok_or_else(|| ExecutionError::TableNotFound(reference.to_string()))
    }

    /// Position of a column in the joined row.
    fn resolve(&self, column: &ColumnRef) -> Result<usize, ExecutionError> {
        if let Some(reference) = &column.table {
            let entry = self.entry(reference)?;
            return entry
                .table
                .schema
                .column_index(&column.name)
                .map(|i| entry.offset + i)
                .ok_or_else(|| ExecutionError::ColumnNotFound(column.to_string()));
        }

        let mut found = None;
        for entry in &self.entries {
            if let Some(i) = entry.table.schema.column_index(&column.name) {
                if found.is_some() {
                    return Err(ExecutionError::AmbiguousColumn(column.name.clone()));
                }
                found = Some(entry.offset + i);
            }
        }
        found.ok_or_else(|| ExecutionError::ColumnNotFound(column.name.clone()))
    }

    fn label(&self, position: usize) -> Option<ColumnLabel> {
        self.entries.iter().find_map(|entry| {
            let column = entry.table.schema.columns.get(position.checked_sub(entry.offset)?)?;
            Some(ColumnLabel {
                table: Some(entry.reference.clone()),
                name: column.name.clone(),
            })
        })
    }

    fn entry_columns(entry: &ScopeEntry<'_>) -> impl Iterator<Item = (Expr, ColumnLabel)> {
        entry.table.schema.columns.iter().map(|column| {
            (
                Expr::column(Some(&entry.reference), &column.name),
                ColumnLabel {
                    table: Some(entry.reference.clone()),
                    name: column.name.clone(),
                },
            )
        })
    }

    /// Expands wildcards and labels every projected expression.
    fn expand(&self, projection: &[SelectItem]) -> Result<Vec<(Expr, ColumnLabel)>, ExecutionError> {
        let mut items = Vec::new();
        for item in projection {
            match item {
                SelectItem::Wildcard => {
                    for entry in &self.entries {
                        items.extend(Self::entry_columns(entry));
                    }
                }
                SelectItem::QualifiedWildcard(reference) => {
                    items.extend(Self::entry_columns(self.entry(reference)?));
                }
                SelectItem::Expr { expr, alias } => {
                    let label = match (alias, expr) {
                        (Some(alias), _) => ColumnLabel {
                            table: None,
                            name: alias.clone(),
                        },
                        (None, Expr::Column(column)) => {
                            let position = self.resolve(column)?;
                            self.label(position).ok_or_else(|| {
                                ExecutionError::ColumnNotFound(column.to_string())
                            })?
                        }
                        (None, expr) => ColumnLabel {
                            table: None,
                            name: expr.to_string(),
                        },
                    };
                    items.push((expr.clone(), label));
                }
            }
        }
        Ok(items)
    }

    fn bind_all<'e>(
        &self,
        exprs: impl Iterator<Item = &'e Expr>,
        context: Context<'_>,
    ) -> Result<Vec<Bound>, ExecutionError> {
        exprs.map(|expr| self.bind(expr, context)).collect()
    }

    /// Resolves every column of the expression to its position in the row.
    ///
    /// In a grouped context, a sub-expression equal to a `GROUP BY` expression
    /// reads the group key; any other column must sit inside an aggregate.
    fn bind(&self, expr: &Expr, context: Context<'_>) -> Result<Bound, ExecutionError> {
        if let Context::Grouped(keys) = context
            && !expr.has_aggregate()
        {
            let bound = self.bind(expr, Context::Row)?;
            if let Some(i) = keys.iter().position(|key| *key == bound) {
                return Ok(Bound::Key(i));
            }
            if let Bound::Column(_) = bound {
                return Err(ExecutionError::Grouping(format!(
                    "column {expr} must appear in the GROUP BY clause or be used in an aggregate function"
                )));
            }
        }

        let bind = |expr: &Expr| self.bind(expr, context).map(Box::new);
        let bound = match expr {
            Expr::Column(column) => Bound::Column(self.resolve(column)?),
            Expr::Literal(value) => Bound::Literal(value.clone()),
            Expr::Comparison { left, op, right } => Bound::Comparison {
                left: bind(left.as_ref())?,
                op: *op,
                right: bind(right.as_ref())?,
            },
            Expr::And { left, right } => Bound::And(bind(left.as_ref())?, bind(right.as_ref())?),
            Expr::Or { left, right } => Bound::Or(bind(left.as_ref())?, bind(right.as_ref())?),
            Expr::Not(expr) => Bound::Not(bind(expr.as_ref())?),
            Expr::IsNull { expr, negated } => Bound::IsNull {
                expr: bind(expr.as_ref())?,
                negated: *negated,
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => Bound::InList {
                expr: bind(expr.as_ref())?,
                list: self.bind_all(list.iter(), context)?,
                negated: *negated,
            },
            Expr::Cast { expr, data_type } => Bound::Cast {
                expr: bind(expr.as_ref())?,
                data_type: *data_type,
            },
            Expr::Count(argument) => match context {
                Context::Row => {
                    return Err(ExecutionError::Grouping(format!(
                        "aggregate {expr} is not allowed here"
                    )));
                }
                Context::Grouped(_) => Bound::Count(
                    argument
                        .as_deref()
                        .map(|argument| self.bind(argument, Context::Row).map(Box::new))
                        .transpose()?,
                ),
            },
        };
        Ok(bound)
    }
}

// --- Evaluation ---

#[derive(Clone, Copy)]
enum Context<'k> {
    /// Expressions see one row.
    Row,
    /// Expressions see a group; the slice holds the bound `GROUP BY` expressions.
    Grouped(&'k [Bound]),
}

/// An expression with its columns resolved to row positions.
#[derive(Debug, Clone, PartialEq)]
enum Bound {
    Column(usize),
    /// Position in the `GROUP BY` list.
    Key(usize),
    Literal(Value),
    Comparison {
        left: Box<Bound>,
        op: ComparisonOp,
        right: Box<Bound>,
    },
    And(Box<Bound>, Box<Bound>),
    Or(Box<Bound>, Box<Bound>),
    Not(Box<Bound>),
    IsNull {
        expr: Box<Bound>,
        negated: bool,
    },
    InList {
        expr: Box<Bound>,
        list: Vec<Bound>,
        negated: bool,
    },
    Cast {
        expr: Box<Bound>,
        data_type: DataType,
    },
    Count(Option<Box<Bound>>),
}

impl Bound {
    /// Collects the row positions the expression reads.
    fn columns(&self, positions: &mut Vec<usize>) {
        match self {
            Bound::Column(i) => positions.push(*i),
            Bound::Key(_) | Bound::Literal(_) | Bound::Count(None) => {}
            Bound::Comparison { left, right, .. } | Bound::And(left, right) | Bound::Or(left, right) => {
                left.columns(positions);
                right.columns(positions);
            }
            Bound::Not(expr) | Bound::IsNull { expr, .. } | Bound::Cast { expr, .. } => expr.columns(positions),
            Bound::InList { expr, list, .. } => {
                expr.columns(positions);
                for item in list {
                    item.columns(positions);
                }
            }
            Bound::Count(Some(argument)) => argument.columns(positions),
        }
    }

    /// The same expression reading a row that starts `offset` columns later.
    fn shifted(&self, offset: usize) -> Bound {
        let shift = |bound: &Bound| Box::new(bound.shifted(offset));
        match self {
            Bound::Column(i) => Bound::Column(i - offset),
            Bound::Key(_) | Bound::Literal(_) => self.clone(),
            Bound::Comparison { left, op, right } => Bound::Comparison {
                left: shift(left),
                op: *op,
                right: shift(right),
            },
            Bound::And(left, right) => Bound::And(shift(left), shift(right)),
            Bound::Or(left, right) => Bound::Or(shift(left), shift(right)),
            Bound::Not(expr) => Bound::Not(shift(expr)),
            Bound::IsNull { expr, negated } => Bound::IsNull {
                expr: shift(expr),
                negated: *negated,
            },
            Bound::InList { expr, list, negated } => Bound::InList {
                expr: shift(expr),
                list: list.iter().map(|item| item.shifted(offset)).collect(),
                negated: *negated,
            },
            Bound::Cast { expr, data_type } => Bound::Cast {
                expr: shift(expr),
                data_type: *data_type,
            },
            Bound::Count(argument) => Bound::Count(argument.as_deref().map(shift)),
        }
    }
}

enum Frame<'r> {
    Row(&'r [Value]),
    Group {
        keys: &'r [Value],
        rows: &'r [Vec<Value>],
    },
}

fn eval_all(bounds: &[Bound], frame: &Frame<'_>) -> Result<Vec<Value>, ExecutionError> {
    bounds.iter().map(|bound| eval(bound, frame)).collect()
}

/// Evaluates an expression with SQL three-valued logic: `NULL` stands for unknown.
fn eval(bound: &Bound, frame: &Frame<'_>) -> Result<Value, ExecutionError> {
    match bound {
        Bound::Column(i) => match frame {
            Frame::Row(row) => Ok(row[*i].clone()),
            Frame::Group { .. } => Err(ExecutionError::Grouping(
                "column read outside of an aggregate".into(),
            )),
        },
        Bound::Key(i) => match frame {
            Frame::Group { keys, .. } => Ok(keys[*i].clone()),
            Frame::Row(_) => Err(ExecutionError::Grouping(
                "group key read outside of a group".into(),
            )),
        },
        Bound::Literal(value) => Ok(value.clone()),
        Bound::Comparison { left, op, right } => {
            compare_values(&eval(left, frame)?, *op, &eval(right, frame)?)
        }
        Bound::And(left, right) => {
            let left = truth(&eval(left, frame)?)?;
            if left == Some(false) {
                return Ok(Value::Bool(false));
            }
            let right = truth(&eval(right, frame)?)?;
            Ok(match (left, right) {
                (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Null,
            })
        }
        Bound::Or(left, right) => {
            let left = truth(&eval(left, frame)?)?;
            if left == Some(true) {
                return Ok(Value::Bool(true));
            }
            let right = truth(&eval(right, frame)?)?;
            Ok(match (left, right) {
                (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Null,
            })
        }
        Bound::Not(expr) => Ok(match truth(&eval(expr, frame)?)? {
            Some(b) => Value::Bool(!b),
            None => Value::Null,
        }),
        Bound::IsNull { expr, negated } => Ok(Value::Bool(eval(expr, frame)?.is_null() != *negated)),
        Bound::InList {
            expr,
            list,
            negated,
        } => {
            let value = eval(expr, frame)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            let mut unknown = false;
            for item in list {
                match compare_values(&value, ComparisonOp::Eq, &eval(item, frame)?)? {
                    Value::Bool(true) => return Ok(Value::Bool(!*negated)),
                    Value::Null => unknown = true,
                    _ => {}
                }
            }
            Ok(if unknown {
                Value::Null
            } else {
                Value::Bool(*negated)
            })
        }
        Bound::Cast { expr, data_type } => eval(expr, frame)?.cast(*data_type),
        Bound::Count(argument) => {
            let Frame::Group { rows, .. } = frame else {
                return Err(ExecutionError::Grouping(
                    "aggregate evaluated outside of a group".into(),
                ));
            };
            let count = match argument {
                None => rows.len(),
                Some(argument) => {
                    let mut count = 0;
                    for row in rows.iter() {
                        if !eval(argument, &Frame::Row(row))?.is_null() {
                            count += 1;
                        }
                    }
                    count
                }
            };
            Ok(Value::Int(count as i64))
        }
    }
}

/// `Some(bool)` for a boolean, `None` for `NULL`.
fn truth(value: &Value) -> Result<Option<bool>, ExecutionError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(ExecutionError::TypeMismatch(format!(
            "{} is not a boolean condition",
            other.to_sql_literal()
        ))),
    }
}

/// Only `TRUE` keeps a row; `FALSE` and `NULL` drop it.
fn is_true(value: &Value) -> Result<bool, ExecutionError> {
    Ok(truth(value)? == Some(true))
}

/// Compares two values using a comparison operator.
///
/// # SQL NULL Semantics
/// - `NULL` compared to anything (including `NULL`) yields `NULL`.
/// - This matches standard SQL three-valued logic.
///
/// # Errors
/// Returns an error if comparing incompatible types (e.g., `Int` vs `Text`).
/// Numbers of any width compare with each other.
fn compare_values(left: &Value, op: ComparisonOp, right: &Value) -> Result<Value, ExecutionError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    let numeric = |v: &Value| matches!(v, Value::SmallInt(_) | Value::Int(_) | Value::Float(_));
    let comparable = match (left, right) {
        (Value::Text(_), Value::Text(_)) | (Value::Bool(_), Value::Bool(_)) => true,
        _ => numeric(left) && numeric(right),
    };
    if !comparable {
        return Err(ExecutionError::TypeMismatch(format!(
            "cannot compare {} with {}",
            left.to_sql_literal(),
            right.to_sql_literal()
        )));
    }

    let ord = left.cmp(right);
    let result = match op {
        ComparisonOp::Eq => ord == Ordering::Equal,
        ComparisonOp::NotEq => ord != Ordering::Equal,
        ComparisonOp::Lt => ord == Ordering::Less,
        ComparisonOp::LtEq => ord != Ordering::Greater,
        ComparisonOp::Gt => ord == Ordering::Greater,
        ComparisonOp::GtEq => ord != Ordering::Less,
    };
    Ok(Value::Bool(result))
}
