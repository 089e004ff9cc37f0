//! Query builder: composes typed fields into `SELECT` and `INSERT` statements
//! and lowers them into SQL the engine executes.
//!
//! Building happens in two phases. The explicit sources (`FROM` and every
//! `JOIN`) are registered first, then each clause is lowered: columns are
//! checked against the registry, relationship paths become implicit joins
//! and nested multisets become separate queries correlated on equality keys.
//!
//! ```
//! use filmdb::query::select;
//! use filmdb::tables::film_actor;
//! use filmdb::SchemaRegistry;
//!
//! let registry = SchemaRegistry::bundled().unwrap();
//! let fa = film_actor();
//! let sql = select((&fa.actor().first_name,)).from(&fa).to_sql(&registry).unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT film_actor__actor.first_name FROM film_actor \
//!      INNER JOIN actor AS film_actor__actor ON film_actor.actor_id = film_actor__actor.actor_id"
//! );
//! ```

use std::sync::Arc;

use crate::ast::{
    self, ComparisonOp, Expr, InsertInto, Join, JoinKind, OrderByClause, SelectItem, TableFactor, conjunction,
};
use crate::data_type::DataType;
use crate::database::ColumnLabel;
use crate::error::SchemaError;
use crate::field::{Condition, Field, IntoList, IntoSql, QueryExpr, SelectField, SortField, SqlType, TableRef, TypedTable};
use crate::schema::{SchemaRegistry, check_name};
use crate::value::Value;

#[derive(Debug, Clone)]
struct ExplicitJoin {
    kind: JoinKind,
    table: TableRef,
    on: QueryExpr,
}

/// A `SELECT` under construction. Every method returns a new query and
/// leaves the one it was called on untouched, so partial queries can be
/// shared and extended in several ways.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    fields: Vec<SelectField>,
    from: Option<TableRef>,
    joins: Vec<ExplicitJoin>,
    paths: Vec<TableRef>,
    filter: Option<QueryExpr>,
    group_by: Vec<QueryExpr>,
    order_by: Vec<SortField>,
    limit: Option<usize>,
}

pub fn select<L: IntoList<SelectField>>(fields: L) -> SelectQuery {
    SelectQuery {
        fields: fields.into_list(),
        ..SelectQuery::default()
    }
}

/// Every column of `table`.
pub fn select_from(table: &impl TypedTable) -> SelectQuery {
    select([table.all()]).from(table)
}

/// A nested collection of the rows of `query`, one collection per outer row.
///
/// The query is correlated with the outer one through equalities in its
/// filter, such as `film_actor.actor_id = CAST(actor.actor_id AS SMALLINT)`.
pub fn multiset(query: SelectQuery) -> Multiset {
    Multiset { query }
}

#[derive(Debug, Clone)]
pub struct Multiset {
    query: SelectQuery,
}

impl Multiset {
    pub fn as_(self, alias: &str) -> SelectField {
        SelectField::Multiset {
            query: Box::new(self.query),
            alias: Some(Arc::from(alias)),
        }
    }
}

impl From<Multiset> for SelectField {
    fn from(value: Multiset) -> Self {
        SelectField::Multiset {
            query: Box::new(value.query),
            alias: None,
        }
    }
}

impl SelectQuery {
    /// Adds fields to the select list.
    pub fn select<L: IntoList<SelectField>>(&self, fields: L) -> Self {
        let mut query = self.clone();
        query.fields.extend(fields.into_list());
        query
    }

    pub fn from(&self, table: &impl TypedTable) -> Self {
        let mut query = self.clone();
        query.from = Some(table.table_ref().clone());
        query
    }

    pub fn join(&self, table: &impl TypedTable, on: Condition) -> Self {
        self.with_join(JoinKind::Inner, table, on)
    }

    pub fn left_join(&self, table: &impl TypedTable, on: Condition) -> Self {
        self.with_join(JoinKind::Left, table, on)
    }

    fn with_join(&self, kind: JoinKind, table: &impl TypedTable, on: Condition) -> Self {
        let mut query = self.clone();
        query.joins.push(ExplicitJoin {
            kind,
            table: table.table_ref().clone(),
            on: on.0,
        });
        query
    }

    /// Joins a relationship path even when no clause reads from it.
    pub fn join_implicit(&self, path: &impl TypedTable) -> Self {
        let mut query = self.clone();
        query.paths.push(path.table_ref().clone());
        query
    }

    /// `WHERE`; several calls are combined with `AND`.
    pub fn filter(&self, condition: Condition) -> Self {
        let mut query = self.clone();
        query.filter = Some(match query.filter.take() {
            Some(existing) => QueryExpr::And(Box::new(existing), Box::new(condition.0)),
            None => condition.0,
        });
        query
    }

    pub fn group_by<L: IntoList<QueryExpr>>(&self, fields: L) -> Self {
        let mut query = self.clone();
        query.group_by.extend(fields.into_list());
        query
    }

    pub fn order_by<L: IntoList<SortField>>(&self, fields: L) -> Self {
        let mut query = self.clone();
        query.order_by.extend(fields.into_list());
        query
    }

    pub fn limit(&self, limit: usize) -> Self {
        let mut query = self.clone();
        query.limit = Some(limit);
        query
    }

    /// Checks the query against the registry and lowers it.
    pub fn build(&self, registry: &SchemaRegistry) -> Result<QueryPlan, SchemaError> {
        Lowering::new(registry).plan(self, &[])
    }

    /// The SQL of the outer query.
    pub fn to_sql(&self, registry: &SchemaRegistry) -> Result<String, SchemaError> {
        Ok(self.build(registry)?.sql())
    }

    fn sources(&self) -> impl Iterator<Item = &TableRef> {
        self.from.iter().chain(self.joins.iter().map(|j| &j.table))
    }

    fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
            || self.fields.iter().any(|field| match field {
                SelectField::Expr { expr, .. } => has_aggregate(expr),
                _ => false,
            })
            || self.order_by.iter().any(|sort| has_aggregate(&sort.expr))
    }
}

/// What a cell of a built result holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A column of the SQL result.
    Column(usize),
    /// A nested collection, by position in [QueryPlan::multisets].
    Multiset(usize),
}

/// A built select: the SQL to run plus how to assemble its rows.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    select: ast::Select,
    labels: Vec<ColumnLabel>,
    slots: Vec<Slot>,
    multisets: Vec<MultisetPlan>,
    /// Leading correlation columns of a nested query.
    key_exprs: Vec<Expr>,
}

/// A nested query and the outer columns holding its correlation key.
#[derive(Debug, Clone)]
pub struct MultisetPlan {
    pub plan: QueryPlan,
    /// Positions of the key in the outer result.
    pub outer_keys: Vec<usize>,
    /// Maximum number of nested rows per outer row.
    pub limit: Option<usize>,
}

impl QueryPlan {
    pub fn sql(&self) -> String {
        self.select.to_string()
    }

    pub fn select(&self) -> &ast::Select {
        &self.select
    }

    /// Labels of the cells, in select-list order.
    pub fn labels(&self) -> &[ColumnLabel] {
        &self.labels
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn multisets(&self) -> &[MultisetPlan] {
        &self.multisets
    }

    /// Number of columns of the SQL result, hidden key columns included.
    pub fn width(&self) -> usize {
        self.select.projection.len()
    }

    /// Number of leading correlation columns.
    pub fn key_len(&self) -> usize {
        self.key_exprs.len()
    }

    /// The SQL restricted to the rows whose single-column key is in `keys`.
    pub(crate) fn restricted_sql(&self, keys: Vec<Value>) -> String {
        let [key] = self.key_exprs.as_slice() else {
            return self.sql();
        };
        let restriction = Expr::InList {
            expr: Box::new(key.clone()),
            list: keys.into_iter().map(Expr::Literal).collect(),
            negated: false,
        };
        let mut select = self.select.clone();
        select.where_clause = Some(match select.where_clause.take() {
            Some(existing) => Expr::and(existing, restriction),
            None => restriction,
        });
        select.to_string()
    }
}

fn has_aggregate(expr: &QueryExpr) -> bool {
    match expr {
        QueryExpr::Count(_) => true,
        QueryExpr::Column { .. } | QueryExpr::Literal(_) => false,
        QueryExpr::Comparison { left, right, .. } | QueryExpr::And(left, right) | QueryExpr::Or(left, right) => {
            has_aggregate(left) || has_aggregate(right)
        }
        QueryExpr::Not(expr) | QueryExpr::IsNull { expr, .. } | QueryExpr::Cast { expr, .. } => has_aggregate(expr),
        QueryExpr::InList { expr, list, .. } => has_aggregate(expr) || list.iter().any(has_aggregate),
    }
}

/// Whether a lowered expression only reads group keys outside of aggregates.
fn is_grouped_by(expr: &Expr, keys: &[Expr]) -> bool {
    if keys.contains(expr) {
        return true;
    }
    match expr {
        Expr::Column(_) => false,
        Expr::Literal(_) | Expr::Count(_) => true,
        Expr::Comparison { left, right, .. } | Expr::And { left, right } | Expr::Or { left, right } => {
            is_grouped_by(left, keys) && is_grouped_by(right, keys)
        }
        Expr::Not(expr) | Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => is_grouped_by(expr, keys),
        Expr::InList { expr, list, .. } => {
            is_grouped_by(expr, keys) && list.iter().all(|item| is_grouped_by(item, keys))
        }
    }
}

fn label_for(expr: &Expr, alias: Option<&str>) -> ColumnLabel {
    match (alias, expr) {
        (Some(alias), _) => ColumnLabel {
            table: None,
            name: alias.to_string(),
        },
        (None, Expr::Column(column)) => ColumnLabel {
            table: column.table.clone(),
            name: column.name.clone(),
        },
        (None, expr) => ColumnLabel {
            table: None,
            name: expr.to_string(),
        },
    }
}

fn factor(table: &TableRef) -> TableFactor {
    TableFactor {
        name: table.name().to_string(),
        alias: (table.reference() != table.name()).then(|| table.reference().to_string()),
    }
}

/// Which tables a clause may read.
#[derive(Debug, Clone, Copy)]
enum Visibility {
    All,
    /// The explicit sources up to this position; no relationship paths.
    UpTo(usize),
}

/// Side of a correlated nested query an expression reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Constant,
    Inner,
    Outer,
    Both,
}

struct Source {
    reference: String,
    table: String,
}

struct PathJoin {
    alias: String,
    table: String,
    kind: JoinKind,
    on: Expr,
}

struct Lowering<'r> {
    registry: &'r SchemaRegistry,
    sources: Vec<Source>,
    paths: Vec<PathJoin>,
}

impl<'r> Lowering<'r> {
    fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            sources: vec![],
            paths: vec![],
        }
    }

    fn register_sources(&mut self, query: &SelectQuery) -> Result<(), SchemaError> {
        if query.from.is_none() {
            return Err(SchemaError::InvalidQuery("the query has no FROM table".into()));
        }
        for table in query.sources() {
            if table.path().is_some() {
                return Err(SchemaError::InvalidQuery(format!(
                    "{table} is a relationship path and cannot be joined explicitly, use join_implicit"
                )));
            }
            self.registry.table(table.name())?;
            check_name(table.reference())?;
            if self.sources.iter().any(|s| s.reference == table.reference()) {
                return Err(SchemaError::DuplicateAlias(table.reference().to_string()));
            }
            self.sources.push(Source {
                reference: table.reference().to_string(),
                table: table.name().to_string(),
            });
        }
        Ok(())
    }

    /// The reference a table is read through; paths are joined on first use.
    fn resolve_table(&mut self, table: &TableRef, column: &str, visibility: Visibility) -> Result<String, SchemaError> {
        if table.path().is_some() {
            if let Visibility::UpTo(_) = visibility {
                return Err(SchemaError::InvalidQuery(format!(
                    "relationship path {table} cannot be used in an ON clause"
                )));
            }
            return self.join_path(table);
        }
        let visible = match visibility {
            Visibility::All => &self.sources[..],
            Visibility::UpTo(last) => &self.sources[..=last],
        };
        visible
            .iter()
            .find(|s| s.reference == table.reference() && s.table == table.name())
            .map(|s| s.reference.clone())
            .ok_or_else(|| SchemaError::UnresolvedTable {
                alias: table.reference().to_string(),
                column: column.to_string(),
            })
    }

    /// Adds the implicit join of a path, after the joins of its parents.
    fn join_path(&mut self, table: &TableRef) -> Result<String, SchemaError> {
        let registry = self.registry;
        let alias = table.reference().to_string();
        if let Some(existing) = self.paths.iter().find(|p| p.alias == alias) {
            if existing.table != table.name() {
                return Err(SchemaError::DuplicateAlias(alias));
            }
            return Ok(alias);
        }
        let Some(path) = table.path() else {
            return self.resolve_table(table, "*", Visibility::All);
        };

        let parent = &path.parent;
        let parent_reference = if parent.path().is_some() {
            self.join_path(parent)?
        } else {
            self.resolve_table(parent, "*", Visibility::All)?
        };
        let parent_optional = self
            .paths
            .iter()
            .any(|p| p.alias == parent_reference && p.kind == JoinKind::Left);

        let relationship = match &path.relationship {
            Some(name) => {
                let relationship = registry.relationship(parent.name(), name)?;
                if relationship.to_table != table.name() {
                    return Err(SchemaError::InvalidRelationship {
                        table: parent.name().to_string(),
                        name: name.to_string(),
                        reason: format!("it leads to {} and not to {}", relationship.to_table, table.name()),
                    });
                }
                relationship
            }
            None => registry.resolve_relationship(parent.name(), table.name())?,
        };
        if self.sources.iter().any(|s| s.reference == alias) {
            return Err(SchemaError::DuplicateAlias(alias));
        }

        let on = conjunction(
            relationship
                .from_columns
                .iter()
                .zip(&relationship.to_columns)
                .map(|(from, to)| Expr::eq(Expr::column(Some(&parent_reference), from), Expr::column(Some(&alias), to))),
        )
        .ok_or_else(|| SchemaError::InvalidRelationship {
            table: relationship.from_table.clone(),
            name: relationship.name.clone(),
            reason: "it has no columns".into(),
        })?;
        // a parent joined as optional makes every table below it optional
        let kind = if relationship.optional || parent_optional {
            JoinKind::Left
        } else {
            JoinKind::Inner
        };
        self.paths.push(PathJoin {
            alias: alias.clone(),
            table: table.name().to_string(),
            kind,
            on,
        });
        Ok(alias)
    }

    fn check_column(&self, table: &str, column: &str, data_type: DataType) -> Result<(), SchemaError> {
        let declared = self.registry.table(table)?.column(column)?;
        if declared.data_type != data_type {
            return Err(SchemaError::TypeMismatch {
                table: table.to_string(),
                column: column.to_string(),
                expected: data_type,
                found: declared.data_type,
            });
        }
        Ok(())
    }

    fn lower(&mut self, expr: &QueryExpr, visibility: Visibility) -> Result<Expr, SchemaError> {
        let lowered = match expr {
            QueryExpr::Column { table, name, data_type } => {
                let reference = self.resolve_table(table, name, visibility)?;
                self.check_column(table.name(), name, *data_type)?;
                Expr::column(Some(&reference), name)
            }
            QueryExpr::Literal(value) => {
                check_literal(value)?;
                Expr::Literal(value.clone())
            }
            QueryExpr::Comparison { left, op, right } => Expr::Comparison {
                left: self.boxed(left, visibility)?,
                op: *op,
                right: self.boxed(right, visibility)?,
            },
            QueryExpr::And(left, right) => Expr::And {
                left: self.boxed(left, visibility)?,
                right: self.boxed(right, visibility)?,
            },
            QueryExpr::Or(left, right) => Expr::Or {
                left: self.boxed(left, visibility)?,
                right: self.boxed(right, visibility)?,
            },
            QueryExpr::Not(expr) => Expr::Not(self.boxed(expr, visibility)?),
            QueryExpr::IsNull { expr, negated } => Expr::IsNull {
                expr: self.boxed(expr, visibility)?,
                negated: *negated,
            },
            QueryExpr::InList { expr, list, negated } => {
                let expr = self.boxed(expr, visibility)?;
                let mut items = Vec::with_capacity(list.len());
                for item in list {
                    items.push(self.lower(item, visibility)?);
                }
                Expr::InList {
                    expr,
                    list: items,
                    negated: *negated,
                }
            }
            QueryExpr::Cast { expr, data_type } => Expr::Cast {
                expr: self.boxed(expr, visibility)?,
                data_type: *data_type,
            },
            QueryExpr::Count(None) => Expr::Count(None),
            QueryExpr::Count(Some(argument)) => Expr::Count(Some(self.boxed(argument, visibility)?)),
        };
        Ok(lowered)
    }

    fn boxed(&mut self, expr: &QueryExpr, visibility: Visibility) -> Result<Box<Expr>, SchemaError> {
        self.lower(expr, visibility).map(Box::new)
    }

    fn lower_all<'q>(&mut self, exprs: impl IntoIterator<Item = &'q QueryExpr>) -> Result<Vec<Expr>, SchemaError> {
        exprs.into_iter().map(|expr| self.lower(expr, Visibility::All)).collect()
    }

    fn plan(mut self, query: &SelectQuery, inner_keys: &[QueryExpr]) -> Result<QueryPlan, SchemaError> {
        self.register_sources(query)?;
        for path in &query.paths {
            if path.path().is_none() {
                return Err(SchemaError::InvalidQuery(format!("{path} is not a relationship path")));
            }
            self.join_path(path)?;
        }

        let key_exprs = self.lower_all(inner_keys)?;
        let mut projection: Vec<Expr> = key_exprs.clone();
        let mut aliases: Vec<Option<String>> = vec![None; key_exprs.len()];
        let mut labels = vec![];
        let mut slots = vec![];
        let mut multisets = vec![];
        let mut outer_exprs: Vec<Vec<Expr>> = vec![];

        for field in &query.fields {
            match field {
                SelectField::Expr { expr, alias } => {
                    if let Some(alias) = alias {
                        check_name(alias)?;
                    }
                    let lowered = self.lower(expr, Visibility::All)?;
                    labels.push(label_for(&lowered, alias.as_deref()));
                    slots.push(Slot::Column(projection.len()));
                    projection.push(lowered);
                    aliases.push(alias.as_deref().map(str::to_string));
                }
                SelectField::AllOf(table) => {
                    let reference = self.resolve_table(table, "*", Visibility::All)?;
                    for column in self.registry.table(table.name())?.columns() {
                        let expr = Expr::column(Some(&reference), &column.name);
                        labels.push(label_for(&expr, None));
                        slots.push(Slot::Column(projection.len()));
                        projection.push(expr);
                        aliases.push(None);
                    }
                }
                SelectField::Multiset { query: nested, alias } => {
                    let (plan, outer) = self.nested(query, nested)?;
                    labels.push(ColumnLabel {
                        table: None,
                        name: alias.as_deref().unwrap_or("multiset").to_string(),
                    });
                    slots.push(Slot::Multiset(multisets.len()));
                    multisets.push(plan);
                    outer_exprs.push(outer);
                }
            }
        }

        let where_clause = query
            .filter
            .as_ref()
            .map(|filter| self.lower(filter, Visibility::All))
            .transpose()?;
        let mut ons = Vec::with_capacity(query.joins.len());
        for (i, join) in query.joins.iter().enumerate() {
            ons.push(self.lower(&join.on, Visibility::UpTo(i + 1))?);
        }
        let group_by = self.lower_all(&query.group_by)?;
        let mut order_by = Vec::with_capacity(query.order_by.len());
        for sort in &query.order_by {
            order_by.push(OrderByClause {
                expr: self.lower(&sort.expr, Visibility::All)?,
                direction: sort.direction,
            });
        }

        // correlation keys of nested queries trail the visible columns
        for (multiset, outer) in multisets.iter_mut().zip(outer_exprs) {
            for expr in outer {
                multiset.outer_keys.push(projection.len());
                projection.push(expr);
                aliases.push(None);
            }
        }

        for expr in where_clause.iter().chain(&ons) {
            if expr.has_aggregate() {
                return Err(SchemaError::InvalidGrouping(format!(
                    "aggregate in {expr} is only allowed in the select list and ORDER BY"
                )));
            }
        }
        if group_by.iter().any(Expr::has_aggregate) {
            return Err(SchemaError::InvalidGrouping("GROUP BY cannot contain an aggregate".into()));
        }
        let grouped = !group_by.is_empty()
            || projection.iter().any(Expr::has_aggregate)
            || order_by.iter().any(|clause| clause.expr.has_aggregate());
        if grouped {
            let ungrouped = projection
                .iter()
                .chain(order_by.iter().map(|clause| &clause.expr))
                .find(|expr| !is_grouped_by(expr, &group_by));
            if let Some(expr) = ungrouped {
                return Err(SchemaError::InvalidGrouping(format!(
                    "{expr} is neither grouped nor aggregated"
                )));
            }
        }

        let from = query
            .from
            .as_ref()
            .ok_or_else(|| SchemaError::InvalidQuery("the query has no FROM table".into()))?;
        let mut joins: Vec<Join> = query
            .joins
            .iter()
            .zip(ons)
            .map(|(join, on)| Join {
                kind: join.kind,
                table: factor(&join.table),
                on,
            })
            .collect();
        joins.extend(self.paths.into_iter().map(|path| Join {
            kind: path.kind,
            table: TableFactor {
                name: path.table,
                alias: Some(path.alias),
            },
            on: path.on,
        }));

        let select = ast::Select {
            projection: projection
                .into_iter()
                .zip(aliases)
                .map(|(expr, alias)| SelectItem::Expr { expr, alias })
                .collect(),
            from: factor(from),
            joins,
            where_clause,
            group_by,
            order_by,
            limit: query.limit,
        };
        Ok(QueryPlan {
            select,
            labels,
            slots,
            multisets,
            key_exprs,
        })
    }

    /// Splits the filter of a nested query into its own conditions and the
    /// equalities correlating it with `outer`, and builds it.
    ///
    /// Returns the nested plan and the outer side of each key, lowered in the
    /// outer query.
    fn nested(&mut self, outer: &SelectQuery, query: &SelectQuery) -> Result<(MultisetPlan, Vec<Expr>), SchemaError> {
        let inner: Vec<&str> = query.sources().map(TableRef::reference).collect();
        let side = |expr: &QueryExpr| {
            let mut found = Side::Constant;
            expr.for_each_table(&mut |table| {
                let this = if inner.iter().any(|name| *name == table.root().reference()) {
                    Side::Inner
                } else {
                    Side::Outer
                };
                found = match found {
                    Side::Constant => this,
                    current if current == this => current,
                    _ => Side::Both,
                };
            });
            found
        };

        let mut inner_keys = vec![];
        let mut outer_keys = vec![];
        let mut remaining = vec![];
        for conjunct in query.filter.iter().flat_map(QueryExpr::conjuncts) {
            match side(conjunct) {
                Side::Constant | Side::Inner => {
                    remaining.push(conjunct.clone());
                    continue;
                }
                Side::Outer | Side::Both => {}
            }
            let pair = match conjunct {
                QueryExpr::Comparison {
                    left,
                    op: ComparisonOp::Eq,
                    right,
                } => match (side(&**left), side(&**right)) {
                    (Side::Inner, Side::Outer) => Some((left, right)),
                    (Side::Outer, Side::Inner) => Some((right, left)),
                    _ => None,
                },
                _ => None,
            };
            let Some((inner_side, outer_side)) = pair else {
                return Err(SchemaError::InvalidQuery(format!(
                    "a nested query can only refer to {} through equalities between its own and outer columns",
                    outer.from.as_ref().map_or("the outer query", TableRef::reference)
                )));
            };
            inner_keys.push((**inner_side).clone());
            outer_keys.push((**outer_side).clone());
        }

        let mut nested = query.clone();
        nested.filter = remaining.into_iter().reduce(|a, b| QueryExpr::And(Box::new(a), Box::new(b)));
        if query.is_grouped() {
            nested.group_by.extend(inner_keys.iter().cloned());
        }
        // the limit applies to each outer row, not to the whole nested query
        let limit = if inner_keys.is_empty() {
            None
        } else {
            nested.limit.take()
        };

        let plan = Lowering::new(self.registry).plan(&nested, &inner_keys)?;
        let outer_exprs = self.lower_all(&outer_keys)?;
        Ok((
            MultisetPlan {
                plan,
                outer_keys: vec![],
                limit,
            },
            outer_exprs,
        ))
    }
}

/// A column listed in an `INSERT`.
#[derive(Debug, Clone)]
pub struct InsertColumn {
    table: TableRef,
    name: Arc<str>,
    data_type: DataType,
}

impl<T: SqlType> From<&Field<T>> for InsertColumn {
    fn from(field: &Field<T>) -> Self {
        Self {
            table: field.table().clone(),
            name: Arc::from(field.name()),
            data_type: T::DATA_TYPE,
        }
    }
}

impl<T: SqlType> From<Field<T>> for InsertColumn {
    fn from(field: Field<T>) -> Self {
        Self::from(&field)
    }
}

/// An `INSERT` under construction.
#[derive(Debug, Clone)]
pub struct InsertQuery {
    table: TableRef,
    columns: Vec<InsertColumn>,
    rows: Vec<Vec<Value>>,
}

pub fn insert_into(table: &impl TypedTable) -> InsertQuery {
    InsertQuery {
        table: table.table_ref().clone(),
        columns: vec![],
        rows: vec![],
    }
}

impl InsertQuery {
    pub fn columns<L: IntoList<InsertColumn>>(&self, columns: L) -> Self {
        let mut query = self.clone();
        query.columns = columns.into_list();
        query
    }

    /// Adds a row; values line up with [InsertQuery::columns].
    pub fn values<L: IntoList<Value>>(&self, row: L) -> Self {
        let mut query = self.clone();
        query.rows.push(row.into_list());
        query
    }

    /// Adds several rows at once.
    pub fn rows<L: IntoList<Value>>(&self, rows: impl IntoIterator<Item = L>) -> Self {
        let mut query = self.clone();
        query.rows.extend(rows.into_iter().map(IntoList::into_list));
        query
    }

    /// Sets a column on every row, adding the column when it is not listed yet.
    pub fn set<T: SqlType, V: IntoSql<T>>(&self, field: &Field<T>, value: V) -> Self {
        let value = value.into_value();
        let mut query = self.clone();
        if query.rows.is_empty() {
            query.rows.push(vec![]);
        }
        match query.columns.iter().position(|c| &*c.name == field.name()) {
            Some(i) => {
                for row in &mut query.rows {
                    if let Some(cell) = row.get_mut(i) {
                        *cell = value.clone();
                    }
                }
            }
            None => {
                query.columns.push(InsertColumn::from(field));
                for row in &mut query.rows {
                    row.push(value.clone());
                }
            }
        }
        query
    }

    pub fn build(&self, registry: &SchemaRegistry) -> Result<InsertInto, SchemaError> {
        if self.table.path().is_some() {
            return Err(SchemaError::InvalidQuery(format!(
                "cannot insert into relationship path {}",
                self.table
            )));
        }
        let table = registry.table(self.table.name())?;
        if self.rows.is_empty() {
            return Err(SchemaError::InvalidQuery(format!("no values to insert into {}", table.name())));
        }

        let mut declared = Vec::with_capacity(self.columns.len());
        for (i, column) in self.columns.iter().enumerate() {
            if column.table.name() != table.name() {
                return Err(SchemaError::InvalidQuery(format!(
                    "column {}.{} does not belong to {}",
                    column.table,
                    column.name,
                    table.name()
                )));
            }
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::InvalidQuery(format!("column {} is listed twice", column.name)));
            }
            let def = table.column(&column.name)?;
            if def.data_type != column.data_type {
                return Err(SchemaError::TypeMismatch {
                    table: table.name().to_string(),
                    column: column.name.to_string(),
                    expected: column.data_type,
                    found: def.data_type,
                });
            }
            declared.push(def);
        }

        let mut rows = Vec::with_capacity(self.rows.len());
        for values in &self.rows {
            if values.len() != declared.len() {
                return Err(SchemaError::InvalidQuery(format!(
                    "{} columns are listed but a row has {} values",
                    declared.len(),
                    values.len()
                )));
            }
            let mut row = Vec::with_capacity(values.len());
            for (value, def) in values.iter().zip(&declared) {
                let coerced = value.coerce_to(def.data_type).ok_or_else(|| SchemaError::TypeMismatch {
                    table: table.name().to_string(),
                    column: def.name.clone(),
                    expected: def.data_type,
                    found: value.data_type().unwrap_or(def.data_type),
                })?;
                check_literal(&coerced)?;
                row.push(coerced);
            }
            rows.push(row);
        }

        Ok(InsertInto {
            table: table.name().to_string(),
            columns: Some(declared.iter().map(|def| def.name.clone()).collect()),
            rows,
        })
    }

    pub fn to_sql(&self, registry: &SchemaRegistry) -> Result<String, SchemaError> {
        Ok(self.build(registry)?.to_string())
    }
}

/// Rejects values that have no SQL literal form.
pub(crate) fn check_literal(value: &Value) -> Result<(), SchemaError> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(SchemaError::InvalidQuery(format!(
            "{f} cannot be written as a SQL literal"
        ))),
        _ => Ok(()),
    }
}
