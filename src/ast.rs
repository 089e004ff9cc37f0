//! Syntax tree of the SQL dialect understood by the engine.
//!
//! Every node renders back to SQL through [fmt::Display]; the rendered text
//! parses into an equal tree.

use std::fmt;

use crate::table::ForeignKey;
use crate::{ColumnDef, DataType, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTable),
    InsertInto(InsertInto),
    Select(Select),
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertInto {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub projection: Vec<SelectItem>,
    pub from: TableFactor,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderByClause>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `alias.*`
    QualifiedWildcard(String),
    Expr { expr: Expr, alias: Option<String> },
}

/// A table in a `FROM` or `JOIN` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct TableFactor {
    pub name: String,
    pub alias: Option<String>,
}

impl TableFactor {
    /// The name columns of this table are qualified with.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableFactor,
    pub on: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    pub expr: Expr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// `[table.]name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Comparison {
        left: Box<Expr>,
        op: ComparisonOp,
        right: Box<Expr>,
    },
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Cast {
        expr: Box<Expr>,
        data_type: DataType,
    },
    /// `COUNT(*)` when empty, `COUNT(expr)` otherwise.
    Count(Option<Box<Expr>>),
}

impl Expr {
    pub fn column(table: Option<&str>, name: &str) -> Self {
        Self::Column(ColumnRef {
            table: table.map(str::to_string),
            name: name.to_string(),
        })
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::Comparison {
            left: Box::new(left),
            op: ComparisonOp::Eq,
            right: Box::new(right),
        }
    }

    /// Whether the expression contains an aggregate call.
    pub fn has_aggregate(&self) -> bool {
        match self {
            Self::Count(_) => true,
            Self::Column(_) | Self::Literal(_) => false,
            Self::Comparison { left, right, .. }
            | Self::And { left, right }
            | Self::Or { left, right } => left.has_aggregate() || right.has_aggregate(),
            Self::Not(expr) | Self::IsNull { expr, .. } | Self::Cast { expr, .. } => {
                expr.has_aggregate()
            }
            Self::InList { expr, list, .. } => {
                expr.has_aggregate() || list.iter().any(Expr::has_aggregate)
            }
        }
    }

    /// Splits a chain of `AND` into its operands, left to right.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Self::And { left, right } => {
                let mut parts = left.conjuncts();
                parts.extend(right.conjuncts());
                parts
            }
            other => vec![other],
        }
    }

    /// Binding strength used when rendering: operands that bind weaker than
    /// their position requires get parentheses.
    fn precedence(&self) -> u8 {
        match self {
            Self::Or { .. } => 1,
            Self::And { .. } => 2,
            Self::Not(_) => 3,
            Self::Comparison { .. } | Self::IsNull { .. } | Self::InList { .. } => 4,
            Self::Column(_) | Self::Literal(_) | Self::Cast { .. } | Self::Count(_) => 5,
        }
    }
}

/// Folds expressions into a left-deep `AND` chain.
pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(Expr::and)
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
    if expr.precedence() < min {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        })
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(column) => write!(f, "{column}"),
            Self::Literal(value) => f.write_str(&value.to_sql_literal()),
            Self::Comparison { left, op, right } => {
                write_operand(f, left, 5)?;
                write!(f, " {op} ")?;
                write_operand(f, right, 5)
            }
            Self::And { left, right } => {
                write_operand(f, left, 2)?;
                f.write_str(" AND ")?;
                write_operand(f, right, 3)
            }
            Self::Or { left, right } => {
                write_operand(f, left, 1)?;
                f.write_str(" OR ")?;
                write_operand(f, right, 2)
            }
            Self::Not(expr) => {
                f.write_str("NOT ")?;
                write_operand(f, expr, 3)
            }
            Self::IsNull { expr, negated } => {
                write_operand(f, expr, 5)?;
                f.write_str(if *negated { " IS NOT NULL" } else { " IS NULL" })
            }
            Self::InList {
                expr,
                list,
                negated,
            } => {
                write_operand(f, expr, 5)?;
                f.write_str(if *negated { " NOT IN (" } else { " IN (" })?;
                write_list(f, list)?;
                f.write_str(")")
            }
            Self::Cast { expr, data_type } => write!(f, "CAST({expr} AS {data_type})"),
            Self::Count(None) => f.write_str("COUNT(*)"),
            Self::Count(Some(expr)) => write!(f, "COUNT({expr})"),
        }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::QualifiedWildcard(table) => write!(f, "{table}.*"),
            Self::Expr { expr, alias: None } => write!(f, "{expr}"),
            Self::Expr {
                expr,
                alias: Some(alias),
            } => write!(f, "{expr} AS {alias}"),
        }
    }
}

impl fmt::Display for TableFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.name, alias),
            None => f.write_str(&self.name),
        }
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        write!(f, "{kind} {} ON {}", self.table, self.on)
    }
}

impl fmt::Display for OrderByClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        write!(f, "{} {direction}", self.expr)
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        write_list(f, &self.projection)?;
        write!(f, " FROM {}", self.from)?;
        for join in &self.joins {
            write!(f, " {join}")?;
        }
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {where_clause}")?;
        }
        if !self.group_by.is_empty() {
            f.write_str(" GROUP BY ")?;
            write_list(f, &self.group_by)?;
        }
        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY ")?;
            write_list(f, &self.order_by)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        if !self.nullable {
            f.write_str(" NOT NULL")?;
        }
        Ok(())
    }
}

impl fmt::Display for CreateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE TABLE {} (", self.name)?;
        write_list(f, &self.columns)?;
        if !self.primary_key.is_empty() {
            f.write_str(", PRIMARY KEY (")?;
            write_list(f, &self.primary_key)?;
            f.write_str(")")?;
        }
        for fk in &self.foreign_keys {
            f.write_str(", FOREIGN KEY (")?;
            write_list(f, &fk.columns)?;
            write!(f, ") REFERENCES {}", fk.table)?;
            if !fk.referenced.is_empty() {
                f.write_str(" (")?;
                write_list(f, &fk.referenced)?;
                f.write_str(")")?;
            }
        }
        f.write_str(")")
    }
}

impl fmt::Display for InsertInto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INSERT INTO {}", self.table)?;
        if let Some(columns) = &self.columns {
            f.write_str(" (")?;
            write_list(f, columns)?;
            f.write_str(")")?;
        }
        f.write_str(" VALUES ")?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("(")?;
            let literals: Vec<String> = row.iter().map(Value::to_sql_literal).collect();
            write_list(f, &literals)?;
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable(create) => write!(f, "{create}"),
            Self::InsertInto(insert) => write!(f, "{insert}"),
            Self::Select(select) => write!(f, "{select}"),
            Self::Begin => f.write_str("BEGIN"),
            Self::Commit => f.write_str("COMMIT"),
            Self::Rollback => f.write_str("ROLLBACK"),
        }
    }
}
