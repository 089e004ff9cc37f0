//! Typed references to tables and columns, and the expressions built from them.
//!
//! A [Field] carries the Rust type of its column, so comparing a text column
//! with a number, or a `SMALLINT` key with an `INT` key without a cast, does
//! not compile. The builder still checks every field against the registry
//! before a query runs.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::ast::{ComparisonOp, SortDirection};
use crate::data_type::DataType;
use crate::query::SelectQuery;
use crate::value::Value;

/// Rust types that stand for a SQL column type.
pub trait SqlType: Sized + 'static {
    const DATA_TYPE: DataType;
}

impl SqlType for i16 {
    const DATA_TYPE: DataType = DataType::SmallInt;
}

impl SqlType for i32 {
    const DATA_TYPE: DataType = DataType::Int;
}

impl SqlType for i64 {
    const DATA_TYPE: DataType = DataType::Int;
}

impl SqlType for f64 {
    const DATA_TYPE: DataType = DataType::Float;
}

impl SqlType for String {
    const DATA_TYPE: DataType = DataType::Text;
}

impl SqlType for bool {
    const DATA_TYPE: DataType = DataType::Bool;
}

/// A step of an implicit join path: the table is reached from `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinPath {
    pub parent: TableRef,
    /// The relationship followed, or `None` to pick the only one leading to the table.
    pub relationship: Option<Arc<str>>,
}

/// A table as it appears in a query: under its own name, an alias, or at the
/// end of a relationship path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    name: Arc<str>,
    alias: Option<Arc<str>>,
    path: Option<Arc<JoinPath>>,
}

impl TableRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            alias: None,
            path: None,
        }
    }

    pub fn aliased(name: &str, alias: &str) -> Self {
        Self {
            name: Arc::from(name),
            alias: Some(Arc::from(alias)),
            path: None,
        }
    }

    /// The registered table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name columns of this table are qualified with in SQL.
    ///
    /// A path table is named after the path, `film_actor__actor` for the actor
    /// reached from `film_actor`, so the same path always yields the same alias.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn path(&self) -> Option<&JoinPath> {
        self.path.as_deref()
    }

    /// The table the path starts from.
    pub fn root(&self) -> &TableRef {
        match &self.path {
            Some(path) => path.parent.root(),
            None => self,
        }
    }

    /// `target` reached through the only relationship leading to it.
    pub fn to(&self, target: &str) -> TableRef {
        self.step(target, None)
    }

    /// `target` reached through the relationship named `relationship`.
    pub fn via(&self, relationship: &str, target: &str) -> TableRef {
        self.step(target, Some(relationship))
    }

    fn step(&self, target: &str, relationship: Option<&str>) -> TableRef {
        let alias = format!("{}__{}", self.reference(), relationship.unwrap_or(target));
        TableRef {
            name: Arc::from(target),
            alias: Some(Arc::from(alias)),
            path: Some(Arc::new(JoinPath {
                parent: self.clone(),
                relationship: relationship.map(Arc::from),
            })),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reference())
    }
}

/// Generated table types implement this to take part in queries.
pub trait TypedTable {
    fn table_ref(&self) -> &TableRef;

    /// Every column of the table, in schema order.
    fn all(&self) -> SelectField {
        SelectField::AllOf(self.table_ref().clone())
    }
}

/// An untyped expression tree, lowered to SQL by the query builder.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    Column {
        table: TableRef,
        name: Arc<str>,
        data_type: DataType,
    },
    Literal(Value),
    Comparison {
        left: Box<QueryExpr>,
        op: ComparisonOp,
        right: Box<QueryExpr>,
    },
    And(Box<QueryExpr>, Box<QueryExpr>),
    Or(Box<QueryExpr>, Box<QueryExpr>),
    Not(Box<QueryExpr>),
    IsNull {
        expr: Box<QueryExpr>,
        negated: bool,
    },
    InList {
        expr: Box<QueryExpr>,
        list: Vec<QueryExpr>,
        negated: bool,
    },
    Cast {
        expr: Box<QueryExpr>,
        data_type: DataType,
    },
    Count(Option<Box<QueryExpr>>),
}

impl QueryExpr {
    /// Calls `f` with every table the expression reads a column of.
    pub fn for_each_table(&self, f: &mut impl FnMut(&TableRef)) {
        match self {
            QueryExpr::Column { table, .. } => f(table),
            QueryExpr::Literal(_) | QueryExpr::Count(None) => {}
            QueryExpr::Comparison { left, right, .. } | QueryExpr::And(left, right) | QueryExpr::Or(left, right) => {
                left.for_each_table(f);
                right.for_each_table(f);
            }
            QueryExpr::Not(expr) | QueryExpr::IsNull { expr, .. } | QueryExpr::Cast { expr, .. } => {
                expr.for_each_table(f)
            }
            QueryExpr::InList { expr, list, .. } => {
                expr.for_each_table(f);
                for item in list {
                    item.for_each_table(f);
                }
            }
            QueryExpr::Count(Some(expr)) => expr.for_each_table(f),
        }
    }

    /// Splits a chain of `AND` into its operands.
    pub fn conjuncts(&self) -> Vec<&QueryExpr> {
        match self {
            QueryExpr::And(left, right) => {
                let mut conjuncts = left.conjuncts();
                conjuncts.extend(right.conjuncts());
                conjuncts
            }
            other => vec![other],
        }
    }
}

/// A typed column of a table.
pub struct Field<T> {
    table: TableRef,
    name: Arc<str>,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            name: Arc::clone(&self.name),
            _type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({}.{})", self.table, self.name)
    }
}

impl<T: SqlType> Field<T> {
    pub fn new(table: TableRef, name: &str) -> Self {
        Self {
            table,
            name: Arc::from(name),
            _type: PhantomData,
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn to_expr(&self) -> QueryExpr {
        QueryExpr::Column {
            table: self.table.clone(),
            name: Arc::clone(&self.name),
            data_type: T::DATA_TYPE,
        }
    }
}

/// A typed computed expression, such as a cast or a count.
pub struct Expression<T> {
    expr: QueryExpr,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for Expression<T> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Expression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.expr).finish()
    }
}

impl<T: SqlType> Expression<T> {
    fn new(expr: QueryExpr) -> Self {
        Self {
            expr,
            _type: PhantomData,
        }
    }

    fn to_expr(&self) -> QueryExpr {
        self.expr.clone()
    }
}

/// `COUNT(*)`
pub fn count() -> Expression<i64> {
    Expression::new(QueryExpr::Count(None))
}

/// Anything usable where a value of type `T` is expected.
pub trait IntoExpr<T> {
    fn into_expr(self) -> QueryExpr;
}

impl<T: SqlType> IntoExpr<T> for Field<T> {
    fn into_expr(self) -> QueryExpr {
        self.to_expr()
    }
}

impl<T: SqlType> IntoExpr<T> for &Field<T> {
    fn into_expr(self) -> QueryExpr {
        self.to_expr()
    }
}

impl<T: SqlType> IntoExpr<T> for Expression<T> {
    fn into_expr(self) -> QueryExpr {
        self.expr
    }
}

impl<T: SqlType> IntoExpr<T> for &Expression<T> {
    fn into_expr(self) -> QueryExpr {
        self.to_expr()
    }
}

/// A value that can be stored in a column of type `T`.
pub trait IntoSql<T> {
    fn into_value(self) -> Value;
}

macro_rules! literal {
    ($sql:ty => $($rust:ty),+) => {
        $(
            impl IntoExpr<$sql> for $rust {
                fn into_expr(self) -> QueryExpr {
                    QueryExpr::Literal(Value::from(self))
                }
            }

            impl IntoSql<$sql> for $rust {
                fn into_value(self) -> Value {
                    Value::from(self)
                }
            }

            impl IntoSql<$sql> for Option<$rust> {
                fn into_value(self) -> Value {
                    Value::from(self)
                }
            }
        )+
    };
}

literal!(i16 => i16);
literal!(i32 => i32);
literal!(i64 => i64);
literal!(f64 => f64);
literal!(bool => bool);
literal!(String => String, &str);

/// Conversion of tuples, arrays and vectors into a homogeneous list.
pub trait IntoList<I> {
    fn into_list(self) -> Vec<I>;
}

impl<I, A: Into<I>, const N: usize> IntoList<I> for [A; N] {
    fn into_list(self) -> Vec<I> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<I, A: Into<I>> IntoList<I> for Vec<A> {
    fn into_list(self) -> Vec<I> {
        self.into_iter().map(Into::into).collect()
    }
}

macro_rules! tuple_list {
    ($($name:ident),+) => {
        impl<I, $($name: Into<I>),+> IntoList<I> for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_list(self) -> Vec<I> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

tuple_list!(A);
tuple_list!(A, B);
tuple_list!(A, B, C);
tuple_list!(A, B, C, D);
tuple_list!(A, B, C, D, E);
tuple_list!(A, B, C, D, E, F);
tuple_list!(A, B, C, D, E, F, G);
tuple_list!(A, B, C, D, E, F, G, H);

/// A boolean condition for `WHERE` and `ON`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition(pub(crate) QueryExpr);

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        Condition(QueryExpr::And(Box::new(self.0), Box::new(other.0)))
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition(QueryExpr::Or(Box::new(self.0), Box::new(other.0)))
    }

    pub fn expr(&self) -> &QueryExpr {
        &self.0
    }
}

impl std::ops::Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        Condition(QueryExpr::Not(Box::new(self.0)))
    }
}

/// An `ORDER BY` item.
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub expr: QueryExpr,
    pub direction: SortDirection,
}

/// An item of a select list.
#[derive(Debug, Clone)]
pub enum SelectField {
    Expr {
        expr: QueryExpr,
        alias: Option<Arc<str>>,
    },
    /// Every column of a table.
    AllOf(TableRef),
    /// A nested collection of rows, correlated with the outer row.
    Multiset {
        query: Box<SelectQuery>,
        alias: Option<Arc<str>>,
    },
}

macro_rules! expression_methods {
    ($ty:ident) => {
        #[allow(clippy::should_implement_trait)]
        impl<T: SqlType> $ty<T> {
            fn compare<V: IntoExpr<T>>(&self, op: ComparisonOp, other: V) -> Condition {
                Condition(QueryExpr::Comparison {
                    left: Box::new(self.to_expr()),
                    op,
                    right: Box::new(other.into_expr()),
                })
            }

            pub fn eq<V: IntoExpr<T>>(&self, other: V) -> Condition {
                self.compare(ComparisonOp::Eq, other)
            }

            pub fn ne<V: IntoExpr<T>>(&self, other: V) -> Condition {
                self.compare(ComparisonOp::NotEq, other)
            }

            pub fn lt<V: IntoExpr<T>>(&self, other: V) -> Condition {
                self.compare(ComparisonOp::Lt, other)
            }

            pub fn le<V: IntoExpr<T>>(&self, other: V) -> Condition {
                self.compare(ComparisonOp::LtEq, other)
            }

            pub fn gt<V: IntoExpr<T>>(&self, other: V) -> Condition {
                self.compare(ComparisonOp::Gt, other)
            }

            pub fn ge<V: IntoExpr<T>>(&self, other: V) -> Condition {
                self.compare(ComparisonOp::GtEq, other)
            }

            pub fn is_null(&self) -> Condition {
                Condition(QueryExpr::IsNull {
                    expr: Box::new(self.to_expr()),
                    negated: false,
                })
            }

            pub fn is_not_null(&self) -> Condition {
                Condition(QueryExpr::IsNull {
                    expr: Box::new(self.to_expr()),
                    negated: true,
                })
            }

            pub fn in_list<V: IntoExpr<T>>(&self, values: impl IntoIterator<Item = V>) -> Condition {
                Condition(QueryExpr::InList {
                    expr: Box::new(self.to_expr()),
                    list: values.into_iter().map(IntoExpr::into_expr).collect(),
                    negated: false,
                })
            }

            pub fn not_in_list<V: IntoExpr<T>>(&self, values: impl IntoIterator<Item = V>) -> Condition {
                Condition(QueryExpr::InList {
                    expr: Box::new(self.to_expr()),
                    list: values.into_iter().map(IntoExpr::into_expr).collect(),
                    negated: true,
                })
            }

            /// `CAST(self AS U)`
            pub fn cast<U: SqlType>(&self) -> Expression<U> {
                Expression::new(QueryExpr::Cast {
                    expr: Box::new(self.to_expr()),
                    data_type: U::DATA_TYPE,
                })
            }

            /// Number of rows of the group where `self` is not `NULL`.
            pub fn count(&self) -> Expression<i64> {
                Expression::new(QueryExpr::Count(Some(Box::new(self.to_expr()))))
            }

            pub fn asc(&self) -> SortField {
                SortField {
                    expr: self.to_expr(),
                    direction: SortDirection::Asc,
                }
            }

            pub fn desc(&self) -> SortField {
                SortField {
                    expr: self.to_expr(),
                    direction: SortDirection::Desc,
                }
            }

            pub fn as_(&self, alias: &str) -> SelectField {
                SelectField::Expr {
                    expr: self.to_expr(),
                    alias: Some(Arc::from(alias)),
                }
            }
        }

        impl<T: SqlType> From<$ty<T>> for QueryExpr {
            fn from(value: $ty<T>) -> Self {
                value.to_expr()
            }
        }

        impl<T: SqlType> From<&$ty<T>> for QueryExpr {
            fn from(value: &$ty<T>) -> Self {
                value.to_expr()
            }
        }

        impl<T: SqlType> From<$ty<T>> for SelectField {
            fn from(value: $ty<T>) -> Self {
                SelectField::Expr {
                    expr: value.to_expr(),
                    alias: None,
                }
            }
        }

        impl<T: SqlType> From<&$ty<T>> for SelectField {
            fn from(value: &$ty<T>) -> Self {
                SelectField::Expr {
                    expr: value.to_expr(),
                    alias: None,
                }
            }
        }

        impl<T: SqlType> From<$ty<T>> for SortField {
            fn from(value: $ty<T>) -> Self {
                value.asc()
            }
        }

        impl<T: SqlType> From<&$ty<T>> for SortField {
            fn from(value: &$ty<T>) -> Self {
                value.asc()
            }
        }
    };
}

expression_methods!(Field);
expression_methods!(Expression);
