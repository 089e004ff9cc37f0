use crate::error::ExecutionError;
use crate::table::ForeignKey;
use crate::tokenizer::{Token, Tokenizer};
use crate::{ColumnDef, DataType, Value, ast::*};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Tokenizes and parses a single statement.
    pub fn parse_sql(sql: &str) -> Result<Statement, ExecutionError> {
        let tokens = Tokenizer::new(sql).tokenize()?;
        Self::new(tokens).parse()
    }

    pub fn parse(&mut self) -> Result<Statement, ExecutionError> {
        let statement = match self.current_token() {
            Token::Create => self.parse_create_table(),
            Token::Insert => self.parse_insert(),
            Token::Select => self.parse_select().map(Statement::Select),
            Token::Begin => {
                self.advance();
                Ok(Statement::Begin)
            }
            Token::Commit => {
                self.advance();
                Ok(Statement::Commit)
            }
            Token::Rollback => {
                self.advance();
                Ok(Statement::Rollback)
            }
            _ => Err(self.unexpected("a statement")),
        }?;

        // semicolon is optionnal in SQL so skip it
        if matches!(self.current_token(), Token::Semicolon) {
            self.advance();
        }

        // Check we are at the end of the statement
        if !self.is_at_end() {
            return Err(ExecutionError::Syntax(format!(
                "Unexpected token after statement: {:?}",
                self.current_token()
            )));
        }

        Ok(statement)
    }

    //helpers
    fn current_token(&self) -> &Token {
        &self.tokens[self.position]
    }

    /// Looks `offset` tokens ahead without moving. Past the end this is `Eof`.
    fn peek(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.position + offset)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_token(), Token::Eof)
    }

    fn unexpected(&self, expected: &str) -> ExecutionError {
        ExecutionError::Syntax(format!(
            "Expected {expected}, found {:?}",
            self.current_token()
        ))
    }

    /// Consumes the token if it is the current one.
    fn eat(&mut self, expected: &Token) -> bool {
        if self.current_token() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, expected: Token) -> Result<(), ExecutionError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{expected:?}")))
        }
    }

    fn consume_ident(&mut self) -> Result<String, ExecutionError> {
        match self.current_token() {
            Token::Ident(string) => {
                let string = string.clone(); // Get the name
                self.advance();
                Ok(string)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn consume_data_type(&mut self) -> Result<DataType, ExecutionError> {
        let data_type = match self.current_token() {
            Token::SmallInt => DataType::SmallInt,
            Token::Int => DataType::Int,
            Token::Text => DataType::Text,
            Token::Bool => DataType::Bool,
            Token::Float => DataType::Float,
            _ => return Err(self.unexpected("a column type")),
        };
        self.advance();
        Ok(data_type)
    }

    /// Parses `item (, item)*`.
    fn parse_comma_separated<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, ExecutionError>,
    ) -> Result<Vec<T>, ExecutionError> {
        let mut items = vec![item(self)?];
        while self.eat(&Token::Comma) {
            items.push(item(self)?);
        }
        Ok(items)
    }

    /// Parses `(ident, ident, ...)`.
    fn parse_ident_list(&mut self) -> Result<Vec<String>, ExecutionError> {
        self.consume(Token::LeftParen)?;
        let idents = self.parse_comma_separated(Self::consume_ident)?;
        self.consume(Token::RightParen)?;
        Ok(idents)
    }

    // --- CREATE TABLE ---

    fn parse_create_table(&mut self) -> Result<Statement, ExecutionError> {
        self.consume(Token::Create)?; // advance if CREATE
        self.consume(Token::Table)?; // advance if TABLE
        let name = self.consume_ident()?;
        self.consume(Token::LeftParen)?;

        let mut columns = vec![];
        let mut primary_key = vec![];
        let mut foreign_keys = vec![];
        loop {
            match self.current_token() {
                Token::Primary => {
                    self.advance();
                    self.consume(Token::Key)?;
                    if !primary_key.is_empty() {
                        return Err(ExecutionError::Syntax(format!(
                            "multiple primary keys for table {name}"
                        )));
                    }
                    primary_key = self.parse_ident_list()?;
                }
                Token::Foreign => {
                    self.advance();
                    self.consume(Token::Key)?;
                    let fk_columns = self.parse_ident_list()?;
                    foreign_keys.push(self.parse_references(fk_columns)?);
                }
                _ => {
                    let column = self.parse_column_def(&mut primary_key, &mut foreign_keys)?;
                    columns.push(column);
                }
            }
            match self.current_token() {
                Token::RightParen => {
                    self.advance();
                    break;
                }
                Token::Comma => {
                    self.advance();
                    continue;
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
        Ok(Statement::CreateTable(CreateTable {
            name,
            columns,
            primary_key,
            foreign_keys,
        }))
    }

    /// `name TYPE [NOT NULL | NULL] [PRIMARY KEY] [REFERENCES table [(cols)]]`
    fn parse_column_def(
        &mut self,
        primary_key: &mut Vec<String>,
        foreign_keys: &mut Vec<ForeignKey>,
    ) -> Result<ColumnDef, ExecutionError> {
        let name = self.consume_ident()?;
        let data_type = self.consume_data_type()?;
        let mut column = ColumnDef::new(name, data_type);

        loop {
            match self.current_token() {
                Token::Not => {
                    self.advance();
                    self.consume(Token::Null)?;
                    column.nullable = false;
                }
                Token::Null => {
                    self.advance();
                    column.nullable = true;
                }
                Token::Primary => {
                    self.advance();
                    self.consume(Token::Key)?;
                    if !primary_key.is_empty() {
                        return Err(ExecutionError::Syntax(format!(
                            "multiple primary keys, {} is not the first",
                            column.name
                        )));
                    }
                    primary_key.push(column.name.clone());
                }
                Token::References => {
                    let fk = self.parse_references(vec![column.name.clone()])?;
                    foreign_keys.push(fk);
                }
                _ => break,
            }
        }
        Ok(column)
    }

    fn parse_references(&mut self, columns: Vec<String>) -> Result<ForeignKey, ExecutionError> {
        self.consume(Token::References)?;
        let table = self.consume_ident()?;
        let referenced = if matches!(self.current_token(), Token::LeftParen) {
            self.parse_ident_list()?
        } else {
            vec![]
        };
        Ok(ForeignKey {
            columns,
            table,
            referenced,
        })
    }

    // --- INSERT ---

    fn parse_insert(&mut self) -> Result<Statement, ExecutionError> {
        self.consume(Token::Insert)?;
        self.consume(Token::Into)?;
        let table = self.consume_ident()?;

        let columns = if matches!(self.current_token(), Token::LeftParen) {
            Some(self.parse_ident_list()?)
        } else {
            None
        };

        self.consume(Token::Values)?;
        let rows = self.parse_comma_separated(|parser| {
            parser.consume(Token::LeftParen)?;
            let values = parser.parse_comma_separated(Self::parse_literal)?;
            parser.consume(Token::RightParen)?;
            Ok(values)
        })?;

        Ok(Statement::InsertInto(InsertInto {
            table,
            columns,
            rows,
        }))
    }

    fn parse_literal(&mut self) -> Result<Value, ExecutionError> {
        let value = match self.current_token() {
            Token::Number(n) => Value::Int(*n),
            Token::FloatNumber(f) => Value::Float(*f),
            Token::String(s) => Value::Text(s.as_str().into()),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
            Token::Minus => {
                self.advance();
                return match self.current_token() {
                    Token::Number(n) => {
                        let value = n
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| ExecutionError::Syntax(format!("cannot negate {n}")))?;
                        self.advance();
                        Ok(value)
                    }
                    Token::FloatNumber(f) => {
                        let value = Value::Float(-*f);
                        self.advance();
                        Ok(value)
                    }
                    _ => Err(self.unexpected("a number after '-'")),
                };
            }
            _ => return Err(self.unexpected("a literal")),
        };
        self.advance();
        Ok(value)
    }

    // --- SELECT ---

    fn parse_select(&mut self) -> Result<Select, ExecutionError> {
        self.consume(Token::Select)?;
        let projection = self.parse_comma_separated(Self::parse_select_item)?;

        self.consume(Token::From)?;
        let from = self.parse_table_factor()?;

        let mut joins = vec![];
        loop {
            let kind = match self.current_token() {
                Token::Join => JoinKind::Inner,
                Token::Inner => {
                    self.advance();
                    JoinKind::Inner
                }
                Token::Left => {
                    self.advance();
                    self.eat(&Token::Outer);
                    JoinKind::Left
                }
                _ => break,
            };
            self.consume(Token::Join)?;
            let table = self.parse_table_factor()?;
            self.consume(Token::On)?;
            let on = self.parse_expr()?;
            joins.push(Join { kind, table, on });
        }

        let where_clause = if self.eat(&Token::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.eat(&Token::Group) {
            self.consume(Token::By)?;
            self.parse_comma_separated(Self::parse_expr)?
        } else {
            vec![]
        };

        let order_by = if self.eat(&Token::Order) {
            self.consume(Token::By)?;
            self.parse_comma_separated(Self::parse_order_by_clause)?
        } else {
            vec![]
        };

        let limit = if self.eat(&Token::Limit) {
            match self.current_token() {
                Token::Number(n) if *n >= 0 => {
                    let limit = *n as usize;
                    self.advance();
                    Some(limit)
                }
                _ => return Err(self.unexpected("a positive number after LIMIT")),
            }
        } else {
            None
        };

        Ok(Select {
            projection,
            from,
            joins,
            where_clause,
            group_by,
            order_by,
            limit,
        })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, ExecutionError> {
        if self.eat(&Token::Star) {
            return Ok(SelectItem::Wildcard);
        }
        if let (Token::Ident(table), Token::Dot, Token::Star) =
            (self.current_token(), self.peek(1), self.peek(2))
        {
            let table = table.clone();
            self.position += 3;
            return Ok(SelectItem::QualifiedWildcard(table));
        }
        let expr = self.parse_expr()?;
        let alias = if self.eat(&Token::As) {
            Some(self.consume_ident()?)
        } else {
            None
        };
        Ok(SelectItem::Expr { expr, alias })
    }

    /// `name [[AS] alias]`
    fn parse_table_factor(&mut self) -> Result<TableFactor, ExecutionError> {
        let name = self.consume_ident()?;
        let alias = if self.eat(&Token::As) {
            Some(self.consume_ident()?)
        } else if let Token::Ident(alias) = self.current_token() {
            let alias = alias.clone();
            self.advance();
            Some(alias)
        } else {
            None
        };
        Ok(TableFactor { name, alias })
    }

    fn parse_order_by_clause(&mut self) -> Result<OrderByClause, ExecutionError> {
        let expr = self.parse_expr()?;
        let direction = if self.eat(&Token::Desc) {
            SortDirection::Desc
        } else {
            self.eat(&Token::Asc);
            SortDirection::Asc
        };
        Ok(OrderByClause { expr, direction })
    }

    // --- Expressions ---

    fn parse_expr(&mut self) -> Result<Expr, ExecutionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExecutionError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExecutionError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, ExecutionError> {
        let left = self.parse_primary()?;

        let op = match self.current_token() {
            Token::Equal => Some(ComparisonOp::Eq),
            Token::NotEqual => Some(ComparisonOp::NotEq),
            Token::Lower => Some(ComparisonOp::Lt),
            Token::LowerEqual => Some(ComparisonOp::LtEq),
            Token::Greater => Some(ComparisonOp::Gt),
            Token::GreaterEqual => Some(ComparisonOp::GtEq),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_primary()?;
            return Ok(Expr::Comparison {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }

        match (self.current_token(), self.peek(1)) {
            (Token::Is, _) => {
                self.advance();
                let negated = self.eat(&Token::Not);
                self.consume(Token::Null)?;
                Ok(Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                })
            }
            (Token::In, _) => {
                self.advance();
                self.parse_in_list(left, false)
            }
            (Token::Not, Token::In) => {
                self.advance();
                self.advance();
                self.parse_in_list(left, true)
            }
            _ => Ok(left),
        }
    }

    fn parse_in_list(&mut self, expr: Expr, negated: bool) -> Result<Expr, ExecutionError> {
        self.consume(Token::LeftParen)?;
        let list = self.parse_comma_separated(Self::parse_expr)?;
        self.consume(Token::RightParen)?;
        Ok(Expr::InList {
            expr: Box::new(expr),
            list,
            negated,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ExecutionError> {
        match self.current_token() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                if self.eat(&Token::Dot) {
                    let column = self.consume_ident()?;
                    Ok(Expr::Column(ColumnRef {
                        table: Some(name),
                        name: column,
                    }))
                } else {
                    Ok(Expr::Column(ColumnRef { table: None, name }))
                }
            }
            Token::Cast => {
                self.advance();
                self.consume(Token::LeftParen)?;
                let expr = self.parse_expr()?;
                self.consume(Token::As)?;
                let data_type = self.consume_data_type()?;
                self.consume(Token::RightParen)?;
                Ok(Expr::Cast {
                    expr: Box::new(expr),
                    data_type,
                })
            }
            Token::Count => {
                self.advance();
                self.consume(Token::LeftParen)?;
                let argument = if self.eat(&Token::Star) {
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                };
                self.consume(Token::RightParen)?;
                Ok(Expr::Count(argument))
            }
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.consume(Token::RightParen)?;
                Ok(expr)
            }
            _ => self.parse_literal().map(Expr::Literal),
        }
    }
}
