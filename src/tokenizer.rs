use crate::error::ExecutionError;

/// Represents the smallest meaningful units (atoms) of the SQL language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // --- SQL Keywords ---
    Create,
    Table,
    Insert,
    Into,
    Values,
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    Null,
    Is,
    In,
    Limit,
    Order,
    Group,
    By,
    Asc,
    Desc,
    Join,
    Inner,
    Left,
    Outer,
    On,
    As,
    Cast,
    Count,
    Primary,
    Foreign,
    Key,
    References,
    Begin,
    Commit,
    Rollback,

    // --- Data Types ---
    SmallInt,
    Int,
    Text,
    Float,
    Bool,

    // --- Identifiers & Literals ---
    /// A name representing a table, an alias or a column (e.g., `film`, `title`).
    Ident(String),
    /// A 64-bit integer literal (e.g., `42`).
    Number(i64),
    /// A string literal, defined between single quotes (e.g., `'Horror'`).
    /// A doubled quote inside the literal stands for one quote.
    String(String),
    /// A 64-bit floating-point literal (e.g., `3.14`).
    FloatNumber(f64),
    /// The boolean literal `TRUE`.
    True,
    /// The boolean literal `FALSE`.
    False,

    // --- Symbols ---
    /// Left parenthesis `(`
    LeftParen,
    /// Right parenthesis `)`
    RightParen,
    /// Comma `,`
    Comma,
    /// Semicolon `;`
    Semicolon,
    /// Qualifier separator `.`
    Dot,
    /// Multiplication or wildcard symbol `*`
    Star,
    /// Minus sign `-`
    Minus,
    /// Greater than
    Greater,
    /// Greater than or equal to
    GreaterEqual,
    /// Lower than
    Lower,
    /// Lower than or equal to
    LowerEqual,
    /// Equal to
    Equal,
    /// Not equal to, `<>` or `!=`
    NotEqual,

    // --- Special ---
    /// Represents the End Of File/Input.
    Eof,
}

/// Maps a word to its keyword token, matched case-insensitively.
///
/// Names that map to a keyword cannot be used as bare identifiers.
pub fn keyword(word: &str) -> Option<Token> {
    let token = match word.to_uppercase().as_str() {
        "CREATE" => Token::Create,
        "TABLE" => Token::Table,
        "INSERT" => Token::Insert,
        "INTO" => Token::Into,
        "VALUES" => Token::Values,
        "SELECT" => Token::Select,
        "FROM" => Token::From,
        "WHERE" => Token::Where,
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "NULL" => Token::Null,
        "IS" => Token::Is,
        "IN" => Token::In,
        "LIMIT" => Token::Limit,
        "ORDER" => Token::Order,
        "GROUP" => Token::Group,
        "BY" => Token::By,
        "ASC" => Token::Asc,
        "DESC" => Token::Desc,
        "JOIN" => Token::Join,
        "INNER" => Token::Inner,
        "LEFT" => Token::Left,
        "OUTER" => Token::Outer,
        "ON" => Token::On,
        "AS" => Token::As,
        "CAST" => Token::Cast,
        "COUNT" => Token::Count,
        "PRIMARY" => Token::Primary,
        "FOREIGN" => Token::Foreign,
        "KEY" => Token::Key,
        "REFERENCES" => Token::References,
        "BEGIN" => Token::Begin,
        "COMMIT" => Token::Commit,
        "ROLLBACK" => Token::Rollback,
        "SMALLINT" => Token::SmallInt,
        "INT" | "INTEGER" => Token::Int,
        "TEXT" => Token::Text,
        "FLOAT" => Token::Float,
        "BOOL" | "BOOLEAN" => Token::Bool,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        _ => return None,
    };
    Some(token)
}

/// A lexical scanner (lexer) that converts a raw SQL string into a sequence of [Token]s.
pub struct Tokenizer {
    /// The input string stored as a vector of characters for easy iteration.
    input: Vec<char>,
    /// The current position in the character vector.
    position: usize,
}

impl Tokenizer {
    /// Creates a new Tokenizer for the given input string.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Processes the entire input and returns a vector of tokens.
    ///
    /// # Errors
    /// Returns an error if an invalid character is encountered or if a literal
    /// (like a string) is malformed.
    ///
    /// # Example
    /// ```
    /// # use filmdb::tokenizer::{Tokenizer, Token};
    /// let mut t = Tokenizer::new("SELECT film.title");
    /// let tokens = t.tokenize().unwrap();
    /// assert_eq!(tokens[0], Token::Select);
    /// assert_eq!(tokens[2], Token::Dot);
    /// ```
    pub fn tokenize(&mut self) -> Result<Vec<Token>, ExecutionError> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            self.skip_whitespace();

            if self.is_at_end() {
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        tokens.push(Token::Eof);
        Ok(tokens)
    }

    /// Identifies the next token based on the character at the current position.
    fn next_token(&mut self) -> Result<Token, ExecutionError> {
        let ch = self.current_char();
        if ch == '-' && self.next_is_digit() {
            return self.read_number();
        }

        let single = match ch {
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            ',' => Some(Token::Comma),
            ';' => Some(Token::Semicolon),
            '.' => Some(Token::Dot),
            '*' => Some(Token::Star),
            '-' => Some(Token::Minus),
            '=' => Some(Token::Equal),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        match ch {
            '>' => {
                self.advance();
                Ok(self.followed_by('=', Token::GreaterEqual, Token::Greater))
            }
            '<' => {
                self.advance();
                if self.peek_is('>') {
                    self.advance();
                    return Ok(Token::NotEqual);
                }
                Ok(self.followed_by('=', Token::LowerEqual, Token::Lower))
            }
            '!' => {
                self.advance();
                if self.peek_is('=') {
                    self.advance();
                    return Ok(Token::NotEqual);
                }
                Err(ExecutionError::Syntax("expected '=' after '!'".into()))
            }
            c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier()),
            c if c.is_ascii_digit() => self.read_number(),
            '\'' => self.read_string(),
            _ => Err(ExecutionError::Syntax(format!(
                "character: {:?} is not supported",
                ch
            ))),
        }
    }

    // --- Navigation Helpers ---

    /// Returns the character at the current position.
    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_is(&self, expected: char) -> bool {
        !self.is_at_end() && self.current_char() == expected
    }

    fn next_is_digit(&self) -> bool {
        self.input.get(self.position + 1).is_some_and(char::is_ascii_digit)
    }

    /// Consumes `expected` if it comes next and returns `matched`, else returns `single`.
    fn followed_by(&mut self, expected: char, matched: Token, single: Token) -> Token {
        if self.peek_is(expected) {
            self.advance();
            matched
        } else {
            single
        }
    }

    /// Moves the cursor forward by one character.
    fn advance(&mut self) {
        self.position += 1;
    }

    /// Checks if the cursor has reached the end of the input.
    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Consumes any whitespace characters (spaces, tabs, newlines).
    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    // --- Extraction Logic ---

    /// Reads a sequence of alphanumeric characters and determines if it's
    /// a reserved SQL keyword or a user-defined identifier.
    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while !self.is_at_end()
            && (self.current_char().is_alphanumeric() || self.current_char() == '_')
        {
            ident.push(self.current_char());
            self.advance();
        }

        keyword(&ident).unwrap_or(Token::Ident(ident))
    }

    /// Reads a numeric literal, with its sign when a `-` is directly followed
    /// by a digit. If a dot `.` is encountered, it returns a
    /// [Token::FloatNumber], otherwise a [Token::Number].
    fn read_number(&mut self) -> Result<Token, ExecutionError> {
        let mut number = String::new();
        let mut has_dot = false;
        if self.current_char() == '-' {
            number.push('-');
            self.advance();
        }

        while !self.is_at_end()
            && (self.current_char().is_ascii_digit() || (self.current_char() == '.' && !has_dot))
        {
            if self.current_char() == '.' {
                has_dot = true;
            }
            number.push(self.current_char());
            self.advance();
        }

        if !self.is_at_end() && self.current_char() == '.' {
            return Err(ExecutionError::Syntax(
                "multiple dots are not allowed for a float".into(),
            ));
        }

        if has_dot {
            return number
                .parse::<f64>()
                .map(Token::FloatNumber)
                .map_err(|e| ExecutionError::Syntax(e.to_string()));
        }

        number
            .parse::<i64>()
            .map(Token::Number)
            .map_err(|e| ExecutionError::Syntax(e.to_string()))
    }

    /// Reads a string literal enclosed in single quotes.
    fn read_string(&mut self) -> Result<Token, ExecutionError> {
        self.advance(); // Skip the opening quote

        let mut string = String::new();
        loop {
            if self.is_at_end() {
                return Err(ExecutionError::Syntax("Unterminated string".into()));
            }
            let ch = self.current_char();
            self.advance();
            if ch != '\'' {
                string.push(ch);
                continue;
            }
            // '' is an escaped quote, a lone ' closes the literal
            if self.peek_is('\'') {
                self.advance();
                string.push('\'');
            } else {
                break;
            }
        }

        Ok(Token::String(string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(sql: &str) -> Vec<Token> {
        Tokenizer::new(sql).tokenize().unwrap()
    }

    #[test]
    fn test_tokenize_simple() {
        assert_eq!(
            tokenize("CREATE TABLE film"),
            vec![
                Token::Create,
                Token::Table,
                Token::Ident("film".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_qualified_names() {
        assert_eq!(
            tokenize("film_actor.actor_id = film_actor__actor.actor_id"),
            vec![
                Token::Ident("film_actor".into()),
                Token::Dot,
                Token::Ident("actor_id".into()),
                Token::Equal,
                Token::Ident("film_actor__actor".into()),
                Token::Dot,
                Token::Ident("actor_id".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            tokenize("< <= > >= <> != ="),
            vec![
                Token::Lower,
                Token::LowerEqual,
                Token::Greater,
                Token::GreaterEqual,
                Token::NotEqual,
                Token::NotEqual,
                Token::Equal,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(
            tokenize("42, -7, - 7, -1.5"),
            vec![
                Token::Number(42),
                Token::Comma,
                Token::Number(-7),
                Token::Comma,
                Token::Minus,
                Token::Number(7),
                Token::Comma,
                Token::FloatNumber(-1.5),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_integer_bounds() {
        assert_eq!(
            tokenize("-9223372036854775808 9223372036854775807"),
            vec![Token::Number(i64::MIN), Token::Number(i64::MAX), Token::Eof]
        );
        assert!(Tokenizer::new("9223372036854775808").tokenize().is_err());
    }

    #[test]
    fn test_tokenize_keywords_case_insensitive() {
        assert_eq!(
            tokenize("select Count(*) from film group by title"),
            vec![
                Token::Select,
                Token::Count,
                Token::LeftParen,
                Token::Star,
                Token::RightParen,
                Token::From,
                Token::Ident("film".into()),
                Token::Group,
                Token::By,
                Token::Ident("title".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_strings() {
        assert_eq!(
            tokenize("'Horror', 'O''Brien', ''"),
            vec![
                Token::String("Horror".into()),
                Token::Comma,
                Token::String("O'Brien".into()),
                Token::Comma,
                Token::String(String::new()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Tokenizer::new("'hello").tokenize().is_err());
        assert!(Tokenizer::new("'it''s").tokenize().is_err());
    }

    #[test]
    fn test_unsupported_character() {
        assert!(Tokenizer::new("SELECT #").tokenize().is_err());
    }

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(keyword("integer"), Some(Token::Int));
        assert_eq!(keyword("key"), Some(Token::Key));
        assert_eq!(keyword("title"), None);
    }
}
