//! Statement classification and the minimal statement AST
//!
//! The native backend only needs to know which rusqlite call a statement
//! belongs to (`classify`). The fallback emulator needs the statement itself,
//! parsed into a `Statement`. The grammar is deliberately tiny:
//!
//! - `INSERT [OR REPLACE|OR IGNORE] INTO t (c, ...) VALUES (v, ...)`
//! - `SELECT *|c, ...|COUNT(*) [AS a] FROM t [WHERE c = v] [ORDER BY ...] [LIMIT ...]`
//! - `UPDATE t SET c = v, ... [WHERE c = v]`
//! - `DELETE FROM t [WHERE c = v]`
//! - `BEGIN` / `COMMIT` / `ROLLBACK`, and DDL / PRAGMA as opaque schema statements
//!
//! Anything else parses to `Statement::Unsupported`; parsing never fails.

use crate::value::Value;

/// Coarse statement class, decided by the leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT / WITH - returns rows
    Read,
    /// INSERT / UPDATE / DELETE / REPLACE - returns affected rows
    Write,
    /// CREATE / DROP / ALTER
    Schema,
    /// PRAGMA - may or may not return rows
    Pragma,
    /// BEGIN / COMMIT / ROLLBACK / END
    Transaction,
    Other,
}

/// Classify a statement by its leading keyword
pub fn classify(sql: &str) -> StatementKind {
    let keyword: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" => StatementKind::Read,
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE" => StatementKind::Write,
        "CREATE" | "DROP" | "ALTER" => StatementKind::Schema,
        "PRAGMA" => StatementKind::Pragma,
        "BEGIN" | "COMMIT" | "ROLLBACK" | "END" => StatementKind::Transaction,
        _ => StatementKind::Other,
    }
}

/// A value position in a statement: a bound parameter or an inline literal
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Zero-based index into the parameter list
    Param(usize),
    Literal(Value),
}

impl Operand {
    /// Resolve against the bound parameters. Missing parameters bind as NULL,
    /// matching SQLite.
    pub fn resolve(&self, params: &[Value]) -> Value {
        match self {
            Operand::Param(i) => params.get(*i).cloned().unwrap_or(Value::Null),
            Operand::Literal(v) => v.clone(),
        }
    }
}

/// Single `column = operand` predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
    Count { alias: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// Plain INSERT. The emulator does not enforce keys, so this appends.
    Abort,
    Replace,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxControl {
    Begin,
    Commit,
    Rollback,
}

/// Parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Operand>,
        conflict: Conflict,
    },
    Select {
        table: String,
        projection: Projection,
        predicate: Option<Predicate>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Operand)>,
        predicate: Option<Predicate>,
    },
    Delete {
        table: String,
        predicate: Option<Predicate>,
    },
    Transaction(TxControl),
    /// DDL or PRAGMA: the emulator's schema is implicit
    Schema,
    /// Outside the supported subset; the reason is kept for logging
    Unsupported(String),
}

impl Statement {
    /// Parse a statement. Never fails: unknown shapes become `Unsupported`.
    pub fn parse(sql: &str) -> Statement {
        match classify(sql) {
            StatementKind::Schema | StatementKind::Pragma => return Statement::Schema,
            StatementKind::Other => {
                return Statement::Unsupported(format!("unknown statement: {}", first_line(sql)));
            }
            _ => {}
        }

        let tokens = match tokenize(sql) {
            Ok(tokens) => tokens,
            Err(reason) => return Statement::Unsupported(reason),
        };

        let mut parser = Parser { tokens, pos: 0 };
        match parser.statement() {
            Ok(stmt) => stmt,
            Err(reason) => Statement::Unsupported(reason),
        }
    }

    /// Target table, if the statement has one
    pub fn table(&self) -> Option<&str> {
        match self {
            Statement::Insert { table, .. }
            | Statement::Select { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. } => Some(table),
            _ => None,
        }
    }
}

fn first_line(sql: &str) -> &str {
    sql.trim().lines().next().unwrap_or("")
}

// ========== Tokenizer ==========

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Bare word: keyword or unquoted identifier
    Word(String),
    /// "quoted", `quoted` or [quoted] identifier
    Ident(String),
    Str(String),
    Number(Value),
    Param(usize),
    Symbol(char),
}

fn tokenize(sql: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut next_param = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
        } else if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let number = if text.contains('.') {
                text.parse::<f64>().map(Value::Real).map_err(|_| format!("bad number: {}", text))?
            } else {
                text.parse::<i64>().map(Value::Integer).map_err(|_| format!("bad number: {}", text))?
            };
            tokens.push(Token::Number(number));
        } else if c == '?' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if start == i {
                tokens.push(Token::Param(next_param));
                next_param += 1;
            } else {
                let n: usize = chars[start..i]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| "bad parameter index".to_string())?;
                if n == 0 {
                    return Err("parameter index ?0 is invalid".to_string());
                }
                tokens.push(Token::Param(n - 1));
                next_param = next_param.max(n);
            }
        } else if c == '\'' {
            let (text, end) = quoted(&chars, i, '\'')?;
            tokens.push(Token::Str(text));
            i = end;
        } else if c == '"' || c == '`' {
            let (text, end) = quoted(&chars, i, c)?;
            tokens.push(Token::Ident(text));
            i = end;
        } else if c == '[' {
            let (text, end) = quoted(&chars, i, ']')?;
            tokens.push(Token::Ident(text));
            i = end;
        } else if "(),=*;.-".contains(c) {
            tokens.push(Token::Symbol(c));
            i += 1;
        } else {
            return Err(format!("unexpected character '{}'", c));
        }
    }

    Ok(tokens)
}

/// Read a quoted run starting at `start`; a doubled closing quote is an escape.
fn quoted(chars: &[char], start: usize, close: char) -> std::result::Result<(String, usize), String> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == close {
            if close != ']' && chars.get(i + 1) == Some(&close) {
                text.push(close);
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }
    Err("unterminated quote".to_string())
}

// ========== Parser ==========

type ParseResult<T> = std::result::Result<T, String>;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(format!("expected {}", keyword))
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> ParseResult<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(format!("expected '{}'", symbol))
        }
    }

    fn identifier(&mut self) -> ParseResult<String> {
        match self.advance() {
            Some(Token::Word(w)) | Some(Token::Ident(w)) => Ok(w),
            other => Err(format!("expected identifier, found {:?}", other)),
        }
    }

    /// Table or column name, folded to lowercase since SQLite identifiers
    /// are case-insensitive
    fn name(&mut self) -> ParseResult<String> {
        self.identifier().map(|n| n.to_ascii_lowercase())
    }

    /// Table name; a schema prefix such as `main.` is dropped.
    fn table_name(&mut self) -> ParseResult<String> {
        let mut name = self.name()?;
        if self.eat_symbol('.') {
            name = self.name()?;
        }
        Ok(name)
    }

    fn operand(&mut self) -> ParseResult<Operand> {
        match self.advance() {
            Some(Token::Param(i)) => Ok(Operand::Param(i)),
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::Text(s))),
            Some(Token::Number(n)) => Ok(Operand::Literal(n)),
            Some(Token::Symbol('-')) => match self.advance() {
                Some(Token::Number(Value::Integer(i))) => Ok(Operand::Literal(Value::Integer(-i))),
                Some(Token::Number(Value::Real(f))) => Ok(Operand::Literal(Value::Real(-f))),
                other => Err(format!("expected number after '-', found {:?}", other)),
            },
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("NULL") => Ok(Operand::Literal(Value::Null)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("TRUE") => Ok(Operand::Literal(Value::Integer(1))),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("FALSE") => Ok(Operand::Literal(Value::Integer(0))),
            other => Err(format!("expected value, found {:?}", other)),
        }
    }

    fn at_end(&mut self) -> bool {
        while self.eat_symbol(';') {}
        self.peek().is_none()
    }

    fn expect_end(&mut self) -> ParseResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(format!("unexpected trailing input at {:?}", self.peek()))
        }
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        let keyword = match self.peek() {
            Some(Token::Word(w)) => w.to_ascii_uppercase(),
            _ => return Err("expected a keyword".to_string()),
        };

        match keyword.as_str() {
            "INSERT" | "REPLACE" => self.insert(),
            "SELECT" => self.select(),
            "UPDATE" => self.update(),
            "DELETE" => self.delete(),
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" => self.transaction(),
            other => Err(format!("{} is not supported", other)),
        }
    }

    fn insert(&mut self) -> ParseResult<Statement> {
        let conflict = if self.eat_keyword("REPLACE") {
            Conflict::Replace
        } else {
            self.expect_keyword("INSERT")?;
            if self.eat_keyword("OR") {
                if self.eat_keyword("REPLACE") {
                    Conflict::Replace
                } else if self.eat_keyword("IGNORE") {
                    Conflict::Ignore
                } else if self.eat_keyword("ABORT") || self.eat_keyword("FAIL") || self.eat_keyword("ROLLBACK") {
                    Conflict::Abort
                } else {
                    return Err("unknown conflict clause".to_string());
                }
            } else {
                Conflict::Abort
            }
        };
        self.expect_keyword("INTO")?;
        let table = self.table_name()?;

        self.expect_symbol('(')?;
        let mut columns = vec![self.name()?];
        while self.eat_symbol(',') {
            columns.push(self.name()?);
        }
        self.expect_symbol(')')?;

        self.expect_keyword("VALUES")?;
        self.expect_symbol('(')?;
        let mut values = vec![self.operand()?];
        while self.eat_symbol(',') {
            values.push(self.operand()?);
        }
        self.expect_symbol(')')?;

        if self.peek() == Some(&Token::Symbol(',')) {
            return Err("multi-row VALUES is not supported".to_string());
        }
        self.expect_end()?;

        if columns.len() != values.len() {
            return Err(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            ));
        }

        Ok(Statement::Insert { table, columns, values, conflict })
    }

    fn select(&mut self) -> ParseResult<Statement> {
        self.expect_keyword("SELECT")?;

        let projection = if self.eat_symbol('*') {
            Projection::All
        } else if self.peek_keyword("COUNT") {
            self.pos += 1;
            self.expect_symbol('(')?;
            self.expect_symbol('*')?;
            self.expect_symbol(')')?;
            let alias = if self.eat_keyword("AS") {
                self.identifier()?
            } else {
                "count".to_string()
            };
            Projection::Count { alias }
        } else {
            let mut columns = vec![self.identifier()?];
            while self.eat_symbol(',') {
                columns.push(self.identifier()?);
            }
            Projection::Columns(columns)
        };

        self.expect_keyword("FROM")?;
        let table = self.table_name()?;
        let predicate = self.where_clause()?;

        // ORDER BY / LIMIT are accepted and ignored: rows come back in insertion order.
        if self.peek_keyword("ORDER") || self.peek_keyword("LIMIT") {
            while let Some(token) = self.peek() {
                match token {
                    Token::Word(w) if ["AND", "OR", "JOIN", "UNION"].iter().any(|k| w.eq_ignore_ascii_case(k)) => {
                        return Err(format!("{} is not supported", w));
                    }
                    Token::Symbol(';') => break,
                    _ => self.pos += 1,
                }
            }
        }
        self.expect_end()?;

        Ok(Statement::Select { table, projection, predicate })
    }

    fn update(&mut self) -> ParseResult<Statement> {
        self.expect_keyword("UPDATE")?;
        let table = self.table_name()?;
        self.expect_keyword("SET")?;

        let mut assignments = Vec::new();
        loop {
            let column = self.name()?;
            self.expect_symbol('=')?;
            assignments.push((column, self.operand()?));
            if !self.eat_symbol(',') {
                break;
            }
        }

        let predicate = self.where_clause()?;
        self.expect_end()?;
        Ok(Statement::Update { table, assignments, predicate })
    }

    fn delete(&mut self) -> ParseResult<Statement> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.table_name()?;
        let predicate = self.where_clause()?;
        self.expect_end()?;
        Ok(Statement::Delete { table, predicate })
    }

    fn transaction(&mut self) -> ParseResult<Statement> {
        let control = match self.advance() {
            Some(Token::Word(w)) => match w.to_ascii_uppercase().as_str() {
                "BEGIN" => {
                    let _ = self.eat_keyword("DEFERRED") || self.eat_keyword("IMMEDIATE") || self.eat_keyword("EXCLUSIVE");
                    TxControl::Begin
                }
                "COMMIT" | "END" => TxControl::Commit,
                _ => TxControl::Rollback,
            },
            _ => return Err("expected transaction keyword".to_string()),
        };
        self.eat_keyword("TRANSACTION");
        self.expect_end()?;
        Ok(Statement::Transaction(control))
    }

    fn where_clause(&mut self) -> ParseResult<Option<Predicate>> {
        if !self.eat_keyword("WHERE") {
            return Ok(None);
        }
        let column = self.name()?;
        self.expect_symbol('=')?;
        let operand = self.operand()?;

        if self.peek_keyword("AND") || self.peek_keyword("OR") {
            return Err("only a single equality predicate is supported".to_string());
        }
        Ok(Some(Predicate { column, operand }))
    }
}
