//! `$filter` expressions.
//!
//! Grammar:
//!
//! ```text
//! expr       := and_expr ( "or" and_expr )*
//! and_expr   := term ( "and" term )*
//! term       := "(" expr ")" | comparison
//! comparison := IDENT op literal
//! op         := eq | ne | gt | ge | lt | le
//! literal    := 'string' | integer[L] | double | true | false
//!             | guid'...' | datetime'...' | X'hex' | binary'hex'
//! ```
//!
//! A comparison against a missing property, or one whose types do not
//! line up, evaluates to false.

use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use strata_protocol::{PropertyValue, TableEntity};
use uuid::Uuid;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `eq`
    Eq,
    /// `ne`
    Ne,
    /// `gt`
    Gt,
    /// `ge`
    Ge,
    /// `lt`
    Lt,
    /// `le`
    Le,
}

impl CompareOp {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "gt" => CompareOp::Gt,
            "ge" => CompareOp::Ge,
            "lt" => CompareOp::Lt,
            "le" => CompareOp::Le,
            _ => return None,
        })
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Quoted string.
    String(String),
    /// Integer.
    Int(i64),
    /// Floating point.
    Double(f64),
    /// `true` / `false`.
    Bool(bool),
    /// `guid'...'`
    Guid(Uuid),
    /// `datetime'...'`
    DateTime(DateTime<Utc>),
    /// `X'...'` or `binary'...'`, hex encoded.
    Binary(Vec<u8>),
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `property op literal`
    Compare {
        /// Property name; `PartitionKey` and `RowKey` address the key.
        property: String,
        /// Operator.
        op: CompareOp,
        /// Right-hand side.
        literal: Literal,
    },
    /// Both sides must hold.
    And(Box<Filter>, Box<Filter>),
    /// Either side must hold.
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    /// Parses a filter expression.
    pub fn parse(input: &str) -> ServerResult<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let filter = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(invalid(format!("unexpected {token:?}")));
        }
        Ok(filter)
    }

    /// Evaluates the filter against an entity.
    pub fn matches(&self, entity: &TableEntity) -> bool {
        match self {
            Filter::And(a, b) => a.matches(entity) && b.matches(entity),
            Filter::Or(a, b) => a.matches(entity) || b.matches(entity),
            Filter::Compare {
                property,
                op,
                literal,
            } => {
                let ordering = match property.as_str() {
                    "PartitionKey" => compare_str(&entity.partition_key, literal),
                    "RowKey" => compare_str(&entity.row_key, literal),
                    name => entity
                        .property(name)
                        .and_then(|value| compare_value(value, literal)),
                };
                ordering.is_some_and(|o| op.holds(o))
            }
        }
    }
}

fn compare_str(value: &str, literal: &Literal) -> Option<Ordering> {
    match literal {
        Literal::String(s) => Some(value.cmp(s.as_str())),
        _ => None,
    }
}

fn compare_value(value: &PropertyValue, literal: &Literal) -> Option<Ordering> {
    match (value, literal) {
        (PropertyValue::String(v), _) => compare_str(v, literal),
        (PropertyValue::Int32(_) | PropertyValue::Int64(_), Literal::Int(l)) => {
            value.as_i64().map(|v| v.cmp(l))
        }
        (PropertyValue::Int32(_) | PropertyValue::Int64(_), Literal::Double(l)) => {
            value.as_i64().and_then(|v| (v as f64).partial_cmp(l))
        }
        (PropertyValue::Double(v), Literal::Double(l)) => v.partial_cmp(l),
        (PropertyValue::Double(v), Literal::Int(l)) => v.partial_cmp(&(*l as f64)),
        (PropertyValue::Boolean(v), Literal::Bool(l)) => Some(v.cmp(l)),
        (PropertyValue::Guid(v), Literal::Guid(l)) => Some(v.cmp(l)),
        (PropertyValue::DateTime(v), Literal::DateTime(l)) => Some(v.cmp(l)),
        (PropertyValue::Binary(v), Literal::Binary(l)) => Some(v.cmp(l)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Word(String),
    Literal(Literal),
}

fn invalid(message: impl Into<String>) -> ServerError {
    ServerError::InvalidQuery(message.into())
}

fn tokenize(input: &str) -> ServerResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else if c == '\'' {
            let (text, next) = quoted(&chars, i)?;
            tokens.push(Token::Literal(Literal::String(text)));
            i = next;
        } else if c.is_ascii_digit() || c == '-' {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if i < chars.len() && chars[i] == 'L' {
                i += 1;
            }
            tokens.push(Token::Literal(number(&text)?));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if i < chars.len() && chars[i] == '\'' {
                let (text, next) = quoted(&chars, i)?;
                tokens.push(Token::Literal(typed_literal(&word, &text)?));
                i = next;
            } else {
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Literal::Bool(true)),
                    "false" => Token::Literal(Literal::Bool(false)),
                    _ => Token::Word(word),
                });
            }
        } else {
            return Err(invalid(format!("unexpected character {c:?}")));
        }
    }
    Ok(tokens)
}

/// Reads a quoted string starting at `chars[start] == '\''`; `''` escapes a quote.
fn quoted(chars: &[char], start: usize) -> ServerResult<(String, usize)> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                text.push('\'');
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }
    Err(invalid("unterminated string literal"))
}

fn number(text: &str) -> ServerResult<Literal> {
    if text.contains('.') {
        text.parse()
            .map(Literal::Double)
            .map_err(|_| invalid(format!("bad number {text:?}")))
    } else {
        text.parse()
            .map(Literal::Int)
            .map_err(|_| invalid(format!("bad number {text:?}")))
    }
}

fn typed_literal(prefix: &str, text: &str) -> ServerResult<Literal> {
    match prefix {
        "guid" => Uuid::parse_str(text)
            .map(Literal::Guid)
            .map_err(|_| invalid(format!("bad guid {text:?}"))),
        "datetime" => DateTime::parse_from_rfc3339(text)
            .map(|dt| Literal::DateTime(dt.with_timezone(&Utc)))
            .map_err(|_| invalid(format!("bad datetime {text:?}"))),
        "X" | "binary" => hex::decode(text)
            .map(Literal::Binary)
            .map_err(|_| invalid(format!("bad binary {text:?}"))),
        other => Err(invalid(format!("unknown literal type {other:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Word(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> ServerResult<Filter> {
        let mut left = self.and_expr()?;
        while self.keyword("or") {
            let right = self.and_expr()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ServerResult<Filter> {
        let mut left = self.term()?;
        while self.keyword("and") {
            let right = self.term()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> ServerResult<Filter> {
        match self.next() {
            Some(Token::Open) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(invalid("missing ')'")),
                }
            }
            Some(Token::Word(property)) => {
                let op = match self.next() {
                    Some(Token::Word(op)) => CompareOp::parse(&op)
                        .ok_or_else(|| invalid(format!("unknown operator {op:?}")))?,
                    _ => return Err(invalid(format!("expected operator after {property}"))),
                };
                match self.next() {
                    Some(Token::Literal(literal)) => Ok(Filter::Compare {
                        property,
                        op,
                        literal,
                    }),
                    _ => Err(invalid(format!("expected literal after {property}"))),
                }
            }
            other => Err(invalid(format!("expected comparison, found {other:?}"))),
        }
    }
}
