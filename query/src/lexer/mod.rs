//! A query lexer that tokenizes and parses KQL query strings.
//!
//! This module provides the token and parse tree types for the query language,
//!   as well as the errors raised while turning raw user input into a [`Kql`] tree.
//!   The [`tokenizer`] resolves escapes and quoting, the [`parser`] applies the
//!   grammar's precedence rules (`not` > `and` > `or`).

use std::fmt::{self, Display};

/// Human readable summary of the grammar, appended to every parse error
pub const KQL_HELP: &str = "A query is built from `field:value`, `field:(a or b)`, \
`field<value` (or <=, >, >=), `field:{ nested query }`, `field:*` or a bare `field`, \
combined with `and`, `or`, `not` and parentheses. \
Escape special characters (\\():<>\"*{}) with '\\'.";

/// Describes an error that occurred while tokenizing or parsing user input
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid escape sequence `{sequence}` at offset {offset}. {}", KQL_HELP)]
    InvalidEscape { sequence: String, offset: usize },
    #[error("Unclosed quoted string starting at offset {offset}")]
    UnclosedQuote { offset: usize },
    #[error("Invalid quoted string {literal}: {reason}")]
    InvalidQuotedString { literal: String, reason: String },
    #[error("Unexpected `{found}` at offset {offset}, near `{near}`: expected {expected}. {}", KQL_HELP)]
    UnexpectedToken {
        found: String,
        offset: usize,
        near: String,
        expected: &'static str,
    },
    #[error("Unexpected end of query: expected {expected}. {}", KQL_HELP)]
    UnexpectedEof { expected: &'static str },
    #[error("Empty query")]
    EmptyQuery,
    #[error("Missing closing parenthesis for `(` at offset {offset}")]
    MissingClosingParen { offset: usize },
    #[error("Missing closing brace for `{{` at offset {offset}")]
    MissingClosingBrace { offset: usize },
    #[error("Query is nested more than {limit} levels deep")]
    TooDeep { limit: usize },
    #[error(
        "Invalid specifier {specifier:?}:\n    Tokens: {tokens:?}\n\n    \
A specifier can either be a single field name (for exists), or a field name, operator and value.\n    \
The available operators are ['=', '<', '>', '~'].\n    \
Escape them with '\\' to use them in a field name or value."
    )]
    InvalidSpecifier {
        specifier: String,
        tokens: Vec<String>,
    },
}

/// Comparison operators shared by the range grammar and the query DSL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl RangeOp {
    /// The operator as written in a query
    pub fn symbol(self) -> &'static str {
        match self {
            RangeOp::Lt => "<",
            RangeOp::Lte => "<=",
            RangeOp::Gt => ">",
            RangeOp::Gte => ">=",
        }
    }

    /// The key used by the backend's `range` query
    pub fn as_str(self) -> &'static str {
        match self {
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
        }
    }
}

/// Describes the kind of a token in either query language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted literal with escapes already resolved
    Term,
    /// Double-quoted literal, unescaped
    Quoted,
    /// A bare, unescaped `*`
    Wildcard,
    /// `:`, the KQL match operator
    Colon,
    /// `=`, specifier equality
    Equals,
    /// `~`, specifier match
    Tilde,
    Range(RangeOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBrace,
    RBrace,
}

/// A single token, `value` holds the (unescaped) text it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// Byte offset of the token in the original input
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, offset: usize) -> Self {
        Token {
            kind,
            value: value.into(),
            offset,
        }
    }

    /// Field names and values: unquoted, quoted or wildcard literals
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Term | TokenKind::Quoted | TokenKind::Wildcard
        )
    }
}

/// The root of a parsed query, the grammar's `start` rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kql {
    pub root: Node,
}

/// Describes an expression node in the query parse tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    /// `field:value` or `field:(value list)`
    FieldValue { field: String, value: ValueList },
    /// `field<value`, `field>=value`, ...
    FieldRange {
        field: String,
        op: RangeOp,
        value: String,
    },
    /// A bare field name, checked for existence
    Value(String),
    /// `field:{ query }`, fields inside `query` are relative to `field`
    Nested { field: String, query: Box<Node> },
}

/// The right hand side of `field:...`, lists are expanded by the transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueList {
    Literal(String),
    Wildcard,
    Or(Vec<ValueList>),
    And(Vec<ValueList>),
    Not(Box<ValueList>),
}

/// Unquoted when it reads back as the same literal, JSON-quoted otherwise
fn write_literal(f: &mut fmt::Formatter<'_>, literal: &str) -> fmt::Result {
    let keyword = ["and", "or", "not"]
        .iter()
        .any(|keyword| literal.eq_ignore_ascii_case(keyword));
    let plain = !literal.is_empty()
        && !keyword
        && literal
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && !"\\():<>\"*{}".contains(c));
    if plain {
        write!(f, "{}", literal)
    } else {
        let quoted = serde_json::to_string(literal).map_err(|_| fmt::Error)?;
        write!(f, "{}", quoted)
    }
}

fn write_joined<T: Display>(f: &mut fmt::Formatter<'_>, parts: &[T], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", part)?;
    }
    write!(f, ")")
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::And(children) => write_joined(f, children, "and"),
            Node::Or(children) => write_joined(f, children, "or"),
            Node::Not(inner) => write!(f, "not {}", inner),
            Node::FieldValue { field, value } => {
                write_literal(f, field)?;
                write!(f, ":{}", value)
            }
            Node::FieldRange { field, op, value } => {
                write_literal(f, field)?;
                write!(f, "{}", op.symbol())?;
                write_literal(f, value)
            }
            Node::Value(field) => write_literal(f, field),
            Node::Nested { field, query } => {
                write_literal(f, field)?;
                write!(f, ":{{ {} }}", query)
            }
        }
    }
}

impl Display for ValueList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueList::Literal(value) => write_literal(f, value),
            ValueList::Wildcard => write!(f, "*"),
            ValueList::Or(values) => write_joined(f, values, "or"),
            ValueList::And(values) => write_joined(f, values, "and"),
            ValueList::Not(inner) => write!(f, "(not {})", inner),
        }
    }
}

impl Display for Kql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

pub mod parser;
pub mod tokenizer;
