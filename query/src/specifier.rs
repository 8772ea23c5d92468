//! The legacy flat query surface: one `field<op>value` specifier per argument,
//! all of which must match.
//!
//! Unlike KQL, `=` is an exact `term` query and `~` an analysed `match`.

use std::{fmt::Display, str::FromStr};

use crate::{
    dsl::Query,
    lexer::{tokenizer::Tokenable, QueryError, RangeOp, Token, TokenKind},
};

/// Operators recognised inside a specifier, in the order they are documented
pub const SPECIFIER_OPERATORS: [char; 4] = ['=', '<', '>', '~'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierOp {
    Exists,
    Equals,
    LessThan,
    GreaterThan,
    Match,
}

/// A single parsed specifier, `value` is `None` only for [`SpecifierOp::Exists`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub field: String,
    pub operator: SpecifierOp,
    pub value: Option<String>,
}

/// Splits a specifier on unescaped operators, coalescing everything else into terms
pub struct SpecifierTokenizer {}

impl<'a> Tokenable<'a> for SpecifierTokenizer {
    type Type = &'a str;

    fn tokenize(input: Self::Type) -> Result<Vec<Token>, QueryError> {
        let mut tokens = Vec::new();
        let mut term = String::new();
        let mut term_start = 0;
        let mut previous = None;

        for (offset, ch) in input.char_indices() {
            let kind = match ch {
                '=' => Some(TokenKind::Equals),
                '<' => Some(TokenKind::Range(RangeOp::Lt)),
                '>' => Some(TokenKind::Range(RangeOp::Gt)),
                '~' => Some(TokenKind::Tilde),
                _ => None,
            };
            match kind {
                Some(kind) if previous != Some('\\') => {
                    if !term.is_empty() {
                        tokens.push(Token::new(TokenKind::Term, unescape(&term), term_start));
                        term.clear();
                    }
                    tokens.push(Token::new(kind, ch.to_string(), offset));
                }
                _ => {
                    if term.is_empty() {
                        term_start = offset;
                    }
                    term.push(ch);
                }
            }
            previous = Some(ch);
        }
        if !term.is_empty() {
            tokens.push(Token::new(TokenKind::Term, unescape(&term), term_start));
        }
        Ok(tokens)
    }
}

/// Removes the `\` in front of escaped operators, other backslashes are kept
fn unescape(term: &str) -> String {
    let mut unescaped = String::with_capacity(term.len());
    let mut chars = term.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let operator = chars
                .peek()
                .copied()
                .filter(|c| SPECIFIER_OPERATORS.contains(c));
            if let Some(next) = operator {
                unescaped.push(next);
                chars.next();
                continue;
            }
        }
        unescaped.push(ch);
    }
    unescaped
}

impl FromStr for Specifier {
    type Err = QueryError;

    /// Parse a given specifier.
    ///
    /// This can be just a field name (exists query), or `<field><operator><value>`,
    /// e.g. `http.status>499` matches every document with a status above 499.
    fn from_str(specifier: &str) -> Result<Self, Self::Err> {
        let tokens = SpecifierTokenizer::tokenize(specifier)?;
        let invalid = || QueryError::InvalidSpecifier {
            specifier: specifier.to_string(),
            tokens: tokens.iter().map(|token| token.value.clone()).collect(),
        };

        match tokens.as_slice() {
            [field] if field.kind == TokenKind::Term => Ok(Specifier {
                field: field.value.clone(),
                operator: SpecifierOp::Exists,
                value: None,
            }),
            [field, operator, value]
                if field.kind == TokenKind::Term && value.kind == TokenKind::Term =>
            {
                let operator = match operator.kind {
                    TokenKind::Equals => SpecifierOp::Equals,
                    TokenKind::Range(RangeOp::Lt) => SpecifierOp::LessThan,
                    TokenKind::Range(RangeOp::Gt) => SpecifierOp::GreaterThan,
                    TokenKind::Tilde => SpecifierOp::Match,
                    _ => return Err(invalid()),
                };
                Ok(Specifier {
                    field: field.value.clone(),
                    operator,
                    value: Some(value.value.clone()),
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl Specifier {
    pub fn to_query(&self) -> Query {
        let field = self.field.clone();
        let value = self.value.clone().unwrap_or_default();
        match self.operator {
            SpecifierOp::Exists => Query::exists(field),
            SpecifierOp::Equals => Query::Term { field, value },
            SpecifierOp::LessThan => Query::range(field, RangeOp::Lt, value),
            SpecifierOp::GreaterThan => Query::range(field, RangeOp::Gt, value),
            SpecifierOp::Match => match value.strip_suffix('*') {
                Some(prefix) => Query::MatchPhrasePrefix {
                    field,
                    query: prefix.to_string(),
                },
                None => Query::MatchQuery {
                    field,
                    query: value,
                },
            },
        }
    }
}

impl Display for Specifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operator = match self.operator {
            SpecifierOp::Exists => return write!(f, "{}", self.field),
            SpecifierOp::Equals => '=',
            SpecifierOp::LessThan => '<',
            SpecifierOp::GreaterThan => '>',
            SpecifierOp::Match => '~',
        };
        write!(
            f,
            "{}{}{}",
            self.field,
            operator,
            self.value.as_deref().unwrap_or_default()
        )
    }
}

/// Parse one specifier straight into its query
pub fn parse_specifier(specifier: &str) -> Result<Query, QueryError> {
    Ok(specifier.parse::<Specifier>()?.to_query())
}
