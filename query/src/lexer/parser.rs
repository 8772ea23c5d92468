use crate::lexer::{
    tokenizer::{StringTokenizer, Tokenable},
    Kql, Node, QueryError, Token, TokenKind, ValueList,
};

/// Default limit on `(`/`{` nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// How much of the query to quote back in an error
const NEAR_CHARS: usize = 24;

///
/// KqlParser turns query strings into a [`Kql`] parse tree.
///
/// The parser is immutable once built, so a single instance is created at
/// startup and shared by reference. Precedence, loosest first:
/// 1. `or`
/// 2. `and`
/// 3. `not`
/// 4. `( ... )` groups, `field:{ ... }` nested scopes and expressions
///
#[derive(Debug, Clone)]
pub struct KqlParser {
    max_depth: usize,
}

impl Default for KqlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl KqlParser {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Tokenize and parse a raw query string
    pub fn parse(&self, query: &str) -> Result<Kql, QueryError> {
        let tokens = StringTokenizer::tokenize(query)?;
        self.parse_tokens(query, tokens)
    }

    /// Parse an already tokenized query, `query` is only used for error context
    pub fn parse_tokens(&self, query: &str, tokens: Vec<Token>) -> Result<Kql, QueryError> {
        if tokens.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let mut state = ParseState {
            query,
            tokens,
            pos: 0,
            depth: 0,
            max_depth: self.max_depth,
        };
        let root = state.parse_or()?;
        if let Some(token) = state.peek() {
            return Err(state.unexpected(token, "`and`, `or` or the end of the query"));
        }
        Ok(Kql { root })
    }
}

struct ParseState<'a> {
    query: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> ParseState<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    /// Takes the next token only if it is of the given kind
    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek_kind() == Some(kind) {
            self.next()
        } else {
            None
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, token: &Token, expected: &'static str) -> QueryError {
        QueryError::UnexpectedToken {
            found: token.value.clone(),
            offset: token.offset,
            near: self.query[token.offset..].chars().take(NEAR_CHARS).collect(),
            expected,
        }
    }

    /// Takes the next token, failing unless it is a literal
    fn expect_literal(&mut self, expected: &'static str) -> Result<Token, QueryError> {
        match self.next() {
            Some(token) if token.is_literal() => Ok(token),
            Some(token) => Err(self.unexpected(&token, expected)),
            None => Err(QueryError::UnexpectedEof { expected }),
        }
    }

    fn enter(&mut self) -> Result<(), QueryError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(QueryError::TooDeep {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    /// Consumes the closing delimiter of a group opened at `open`
    fn close(&mut self, kind: TokenKind, open: &Token) -> Result<(), QueryError> {
        self.depth -= 1;
        match self.next() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) if token.kind == TokenKind::RParen || token.kind == TokenKind::RBrace => {
                Err(self.unexpected(&token, "a matching closing delimiter"))
            }
            Some(token) => Err(self.unexpected(&token, "`and`, `or` or a closing delimiter")),
            None if kind == TokenKind::RBrace => Err(QueryError::MissingClosingBrace {
                offset: open.offset,
            }),
            None => Err(QueryError::MissingClosingParen {
                offset: open.offset,
            }),
        }
    }

    fn parse_or(&mut self) -> Result<Node, QueryError> {
        let mut children = vec![self.parse_and()?];
        while let Some(TokenKind::Or) = self.peek_kind() {
            self.next();
            children.push(self.parse_and()?);
        }
        Ok(flatten(children, Node::Or))
    }

    fn parse_and(&mut self) -> Result<Node, QueryError> {
        let mut children = vec![self.parse_not()?];
        while let Some(TokenKind::And) = self.peek_kind() {
            self.next();
            children.push(self.parse_not()?);
        }
        Ok(flatten(children, Node::And))
    }

    fn parse_not(&mut self) -> Result<Node, QueryError> {
        if let Some(TokenKind::Not) = self.peek_kind() {
            self.next();
            let operand = self.parse_sub_query()?;
            return Ok(Node::Not(Box::new(operand)));
        }
        self.parse_sub_query()
    }

    fn parse_sub_query(&mut self) -> Result<Node, QueryError> {
        if let Some(open) = self.eat(TokenKind::LParen) {
            self.enter()?;
            let query = self.parse_or()?;
            self.close(TokenKind::RParen, &open)?;
            return Ok(query);
        }
        self.parse_expression()
    }

    /// `field:{...}`, `field:value(s)`, `field<op>value` or a bare `field`
    fn parse_expression(&mut self) -> Result<Node, QueryError> {
        let field = self.expect_literal("a field name, `not` or `(`")?;
        if field.kind == TokenKind::Wildcard {
            return Err(self.unexpected(&field, "a field name"));
        }
        let field = field.value;

        match self.peek_kind() {
            Some(TokenKind::Colon) => {
                self.next();
                if let Some(open) = self.eat(TokenKind::LBrace) {
                    self.enter()?;
                    let query = self.parse_or()?;
                    self.close(TokenKind::RBrace, &open)?;
                    return Ok(Node::Nested {
                        field,
                        query: Box::new(query),
                    });
                }
                let value = self.parse_list_of_values()?;
                Ok(Node::FieldValue { field, value })
            }
            Some(TokenKind::Range(op)) => {
                self.next();
                let value = self.expect_literal("a value to compare against")?;
                if value.kind == TokenKind::Wildcard {
                    return Err(self.unexpected(&value, "a value to compare against"));
                }
                Ok(Node::FieldRange {
                    field,
                    op,
                    value: value.value,
                })
            }
            _ => Ok(Node::Value(field)),
        }
    }

    fn parse_list_of_values(&mut self) -> Result<ValueList, QueryError> {
        if let Some(open) = self.eat(TokenKind::LParen) {
            self.enter()?;
            let values = self.parse_or_values()?;
            self.close(TokenKind::RParen, &open)?;
            return Ok(values);
        }
        let value = self.expect_literal("a value, `*` or `(`")?;
        Ok(match value.kind {
            TokenKind::Wildcard => ValueList::Wildcard,
            _ => ValueList::Literal(value.value),
        })
    }

    fn parse_or_values(&mut self) -> Result<ValueList, QueryError> {
        let mut values = vec![self.parse_and_values()?];
        while let Some(TokenKind::Or) = self.peek_kind() {
            self.next();
            values.push(self.parse_and_values()?);
        }
        Ok(flatten(values, ValueList::Or))
    }

    fn parse_and_values(&mut self) -> Result<ValueList, QueryError> {
        let mut values = vec![self.parse_not_values()?];
        while let Some(TokenKind::And) = self.peek_kind() {
            self.next();
            values.push(self.parse_not_values()?);
        }
        Ok(flatten(values, ValueList::And))
    }

    fn parse_not_values(&mut self) -> Result<ValueList, QueryError> {
        if let Some(TokenKind::Not) = self.peek_kind() {
            self.next();
            let operand = self.parse_list_of_values()?;
            return Ok(ValueList::Not(Box::new(operand)));
        }
        self.parse_list_of_values()
    }
}

/// A chain with a single operand is just that operand
fn flatten<T>(mut items: Vec<T>, wrap: fn(Vec<T>) -> T) -> T {
    match items.pop() {
        Some(item) if items.is_empty() => item,
        Some(item) => {
            items.push(item);
            wrap(items)
        }
        None => wrap(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::RangeOp;

    fn parse(query: &str) -> Node {
        KqlParser::new().parse(query).unwrap().root
    }

    fn field_value(field: &str, value: &str) -> Node {
        Node::FieldValue {
            field: field.into(),
            value: ValueList::Literal(value.into()),
        }
    }

    #[test]
    fn test_bare_field_is_value_expression() {
        assert_eq!(parse("foo"), Node::Value("foo".into()));
    }

    #[test]
    fn test_field_wildcard() {
        assert_eq!(
            parse("foo:*"),
            Node::FieldValue {
                field: "foo".into(),
                value: ValueList::Wildcard
            }
        );
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("a:1 or a:2 and a:3"),
            Node::Or(vec![
                field_value("a", "1"),
                Node::And(vec![field_value("a", "2"), field_value("a", "3")]),
            ])
        );
    }

    #[test]
    fn test_chains_are_flat() {
        assert_eq!(
            parse("a and b and c"),
            Node::And(vec![
                Node::Value("a".into()),
                Node::Value("b".into()),
                Node::Value("c".into()),
            ])
        );
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        assert_eq!(
            parse("not a and b"),
            Node::And(vec![
                Node::Not(Box::new(Node::Value("a".into()))),
                Node::Value("b".into()),
            ])
        );
    }

    #[test]
    fn test_groups() {
        assert_eq!(
            parse("(a or b) and c"),
            Node::And(vec![
                Node::Or(vec![Node::Value("a".into()), Node::Value("b".into())]),
                Node::Value("c".into()),
            ])
        );
    }

    #[test]
    fn test_range() {
        assert_eq!(
            parse("status>=500"),
            Node::FieldRange {
                field: "status".into(),
                op: RangeOp::Gte,
                value: "500".into()
            }
        );
    }

    #[test]
    fn test_nested() {
        assert_eq!(
            parse("items:{ name:banana }"),
            Node::Nested {
                field: "items".into(),
                query: Box::new(field_value("name", "banana")),
            }
        );
    }

    #[test]
    fn test_value_list_structure_is_preserved() {
        assert_eq!(
            parse("tag:(a or b and not c)"),
            Node::FieldValue {
                field: "tag".into(),
                value: ValueList::Or(vec![
                    ValueList::Literal("a".into()),
                    ValueList::And(vec![
                        ValueList::Literal("b".into()),
                        ValueList::Not(Box::new(ValueList::Literal("c".into()))),
                    ]),
                ]),
            }
        );
    }

    #[test]
    fn test_quoted_field_and_value() {
        assert_eq!(
            parse(r#""my field":"hello world""#),
            field_value("my field", "hello world")
        );
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(KqlParser::new().parse("   "), Err(QueryError::EmptyQuery));
    }

    #[test]
    fn test_dangling_operator() {
        assert_eq!(
            KqlParser::new().parse("a:1 and"),
            Err(QueryError::UnexpectedEof {
                expected: "a field name, `not` or `(`"
            })
        );
        assert!(matches!(
            KqlParser::new().parse("a:"),
            Err(QueryError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_unclosed_groups() {
        assert_eq!(
            KqlParser::new().parse("(a or b"),
            Err(QueryError::MissingClosingParen { offset: 0 })
        );
        assert_eq!(
            KqlParser::new().parse("x:{ a:1"),
            Err(QueryError::MissingClosingBrace { offset: 2 })
        );
    }

    #[test]
    fn test_unexpected_token_reports_context() {
        let err = KqlParser::new().parse("a:1 and ) b").unwrap_err();
        assert_eq!(
            err,
            QueryError::UnexpectedToken {
                found: ")".into(),
                offset: 8,
                near: ") b".into(),
                expected: "a field name, `not` or `(`",
            }
        );
        let message = err.to_string();
        assert!(message.contains("offset 8"));
        assert!(message.contains("`field<value` (or <=, >, >=)"));
    }

    #[test]
    fn test_trailing_tokens() {
        assert!(matches!(
            KqlParser::new().parse("a:1 )"),
            Err(QueryError::UnexpectedToken { offset: 4, .. })
        ));
    }

    #[test]
    fn test_double_not_is_rejected() {
        assert!(KqlParser::new().parse("not not a").is_err());
    }

    #[test]
    fn test_wildcard_field_is_rejected() {
        assert!(matches!(
            KqlParser::new().parse("*:foo"),
            Err(QueryError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_max_depth() {
        let parser = KqlParser::new().with_max_depth(2);
        assert!(parser.parse("((a))").is_ok());
        assert_eq!(
            parser.parse("(((a)))"),
            Err(QueryError::TooDeep { limit: 2 })
        );
    }
}
