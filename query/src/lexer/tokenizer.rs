use crate::lexer::{QueryError, RangeOp, Token, TokenKind};

/// Describes the input medium tokenizer
pub trait Tokenable<'a> {
    type Type;
    fn tokenize(input: Self::Type) -> Result<Vec<Token>, QueryError>;
}

/// Characters which end an unquoted literal unless escaped. `*` is special
/// too but stays inside literals as a wildcard.
const DELIMITERS: &[char] = &['(', ')', ':', '<', '>', '"', '{', '}'];

/// Characters which may follow a `\` and stand for themselves
const ESCAPABLE: &[char] = &['\\', '(', ')', ':', '<', '>', '"', '*', '{', '}'];

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("and", TokenKind::And),
    ("or", TokenKind::Or),
    ("not", TokenKind::Not),
];

/// Processes KQL strings into tokens
///
/// Some examples of valid inputs:
///  - `http.status_code>=500`
///  - `message:"connection refused" and not host:db-1`
///  - `items:{ name:(apple or banana) and stock<10 }`
pub struct StringTokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenable<'a> for StringTokenizer<'a> {
    type Type = &'a str;

    fn tokenize(input: Self::Type) -> Result<Vec<Token>, QueryError> {
        let mut tokenizer = StringTokenizer { input, pos: 0 };
        let mut tokens = Vec::new();
        while let Some(token) = tokenizer.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

impl<'a> StringTokenizer<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, QueryError> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let single = |kind| Some(Token::new(kind, ch.to_string(), start));
        let token = match ch {
            '(' => single(TokenKind::LParen),
            ')' => single(TokenKind::RParen),
            '{' => single(TokenKind::LBrace),
            '}' => single(TokenKind::RBrace),
            ':' => single(TokenKind::Colon),
            '<' | '>' => {
                self.bump();
                let op = match (ch, self.peek() == Some('=')) {
                    ('<', true) => RangeOp::Lte,
                    ('<', false) => RangeOp::Lt,
                    (_, true) => RangeOp::Gte,
                    (_, false) => RangeOp::Gt,
                };
                if matches!(op, RangeOp::Lte | RangeOp::Gte) {
                    self.bump();
                }
                return Ok(Some(Token::new(TokenKind::Range(op), op.symbol(), start)));
            }
            '"' => return self.quoted_string().map(Some),
            _ => {
                if let Some((word, kind)) = keyword_at(self.rest()) {
                    self.pos += word.len();
                    return Ok(Some(Token::new(kind, word, start)));
                }
                return self.unquoted_literal().map(Some);
            }
        };
        self.bump();
        Ok(token)
    }

    /// Reads a JSON-style double quoted string, the closing quote must not be escaped.
    fn quoted_string(&mut self) -> Result<Token, QueryError> {
        let start = self.pos;
        self.bump();
        let mut escaped = false;
        loop {
            match self.bump() {
                None => return Err(QueryError::UnclosedQuote { offset: start }),
                Some('\\') if !escaped => escaped = true,
                Some('"') if !escaped => break,
                Some(_) => escaped = false,
            }
        }
        let literal = &self.input[start..self.pos];
        let value = serde_json::from_str::<String>(literal).map_err(|err| {
            QueryError::InvalidQuotedString {
                literal: literal.to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(Token::new(TokenKind::Quoted, value, start))
    }

    /// Accumulates unquoted characters into a single term, resolving escapes.
    ///
    /// Whitespace is kept inside the term unless what follows it would end the
    /// term anyway (end of input, a delimiter or a keyword).
    fn unquoted_literal(&mut self) -> Result<Token, QueryError> {
        let start = self.pos;
        let mut value = String::new();
        let mut escaped_any = false;

        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                let ws_start = self.pos;
                self.skip_whitespace();
                let ends_term = match self.peek() {
                    None => true,
                    Some(next) => DELIMITERS.contains(&next) || keyword_at(self.rest()).is_some(),
                };
                if ends_term {
                    self.pos = ws_start;
                    break;
                }
                value.push_str(&self.input[ws_start..self.pos]);
                continue;
            }
            if ch == '\\' {
                value.push(self.escape_sequence()?);
                escaped_any = true;
                continue;
            }
            if DELIMITERS.contains(&ch) {
                break;
            }
            value.push(ch);
            self.bump();
        }

        if value == "*" && !escaped_any {
            return Ok(Token::new(TokenKind::Wildcard, value, start));
        }
        Ok(Token::new(TokenKind::Term, value, start))
    }

    /// Resolves the escape sequence at the cursor into the character it stands for.
    ///
    /// Escaped keywords (`\and`) push their first letter here and leave the rest
    /// of the word to be read as ordinary characters.
    fn escape_sequence(&mut self) -> Result<char, QueryError> {
        let start = self.pos;
        self.bump();
        let after = self.rest();
        if keyword_at(after).is_some() {
            return self.bump().ok_or(QueryError::InvalidEscape {
                sequence: "\\".into(),
                offset: start,
            });
        }
        let invalid = |sequence: &str| QueryError::InvalidEscape {
            sequence: sequence.to_string(),
            offset: start,
        };
        match self.bump() {
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('n') => Ok('\n'),
            Some('u') => {
                let hex = after.get(1..5).filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()));
                let Some(hex) = hex else {
                    return Err(invalid(&self.input[start..self.pos]));
                };
                self.pos += 4;
                u32::from_str_radix(hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| invalid(&self.input[start..self.pos]))
            }
            Some(ch) if ESCAPABLE.contains(&ch) => Ok(ch),
            Some(_) => Err(invalid(&self.input[start..self.pos])),
            None => Err(invalid("\\")),
        }
    }
}

/// Matches a case-insensitive `and`/`or`/`not` at the start of `rest`, as long
/// as it is a whole word (followed by whitespace, a delimiter or the end).
fn keyword_at(rest: &str) -> Option<(&str, TokenKind)> {
    KEYWORDS.iter().find_map(|(keyword, kind)| {
        let word = rest.get(..keyword.len())?;
        if !word.eq_ignore_ascii_case(keyword) {
            return None;
        }
        match rest[keyword.len()..].chars().next() {
            None => Some((word, *kind)),
            Some(next) if next.is_whitespace() || DELIMITERS.contains(&next) => {
                Some((word, *kind))
            }
            Some(_) => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        StringTokenizer::tokenize(input)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    fn values(input: &str) -> Vec<String> {
        StringTokenizer::tokenize(input)
            .unwrap()
            .into_iter()
            .map(|token| token.value)
            .collect()
    }

    #[test]
    fn test_tokenize_field_value() {
        assert_eq!(
            kinds("foo:bar"),
            vec![TokenKind::Term, TokenKind::Colon, TokenKind::Term]
        );
        assert_eq!(values("foo:bar"), vec!["foo", ":", "bar"]);
    }

    #[test]
    fn test_tokenize_range_operators() {
        assert_eq!(kinds("a<1")[1], TokenKind::Range(RangeOp::Lt));
        assert_eq!(kinds("a>1")[1], TokenKind::Range(RangeOp::Gt));
        let tokens = StringTokenizer::tokenize("x>=4").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Range(RangeOp::Gte));
        assert_eq!(tokens[2].value, "4");
        let tokens = StringTokenizer::tokenize("x<=4").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Range(RangeOp::Lte));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("a AND b Or NOT c"),
            vec![
                TokenKind::Term,
                TokenKind::And,
                TokenKind::Term,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Term
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_a_literal() {
        assert_eq!(values("android or nothing"), vec!["android", "or", "nothing"]);
    }

    #[test]
    fn test_whitespace_coalesces_into_literal() {
        assert_eq!(
            values("message:hello  world and level:error"),
            vec!["message", ":", "hello  world", "and", "level", ":", "error"]
        );
    }

    #[test]
    fn test_trailing_whitespace_is_trimmed() {
        assert_eq!(values("  foo   "), vec!["foo"]);
    }

    #[test]
    fn test_quoted_string_unescapes_json() {
        let tokens = StringTokenizer::tokenize(r#"msg:"say \"hi\"\n""#).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Quoted);
        assert_eq!(tokens[2].value, "say \"hi\"\n");
    }

    #[test]
    fn test_unclosed_quote() {
        assert_eq!(
            StringTokenizer::tokenize(r#"msg:"oops"#),
            Err(QueryError::UnclosedQuote { offset: 4 })
        );
    }

    #[test]
    fn test_escaped_special_characters() {
        assert_eq!(values(r"url:http\://x\(1\)"), vec!["url", ":", "http://x(1)"]);
        assert_eq!(values(r"a\:b"), vec!["a:b"]);
    }

    #[test]
    fn test_escaped_whitespace() {
        assert_eq!(values(r"a\tb\r\nc"), vec!["a\tb\r\nc"]);
    }

    #[test]
    fn test_escaped_keyword() {
        assert_eq!(kinds(r"\and"), vec![TokenKind::Term]);
        assert_eq!(values(r"word:\not"), vec!["word", ":", "not"]);
        assert_eq!(values(r"a:b \or c"), vec!["a", ":", "b or c"]);
    }

    #[test]
    fn test_escaped_unicode() {
        assert_eq!(values(r"name:caf\u00e9"), vec!["name", ":", "café"]);
    }

    #[test]
    fn test_invalid_escape() {
        assert!(matches!(
            StringTokenizer::tokenize(r"a:\q"),
            Err(QueryError::InvalidEscape { offset: 2, .. })
        ));
        assert!(matches!(
            StringTokenizer::tokenize(r"a:\u12"),
            Err(QueryError::InvalidEscape { .. })
        ));
        assert!(matches!(
            StringTokenizer::tokenize("a:b\\"),
            Err(QueryError::InvalidEscape { .. })
        ));
    }

    #[test]
    fn test_wildcard() {
        assert_eq!(
            kinds("a:*"),
            vec![TokenKind::Term, TokenKind::Colon, TokenKind::Wildcard]
        );
        assert_eq!(kinds(r"a:\*")[2], TokenKind::Term);
        assert_eq!(kinds("a:foo*")[2], TokenKind::Term);
    }

    #[test]
    fn test_offsets() {
        let tokens = StringTokenizer::tokenize("a:1 and b").unwrap();
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 4, 8]);
    }
}
