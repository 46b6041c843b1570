//! Recursive-descent parser for the opaque `filter` query parameter on List
//! endpoints (§6, §9). The grammar only ever produces `FilterAst` nodes; it
//! never touches the store with raw text, so no input string — however
//! adversarial — can execute as anything but an equality/membership/pattern
//! test against known fields.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterAst {
    Eq(String, String),
    In(String, Vec<String>),
    Like(String, String),
    And(Box<FilterAst>, Box<FilterAst>),
    Or(Box<FilterAst>, Box<FilterAst>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterParseError(pub String);

impl fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid filter: {}", self.0)
    }
}

impl std::error::Error for FilterParseError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Eq,
    In,
    Like,
    And,
    Or,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterParseError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err(FilterParseError("unterminated string literal".into()));
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_uppercase().as_str() {
                    "IN" => Token::In,
                    "LIKE" => Token::Like,
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(FilterParseError(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_ident(&mut self) -> Result<String, FilterParseError> {
        match self.advance() {
            Some(Token::Ident(s)) => Ok(s),
            other => Err(FilterParseError(format!("expected field name, got {other:?}"))),
        }
    }

    fn expect_str(&mut self) -> Result<String, FilterParseError> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(s),
            other => Err(FilterParseError(format!("expected string literal, got {other:?}"))),
        }
    }

    fn parse_or(&mut self) -> Result<FilterAst, FilterParseError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = FilterAst::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterAst, FilterParseError> {
        let mut left = self.parse_atom()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_atom()?;
            left = FilterAst::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<FilterAst, FilterParseError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.advance();
            let inner = self.parse_or()?;
            match self.advance() {
                Some(Token::RParen) => return Ok(inner),
                other => return Err(FilterParseError(format!("expected ')', got {other:?}"))),
            }
        }

        let field = self.expect_ident()?;
        match self.advance() {
            Some(Token::Eq) => {
                let value = self.expect_str()?;
                Ok(FilterAst::Eq(field, value))
            }
            Some(Token::Like) => {
                let value = self.expect_str()?;
                Ok(FilterAst::Like(field, value))
            }
            Some(Token::In) => {
                match self.advance() {
                    Some(Token::LParen) => {}
                    other => return Err(FilterParseError(format!("expected '(' after IN, got {other:?}"))),
                }
                let mut values = vec![self.expect_str()?];
                while matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                    values.push(self.expect_str()?);
                }
                match self.advance() {
                    Some(Token::RParen) => {}
                    other => return Err(FilterParseError(format!("expected ')', got {other:?}"))),
                }
                Ok(FilterAst::In(field, values))
            }
            other => Err(FilterParseError(format!("expected '=', LIKE, or IN, got {other:?}"))),
        }
    }
}

/// Parse a filter expression. Any token the grammar does not recognise is a
/// parse error — never forwarded to the store as raw text (§9).
pub fn parse(input: &str) -> Result<FilterAst, FilterParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FilterParseError("empty filter".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(FilterParseError("trailing tokens after expression".into()));
    }
    Ok(ast)
}

/// Evaluate `ast` against a field accessor. `get` maps a field name to its
/// string value for the record under test, or `None` if the field is unknown
/// (an unknown field never matches, it does not error).
pub fn eval(ast: &FilterAst, get: impl Fn(&str) -> Option<String> + Copy) -> bool {
    match ast {
        FilterAst::Eq(field, value) => get(field).as_deref() == Some(value.as_str()),
        FilterAst::In(field, values) => get(field).map(|v| values.contains(&v)).unwrap_or(false),
        FilterAst::Like(field, pattern) => get(field)
            .map(|v| like_match(&v, pattern))
            .unwrap_or(false),
        FilterAst::And(a, b) => eval(a, get) && eval(b, get),
        FilterAst::Or(a, b) => eval(a, get) || eval(b, get),
    }
}

/// `%` as a wildcard, the rest matched literally (SQL-LIKE semantics without
/// ever touching an actual SQL engine).
fn like_match(value: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return value == pattern;
    }
    let mut rest = value;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_equality() {
        let ast = parse("ownerName = 'alice'").unwrap();
        assert_eq!(ast, FilterAst::Eq("ownerName".into(), "alice".into()));
    }

    #[test]
    fn parses_and_or_with_parens() {
        let ast = parse("(ownerName = 'alice' OR ownerName = 'bob') AND name = 'x'").unwrap();
        assert!(matches!(ast, FilterAst::And(_, _)));
    }

    #[test]
    fn parses_in_list() {
        let ast = parse("name IN ('a', 'b', 'c')").unwrap();
        assert_eq!(ast, FilterAst::In("name".into(), vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn parses_like_with_wildcard() {
        let ast = parse("name LIKE 'demo-%'").unwrap();
        assert!(eval(&ast, |f| if f == "name" { Some("demo-1".into()) } else { None }));
        assert!(!eval(&ast, |f| if f == "name" { Some("other".into()) } else { None }));
    }

    #[test]
    fn sql_injection_attempt_is_a_parse_error_not_executed() {
        let result = parse("name = 'x'; DROP TABLE users; --'");
        assert!(result.is_err());
    }

    #[test]
    fn unrecognised_token_is_a_parse_error() {
        assert!(parse("name ~= 'x'").is_err());
    }

    #[test]
    fn unknown_field_never_matches() {
        let ast = parse("missing = 'x'").unwrap();
        assert!(!eval(&ast, |_| None));
    }
}
