use crate::Span;
use crate::lexer::{LexerError, Token, TokenKind};
use crate::types::{MalMap, Value};
use std::iter::Peekable;
use std::vec::IntoIter;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token '{}' at [{}], expected {expected}", .found.kind, .found.span)]
    UnexpectedToken { found: Token, expected: String },
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(String),
    #[error("unterminated {form}: reached end of input before '{close}'")]
    Unterminated {
        form: &'static str,
        close: char,
        span: Span,
    },
    #[error("hash-map literal at [{0}] has a key without a value")]
    OddMapEntries(Span),
    #[error("integer literal out of range: {text}")]
    InvalidNumber { text: String, span: Span },
    #[error("no form to read")]
    Empty,
    #[error("{0}")]
    Lexer(#[from] LexerError),
}

// Result type alias for convenience
type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Peekable<IntoIter<Token>>,
    // Where unterminated forms are reported to end
    eof: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof = tokens.last().map_or(0, |token| token.span.end);
        Parser {
            tokens: tokens.into_iter().peekable(),
            eof,
        }
    }

    // Consumes the next token if available.
    fn next_token(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    /// Parses a single form from the token stream.
    pub fn parse_expr(&mut self) -> ParseResult<Value> {
        match self.next_token() {
            Some(token) => self.parse_expr_with_token(token),
            None => Err(ParseError::UnexpectedEof("a form".to_string())),
        }
    }

    fn parse_expr_with_token(&mut self, token: Token) -> ParseResult<Value> {
        let span = token.span;
        match token.kind {
            TokenKind::LParen => {
                let items = self.parse_sequence(span, TokenKind::RParen, "list", ')')?;
                Ok(Value::list(items))
            }
            TokenKind::LBracket => {
                let items = self.parse_sequence(span, TokenKind::RBracket, "vector", ']')?;
                Ok(Value::vector(items))
            }
            TokenKind::LBrace => self.parse_hash_map(span),
            TokenKind::Quote => self.parse_reader_macro("quote"),
            TokenKind::QuasiQuote => self.parse_reader_macro("quasiquote"),
            TokenKind::Unquote => self.parse_reader_macro("unquote"),
            TokenKind::SpliceUnquote => self.parse_reader_macro("splice-unquote"),
            TokenKind::Deref => self.parse_reader_macro("deref"),
            TokenKind::Meta => self.parse_meta(),
            TokenKind::String(s) => Ok(Value::string(&s)),
            TokenKind::Atom(text) => parse_atom(text, span),
            kind @ (TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace) => {
                Err(ParseError::UnexpectedToken {
                    found: Token { kind, span },
                    expected: "a form".to_string(),
                })
            }
        }
    }

    /// Parses forms until the `close` token. `open` is the span of the
    /// opening delimiter.
    fn parse_sequence(
        &mut self,
        open: Span,
        close: TokenKind,
        form: &'static str,
        close_char: char,
    ) -> ParseResult<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            match self.next_token() {
                Some(token) if token.kind == close => return Ok(items),
                Some(token) => items.push(self.parse_expr_with_token(token)?),
                None => {
                    return Err(ParseError::Unterminated {
                        form,
                        close: close_char,
                        span: Span::new(open.start, self.eof),
                    });
                }
            }
        }
    }

    fn parse_hash_map(&mut self, open: Span) -> ParseResult<Value> {
        let items = self.parse_sequence(open, TokenKind::RBrace, "hash-map", '}')?;
        // Duplicate keys are merged only once the entries are evaluated
        match MalMap::from_flat_unmerged(items) {
            Some(map) => Ok(Value::hash_map(map)),
            None => Err(ParseError::OddMapEntries(Span::new(open.start, self.eof))),
        }
    }

    /// Expands a prefix such as `'x` into `(quote x)`.
    fn parse_reader_macro(&mut self, name: &str) -> ParseResult<Value> {
        let form = self
            .parse_expr()
            .map_err(|err| eof_after(err, name))?;
        Ok(Value::list(vec![Value::symbol(name), form]))
    }

    /// Expands `^{meta} form` into `(with-meta form {meta})`.
    fn parse_meta(&mut self) -> ParseResult<Value> {
        let meta = match self.next_token() {
            Some(Token {
                kind: TokenKind::LBrace,
                span,
            }) => self.parse_hash_map(span)?,
            Some(found) => {
                return Err(ParseError::UnexpectedToken {
                    found,
                    expected: "a hash-map after '^'".to_string(),
                });
            }
            None => return Err(ParseError::UnexpectedEof("a hash-map after '^'".to_string())),
        };
        let form = self
            .parse_expr()
            .map_err(|err| eof_after(err, "with-meta"))?;
        Ok(Value::list(vec![Value::symbol("with-meta"), form, meta]))
    }

    /// Parses exactly one form. Trailing forms are rejected rather than
    /// silently dropped.
    pub fn parse(mut self) -> ParseResult<Value> {
        let expr = self.parse_expr()?;
        if let Some(found) = self.next_token() {
            Err(ParseError::UnexpectedToken {
                found,
                expected: "end of input".to_string(),
            })
        } else {
            Ok(expr)
        }
    }
}

fn eof_after(err: ParseError, name: &str) -> ParseError {
    match err {
        ParseError::UnexpectedEof(_) => ParseError::UnexpectedEof(format!("a form after {}", name)),
        other => other,
    }
}

/// Classifies an atom token: literal constants, integers, then symbols.
fn parse_atom(text: String, span: Span) -> ParseResult<Value> {
    match text.as_str() {
        "true" => return Ok(Value::Boolean(true)),
        "false" => return Ok(Value::Boolean(false)),
        "nil" => return Ok(Value::Nil),
        _ => {}
    }
    if !looks_like_integer(&text) {
        return Ok(Value::symbol(&text));
    }
    match text.parse::<i64>() {
        Ok(n) => Ok(Value::Number(n)),
        Err(_) => Err(ParseError::InvalidNumber { text, span }),
    }
}

fn looks_like_integer(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Reads a single form from a line of text.
pub fn read_str(input: &str) -> ParseResult<Value> {
    let tokens = crate::lexer::tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    Parser::new(tokens).parse()
}
