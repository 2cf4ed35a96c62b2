use logos::Logos;
use std::fmt;
use thiserror::Error;

use crate::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[\s,]+")] // Skip whitespace and commas
#[logos(skip r";[^\n\r]*")] // Skip comments
#[logos(error = LexerErrorKind)]
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("'")]
    Quote,
    #[token("`")]
    QuasiQuote,
    #[token("~")]
    Unquote,
    #[token("~@")]
    SpliceUnquote,
    #[token("^")]
    Meta,
    #[token("@")]
    Deref,
    // The closing quote is optional so that an unterminated string is
    // reported as such instead of an invalid token.
    #[regex(r#""([^"\\]|\\[\s\S])*"?"#, |lex| unescape::unescape(lex.slice()))]
    String(String),
    // Everything else up to the next delimiter. true/false/nil and integers
    // are told apart from symbols by the parser.
    #[regex(r#"[^\s\[\]{}()'"`,;~^@][^\s\[\]{}()'"`,;]*"#, |lex| lex.slice().to_string())]
    Atom(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

mod unescape {
    use super::{LexerErrorKind, LexerResult};

    /// Decodes a string token, opening quote included. Only `\"`, `\n` and
    /// `\\` are accepted escapes.
    pub fn unescape(slice: &str) -> LexerResult<String> {
        let body = slice.strip_prefix('"').unwrap_or(slice);
        let mut result = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return Ok(result),
                '\\' => match chars.next() {
                    Some('n') => result.push('\n'),
                    Some('\\') => result.push('\\'),
                    Some('"') => result.push('"'),
                    Some(c) => return Err(LexerErrorKind::UnknownEscapeSequence(c)),
                    None => return Err(LexerErrorKind::UnterminatedString),
                },
                c => result.push(c),
            }
        }
        Err(LexerErrorKind::UnterminatedString)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Quote => write!(f, "'"),
            TokenKind::QuasiQuote => write!(f, "`"),
            TokenKind::Unquote => write!(f, "~"),
            TokenKind::SpliceUnquote => write!(f, "~@"),
            TokenKind::Meta => write!(f, "^"),
            TokenKind::Deref => write!(f, "@"),
            TokenKind::String(s) => write!(f, "{:?}", s), // Display with quotes for clarity
            TokenKind::Atom(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Error, Default, Debug, Clone, PartialEq)]
pub enum LexerErrorKind {
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Unknown escape sequence: '\\{0}'")]
    UnknownEscapeSequence(char),
    #[default]
    #[error("Invalid Token")]
    InvalidToken,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct LexerError {
    pub error: LexerErrorKind,
    pub span: Span,
}

type LexerResult<T> = Result<T, LexerErrorKind>;

type LexerRangedResult<T> = Result<T, LexerError>;

/// Scans the whole input left to right into an ordered token sequence.
/// Comments, whitespace and commas never reach the parser.
pub fn tokenize(input: &str) -> LexerRangedResult<Vec<Token>> {
    TokenKind::lexer(input)
        .spanned()
        .map(|(result, range)| match result {
            Ok(kind) => Ok(Token {
                kind,
                span: range.into(),
            }),
            Err(error) => Err(LexerError {
                error,
                span: range.into(),
            }),
        })
        .collect()
}
