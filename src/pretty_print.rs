use crate::{Error, EvalError, ParseError};
use ariadne::{Label, Report, ReportKind, Source};
use std::io;
use std::ops::Range;

const SOURCE_ID: &str = "REPL";

fn print_report(input: &str, span: Range<usize>, message: String, label: String) -> io::Result<()> {
    Report::build(ReportKind::Error, (SOURCE_ID, span.clone()))
        .with_message(message)
        .with_label(Label::new((SOURCE_ID, span)).with_message(label))
        .finish()
        .eprint((SOURCE_ID, Source::from(input)))
}

impl ParseError {
    /// Writes a report pointing at the offending token to stderr.
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        let end = input.len();
        let (span, message, label) = match self {
            ParseError::UnexpectedToken { found, expected } => (
                found.span.to_range(),
                format!("Unexpected token: {}", found.kind),
                format!("Expected {expected}"),
            ),
            ParseError::UnexpectedEof(expected) => (
                end..end,
                "Unexpected end of input".to_string(),
                format!("Expected {expected}"),
            ),
            ParseError::Unterminated { form, close, span } => (
                span.to_range(),
                format!("Unterminated {form}"),
                format!("This is never closed with '{close}'"),
            ),
            ParseError::OddMapEntries(span) => (
                span.to_range(),
                "Odd number of forms in hash-map literal".to_string(),
                "The last key has no value".to_string(),
            ),
            ParseError::InvalidNumber { text, span } => (
                span.to_range(),
                format!("Invalid number: {text}"),
                "Does not fit in a 64-bit integer".to_string(),
            ),
            ParseError::Empty => (0..0, "Nothing to read".to_string(), "Expected a form".to_string()),
            ParseError::Lexer(lex_err) => (
                lex_err.span.to_range(),
                "Lexer Error".to_string(),
                lex_err.error.to_string(),
            ),
        };
        print_report(input, span, message, label)
    }
}

impl EvalError {
    fn headline(&self) -> &'static str {
        match self {
            EvalError::Env(_) => "Unbound symbol",
            EvalError::Construction(_) => "Construction error",
            EvalError::NotCallable(_) => "Not a function",
            EvalError::NotASymbol { .. } => "Not a symbol",
            EvalError::InvalidSpecialForm { .. } => "Invalid special form",
            EvalError::MalformedBindings { .. } => "Malformed bindings",
            EvalError::Arity { .. } => "Wrong number of arguments",
            EvalError::WrongType { .. } => "Wrong argument type",
            EvalError::DivisionByZero => "Division by zero",
            EvalError::Overflow(_) => "Integer overflow",
            EvalError::Output(_) => "Output error",
        }
    }

    /// Writes a report to stderr. Values carry no source positions, so the
    /// whole line is labelled.
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        let line = 0..input.trim_end().len();
        print_report(input, line, self.headline().to_string(), self.to_string())
    }
}

impl Error {
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        match self {
            Error::Parse(err) => err.pretty_print(input),
            Error::Eval(err) => err.pretty_print(input),
        }
    }
}
