// Declare modules publicly so they are part of the library interface
pub mod config;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod printer;
pub mod session;
pub mod source;
pub mod types;

pub use environment::{EnvError, Environment};
pub use evaluator::{EvalError, EvalResult, apply, evaluate};
pub use lexer::{LexerError, Token, tokenize};
pub use parser::{ParseError, Parser, read_str};
pub use printer::pr_str;
pub use session::{Error, Session};
pub use source::Span;
pub use types::{Symbol, Value};
