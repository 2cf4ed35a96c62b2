use crate::environment::Environment;
use crate::evaluator::{EvalError, evaluate};
use crate::parser::{ParseError, read_str};
use crate::printer::pr_str;
use thiserror::Error;

/// Anything that can go wrong reading or evaluating one line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Eval(#[from] EvalError),
}

/// A read-eval-print session over one top-level environment. Definitions
/// made by one line are visible to the next.
#[derive(Debug)]
pub struct Session {
    env: Environment,
}

impl Session {
    pub fn new() -> Self {
        Session {
            env: Environment::new_global_populated(),
        }
    }

    /// The top-level environment lines are evaluated in.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Reads, evaluates and prints one line. Returns `Ok(None)` when the
    /// line holds no form.
    pub fn rep(&self, line: &str) -> Result<Option<String>, Error> {
        let form = match read_str(line) {
            Ok(form) => form,
            Err(ParseError::Empty) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = evaluate(&form, &self.env)?;
        Ok(Some(pr_str(&value)))
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}
