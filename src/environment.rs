use crate::primitives;
use crate::types::{ParamSpec, PrimitiveFunc, Symbol, Value};
use gc::{Finalize, Gc, GcCell, Trace};
use log::trace;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("'{0}' not found")]
    UnboundSymbol(String),
}

#[derive(Trace, Finalize)]
struct Frame {
    outer: Option<Environment>,
    bindings: HashMap<Symbol, Value>,
}

/// A handle to one scope in a chain of lexical scopes.
///
/// Cloning the handle shares the scope. Frames live on the garbage collected
/// heap, so a closure stored in the scope it captured is still reclaimed.
#[derive(Clone, Trace, Finalize)]
pub struct Environment {
    frame: Gc<GcCell<Frame>>,
}

impl Environment {
    /// Creates a new, top-level (global) environment.
    pub fn new() -> Self {
        Environment::with_outer(None)
    }

    fn with_outer(outer: Option<Environment>) -> Self {
        Environment {
            frame: Gc::new(GcCell::new(Frame {
                outer,
                bindings: HashMap::new(),
            })),
        }
    }

    /// Creates a top-level environment holding every primitive.
    pub fn new_global_populated() -> Self {
        let env = Environment::new();
        for &(name, func) in primitives::PRIMITIVES {
            env.add_primitive(name, func);
        }
        env.set(Symbol::new("nil"), Value::Nil);
        env
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer: &Environment) -> Self {
        Environment::with_outer(Some(outer.clone()))
    }

    /// Creates a scope for a function application, binding `params`
    /// positionally against `args`. A rest parameter collects every
    /// argument past the fixed ones into a list.
    ///
    /// Arity is the caller's responsibility: missing arguments leave their
    /// parameters unbound.
    pub fn bind(outer: &Environment, params: &ParamSpec, args: Vec<Value>) -> Self {
        let env = Environment::new_enclosed(outer);
        let mut args = args.into_iter();
        for (name, value) in params.fixed.iter().zip(args.by_ref()) {
            env.set(name.clone(), value);
        }
        if let Some(rest) = &params.rest {
            env.set(rest.clone(), Value::List(args.collect()));
        }
        env
    }

    /// Binds `name` in this scope only, replacing any existing binding here.
    pub fn set(&self, name: Symbol, value: Value) {
        trace!("binding '{}'", name);
        self.frame.borrow_mut().bindings.insert(name, value);
    }

    /// Looks a symbol up, walking outward through enclosing scopes.
    pub fn get(&self, name: &Symbol) -> Result<Value, EnvError> {
        let frame = self.frame.borrow();
        match frame.bindings.get(name) {
            Some(value) => Ok(value.clone()),
            None => match &frame.outer {
                Some(outer) => outer.get(name),
                None => Err(EnvError::UnboundSymbol(name.to_string())),
            },
        }
    }

    /// Checks whether `name` is bound in this scope, ignoring outer scopes.
    pub fn contains_local(&self, name: &Symbol) -> bool {
        self.frame.borrow().bindings.contains_key(name)
    }

    fn add_primitive(&self, name: &'static str, func: PrimitiveFunc) {
        self.set(Symbol::new(name), Value::primitive(name, func));
    }

    /// Gets every identifier visible from this scope.
    pub fn get_identifiers(&self) -> HashSet<String> {
        let frame = self.frame.borrow();
        let mut identifiers: HashSet<String> =
            frame.bindings.keys().map(|i| i.to_string()).collect();
        if let Some(outer) = &frame.outer {
            identifiers.extend(outer.get_identifiers());
        }
        identifiers
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

// Scopes routinely reach themselves through closures, so never print bindings.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Environment({} bindings)",
            self.frame.borrow().bindings.len()
        )
    }
}
