use crate::environment::{EnvError, Environment};
use crate::printer::pr_str;
use crate::types::{
    Closure, ConstructionError, Function, List, MalMap, ParamSpec, Symbol, VARIADIC_MARKER, Value,
};
use log::{debug, trace};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// How many arguments something accepts, for error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
            Arity::Range(min, max) => write!(f, "between {} and {}", min, max),
        }
    }
}

// --- Evaluation Error ---
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error("expected a function, but got: {0}")]
    NotCallable(String),
    #[error("'{form}' expects a symbol, but got: {found}")]
    NotASymbol { form: &'static str, found: String },
    #[error("invalid '{form}' form: {message}")]
    InvalidSpecialForm { form: &'static str, message: String },
    #[error("malformed '{form}' bindings: {message}")]
    MalformedBindings { form: &'static str, message: String },
    #[error("'{name}' expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: Arity,
        got: usize,
    },
    #[error("{name}: expected {expected}, got {got}")]
    WrongType {
        name: &'static str,
        expected: &'static str,
        got: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in '{0}'")]
    Overflow(&'static str),
    #[error("could not write output: {0}")]
    Output(String),
}

// Result type alias for convenience
pub type EvalResult<T = Value> = Result<T, EvalError>;

const SPECIAL_FORMS: &[&str] = &["def!", "let*", "do", "if", "fn*", "quote"];

/// Names the evaluator handles itself rather than looking up.
pub fn special_form_identifiers() -> HashSet<String> {
    SPECIAL_FORMS.iter().map(|name| name.to_string()).collect()
}

// --- Evaluate Function ---

/// Evaluates a form within the specified environment.
pub fn evaluate(form: &Value, env: &Environment) -> EvalResult {
    match form {
        // Keywords evaluate to themselves, other symbols are looked up
        Value::Symbol(sym) if sym.is_keyword() => Ok(form.clone()),
        Value::Symbol(sym) => Ok(env.get(sym)?),

        // The empty list is never a call
        Value::List(list) if list.is_empty() => Ok(form.clone()),
        Value::List(list) => evaluate_list(list, env),

        Value::Vector(items) => Ok(Value::vector(evaluate_all(items.iter(), env)?)),
        Value::HashMap(map) => evaluate_hash_map(map, env),

        Value::Nil
        | Value::Boolean(_)
        | Value::Number(_)
        | Value::String(_)
        | Value::Pair(_)
        | Value::Function(_) => Ok(form.clone()),
    }
}

fn evaluate_all<'a>(
    forms: impl Iterator<Item = &'a Value>,
    env: &Environment,
) -> EvalResult<Vec<Value>> {
    forms.map(|form| evaluate(form, env)).collect()
}

fn evaluate_hash_map(map: &MalMap, env: &Environment) -> EvalResult {
    let mut result = MalMap::new();
    for (key, value) in map.iter() {
        let key = evaluate(key, env)?;
        let value = evaluate(value, env)?;
        result.insert(key, value);
    }
    Ok(Value::hash_map(result))
}

type SpecialForm = fn(&[Value], &Environment) -> EvalResult;

fn special_form(name: &str) -> Option<SpecialForm> {
    let form: SpecialForm = match name {
        "def!" => evaluate_def,
        "let*" => evaluate_let,
        "do" => evaluate_do,
        "if" => evaluate_if,
        "fn*" => evaluate_fn,
        "quote" => |operands, _| evaluate_quote(operands),
        _ => return None,
    };
    Some(form)
}

fn evaluate_list(list: &List, env: &Environment) -> EvalResult {
    if let Some(Value::Symbol(sym)) = list.first() {
        if let Some(form) = special_form(sym.name()) {
            trace!("special form '{}'", sym);
            return form(&list.rest().to_vec(), env);
        }
    }
    evaluate_call(list, env)
}

fn evaluate_call(list: &List, env: &Environment) -> EvalResult {
    // Head and operands are evaluated left to right before the head is checked
    let mut values = evaluate_all(list.iter(), env)?;
    let args = values.split_off(1);
    match &values[0] {
        Value::Function(function) => apply(function, args),
        other => Err(EvalError::NotCallable(pr_str(other))),
    }
}

/// Applies a function to already evaluated arguments.
pub fn apply(function: &Function, args: Vec<Value>) -> EvalResult {
    match function {
        Function::Primitive(primitive) => {
            trace!("applying primitive '{}' to {} args", primitive.name, args.len());
            (primitive.func)(&args)
        }
        Function::Closure(closure) => {
            check_closure_arity(&closure.params, args.len())?;
            trace!("applying closure to {} args", args.len());
            let call_env = Environment::bind(&closure.env, &closure.params, args);
            evaluate(&closure.body, &call_env)
        }
    }
}

fn check_closure_arity(params: &ParamSpec, got: usize) -> Result<(), EvalError> {
    let fixed = params.fixed.len();
    let expected = match params.rest {
        Some(_) if got < fixed => Arity::AtLeast(fixed),
        None if got != fixed => Arity::Exact(fixed),
        _ => return Ok(()),
    };
    Err(EvalError::Arity {
        name: "#<function>".to_string(),
        expected,
        got,
    })
}

fn expect_symbol(value: &Value, form: &'static str) -> EvalResult<Symbol> {
    match value {
        Value::Symbol(sym) => Ok(sym.clone()),
        other => Err(EvalError::NotASymbol {
            form,
            found: pr_str(other),
        }),
    }
}

// Binding and parameter forms accept either brackets or parens.
fn sequence_form(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::List(list) => Some(list.to_vec()),
        Value::Vector(items) => Some(items.to_vec()),
        _ => None,
    }
}

fn evaluate_def(operands: &[Value], env: &Environment) -> EvalResult {
    let [name, expr] = operands else {
        return Err(EvalError::InvalidSpecialForm {
            form: "def!",
            message: format!("expected a name and a value, got {} operands", operands.len()),
        });
    };
    let name = expect_symbol(name, "def!")?;
    // Nothing is bound if the value fails to evaluate
    let value = evaluate(expr, env)?;
    debug!("def! {} = {}", name, value);
    env.set(name, value.clone());
    Ok(value)
}

fn evaluate_let(operands: &[Value], env: &Environment) -> EvalResult {
    let (bindings, body) = match operands {
        [bindings] => (bindings, None),
        [bindings, body] => (bindings, Some(body)),
        _ => {
            return Err(EvalError::InvalidSpecialForm {
                form: "let*",
                message: format!(
                    "expected bindings and an optional body, got {} operands",
                    operands.len()
                ),
            });
        }
    };
    let items = sequence_form(bindings).ok_or_else(|| EvalError::MalformedBindings {
        form: "let*",
        message: format!("expected a list or vector, got {}", bindings.type_name()),
    })?;
    if items.len() % 2 != 0 {
        return Err(EvalError::MalformedBindings {
            form: "let*",
            message: format!("expected an even number of forms, got {}", items.len()),
        });
    }

    // Each binding is visible to the ones after it
    let let_env = Environment::new_enclosed(env);
    for binding in items.chunks(2) {
        let name = expect_symbol(&binding[0], "let*")?;
        let value = evaluate(&binding[1], &let_env)?;
        let_env.set(name, value);
    }
    match body {
        Some(body) => evaluate(body, &let_env),
        None => Ok(Value::Nil),
    }
}

fn evaluate_do(operands: &[Value], env: &Environment) -> EvalResult {
    let mut result = Value::Nil;
    for operand in operands {
        result = evaluate(operand, env)?;
    }
    Ok(result)
}

fn evaluate_if(operands: &[Value], env: &Environment) -> EvalResult {
    let (condition, consequent, alternate) = match operands {
        [condition, consequent] => (condition, consequent, None),
        [condition, consequent, alternate] => (condition, consequent, Some(alternate)),
        _ => {
            return Err(EvalError::InvalidSpecialForm {
                form: "if",
                message: "expected condition, consequent, and optional alternate".to_string(),
            });
        }
    };
    if evaluate(condition, env)?.is_truthy() {
        evaluate(consequent, env)
    } else {
        match alternate {
            Some(alternate) => evaluate(alternate, env),
            None => Ok(Value::Nil),
        }
    }
}

fn evaluate_fn(operands: &[Value], env: &Environment) -> EvalResult {
    let (params, body) = match operands {
        [params] => (params, None),
        [params, body] => (params, Some(body)),
        _ => {
            return Err(EvalError::InvalidSpecialForm {
                form: "fn*",
                message: format!(
                    "expected parameters and a single body form, got {} operands",
                    operands.len()
                ),
            });
        }
    };
    Ok(Value::closure(Closure {
        params: parse_params(params)?,
        body: body.cloned().unwrap_or(Value::Nil),
        env: env.clone(),
    }))
}

/// Splits a parameter list into fixed names and an optional rest name
/// following `&`.
fn parse_params(params: &Value) -> EvalResult<ParamSpec> {
    let items = sequence_form(params).ok_or_else(|| EvalError::InvalidSpecialForm {
        form: "fn*",
        message: format!(
            "parameters must be a list or vector, got {}",
            params.type_name()
        ),
    })?;
    let mut names = items
        .iter()
        .map(|item| expect_symbol(item, "fn*"))
        .collect::<EvalResult<Vec<Symbol>>>()?;

    match names.iter().position(|name| name.name() == VARIADIC_MARKER) {
        None => Ok(ParamSpec {
            fixed: names,
            rest: None,
        }),
        Some(index) if index + 2 == names.len() => {
            let rest = names.pop();
            names.truncate(index);
            Ok(ParamSpec { fixed: names, rest })
        }
        Some(_) => Err(EvalError::InvalidSpecialForm {
            form: "fn*",
            message: format!("'{}' must be followed by exactly one parameter", VARIADIC_MARKER),
        }),
    }
}

fn evaluate_quote(operands: &[Value]) -> EvalResult {
    match operands {
        [form] => Ok(form.clone()),
        _ => Err(EvalError::InvalidSpecialForm {
            form: "quote",
            message: "quote expects exactly one argument".to_string(),
        }),
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read_str;

    fn eval_str(input: &str, env: &Environment) -> EvalResult {
        match read_str(input) {
            Ok(form) => evaluate(&form, env),
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        }
    }

    // Evaluates in a fresh global environment and compares printed output
    fn assert_eval(input: &str, expected: &str) {
        let env = Environment::new_global_populated();
        assert_eval_in(input, expected, &env);
    }

    fn assert_eval_in(input: &str, expected: &str, env: &Environment) {
        match eval_str(input, env) {
            Ok(result) => assert_eq!(pr_str(&result), expected, "Input: '{}'", input),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    fn assert_eval_error(input: &str, expected_error_variant: &EvalError) {
        let env = Environment::new_global_populated();
        match eval_str(input, &env) {
            Ok(result) => panic!(
                "Expected evaluation to fail for input '{}', but got: {:?}",
                input, result
            ),
            Err(e) => {
                assert_eq!(
                    std::mem::discriminant(&e),
                    std::mem::discriminant(expected_error_variant),
                    "Input: '{}', Expected error variant like {:?}, got: {:?}",
                    input,
                    expected_error_variant,
                    e
                );
            }
        }
    }

    fn invalid_form() -> EvalError {
        EvalError::InvalidSpecialForm {
            form: "",
            message: String::new(),
        }
    }

    fn arity() -> EvalError {
        EvalError::Arity {
            name: String::new(),
            expected: Arity::Exact(0),
            got: 0,
        }
    }

    #[test]
    fn test_eval_self_evaluating() {
        assert_eval("42", "42");
        assert_eval("true", "true");
        assert_eval("false", "false");
        assert_eval("nil", "nil");
        assert_eval(r#""abc""#, r#""abc""#);
        assert_eval(":kw", ":kw");
        assert_eval("()", "()");
    }

    #[test]
    fn test_eval_collections_elementwise() {
        assert_eval("[1 (+ 1 1) 3]", "[1 2 3]");
        assert_eval("{:a (+ 1 2)}", "{:a 3}");
        assert_eval("(let* (k :a) {k 1 :b 2})", "{:a 1 :b 2}");
        // Keys that evaluate equal collapse, later wins
        assert_eval("(let* (x :a y :a) {x 1 y 2})", "{:a 2}");
        assert_eval("{:a 1 :b 2 :a 3}", "{:a 3 :b 2}");
        assert_eval("[]", "[]");
    }

    #[test]
    fn test_map_literal_evaluates_overwritten_entries() {
        assert_eval("(do {:a (def! x 1) :a 2} x)", "1");
        assert_eval("(do {:a 1 :a (def! y 2)} y)", "2");
        // Both keys are still evaluated, so the list key is a failed call
        assert_eval_error("{[1] 1 (1) 2}", &EvalError::NotCallable(String::new()));
    }

    #[test]
    fn test_eval_symbol_lookup() {
        let env = Environment::new();
        env.set(Symbol::new("x"), Value::Number(100));
        assert_eval_in("x", "100", &env);
        assert_eq!(
            eval_str("y", &env),
            Err(EvalError::Env(EnvError::UnboundSymbol("y".to_string())))
        );
    }

    #[test]
    fn test_unbound_symbol_names_it() {
        let env = Environment::new_global_populated();
        let err = eval_str("(+ 1 undefined-thing)", &env).unwrap_err();
        assert_eq!(err.to_string(), "'undefined-thing' not found");
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eval("(+ 1 2 3)", "6");
        assert_eval("(- 10 3 2)", "5");
        assert_eval("(* 2 3 4)", "24");
        assert_eval("(/ 7 2)", "3");
        assert_eval("(-)", "0");
        assert_eval("(*)", "1");
        assert_eval("(+ 1 (* 2 3))", "7");
        assert_eval("(- (+ 5 5) (* 2 3))", "4");
    }

    #[test]
    fn test_def() {
        let env = Environment::new_global_populated();
        assert_eval_in("(def! x (+ 1 2))", "3", &env);
        assert_eval_in("x", "3", &env);
        assert_eval_in("(def! x 7)", "7", &env);
        assert_eval_in("x", "7", &env);

        assert_eval_error("(def! x)", &invalid_form());
        assert_eval_error("(def! x 1 2)", &invalid_form());
        assert_eval_error(
            "(def! 1 2)",
            &EvalError::NotASymbol {
                form: "",
                found: String::new(),
            },
        );
    }

    #[test]
    fn test_def_inside_let_stays_local() {
        let env = Environment::new_global_populated();
        assert_eval_in("(let* (a 1) (def! inner a))", "1", &env);
        assert!(eval_str("inner", &env).is_err());
    }

    #[test]
    fn test_failed_def_commits_nothing() {
        let env = Environment::new_global_populated();
        assert!(eval_str("(def! x (car 5))", &env).is_err());
        assert!(eval_str("x", &env).is_err());

        // Bindings made before the failure point persist
        assert!(eval_str("(do (def! a 1) (car 5) (def! b 2))", &env).is_err());
        assert_eval_in("a", "1", &env);
        assert!(eval_str("b", &env).is_err());
    }

    #[test]
    fn test_let_sequential_bindings() {
        assert_eval("(let* (x 1 y (+ x 1)) (+ x y))", "3");
        assert_eval("(let* [x 2 y x] (* x y))", "4");
        assert_eval("(let* (x 1))", "nil");
        assert_eval("(let* () 5)", "5");
        assert_eval("(let* (x 1) (let* (x 2) x))", "2");
    }

    #[test]
    fn test_let_bindings_do_not_leak() {
        let env = Environment::new_global_populated();
        assert_eval_in("(let* (hidden 1) hidden)", "1", &env);
        assert_eq!(
            eval_str("hidden", &env),
            Err(EvalError::Env(EnvError::UnboundSymbol("hidden".to_string())))
        );
        assert_eval_in("((fn* (param) param) 1)", "1", &env);
        assert!(eval_str("param", &env).is_err());
    }

    #[test]
    fn test_let_errors() {
        let malformed = EvalError::MalformedBindings {
            form: "",
            message: String::new(),
        };
        assert_eval_error("(let* (x) x)", &malformed);
        assert_eval_error("(let* (x 1 y) x)", &malformed);
        assert_eval_error("(let* 5 x)", &malformed);
        assert_eval_error("(let*)", &invalid_form());
        assert_eval_error("(let* (x 1) x x)", &invalid_form());
    }

    #[test]
    fn test_do() {
        assert_eval("(do 1 2 3)", "3");
        assert_eval("(do)", "nil");
        let env = Environment::new_global_populated();
        assert_eval_in("(do (def! a 1) (def! b (+ a 1)) (+ a b))", "3", &env);
    }

    #[test]
    fn test_if() {
        assert_eval("(if true 1 2)", "1");
        assert_eval("(if false 1 2)", "2");
        assert_eval("(if nil 1 2)", "2");
        assert_eval("(if 0 1 2)", "1");
        assert_eval("(if () 1 2)", "1");
        assert_eval(r#"(if "" 1 2)"#, "1");
        assert_eval("(if false 1)", "nil");
        assert_eval("(if true 1)", "1");
    }

    #[test]
    fn test_if_does_not_evaluate_unused_branch() {
        assert_eval("(if true :good unbound-variable)", ":good");
        assert_eval("(if false unbound-variable :good)", ":good");
    }

    #[test]
    fn test_if_errors() {
        assert_eval_error("(if)", &invalid_form());
        assert_eval_error("(if true)", &invalid_form());
        assert_eval_error("(if true 1 2 3)", &invalid_form());
        assert_eval_error(
            "(if unbound 1 2)",
            &EvalError::Env(EnvError::UnboundSymbol(String::new())),
        );
    }

    #[test]
    fn test_fn_closures() {
        assert_eval("((fn* (a b) (+ a b)) 2 3)", "5");
        assert_eval("((fn* [] 7))", "7");
        assert_eval("((fn* ()))", "nil");
        assert_eval(
            "(let* (make-adder (fn* (n) (fn* (x) (+ x n)))) ((make-adder 5) 10))",
            "15",
        );
        assert_eval("(fn* (x) x)", "#<function>");
    }

    #[test]
    fn test_variadic_params() {
        assert_eval("((fn* (a & rest) rest) 1 2 3)", "(2 3)");
        assert_eval("((fn* (a & rest) (count rest)) 1 2 3)", "2");
        assert_eval("((fn* (a & rest) rest) 1)", "()");
        assert_eval("((fn* (& all) all) 1 2)", "(1 2)");
        assert_eval("((fn* [a & more] a) :first :second)", ":first");
    }

    #[test]
    fn test_fn_param_errors() {
        assert_eval_error("(fn* (a &) a)", &invalid_form());
        assert_eval_error("(fn* (& a b) a)", &invalid_form());
        assert_eval_error("(fn* 5 a)", &invalid_form());
        assert_eval_error("(fn*)", &invalid_form());
        assert_eval_error(
            "(fn* (1) 1)",
            &EvalError::NotASymbol {
                form: "",
                found: String::new(),
            },
        );
    }

    #[test]
    fn test_closure_arity() {
        assert_eval_error("((fn* (a b) a) 1)", &arity());
        assert_eval_error("((fn* (a) a) 1 2)", &arity());
        assert_eval_error("((fn* (a b & c) a) 1)", &arity());
        let env = Environment::new_global_populated();
        let err = eval_str("((fn* (a & c) a))", &env).unwrap_err();
        assert_eq!(
            err,
            EvalError::Arity {
                name: "#<function>".to_string(),
                expected: Arity::AtLeast(1),
                got: 0,
            }
        );
    }

    #[test]
    fn test_recursion_through_global_binding() {
        let env = Environment::new_global_populated();
        eval_str(
            "(def! fact (fn* (n) (if (< n 2) 1 (* n (fact (- n 1))))))",
            &env,
        )
        .unwrap();
        gc::force_collect();
        assert_eval_in("(fact 10)", "3628800", &env);
        eval_str(
            "(def! fib (fn* (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))))",
            &env,
        )
        .unwrap();
        assert_eval_in("(fib 15)", "610", &env);
    }

    #[test]
    fn test_closure_sees_later_defs_in_captured_scope() {
        let env = Environment::new_global_populated();
        eval_str("(def! get-y (fn* () y))", &env).unwrap();
        assert!(eval_str("(get-y)", &env).is_err());
        eval_str("(def! y 9)", &env).unwrap();
        assert_eval_in("(get-y)", "9", &env);
    }

    #[test]
    fn test_quote() {
        assert_eval("'a", "a");
        assert_eval("'(1 (+ 2 3))", "(1 (+ 2 3))");
        assert_eval("(quote [x y])", "[x y]");
        assert_eval_error("(quote a b)", &invalid_form());
        assert_eval_error("(quote)", &invalid_form());
    }

    #[test]
    fn test_not_callable_head() {
        let not_callable = EvalError::NotCallable(String::new());
        assert_eval_error("(1 2 3)", &not_callable);
        assert_eval_error(r#"("hello" 1)"#, &not_callable);
        assert_eval_error("((list 1 2) 3)", &not_callable);
        assert_eval_error("(:kw 1)", &not_callable);
    }

    #[test]
    fn test_call_evaluates_operands_before_checking_head() {
        // The unbound operand is reported, not the bad head
        assert_eval_error(
            "(1 missing)",
            &EvalError::Env(EnvError::UnboundSymbol(String::new())),
        );
    }

    #[test]
    fn test_functions_are_first_class() {
        assert_eval("((if true + -) 5 3)", "8");
        assert_eval("(let* (f car) (f (list 4 5)))", "4");
        assert_eval("+", "#<primitive:+>");
    }

    mod capture {
        use log::{Level, LevelFilter, Log, Metadata, Record};
        use std::cell::RefCell;
        use std::sync::Once;

        thread_local! {
            static LINES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
        }

        struct CaptureLogger;

        impl Log for CaptureLogger {
            fn enabled(&self, metadata: &Metadata) -> bool {
                metadata.level() <= Level::Trace
            }

            fn log(&self, record: &Record) {
                LINES.with(|lines| lines.borrow_mut().push(record.args().to_string()));
            }

            fn flush(&self) {}
        }

        static LOGGER: CaptureLogger = CaptureLogger;
        static INIT: Once = Once::new();

        // Records this thread's log lines while `f` runs
        pub fn logged_lines(f: impl FnOnce()) -> Vec<String> {
            INIT.call_once(|| {
                log::set_logger(&LOGGER).expect("logger already set");
                log::set_max_level(LevelFilter::Trace);
            });
            LINES.with(|lines| lines.borrow_mut().clear());
            f();
            LINES.with(|lines| lines.borrow_mut().drain(..).collect())
        }
    }

    #[test]
    fn test_special_form_traced_before_its_operands_run() {
        let env = Environment::new_global_populated();
        let lines = capture::logged_lines(|| assert_eval_in("(if true (do 1) 2)", "1", &env));
        let position = |needle: &str| {
            lines
                .iter()
                .position(|line| line == needle)
                .unwrap_or_else(|| panic!("'{}' not logged in {:?}", needle, lines))
        };
        assert!(position("special form 'if'") < position("special form 'do'"));

        let lines = capture::logged_lines(|| assert!(eval_str("(do (car 5))", &env).is_err()));
        assert_eq!(lines.first().map(String::as_str), Some("special form 'do'"));
    }

    #[test]
    fn test_special_form_identifiers() {
        let identifiers = special_form_identifiers();
        for name in ["def!", "let*", "do", "if", "fn*"] {
            assert!(identifiers.contains(name));
        }
    }
}
