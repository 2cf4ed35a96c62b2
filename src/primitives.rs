use crate::evaluator::{Arity, EvalError, EvalResult};
use crate::printer::pr_str;
use crate::types::{Pair, PrimitiveFunc, Value};
use std::io::{self, Write};

/// Every primitive bound in the top-level environment.
pub const PRIMITIVES: &[(&str, PrimitiveFunc)] = &[
    ("+", prim_add),
    ("-", prim_sub),
    ("*", prim_mul),
    ("/", prim_div),
    ("=", prim_equals),
    ("<", prim_less_than),
    ("<=", prim_less_than_or_equals),
    (">", prim_greater_than),
    (">=", prim_greater_than_or_equals),
    ("cons", prim_cons),
    ("list", prim_list),
    ("list?", prim_is_list),
    ("empty?", prim_is_empty),
    ("count", prim_count),
    ("type", prim_type),
    ("pair?", prim_is_pair),
    ("car", prim_car),
    ("cdr", prim_cdr),
    ("prn", prim_prn),
];

fn arity_error(name: &str, expected: Arity, got: usize) -> EvalError {
    EvalError::Arity {
        name: name.to_string(),
        expected,
        got,
    }
}

fn wrong_type(name: &'static str, expected: &'static str, got: &Value) -> EvalError {
    EvalError::WrongType {
        name,
        expected,
        got: got.type_name(),
    }
}

// Checks the number of arguments
macro_rules! check_arity {
    // Variant for minimum number of args
    ($args:expr, min $expected:expr, $name:expr) => {
        if $args.len() < $expected {
            return Err(arity_error($name, Arity::AtLeast($expected), $args.len()));
        }
    };
    // Variant for range of args (inclusive)
    ($args:expr, $min:expr, $max:expr, $name:expr) => {
        if !($min..=$max).contains(&$args.len()) {
            return Err(arity_error($name, Arity::Range($min, $max), $args.len()));
        }
    };
    ($args:expr, $expected:expr, $name:expr) => {
        if $args.len() != $expected {
            return Err(arity_error($name, Arity::Exact($expected), $args.len()));
        }
    };
}

fn expect_number(value: &Value, name: &'static str) -> EvalResult<i64> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(wrong_type(name, "number", other)),
    }
}

fn expect_numbers(args: &[Value], name: &'static str) -> EvalResult<Vec<i64>> {
    args.iter().map(|arg| expect_number(arg, name)).collect()
}

fn fold_numbers(
    args: &[Value],
    name: &'static str,
    start: i64,
    func: fn(i64, i64) -> Option<i64>,
) -> EvalResult {
    args.iter()
        .try_fold(start, |acc, arg| {
            func(acc, expect_number(arg, name)?).ok_or(EvalError::Overflow(name))
        })
        .map(Value::Number)
}

fn compare_numbers(args: &[Value], name: &'static str, compare: fn(i64, i64) -> bool) -> EvalResult {
    check_arity!(args, min 2, name);
    let numbers = expect_numbers(args, name)?;
    Ok(Value::Boolean(
        numbers.windows(2).all(|pair| compare(pair[0], pair[1])),
    ))
}

// --- Arithmetic Primitives ---

pub fn prim_add(args: &[Value]) -> EvalResult {
    // (+) -> 0
    // (+ 1 2 3) -> 6
    fold_numbers(args, "+", 0, i64::checked_add)
}

pub fn prim_sub(args: &[Value]) -> EvalResult {
    // (-) -> 0
    // (- x) -> x
    // (- x y z) -> x - y - z
    match args {
        [] => Ok(Value::Number(0)),
        [only] => Ok(Value::Number(expect_number(only, "-")?)),
        [first, rest @ ..] => fold_numbers(rest, "-", expect_number(first, "-")?, i64::checked_sub),
    }
}

pub fn prim_mul(args: &[Value]) -> EvalResult {
    // (*) -> 1
    // (* 1 2 3) -> 6
    fold_numbers(args, "*", 1, i64::checked_mul)
}

pub fn prim_div(args: &[Value]) -> EvalResult {
    // (/) -> 1
    // (/ x) -> floor(1 / x)
    // (/ x y z) -> floor(x / (y * z))
    let numbers = expect_numbers(args, "/")?;
    let (dividend, divisors) = match numbers.as_slice() {
        [] => return Ok(Value::Number(1)),
        [only] => (1, std::slice::from_ref(only)),
        [first, rest @ ..] => (*first, rest),
    };
    if divisors.contains(&0) {
        return Err(EvalError::DivisionByZero);
    }

    let product = divisors
        .iter()
        .try_fold(1i128, |acc, &divisor| acc.checked_mul(i128::from(divisor)));
    let quotient = match product {
        Some(divisor) => floor_div(i128::from(dividend), divisor),
        // The divisor outweighs any i64, so only the sign of the result is left
        None => {
            let negative_divisor = divisors.iter().filter(|&&d| d < 0).count() % 2 == 1;
            if dividend == 0 || (dividend < 0) == negative_divisor {
                0
            } else {
                -1
            }
        }
    };
    i64::try_from(quotient)
        .map(Value::Number)
        .map_err(|_| EvalError::Overflow("/"))
}

fn floor_div(dividend: i128, divisor: i128) -> i128 {
    let quotient = dividend / divisor;
    if dividend % divisor != 0 && (dividend < 0) != (divisor < 0) {
        quotient - 1
    } else {
        quotient
    }
}

// --- Comparison Primitives ---

pub fn prim_equals(args: &[Value]) -> EvalResult {
    check_arity!(args, min 1, "=");
    Ok(Value::Boolean(args.windows(2).all(|pair| pair[0] == pair[1])))
}

pub fn prim_less_than(args: &[Value]) -> EvalResult {
    compare_numbers(args, "<", |left, right| left < right)
}

pub fn prim_less_than_or_equals(args: &[Value]) -> EvalResult {
    compare_numbers(args, "<=", |left, right| left <= right)
}

pub fn prim_greater_than(args: &[Value]) -> EvalResult {
    compare_numbers(args, ">", |left, right| left > right)
}

pub fn prim_greater_than_or_equals(args: &[Value]) -> EvalResult {
    compare_numbers(args, ">=", |left, right| left >= right)
}

// --- List Primitives ---

pub fn prim_cons(args: &[Value]) -> EvalResult {
    // (cons item list) -> list with item prepended
    // (cons a b) -> (a . b)
    check_arity!(args, 0, 2, "cons");
    let cdr = args.get(1).cloned().unwrap_or(Value::Nil);
    if let (Some(car), Value::List(list)) = (args.first(), &cdr) {
        return Ok(Value::List(list.cons(car.clone())));
    }
    Ok(Value::pair(Pair::try_new(args.first().cloned(), cdr)?))
}

pub fn prim_list(args: &[Value]) -> EvalResult {
    Ok(Value::list(args.to_vec()))
}

pub fn prim_car(args: &[Value]) -> EvalResult {
    check_arity!(args, 1, "car");
    match &args[0] {
        Value::Pair(pair) => Ok(pair.car.clone()),
        Value::List(list) => list
            .first()
            .cloned()
            .ok_or_else(|| wrong_type("car", "pair", &args[0])),
        other => Err(wrong_type("car", "pair", other)),
    }
}

pub fn prim_cdr(args: &[Value]) -> EvalResult {
    check_arity!(args, 1, "cdr");
    match &args[0] {
        Value::Pair(pair) => Ok(pair.cdr.clone()),
        Value::List(list) => Ok(Value::List(list.rest())),
        Value::Nil => Ok(Value::Nil),
        other => Err(wrong_type("cdr", "pair", other)),
    }
}

pub fn prim_count(args: &[Value]) -> EvalResult {
    check_arity!(args, 1, "count");
    let count = match &args[0] {
        Value::Nil => 0,
        Value::List(list) => list.len(),
        Value::Vector(items) => items.len(),
        Value::HashMap(map) => map.len(),
        pair @ Value::Pair(_) => pair
            .sequence_items()
            .map(|items| items.len())
            .ok_or_else(|| wrong_type("count", "proper list", pair))?,
        other => return Err(wrong_type("count", "sequence", other)),
    };
    i64::try_from(count)
        .map(Value::Number)
        .map_err(|_| EvalError::Overflow("count"))
}

// --- Type Predicates ---

pub fn prim_is_list(args: &[Value]) -> EvalResult {
    check_arity!(args, 1, "list?");
    Ok(Value::Boolean(match &args[0] {
        Value::List(_) => true,
        pair @ Value::Pair(_) => pair.sequence_items().is_some(),
        _ => false,
    }))
}

pub fn prim_is_pair(args: &[Value]) -> EvalResult {
    check_arity!(args, 1, "pair?");
    Ok(Value::Boolean(match &args[0] {
        Value::Pair(_) => true,
        Value::List(list) => !list.is_empty(),
        _ => false,
    }))
}

pub fn prim_is_empty(args: &[Value]) -> EvalResult {
    check_arity!(args, 1, "empty?");
    let empty = match &args[0] {
        Value::Nil => true,
        Value::List(list) => list.is_empty(),
        Value::Vector(items) => items.is_empty(),
        Value::HashMap(map) => map.is_empty(),
        Value::Pair(_) => false,
        other => return Err(wrong_type("empty?", "sequence", other)),
    };
    Ok(Value::Boolean(empty))
}

pub fn prim_type(args: &[Value]) -> EvalResult {
    // (type 1) -> :number
    check_arity!(args, 1, "type");
    Ok(Value::symbol(&format!(":{}", args[0].type_name())))
}

// --- Output ---

/// Writes the readable forms of `args` separated by spaces, then a newline.
pub fn write_prn(out: &mut impl Write, args: &[Value]) -> io::Result<()> {
    let line: Vec<String> = args.iter().map(pr_str).collect();
    writeln!(out, "{}", line.join(" "))
}

pub fn prim_prn(args: &[Value]) -> EvalResult {
    write_prn(&mut io::stdout().lock(), args).map_err(|e| EvalError::Output(e.to_string()))?;
    Ok(Value::Nil)
}
