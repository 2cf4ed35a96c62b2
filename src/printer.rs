use crate::types::{Function, Value};
use std::fmt;

/// Renders a value the way the reader would accept it back.
pub fn pr_str(value: &Value) -> String {
    value.to_string()
}

fn write_joined<'a, I>(f: &mut fmt::Formatter<'_>, items: I) -> fmt::Result
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut first = true;
    for item in items {
        if !first {
            write!(f, " ")?;
        }
        write!(f, "{}", item)?;
        first = false;
    }
    Ok(())
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    // Inverse of the reader's unescaping, so literals print as written.
    write!(
        f,
        "\"{}\"",
        s.chars().fold(String::new(), |mut acc, char| {
            match char {
                '"' => acc.push_str("\\\""),
                '\n' => acc.push_str("\\n"),
                '\\' => acc.push_str("\\\\"),
                c => acc.push(c),
            }
            acc
        })
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write_string(f, s),
            Value::Symbol(sym) => write!(f, "{}", sym),
            Value::Pair(pair) => {
                write!(f, "({}", pair.car)?;
                let mut rest = pair.cdr.clone();
                loop {
                    let next = match &rest {
                        Value::Pair(next) => {
                            write!(f, " {}", next.car)?;
                            next.cdr.clone()
                        }
                        Value::List(list) => {
                            for item in list.iter() {
                                write!(f, " {}", item)?;
                            }
                            break;
                        }
                        Value::Nil => break,
                        other => {
                            write!(f, " . {}", other)?;
                            break;
                        }
                    };
                    rest = next;
                }
                write!(f, ")")
            }
            Value::List(list) => {
                write!(f, "(")?;
                write_joined(f, list.iter())?;
                write!(f, ")")
            }
            Value::Vector(items) => {
                write!(f, "[")?;
                write_joined(f, items.iter())?;
                write!(f, "]")
            }
            Value::HashMap(map) => {
                write!(f, "{{")?;
                write_joined(f, map.iter().flat_map(|(key, value)| [key, value]))?;
                write!(f, "}}")
            }
            Value::Function(Function::Primitive(primitive)) => {
                write!(f, "#<primitive:{}>", primitive.name)
            }
            Value::Function(Function::Closure(_)) => write!(f, "#<function>"),
        }
    }
}
