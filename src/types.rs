use crate::environment::Environment;
use crate::evaluator::EvalResult;
use gc::{Finalize, Gc, Trace};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Prefix that turns a symbol into a self-evaluating keyword.
pub const KEYWORD_MARKER: char = ':';

/// Separates the fixed parameters of a `fn*` from its rest parameter.
pub const VARIADIC_MARKER: &str = "&";

thread_local! {
    static SYMBOLS: RefCell<HashSet<Rc<str>>> = RefCell::new(HashSet::new());
}

/// An interned name. Two symbols with the same name share storage.
#[derive(Clone, Trace, Finalize, Hash, Eq)]
pub struct Symbol(#[unsafe_ignore_trace] Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        SYMBOLS.with(|symbols| {
            let mut symbols = symbols.borrow_mut();
            match symbols.get(name) {
                Some(interned) => Symbol(interned.clone()),
                None => {
                    let interned: Rc<str> = Rc::from(name);
                    symbols.insert(interned.clone());
                    Symbol(interned)
                }
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_keyword(&self) -> bool {
        self.0.starts_with(KEYWORD_MARKER)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Represents a value of the language. Read forms and evaluated results
/// share this one representation.
#[derive(Clone, Trace, Finalize)]
pub enum Value {
    /// Absence of a value. Distinct from the empty list.
    Nil,
    Boolean(bool),
    Number(i64),
    String(#[unsafe_ignore_trace] Rc<str>),
    Symbol(Symbol),
    Pair(Gc<Pair>),
    List(List),
    Vector(Gc<Vec<Value>>),
    HashMap(Gc<MalMap>),
    Function(Function),
}

impl Value {
    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Symbol::new(name))
    }

    pub fn string(s: &str) -> Value {
        Value::String(Rc::from(s))
    }

    pub fn empty_list() -> Value {
        Value::List(List::empty())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(List::from(items))
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(Gc::new(items))
    }

    pub fn hash_map(map: MalMap) -> Value {
        Value::HashMap(Gc::new(map))
    }

    pub fn pair(pair: Pair) -> Value {
        Value::Pair(Gc::new(pair))
    }

    pub fn primitive(name: &'static str, func: PrimitiveFunc) -> Value {
        Value::Function(Function::Primitive(Primitive { name, func }))
    }

    pub fn closure(closure: Closure) -> Value {
        Value::Function(Function::Closure(Gc::new(closure)))
    }

    /// Everything except `false` and `nil` counts as true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(sym) if sym.is_keyword() => "keyword",
            Value::Symbol(_) => "symbol",
            Value::Pair(_) => "pair",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::HashMap(_) => "hash-map",
            Value::Function(_) => "function",
        }
    }

    /// The elements of a sequential value: a list, a vector, or a chain of
    /// pairs terminated by nil or a list. Returns `None` for anything else,
    /// including dotted pairs.
    pub fn sequence_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(list) => Some(list.iter().cloned().collect()),
            Value::Vector(items) => Some(items.to_vec()),
            Value::Pair(pair) => {
                let mut items = vec![pair.car.clone()];
                let mut rest = pair.cdr.clone();
                loop {
                    let next = match &rest {
                        Value::Pair(next) => {
                            items.push(next.car.clone());
                            next.cdr.clone()
                        }
                        Value::List(list) => {
                            items.extend(list.iter().cloned());
                            return Some(items);
                        }
                        Value::Nil => return Some(items),
                        _ => return None,
                    };
                    rest = next;
                }
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::HashMap(a), Value::HashMap(b)) => Gc::ptr_eq(a, b) || **a == **b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) if Gc::ptr_eq(a, b) => true,
            (
                Value::Pair(_) | Value::List(_) | Value::Vector(_),
                Value::Pair(_) | Value::List(_) | Value::Vector(_),
            ) => match (self.sequence_items(), other.sequence_items()) {
                (Some(left), Some(right)) => left == right,
                _ => match (self, other) {
                    (Value::Pair(a), Value::Pair(b)) => a.car == b.car && a.cdr == b.cdr,
                    _ => false,
                },
            },
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The printed form is unambiguous enough for test failures.
        write!(f, "{}<{}>", self.type_name(), self)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    #[error("cannot construct a pair without a car")]
    MissingCar,
}

/// A cons cell. Immutable once built.
#[derive(Trace, Finalize)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

impl Pair {
    pub fn new(car: Value, cdr: Value) -> Self {
        Pair { car, cdr }
    }

    /// Builds a pair from a car that may be missing, e.g. taken from an
    /// argument list that ran out.
    pub fn try_new(car: Option<Value>, cdr: Value) -> Result<Self, ConstructionError> {
        car.map(|car| Pair::new(car, cdr))
            .ok_or(ConstructionError::MissingCar)
    }
}

#[derive(Trace, Finalize)]
struct ListNode {
    value: Value,
    next: Option<Gc<ListNode>>,
}

/// A persistent singly linked list that knows its length. Tails are shared
/// between lists, so `cons` and `rest` never copy.
#[derive(Clone, Trace, Finalize)]
pub struct List {
    head: Option<Gc<ListNode>>,
    len: usize,
}

impl List {
    pub fn empty() -> Self {
        List { head: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a new list with `value` in front of this one.
    pub fn cons(&self, value: Value) -> List {
        List {
            head: Some(Gc::new(ListNode {
                value,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn first(&self) -> Option<&Value> {
        self.head.as_ref().map(|node| &node.value)
    }

    /// Everything after the first element. The rest of an empty list is empty.
    pub fn rest(&self) -> List {
        match &self.head {
            Some(node) => List {
                head: node.next.clone(),
                len: self.len - 1,
            },
            None => List::empty(),
        }
    }

    pub fn iter(&self) -> ListIter<'_> {
        ListIter {
            next: self.head.as_deref(),
        }
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().cloned().collect()
    }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> Self {
        items
            .into_iter()
            .rev()
            .fold(List::empty(), |list, value| list.cons(value))
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        List::from(iter.into_iter().collect::<Vec<_>>())
    }
}

pub struct ListIter<'a> {
    next: Option<&'a ListNode>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|node| {
            self.next = node.next.as_deref();
            &node.value
        })
    }
}

#[derive(Trace, Finalize)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

/// Insertion-ordered map whose keys compare with value equality.
#[derive(Trace, Finalize, Default)]
pub struct MalMap {
    entries: Vec<MapEntry>,
}

impl MalMap {
    pub fn new() -> Self {
        MalMap::default()
    }

    /// Builds a map from alternating keys and values; later duplicates win.
    /// Returns `None` when a key has no value.
    pub fn from_flat(items: Vec<Value>) -> Option<Self> {
        if items.len() % 2 != 0 {
            return None;
        }
        let mut map = MalMap::new();
        let mut items = items.into_iter();
        while let (Some(key), Some(value)) = (items.next(), items.next()) {
            map.insert(key, value);
        }
        Some(map)
    }

    /// Keeps every entry of a map literal as read, duplicates included, so
    /// that each key and value is still evaluated. Returns `None` when a key
    /// has no value.
    pub fn from_flat_unmerged(items: Vec<Value>) -> Option<Self> {
        if items.len() % 2 != 0 {
            return None;
        }
        let mut entries = Vec::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(key), Some(value)) = (items.next(), items.next()) {
            entries.push(MapEntry { key, value });
        }
        Some(MalMap { entries })
    }

    /// Overwrites the value of an equal key in place, otherwise appends.
    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(MapEntry { key, value }),
        }
    }

    /// Looks up a key. If an unmerged literal repeats it, the last one wins.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.key == *key)
            .map(|entry| &entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|entry| (&entry.key, &entry.value))
    }
}

impl PartialEq for MalMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

pub type PrimitiveFunc = fn(&[Value]) -> EvalResult;

#[derive(Clone, Trace, Finalize)]
pub struct Primitive {
    #[unsafe_ignore_trace]
    pub name: &'static str,
    #[unsafe_ignore_trace]
    pub func: PrimitiveFunc,
}

/// Parameters of a closure, split once when the `fn*` is evaluated.
#[derive(Debug, Clone, PartialEq, Default, Trace, Finalize)]
pub struct ParamSpec {
    pub fixed: Vec<Symbol>,
    pub rest: Option<Symbol>,
}

#[derive(Trace, Finalize)]
pub struct Closure {
    pub params: ParamSpec,
    pub body: Value,
    pub env: Environment,
}

#[derive(Clone, Trace, Finalize)]
pub enum Function {
    Primitive(Primitive),
    Closure(Gc<Closure>),
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Primitive(primitive) => write!(f, "Primitive({})", primitive.name),
            Function::Closure(closure) => write!(f, "Closure({:?})", closure.params),
        }
    }
}

// Primitives compare by name, closures by identity.
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Primitive(a), Function::Primitive(b)) => a.name == b.name,
            (Function::Closure(a), Function::Closure(b)) => Gc::ptr_eq(a, b),
            _ => false,
        }
    }
}
