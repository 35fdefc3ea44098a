//! Runtime values flowing through operand stacks and scopes.

use std::{cell::RefCell, cmp::Ordering, fmt, rc::Rc};

use crate::{
    builtins::NativeFunction,
    bytecode::Code,
    exception::{Fault, RunResult},
    function::Function,
    types::{BoundMethod, Dict, Range, Set, Slice, ValueIter},
};

/// A runtime value.
///
/// Scalars are stored inline; containers are shared through `Rc`, so cloning a
/// `Value` clones a handle and mutations through one handle are visible through
/// every other, as with Python object references.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    /// The call-convention marker pushed by `PUSH_NULL` and `LOAD_GLOBAL`;
    /// also the "unbound" marker of `LOAD_FAST_AND_CLEAR`.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<Set>>),
    Range(Range),
    Iter(Rc<RefCell<ValueIter>>),
    Slice(Slice),
    Code(Rc<Code>),
    Function(Rc<Function>),
    Builtin(Rc<NativeFunction>),
    Method(Rc<BoundMethod>),
}

/// A numeric view of a value: bools count as integers.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

/// Key used to hash values inside dicts and sets.
///
/// Equal numbers hash equal regardless of type (`1`, `1.0` and `True` share a key),
/// as Python requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    /// Bit pattern of a float with a fractional part (or outside the i64 range).
    Float(u64),
    Str(Rc<str>),
    Tuple(Box<[HashKey]>),
    Range(i64, i64, i64),
    /// Functions and other identity-hashed objects, keyed by address.
    Identity(usize),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(items.into())
    }

    #[must_use]
    pub fn dict(dict: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(dict)))
    }

    #[must_use]
    pub fn set(set: Set) -> Self {
        Self::Set(Rc::new(RefCell::new(set)))
    }

    pub(crate) fn iter(iter: ValueIter) -> Self {
        Self::Iter(Rc::new(RefCell::new(iter)))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Python type name, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Null => "NULL",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Tuple(_) => "tuple",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::Range(_) => "range",
            Self::Iter(_) => "iterator",
            Self::Slice(_) => "slice",
            Self::Code(_) => "code",
            Self::Function(_) => "function",
            Self::Builtin(_) => "builtin_function_or_method",
            Self::Method(_) => "method",
        }
    }

    pub(crate) fn as_number(&self) -> Option<Number> {
        match self {
            Self::Bool(b) => Some(Number::Int(i64::from(*b))),
            Self::Int(i) => Some(Number::Int(*i)),
            Self::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Integer view of an int or bool.
    pub(crate) fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Like [`Value::as_int`], but reports other types as a `TypeMismatch`.
    pub(crate) fn expect_int(&self, what: &str) -> RunResult<i64> {
        self.as_int()
            .ok_or_else(|| Fault::type_mismatch(format!("{what} must be an integer, not '{}'", self.type_name())))
    }

    /// Python truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Dict(dict) => !dict.borrow().is_empty(),
            Self::Set(set) => !set.borrow().is_empty(),
            Self::Range(range) => range.len() > 0,
            _ => true,
        }
    }

    /// Python `==`.
    #[must_use]
    pub fn py_eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return match (a, b) {
                (Number::Int(a), Number::Int(b)) => a == b,
                (a, b) => a.as_f64() == b.as_f64(),
            };
        }
        match (self, other) {
            (Self::None, Self::None) | (Self::Null, Self::Null) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => seq_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow()),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b) || a.borrow().py_eq(&b.borrow()),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b) || a.borrow().py_eq(&b.borrow()),
            (Self::Range(a), Self::Range(b)) => a.same_sequence(b),
            (Self::Slice(a), Self::Slice(b)) => a == b,
            _ => self.is_identical(other),
        }
    }

    /// Python `is`.
    ///
    /// Scalars (`None`, bools, numbers, strings) compare by value, as if every
    /// equal scalar were interned; everything else compares by reference.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b),
            (Self::Range(a), Self::Range(b)) => a == b,
            (Self::Iter(a), Self::Iter(b)) => Rc::ptr_eq(a, b),
            (Self::Slice(a), Self::Slice(b)) => a == b,
            (Self::Code(a), Self::Code(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => Rc::ptr_eq(a, b),
            (Self::Method(a), Self::Method(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`.
    ///
    /// `Ok(None)` means the values are unordered (a NaN operand, or two sets
    /// neither of which contains the other): every ordering comparison is false.
    pub fn py_partial_cmp(&self, other: &Self) -> RunResult<Option<Ordering>> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return Ok(match (a, b) {
                (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
                (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
            });
        }
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => Ok(Some(a.cmp(b))),
            (Self::Tuple(a), Self::Tuple(b)) => seq_partial_cmp(a, b),
            (Self::List(a), Self::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                seq_partial_cmp(&a, &b)
            }
            (Self::Set(a), Self::Set(b)) => Ok(a.borrow().subset_order(&b.borrow())),
            _ => Err(Fault::type_mismatch(format!(
                "ordering not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// Total ordering used by `sorted()`, `min()` and `max()`; unordered pairs compare equal.
    pub(crate) fn sort_cmp(&self, other: &Self) -> RunResult<Ordering> {
        Ok(self.py_partial_cmp(other)?.unwrap_or(Ordering::Equal))
    }

    /// Computes the dict/set key for this value.
    pub fn hash_key(&self) -> RunResult<HashKey> {
        match self {
            Self::None => Ok(HashKey::None),
            Self::Bool(b) => Ok(HashKey::Int(i64::from(*b))),
            Self::Int(i) => Ok(HashKey::Int(*i)),
            Self::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    Ok(HashKey::Int(*f as i64))
                } else {
                    Ok(HashKey::Float(f.to_bits()))
                }
            }
            Self::Str(s) => Ok(HashKey::Str(Rc::clone(s))),
            Self::Tuple(items) => Ok(HashKey::Tuple(
                items.iter().map(Self::hash_key).collect::<RunResult<_>>()?,
            )),
            Self::Range(range) => Ok(HashKey::Range(range.start, range.stop, range.step)),
            Self::Code(code) => Ok(HashKey::Identity(Rc::as_ptr(code) as usize)),
            Self::Function(function) => Ok(HashKey::Identity(Rc::as_ptr(function) as usize)),
            Self::Builtin(native) => Ok(HashKey::Identity(Rc::as_ptr(native) as usize)),
            Self::Null
            | Self::List(_)
            | Self::Dict(_)
            | Self::Set(_)
            | Self::Iter(_)
            | Self::Slice(_)
            | Self::Method(_) => Err(Fault::type_mismatch(format!("unhashable type: '{}'", self.type_name()))),
        }
    }

    /// Collects every item this value yields when iterated.
    ///
    /// Iterating an iterator value consumes it.
    pub fn collect_items(&self) -> RunResult<Vec<Self>> {
        match self {
            Self::Tuple(items) => Ok(items.to_vec()),
            Self::List(items) => Ok(items.borrow().clone()),
            _ => {
                let mut iter = ValueIter::from_value(self)?;
                let mut items = Vec::new();
                while let Some(item) = iter.next() {
                    items.push(item);
                }
                Ok(items)
            }
        }
    }

    /// Python `repr()`.
    #[must_use]
    pub fn py_repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    /// Python `str()`.
    #[must_use]
    pub fn py_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            other => other.py_repr(),
        }
    }

    fn write_repr(&self, out: &mut String) {
        match self {
            Self::None => out.push_str("None"),
            Self::Null => out.push_str("<NULL>"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => out.push_str(&i.to_string()),
            Self::Float(f) => out.push_str(&float_repr(*f)),
            Self::Str(s) => write_str_repr(s, out),
            Self::Tuple(items) => {
                out.push('(');
                write_items(items, out);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::List(items) => match items.try_borrow() {
                Ok(items) => {
                    out.push('[');
                    write_items(&items, out);
                    out.push(']');
                }
                Err(_) => out.push_str("[...]"),
            },
            Self::Dict(dict) => match dict.try_borrow() {
                Ok(dict) => {
                    out.push('{');
                    for (index, (key, value)) in dict.iter().enumerate() {
                        if index > 0 {
                            out.push_str(", ");
                        }
                        key.write_repr(out);
                        out.push_str(": ");
                        value.write_repr(out);
                    }
                    out.push('}');
                }
                Err(_) => out.push_str("{...}"),
            },
            Self::Set(set) => {
                let set = set.borrow();
                if set.is_empty() {
                    out.push_str("set()");
                } else {
                    out.push('{');
                    let items: Vec<Self> = set.iter().cloned().collect();
                    write_items(&items, out);
                    out.push('}');
                }
            }
            Self::Range(range) => {
                if range.step == 1 {
                    out.push_str(&format!("range({}, {})", range.start, range.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", range.start, range.stop, range.step));
                }
            }
            Self::Iter(_) => out.push_str("<iterator object>"),
            Self::Slice(slice) => out.push_str(&slice.to_string()),
            Self::Code(code) => out.push_str(&format!("<code object {}>", code.name())),
            Self::Function(function) => out.push_str(&format!("<function {}>", function.name())),
            Self::Builtin(native) => out.push_str(&format!("<built-in function {}>", native.name())),
            Self::Method(method) => out.push_str(&format!("<built-in method {}>", method.kind())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.py_str())
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

/// Lexicographic comparison: the first unequal pair decides, then length.
fn seq_partial_cmp(a: &[Value], b: &[Value]) -> RunResult<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return x.py_partial_cmp(y);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

fn write_items(items: &[Value], out: &mut String) {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        item.write_repr(out);
    }
}

/// Formats a float the way Python's `repr()` does: shortest round-trip digits,
/// always with a decimal point or exponent.
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let formatted = format!("{f:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) => {
                let exp: i32 = exp.parse().unwrap_or_default();
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exp.abs())
            }
            None => formatted,
        };
    }
    if f.fract() == 0.0 { format!("{f:.1}") } else { format!("{f}") }
}

fn write_str_repr(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push(quote);
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::list(items)
    }
}

/// Error returned when a [`Value`] cannot be converted to a host type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    pub expected: &'static str,
    pub actual: &'static str,
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, got {}", self.expected, self.actual)
    }
}

impl std::error::Error for ConversionError {}

impl TryFrom<&Value> for i64 {
    type Error = ConversionError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(i) => Ok(*i),
            other => Err(ConversionError {
                expected: "int",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<&Value> for f64 {
    type Error = ConversionError;

    /// Ints convert too, as Python accepts an int wherever a float is expected.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as Self),
            other => Err(ConversionError {
                expected: "float",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<&Value> for bool {
    type Error = ConversionError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(ConversionError {
                expected: "bool",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<&Value> for String {
    type Error = ConversionError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(ConversionError {
                expected: "str",
                actual: other.type_name(),
            }),
        }
    }
}
