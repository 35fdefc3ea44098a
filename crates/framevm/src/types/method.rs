//! Methods of the built-in container and string types.

use std::{cmp::Ordering, rc::Rc, str::FromStr};

use crate::{
    args::ArgValues,
    exception::{Fault, RunResult},
    types::{Dict, Set},
    value::Value,
};

/// A built-in method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum MethodKind {
    // list
    Append,
    Extend,
    Pop,
    Insert,
    Remove,
    Index,
    Count,
    Reverse,
    Sort,
    Copy,
    Clear,
    // dict
    Get,
    Keys,
    Values,
    Items,
    Setdefault,
    Update,
    // set
    Add,
    Discard,
    // str
    Join,
    Split,
    Strip,
    Upper,
    Lower,
    Startswith,
    Endswith,
    Replace,
    Find,
}

impl MethodKind {
    /// Looks up the method `name` on `receiver`'s type.
    #[must_use]
    pub fn resolve(receiver: &Value, name: &str) -> Option<Self> {
        let kind = Self::from_str(name).ok()?;
        let supported = match receiver {
            Value::List(_) => matches!(
                kind,
                Self::Append
                    | Self::Extend
                    | Self::Pop
                    | Self::Insert
                    | Self::Remove
                    | Self::Index
                    | Self::Count
                    | Self::Reverse
                    | Self::Sort
                    | Self::Copy
                    | Self::Clear
            ),
            Value::Dict(_) => matches!(
                kind,
                Self::Get
                    | Self::Keys
                    | Self::Values
                    | Self::Items
                    | Self::Pop
                    | Self::Setdefault
                    | Self::Update
                    | Self::Copy
                    | Self::Clear
            ),
            Value::Set(_) => matches!(
                kind,
                Self::Add | Self::Discard | Self::Remove | Self::Update | Self::Pop | Self::Copy | Self::Clear
            ),
            Value::Str(_) => matches!(
                kind,
                Self::Join
                    | Self::Split
                    | Self::Strip
                    | Self::Upper
                    | Self::Lower
                    | Self::Startswith
                    | Self::Endswith
                    | Self::Replace
                    | Self::Find
                    | Self::Count
                    | Self::Index
            ),
            Value::Tuple(_) => matches!(kind, Self::Index | Self::Count),
            _ => false,
        };
        supported.then_some(kind)
    }
}

/// A method looked up on a value.
///
/// `LOAD_ATTR` in method form produces an unbound method and pushes the
/// receiver separately; the call then passes the receiver as the first
/// positional argument.
#[derive(Debug)]
pub struct BoundMethod {
    kind: MethodKind,
    receiver: Option<Value>,
}

impl BoundMethod {
    #[must_use]
    pub fn bound(kind: MethodKind, receiver: Value) -> Self {
        Self {
            kind,
            receiver: Some(receiver),
        }
    }

    #[must_use]
    pub fn unbound(kind: MethodKind) -> Self {
        Self { kind, receiver: None }
    }

    #[must_use]
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// Calls the method.
    pub fn call(&self, mut args: ArgValues) -> RunResult<Value> {
        if let Some(receiver) = &self.receiver {
            args.prepend(receiver.clone());
        }
        if args.positional.is_empty() {
            return Err(Fault::type_mismatch(format!(
                "unbound method {}() needs an argument",
                self.kind
            )));
        }
        let receiver = args.positional.remove(0);
        let name: &'static str = self.kind.into();
        match &receiver {
            Value::List(_) => call_list_method(self.kind, &receiver, args, name),
            Value::Dict(_) => call_dict_method(self.kind, &receiver, args, name),
            Value::Set(_) => call_set_method(self.kind, &receiver, args, name),
            Value::Str(s) => call_str_method(self.kind, s, args, name),
            Value::Tuple(items) => call_tuple_method(self.kind, items, args, name),
            other => Err(no_method(other, name)),
        }
    }
}

fn no_method(receiver: &Value, name: &str) -> Fault {
    Fault::type_mismatch(format!("'{}' object has no method '{name}'", receiver.type_name()))
}

fn position_of(items: &[Value], target: &Value) -> Option<usize> {
    items.iter().position(|item| item.py_eq(target))
}

fn count_of(items: &[Value], target: &Value) -> Value {
    Value::Int(items.iter().filter(|item| item.py_eq(target)).count() as i64)
}

/// Normalizes a possibly negative index against `len`.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index.checked_add(len)? } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// Sorts values with Python ordering, surfacing the first comparison error.
pub(crate) fn sort_values(items: &mut [Value], reverse: bool) -> RunResult<()> {
    let mut error = None;
    items.sort_by(|a, b| match a.sort_cmp(b) {
        Ok(ordering) if reverse => ordering.reverse(),
        Ok(ordering) => ordering,
        Err(err) => {
            error.get_or_insert(err);
            Ordering::Equal
        }
    });
    error.map_or(Ok(()), Err)
}

fn call_list_method(kind: MethodKind, receiver: &Value, mut args: ArgValues, name: &str) -> RunResult<Value> {
    let Value::List(list) = receiver else {
        return Err(no_method(receiver, name));
    };
    match kind {
        MethodKind::Append => {
            let item = args.get_one_arg(name)?;
            list.borrow_mut().push(item);
            Ok(Value::None)
        }
        MethodKind::Extend => {
            let items = args.get_one_arg(name)?.collect_items()?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        MethodKind::Pop => {
            let index = match args.get_up_to(name, 1)?.first() {
                Some(index) => index.expect_int("list index")?,
                None => -1,
            };
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(Fault::lookup("pop from empty list"));
            }
            let index = normalize_index(index, items.len()).ok_or_else(|| Fault::lookup("pop index out of range"))?;
            Ok(items.remove(index))
        }
        MethodKind::Insert => {
            let (index, item) = args.get_two_args(name)?;
            let index = index.expect_int("list index")?;
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let position = if index < 0 { index.saturating_add(len).max(0) } else { index.min(len) };
            items.insert(position as usize, item);
            Ok(Value::None)
        }
        MethodKind::Remove => {
            let target = args.get_one_arg(name)?;
            let mut items = list.borrow_mut();
            let index =
                position_of(&items, &target).ok_or_else(|| Fault::invalid_value("list.remove(x): x not in list"))?;
            items.remove(index);
            Ok(Value::None)
        }
        MethodKind::Index => {
            let target = args.get_one_arg(name)?;
            let items = list.borrow();
            position_of(&items, &target)
                .map(|index| Value::Int(index as i64))
                .ok_or_else(|| Fault::invalid_value(format!("{} is not in list", target.py_repr())))
        }
        MethodKind::Count => {
            let target = args.get_one_arg(name)?;
            Ok(count_of(&list.borrow(), &target))
        }
        MethodKind::Reverse => {
            args.check_zero_args(name)?;
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        MethodKind::Sort => {
            let reverse = args.take_keyword("reverse").is_some_and(|value| value.is_truthy());
            if args.take_keyword("key").is_some() {
                return Err(Fault::unsupported("list.sort() with a key function"));
            }
            args.check_zero_args(name)?;
            let mut items = list.borrow().clone();
            sort_values(&mut items, reverse)?;
            *list.borrow_mut() = items;
            Ok(Value::None)
        }
        MethodKind::Copy => {
            args.check_zero_args(name)?;
            Ok(Value::list(list.borrow().clone()))
        }
        MethodKind::Clear => {
            args.check_zero_args(name)?;
            list.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(no_method(receiver, name)),
    }
}

fn call_dict_method(kind: MethodKind, receiver: &Value, mut args: ArgValues, name: &str) -> RunResult<Value> {
    let Value::Dict(dict) = receiver else {
        return Err(no_method(receiver, name));
    };
    match kind {
        MethodKind::Get => {
            let (key, default) = args.get_one_two_args(name)?;
            Ok(dict.borrow().get(&key)?.or(default).unwrap_or(Value::None))
        }
        MethodKind::Keys => {
            args.check_zero_args(name)?;
            Ok(Value::list(dict.borrow().keys().cloned().collect()))
        }
        MethodKind::Values => {
            args.check_zero_args(name)?;
            Ok(Value::list(dict.borrow().values().cloned().collect()))
        }
        MethodKind::Items => {
            args.check_zero_args(name)?;
            let items = dict
                .borrow()
                .iter()
                .map(|(key, value)| Value::tuple(vec![key.clone(), value.clone()]))
                .collect();
            Ok(Value::list(items))
        }
        MethodKind::Pop => {
            let (key, default) = args.get_one_two_args(name)?;
            let removed = dict.borrow_mut().remove(&key)?;
            removed
                .or(default)
                .ok_or_else(|| Fault::lookup(format!("KeyError: {}", key.py_repr())))
        }
        MethodKind::Setdefault => {
            let (key, default) = args.get_one_two_args(name)?;
            if let Some(existing) = dict.borrow().get(&key)? {
                return Ok(existing);
            }
            let value = default.unwrap_or(Value::None);
            dict.borrow_mut().insert(key, value.clone())?;
            Ok(value)
        }
        MethodKind::Update => {
            let keywords = std::mem::take(&mut args.keywords);
            let sources = args.get_up_to(name, 1)?;
            if let Some(source) = sources.first() {
                let merged = dict_from_value(source)?;
                dict.borrow_mut().update(&merged);
            }
            let mut dict = dict.borrow_mut();
            for (key, value) in keywords {
                dict.insert_str(key, value);
            }
            Ok(Value::None)
        }
        MethodKind::Copy => {
            args.check_zero_args(name)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        MethodKind::Clear => {
            args.check_zero_args(name)?;
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(no_method(receiver, name)),
    }
}

/// Builds a dict from a mapping or an iterable of key/value pairs.
pub(crate) fn dict_from_value(source: &Value) -> RunResult<Dict> {
    if let Value::Dict(dict) = source {
        return Ok(dict.borrow().clone());
    }
    let mut dict = Dict::new();
    for item in source.collect_items()? {
        let pair = item.collect_items()?;
        let [key, value]: [Value; 2] = pair.try_into().map_err(|pair: Vec<Value>| {
            Fault::invalid_value(format!(
                "dictionary update sequence element has length {}; 2 is required",
                pair.len()
            ))
        })?;
        dict.insert(key, value)?;
    }
    Ok(dict)
}

fn call_set_method(kind: MethodKind, receiver: &Value, args: ArgValues, name: &str) -> RunResult<Value> {
    let Value::Set(set) = receiver else {
        return Err(no_method(receiver, name));
    };
    match kind {
        MethodKind::Add => {
            let item = args.get_one_arg(name)?;
            set.borrow_mut().add(item)?;
            Ok(Value::None)
        }
        MethodKind::Discard => {
            let item = args.get_one_arg(name)?;
            set.borrow_mut().remove(&item)?;
            Ok(Value::None)
        }
        MethodKind::Remove => {
            let item = args.get_one_arg(name)?;
            if set.borrow_mut().remove(&item)? {
                Ok(Value::None)
            } else {
                Err(Fault::lookup(format!("KeyError: {}", item.py_repr())))
            }
        }
        MethodKind::Update => {
            let items = args.get_one_arg(name)?.collect_items()?;
            let mut set = set.borrow_mut();
            for item in items {
                set.add(item)?;
            }
            Ok(Value::None)
        }
        MethodKind::Pop => {
            args.check_zero_args(name)?;
            let first = set.borrow().iter().next().cloned();
            let item = first.ok_or_else(|| Fault::lookup("pop from an empty set"))?;
            set.borrow_mut().remove(&item)?;
            Ok(item)
        }
        MethodKind::Copy => {
            args.check_zero_args(name)?;
            Ok(Value::set(set.borrow().clone()))
        }
        MethodKind::Clear => {
            args.check_zero_args(name)?;
            set.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(no_method(receiver, name)),
    }
}

fn expect_str<'a>(value: &'a Value, what: &str) -> RunResult<&'a Rc<str>> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(Fault::type_mismatch(format!(
            "{what} must be str, not '{}'",
            other.type_name()
        ))),
    }
}

/// Character index of a byte offset.
fn char_index(s: &str, byte_offset: usize) -> i64 {
    s[..byte_offset].chars().count() as i64
}

fn call_str_method(kind: MethodKind, s: &Rc<str>, args: ArgValues, name: &str) -> RunResult<Value> {
    match kind {
        MethodKind::Join => {
            let items = args.get_one_arg(name)?.collect_items()?;
            let parts = items
                .iter()
                .map(|item| expect_str(item, "sequence item").map(|part| &**part))
                .collect::<RunResult<Vec<&str>>>()?;
            Ok(Value::from(parts.join(&**s)))
        }
        MethodKind::Split => {
            let parts: Vec<Value> = match args.get_up_to(name, 1)?.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::from).collect(),
                Some(sep) => {
                    let sep = expect_str(sep, "separator")?;
                    if sep.is_empty() {
                        return Err(Fault::invalid_value("empty separator"));
                    }
                    s.split(&**sep).map(Value::from).collect()
                }
            };
            Ok(Value::list(parts))
        }
        MethodKind::Strip => match args.get_up_to(name, 1)?.first() {
            None | Some(Value::None) => Ok(Value::from(s.trim())),
            Some(chars) => {
                let chars = expect_str(chars, "strip arg")?;
                Ok(Value::from(s.trim_matches(|c: char| chars.contains(c))))
            }
        },
        MethodKind::Upper => {
            args.check_zero_args(name)?;
            Ok(Value::from(s.to_uppercase()))
        }
        MethodKind::Lower => {
            args.check_zero_args(name)?;
            Ok(Value::from(s.to_lowercase()))
        }
        MethodKind::Startswith | MethodKind::Endswith => {
            let prefix = args.get_one_arg(name)?;
            let candidates = match &prefix {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in &candidates {
                let candidate = expect_str(candidate, name)?;
                let hit = if kind == MethodKind::Startswith {
                    s.starts_with(&**candidate)
                } else {
                    s.ends_with(&**candidate)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        MethodKind::Replace => {
            let (old, new) = args.get_two_args(name)?;
            let old = expect_str(&old, "replace() argument 1")?;
            let new = expect_str(&new, "replace() argument 2")?;
            Ok(Value::from(s.replace(&**old, new)))
        }
        MethodKind::Find | MethodKind::Index => {
            let needle = args.get_one_arg(name)?;
            let needle = expect_str(&needle, "substring")?;
            match s.find(&**needle) {
                Some(offset) => Ok(Value::Int(char_index(s, offset))),
                None if kind == MethodKind::Find => Ok(Value::Int(-1)),
                None => Err(Fault::invalid_value("substring not found")),
            }
        }
        MethodKind::Count => {
            let needle = args.get_one_arg(name)?;
            let needle = expect_str(&needle, "substring")?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(&**needle).count()
            };
            Ok(Value::Int(count as i64))
        }
        _ => Err(no_method(&Value::Str(Rc::clone(s)), name)),
    }
}

fn call_tuple_method(kind: MethodKind, items: &Rc<[Value]>, args: ArgValues, name: &str) -> RunResult<Value> {
    let target = args.get_one_arg(name)?;
    match kind {
        MethodKind::Index => position_of(items, &target)
            .map(|index| Value::Int(index as i64))
            .ok_or_else(|| Fault::invalid_value("tuple.index(x): x not in tuple")),
        MethodKind::Count => Ok(count_of(items, &target)),
        _ => Err(no_method(&Value::Tuple(Rc::clone(items)), name)),
    }
}

/// Builds a set from any iterable.
pub(crate) fn set_from_value(source: &Value) -> RunResult<Set> {
    if let Value::Set(set) = source {
        return Ok(set.borrow().clone());
    }
    Set::from_values(source.collect_items()?)
}
