//! Container opcodes: building, extending, subscripting and unpacking.

use super::Frame;
use crate::{
    exception::{Fault, RunResult},
    types::{Dict, Range, Set, Slice, dict_from_value, normalize_index},
    value::Value,
};

// ============================================================
// Building
// ============================================================

pub(super) fn build_set(frame: &mut Frame, count: usize) -> RunResult<()> {
    let items = frame.pop_n(count)?;
    frame.push(Value::set(Set::from_values(items)?));
    Ok(())
}

/// `BUILD_MAP(n)`: `n` key/value pairs, keys first.
pub(super) fn build_map(frame: &mut Frame, count: usize) -> RunResult<()> {
    let flat = frame.pop_n(count * 2)?;
    let mut dict = Dict::with_capacity(count);
    let mut flat = flat.into_iter();
    while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
        dict.insert(key, value)?;
    }
    frame.push(Value::dict(dict));
    Ok(())
}

/// `BUILD_CONST_KEY_MAP(n)`: a tuple of `n` keys on top of `n` values.
pub(super) fn build_const_key_map(frame: &mut Frame, count: usize) -> RunResult<()> {
    let keys = frame.pop()?;
    let Value::Tuple(keys) = keys else {
        return Err(Fault::type_mismatch(format!(
            "BUILD_CONST_KEY_MAP expected a tuple of keys, got '{}'",
            keys.type_name()
        )));
    };
    if keys.len() != count {
        return Err(Fault::invalid_value(format!(
            "BUILD_CONST_KEY_MAP expected {count} keys, got {}",
            keys.len()
        )));
    }
    let values = frame.pop_n(count)?;
    let dict = Dict::from_pairs(keys.iter().cloned().zip(values))?;
    frame.push(Value::dict(dict));
    Ok(())
}

/// `BUILD_STRING(n)`: concatenates `n` strings.
pub(super) fn build_string(frame: &mut Frame, count: usize) -> RunResult<()> {
    let parts = frame.pop_n(count)?;
    let mut out = String::new();
    for part in &parts {
        match part {
            Value::Str(s) => out.push_str(s),
            other => {
                return Err(Fault::type_mismatch(format!(
                    "BUILD_STRING expected str, got '{}'",
                    other.type_name()
                )));
            }
        }
    }
    frame.push(Value::from(out));
    Ok(())
}

/// `BUILD_SLICE(argc)`: `start, stop` or `start, stop, step`.
pub(super) fn build_slice(frame: &mut Frame, argc: u32) -> RunResult<()> {
    let step = match argc {
        2 => Value::None,
        3 => frame.pop()?,
        other => return Err(Fault::invalid_value(format!("BUILD_SLICE takes 2 or 3 values, got {other}"))),
    };
    let stop = frame.pop()?;
    let start = frame.pop()?;
    frame.push(Value::Slice(Slice::from_values(&start, &stop, &step)?));
    Ok(())
}

// ============================================================
// Comprehension helpers
//
// The target container sits `i` slots below the top once the operand is popped.
// ============================================================

pub(super) fn list_append(frame: &mut Frame, depth: usize) -> RunResult<()> {
    let item = frame.pop()?;
    let Value::List(list) = frame.peek(depth.saturating_sub(1))? else {
        return Err(target_error("LIST_APPEND", "list"));
    };
    list.borrow_mut().push(item);
    Ok(())
}

pub(super) fn list_extend(frame: &mut Frame, depth: usize) -> RunResult<()> {
    let source = frame.pop()?;
    let items = source.collect_items()?;
    let Value::List(list) = frame.peek(depth.saturating_sub(1))? else {
        return Err(target_error("LIST_EXTEND", "list"));
    };
    list.borrow_mut().extend(items);
    Ok(())
}

pub(super) fn set_add(frame: &mut Frame, depth: usize) -> RunResult<()> {
    let item = frame.pop()?;
    let Value::Set(set) = frame.peek(depth.saturating_sub(1))? else {
        return Err(target_error("SET_ADD", "set"));
    };
    set.borrow_mut().add(item)?;
    Ok(())
}

pub(super) fn set_update(frame: &mut Frame, depth: usize) -> RunResult<()> {
    let source = frame.pop()?;
    let items = source.collect_items()?;
    let Value::Set(set) = frame.peek(depth.saturating_sub(1))? else {
        return Err(target_error("SET_UPDATE", "set"));
    };
    let mut set = set.borrow_mut();
    for item in items {
        set.add(item)?;
    }
    Ok(())
}

/// `MAP_ADD(i)`: pops the value, then the key.
pub(super) fn map_add(frame: &mut Frame, depth: usize) -> RunResult<()> {
    let value = frame.pop()?;
    let key = frame.pop()?;
    let Value::Dict(dict) = frame.peek(depth.saturating_sub(1))? else {
        return Err(target_error("MAP_ADD", "dict"));
    };
    dict.borrow_mut().insert(key, value)?;
    Ok(())
}

/// `DICT_UPDATE(i)` and `DICT_MERGE(i)`; merging rejects keys already present.
pub(super) fn dict_update(frame: &mut Frame, depth: usize, merge: bool) -> RunResult<()> {
    let source = frame.pop()?;
    let source = dict_from_value(&source)?;
    let Value::Dict(dict) = frame.peek(depth.saturating_sub(1))? else {
        return Err(target_error(if merge { "DICT_MERGE" } else { "DICT_UPDATE" }, "dict"));
    };
    let mut dict = dict.borrow_mut();
    if merge {
        for key in source.keys() {
            if dict.contains_key(key)? {
                return Err(Fault::type_mismatch(format!(
                    "got multiple values for keyword argument {}",
                    key.py_repr()
                )));
            }
        }
    }
    dict.update(&source);
    Ok(())
}

fn target_error(opcode: &str, expected: &str) -> Fault {
    Fault::type_mismatch(format!("{opcode} target is not a {expected}"))
}

// ============================================================
// Subscripts
// ============================================================

/// `BINARY_SUBSCR`: pops the key, then the container.
pub(super) fn binary_subscr(frame: &mut Frame) -> RunResult<()> {
    let key = frame.pop()?;
    let container = frame.pop()?;
    frame.push(get_item(&container, &key)?);
    Ok(())
}

/// `STORE_SUBSCR`: pops the key, the container, then the value.
pub(super) fn store_subscr(frame: &mut Frame) -> RunResult<()> {
    let key = frame.pop()?;
    let container = frame.pop()?;
    let value = frame.pop()?;
    set_item(&container, &key, value)
}

pub(super) fn delete_subscr(frame: &mut Frame) -> RunResult<()> {
    let key = frame.pop()?;
    let container = frame.pop()?;
    del_item(&container, &key)
}

/// `BINARY_SLICE`: `container[start:stop]`.
pub(super) fn binary_slice(frame: &mut Frame) -> RunResult<()> {
    let stop = frame.pop()?;
    let start = frame.pop()?;
    let container = frame.pop()?;
    let slice = Value::Slice(Slice::from_values(&start, &stop, &Value::None)?);
    frame.push(get_item(&container, &slice)?);
    Ok(())
}

/// `STORE_SLICE`: `container[start:stop] = value`.
pub(super) fn store_slice(frame: &mut Frame) -> RunResult<()> {
    let stop = frame.pop()?;
    let start = frame.pop()?;
    let container = frame.pop()?;
    let value = frame.pop()?;
    let slice = Value::Slice(Slice::from_values(&start, &stop, &Value::None)?);
    set_item(&container, &slice, value)
}

pub(super) fn get_item(container: &Value, key: &Value) -> RunResult<Value> {
    match container {
        Value::List(list) => sequence_item(&list.borrow(), key, "list").map(|item| match item {
            Picked::One(value) => value,
            Picked::Many(values) => Value::list(values),
        }),
        Value::Tuple(items) => sequence_item(items, key, "tuple").map(|item| match item {
            Picked::One(value) => value,
            Picked::Many(values) => Value::tuple(values),
        }),
        Value::Str(s) => {
            let chars: Vec<Value> = s.chars().map(|c| Value::from(c.to_string())).collect();
            sequence_item(&chars, key, "string").map(|item| match item {
                Picked::One(value) => value,
                Picked::Many(values) => {
                    let joined: String = values.iter().map(Value::py_str).collect();
                    Value::from(joined)
                }
            })
        }
        Value::Range(range) => range_item(range, key),
        Value::Dict(dict) => dict
            .borrow()
            .get(key)?
            .ok_or_else(|| Fault::lookup(format!("key {} not found", key.py_repr()))),
        other => Err(Fault::type_mismatch(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

enum Picked {
    One(Value),
    Many(Vec<Value>),
}

fn sequence_item(items: &[Value], key: &Value, type_name: &str) -> RunResult<Picked> {
    if let Value::Slice(slice) = key {
        let picked = slice.positions(items.len())?.into_iter().map(|i| items[i].clone()).collect();
        return Ok(Picked::Many(picked));
    }
    let index = index_of(key, type_name)?;
    normalize_index(index, items.len())
        .map(|i| Picked::One(items[i].clone()))
        .ok_or_else(|| Fault::lookup(format!("{type_name} index out of range")))
}

fn range_item(range: &Range, key: &Value) -> RunResult<Value> {
    if let Value::Slice(slice) = key {
        let (start, stop, step) = slice.indices(range.len())?;
        let at = |position: i64| {
            position
                .checked_mul(range.step)
                .and_then(|offset| range.start.checked_add(offset))
                .ok_or_else(Fault::overflow)
        };
        let step = step.checked_mul(range.step).ok_or_else(Fault::overflow)?;
        return Ok(Value::Range(Range::new(at(start)?, at(stop)?, step)?));
    }
    let index = index_of(key, "range object")?;
    normalize_index(index, range.len())
        .and_then(|i| range.get(i))
        .map(Value::Int)
        .ok_or_else(|| Fault::lookup("range object index out of range"))
}

fn index_of(key: &Value, type_name: &str) -> RunResult<i64> {
    key.as_int().ok_or_else(|| {
        Fault::type_mismatch(format!(
            "{type_name} indices must be integers or slices, not '{}'",
            key.type_name()
        ))
    })
}

fn set_item(container: &Value, key: &Value, value: Value) -> RunResult<()> {
    match container {
        Value::List(list) => {
            if let Value::Slice(slice) = key {
                let items = value.collect_items()?;
                return assign_slice(&mut list.borrow_mut(), slice, items);
            }
            let index = index_of(key, "list")?;
            let mut list = list.borrow_mut();
            let position = normalize_index(index, list.len())
                .ok_or_else(|| Fault::lookup("list assignment index out of range"))?;
            list[position] = value;
            Ok(())
        }
        Value::Dict(dict) => {
            dict.borrow_mut().insert(key.clone(), value)?;
            Ok(())
        }
        other => Err(Fault::type_mismatch(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn assign_slice(list: &mut Vec<Value>, slice: &Slice, items: Vec<Value>) -> RunResult<()> {
    let (start, stop, step) = slice.indices(list.len())?;
    if step == 1 {
        let start = start as usize;
        let stop = (stop as usize).max(start);
        list.splice(start..stop, items);
        return Ok(());
    }
    let positions = slice.positions(list.len())?;
    if positions.len() != items.len() {
        return Err(Fault::invalid_value(format!(
            "attempt to assign sequence of size {} to extended slice of size {}",
            items.len(),
            positions.len()
        )));
    }
    for (position, item) in positions.into_iter().zip(items) {
        list[position] = item;
    }
    Ok(())
}

fn del_item(container: &Value, key: &Value) -> RunResult<()> {
    match container {
        Value::List(list) => {
            let mut list = list.borrow_mut();
            if let Value::Slice(slice) = key {
                let mut positions = slice.positions(list.len())?;
                positions.sort_unstable_by(|a, b| b.cmp(a));
                for position in positions {
                    list.remove(position);
                }
                return Ok(());
            }
            let index = index_of(key, "list")?;
            let position = normalize_index(index, list.len())
                .ok_or_else(|| Fault::lookup("list assignment index out of range"))?;
            list.remove(position);
            Ok(())
        }
        Value::Dict(dict) => match dict.borrow_mut().remove(key)? {
            Some(_) => Ok(()),
            None => Err(Fault::lookup(format!("key {} not found", key.py_repr()))),
        },
        other => Err(Fault::type_mismatch(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

// ============================================================
// Unpacking
// ============================================================

/// `UNPACK_SEQUENCE(n)`: pushes the items so the first ends up on top.
pub(super) fn unpack_sequence(frame: &mut Frame, count: usize) -> RunResult<()> {
    let items = frame.pop()?.collect_items()?;
    if items.len() != count {
        return Err(Fault::invalid_value(if items.len() > count {
            format!("too many values to unpack (expected {count})")
        } else {
            format!("not enough values to unpack (expected {count}, got {})", items.len())
        }));
    }
    frame.stack.extend(items.into_iter().rev());
    Ok(())
}

/// `UNPACK_EX(counts)`: the low byte counts targets before the starred one,
/// the next byte those after it. The starred target receives a list.
pub(super) fn unpack_ex(frame: &mut Frame, counts: u32) -> RunResult<()> {
    let before = (counts & 0xFF) as usize;
    let after = (counts >> 8) as usize;
    let mut items = frame.pop()?.collect_items()?;
    if items.len() < before + after {
        return Err(Fault::invalid_value(format!(
            "not enough values to unpack (expected at least {}, got {})",
            before + after,
            items.len()
        )));
    }
    let tail = items.split_off(items.len() - after);
    let middle = items.split_off(before);
    frame.stack.extend(tail.into_iter().rev());
    frame.push(Value::list(middle));
    frame.stack.extend(items.into_iter().rev());
    Ok(())
}
