use std::rc::Rc;

use crate::{
    args::ArgValues,
    exception::{Fault, RunResult},
    types::{Dict, Set, ValueIter, dict_from_value, set_from_value, sort_values},
    value::Value,
};

/// `len(obj)`
pub(super) fn builtin_len(args: ArgValues) -> RunResult<Value> {
    let value = args.get_one_arg("len")?;
    let len = match &value {
        Value::Str(s) => s.chars().count(),
        Value::Tuple(items) => items.len(),
        Value::List(items) => items.borrow().len(),
        Value::Dict(dict) => dict.borrow().len(),
        Value::Set(set) => set.borrow().len(),
        Value::Range(range) => range.len(),
        other => {
            return Err(Fault::type_mismatch(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(i64::try_from(len).map_err(|_| Fault::overflow())?))
}

/// `list([iterable])`
pub(super) fn builtin_list(args: ArgValues) -> RunResult<Value> {
    match args.get_up_to("list", 1)?.first() {
        None => Ok(Value::list(Vec::new())),
        Some(source) => Ok(Value::list(source.collect_items()?)),
    }
}

/// `tuple([iterable])`
pub(super) fn builtin_tuple(args: ArgValues) -> RunResult<Value> {
    match args.get_up_to("tuple", 1)?.first() {
        None => Ok(Value::tuple(Vec::new())),
        Some(Value::Tuple(items)) => Ok(Value::Tuple(Rc::clone(items))),
        Some(source) => Ok(Value::tuple(source.collect_items()?)),
    }
}

/// `dict([mapping_or_pairs], **kwargs)`
pub(super) fn builtin_dict(mut args: ArgValues) -> RunResult<Value> {
    let keywords = std::mem::take(&mut args.keywords);
    let mut dict = match args.get_up_to("dict", 1)?.first() {
        None => Dict::new(),
        Some(source) => dict_from_value(source)?,
    };
    for (key, value) in keywords {
        dict.insert_str(key, value);
    }
    Ok(Value::dict(dict))
}

/// `set([iterable])`
pub(super) fn builtin_set(args: ArgValues) -> RunResult<Value> {
    match args.get_up_to("set", 1)?.first() {
        None => Ok(Value::set(Set::new())),
        Some(source) => Ok(Value::set(set_from_value(source)?)),
    }
}

/// `sorted(iterable, reverse=False)`
pub(super) fn builtin_sorted(mut args: ArgValues) -> RunResult<Value> {
    let reverse = args.take_keyword("reverse").is_some_and(|value| value.is_truthy());
    if args.take_keyword("key").is_some() {
        return Err(Fault::unsupported("sorted() with a key function"));
    }
    let mut items = args.get_one_arg("sorted")?.collect_items()?;
    sort_values(&mut items, reverse)?;
    Ok(Value::list(items))
}

/// `reversed(sequence)`
pub(super) fn builtin_reversed(args: ArgValues) -> RunResult<Value> {
    let value = args.get_one_arg("reversed")?;
    let items: Vec<Value> = match &value {
        Value::Tuple(_) | Value::List(_) | Value::Str(_) | Value::Range(_) | Value::Dict(_) => {
            value.collect_items()?.into_iter().rev().collect()
        }
        other => {
            return Err(Fault::type_mismatch(format!(
                "'{}' object is not reversible",
                other.type_name()
            )));
        }
    };
    Ok(Value::iter(ValueIter::items(items.into())))
}
