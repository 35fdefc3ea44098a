use crate::{
    args::ArgValues,
    exception::{Fault, RunResult},
    types::{Range, ValueIter},
    value::Value,
};

/// `range(stop)`, `range(start, stop[, step])`
pub(super) fn builtin_range(args: ArgValues) -> RunResult<Value> {
    let bounds = args.get_up_to("range", 3)?;
    let ints = bounds
        .iter()
        .map(|value| value.expect_int("range() argument"))
        .collect::<RunResult<Vec<_>>>()?;
    let range = match ints.as_slice() {
        [] => return Err(Fault::type_mismatch("range expected at least 1 argument, got 0")),
        [stop] => Range::new(0, *stop, 1)?,
        [start, stop] => Range::new(*start, *stop, 1)?,
        [start, stop, step, ..] => Range::new(*start, *stop, *step)?,
    };
    Ok(Value::Range(range))
}

/// `enumerate(iterable, start=0)`
pub(super) fn builtin_enumerate(mut args: ArgValues) -> RunResult<Value> {
    let start = match args.take_keyword("start") {
        Some(value) => Some(value),
        None if args.positional.len() == 2 => args.positional.pop(),
        None => None,
    };
    let count = match start {
        Some(value) => value.expect_int("enumerate() start")?,
        None => 0,
    };
    let source = args.get_one_arg("enumerate")?;
    Ok(Value::iter(ValueIter::Enumerate {
        inner: Box::new(ValueIter::from_value(&source)?),
        count,
    }))
}

/// `zip(*iterables)`
pub(super) fn builtin_zip(args: ArgValues) -> RunResult<Value> {
    args.check_no_kwargs("zip")?;
    let iters = args
        .positional
        .iter()
        .map(ValueIter::from_value)
        .collect::<RunResult<Vec<_>>>()?;
    Ok(Value::iter(ValueIter::Zip(iters)))
}

/// `iter(iterable)`
pub(super) fn builtin_iter(args: ArgValues) -> RunResult<Value> {
    match args.get_one_arg("iter")? {
        Value::Iter(shared) => Ok(Value::Iter(shared)),
        other => Ok(Value::iter(ValueIter::from_value(&other)?)),
    }
}

/// `next(iterator[, default])`
pub(super) fn builtin_next(args: ArgValues) -> RunResult<Value> {
    let (iterator, default) = args.get_one_two_args("next")?;
    let Value::Iter(shared) = &iterator else {
        return Err(Fault::type_mismatch(format!(
            "'{}' object is not an iterator",
            iterator.type_name()
        )));
    };
    let item = shared.borrow_mut().next();
    item.or(default).ok_or_else(|| Fault::lookup("StopIteration"))
}

/// `all(iterable)`
pub(super) fn builtin_all(args: ArgValues) -> RunResult<Value> {
    let source = args.get_one_arg("all")?;
    let mut iter = ValueIter::from_value(&source)?;
    while let Some(item) = iter.next() {
        if !item.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

/// `any(iterable)`
pub(super) fn builtin_any(args: ArgValues) -> RunResult<Value> {
    let source = args.get_one_arg("any")?;
    let mut iter = ValueIter::from_value(&source)?;
    while let Some(item) = iter.next() {
        if item.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}
