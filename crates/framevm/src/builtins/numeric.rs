use std::cmp::Ordering;

use crate::{
    args::ArgValues,
    bytecode::BinaryOp,
    exception::{Fault, RunResult},
    operators,
    value::{Number, Value},
};

/// `abs(x)`
pub(super) fn builtin_abs(args: ArgValues) -> RunResult<Value> {
    let value = args.get_one_arg("abs")?;
    match value.as_number() {
        Some(Number::Int(i)) => i.checked_abs().map(Value::Int).ok_or_else(Fault::overflow),
        Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
        None => Err(Fault::type_mismatch(format!(
            "bad operand type for abs(): '{}'",
            value.type_name()
        ))),
    }
}

/// `min(iterable, *, default=...)` or `min(a, b, *rest)`
pub(super) fn builtin_min(args: ArgValues) -> RunResult<Value> {
    extreme(args, "min", Ordering::Less)
}

/// `max(iterable, *, default=...)` or `max(a, b, *rest)`
pub(super) fn builtin_max(args: ArgValues) -> RunResult<Value> {
    extreme(args, "max", Ordering::Greater)
}

/// Picks the first item that no later item beats in the `wanted` direction.
fn extreme(mut args: ArgValues, name: &str, wanted: Ordering) -> RunResult<Value> {
    let default = args.take_keyword("default");
    args.check_no_kwargs(name)?;
    let items = match args.positional.len() {
        0 => return Err(Fault::type_mismatch(format!("{name} expected at least 1 argument, got 0"))),
        1 => args.positional[0].collect_items()?,
        _ => args.positional,
    };
    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return default.ok_or_else(|| Fault::invalid_value(format!("{name}() arg is an empty sequence")));
    };
    for item in items {
        if item.sort_cmp(&best)? == wanted {
            best = item;
        }
    }
    Ok(best)
}

/// `sum(iterable, start=0)`
pub(super) fn builtin_sum(mut args: ArgValues) -> RunResult<Value> {
    let start = args.take_keyword("start");
    let (source, positional_start) = args.get_one_two_args("sum")?;
    let mut total = positional_start.or(start).unwrap_or(Value::Int(0));
    if matches!(total, Value::Str(_)) {
        return Err(Fault::type_mismatch("sum() can't sum strings [use ''.join(seq) instead]"));
    }
    for item in source.collect_items()? {
        total = operators::binary(&total, &item, BinaryOp::Add)?;
    }
    Ok(total)
}
