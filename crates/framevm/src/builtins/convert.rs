use crate::{
    args::ArgValues,
    exception::{Fault, RunResult},
    value::Value,
};

/// `str([object])`
pub(super) fn builtin_str(args: ArgValues) -> RunResult<Value> {
    match args.get_up_to("str", 1)?.first() {
        None => Ok(Value::from("")),
        Some(Value::Str(s)) => Ok(Value::Str(s.clone())),
        Some(value) => Ok(Value::from(value.py_str())),
    }
}

/// `repr(object)`
pub(super) fn builtin_repr(args: ArgValues) -> RunResult<Value> {
    Ok(Value::from(args.get_one_arg("repr")?.py_repr()))
}

/// `bool([object])`
pub(super) fn builtin_bool(args: ArgValues) -> RunResult<Value> {
    Ok(Value::Bool(
        args.get_up_to("bool", 1)?.first().is_some_and(Value::is_truthy),
    ))
}

/// `int([value])`: truncates floats and parses decimal strings.
pub(super) fn builtin_int(args: ArgValues) -> RunResult<Value> {
    match args.get_up_to("int", 1)?.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Float(f)) => {
            if f.is_nan() {
                return Err(Fault::invalid_value("cannot convert float NaN to integer"));
            }
            let truncated = f.trunc();
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(Fault::overflow());
            }
            Ok(Value::Int(truncated as i64))
        }
        Some(Value::Str(s)) => parse_int(s).map(Value::Int).ok_or_else(|| {
            Fault::invalid_value(format!("invalid literal for int() with base 10: {}", Value::Str(s.clone()).py_repr()))
        }),
        Some(other) => Err(Fault::type_mismatch(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    s.replace('_', "").parse().ok()
}

/// `float([value])`: accepts numbers and decimal strings, including `inf` and `nan`.
pub(super) fn builtin_float(args: ArgValues) -> RunResult<Value> {
    match args.get_up_to("float", 1)?.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Float(f)) => Ok(Value::Float(*f)),
        Some(Value::Str(s)) => parse_float(s).map(Value::Float).ok_or_else(|| {
            Fault::invalid_value(format!("could not convert string to float: {}", Value::Str(s.clone()).py_repr()))
        }),
        Some(other) => match other.as_number() {
            Some(number) => Ok(Value::Float(number.as_f64())),
            None => Err(Fault::type_mismatch(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))),
        },
    }
}

fn parse_float(s: &str) -> Option<f64> {
    let s = s.trim();
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    match unsigned.to_ascii_lowercase().as_str() {
        "inf" | "infinity" | "nan" => s.to_ascii_lowercase().parse().ok(),
        _ if unsigned.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-' | '_')) => {
            s.replace('_', "").parse().ok()
        }
        _ => None,
    }
}
