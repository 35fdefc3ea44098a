//! Python semantics of the arithmetic, bitwise, comparison and membership operators.
//!
//! These functions are shared by the VM's operator opcodes and by builtins such
//! as `sum()`. They never touch the operand stack.

use std::{cmp::Ordering, rc::Rc};

use crate::{
    bytecode::{BinaryOp, CompareOp},
    exception::{Fault, RunResult},
    types::{Set, ValueIter},
    value::{Number, Value},
};

/// Applies a binary operator, producing a new value.
pub(crate) fn binary(lhs: &Value, rhs: &Value, op: BinaryOp) -> RunResult<Value> {
    let result = match op {
        BinaryOp::Add => add(lhs, rhs)?,
        BinaryOp::Subtract => subtract(lhs, rhs)?,
        BinaryOp::Multiply => multiply(lhs, rhs)?,
        BinaryOp::TrueDivide => true_divide(lhs, rhs)?,
        BinaryOp::FloorDivide => floor_divide(lhs, rhs)?,
        BinaryOp::Remainder => remainder(lhs, rhs)?,
        BinaryOp::Power => power(lhs, rhs)?,
        BinaryOp::Lshift => shift(lhs, rhs, true)?,
        BinaryOp::Rshift => shift(lhs, rhs, false)?,
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => bitwise(lhs, rhs, op)?,
        BinaryOp::MatrixMultiply => {
            return Err(Fault::unsupported("matrix multiplication is not supported"));
        }
    };
    result.ok_or_else(|| operand_error(lhs, rhs, op, false))
}

/// Applies the in-place form of a binary operator (`+=` etc.).
///
/// Mutable containers are updated through their shared handle and returned;
/// every other combination falls back to [`binary`].
pub(crate) fn binary_inplace(lhs: &Value, rhs: &Value, op: BinaryOp) -> RunResult<Value> {
    match (lhs, op) {
        (Value::List(list), BinaryOp::Add) => {
            let items = rhs.collect_items()?;
            list.borrow_mut().extend(items);
            Ok(lhs.clone())
        }
        (Value::List(list), BinaryOp::Multiply) => {
            let count = rhs
                .as_int()
                .ok_or_else(|| operand_error(lhs, rhs, op, true))?;
            let repeated = repeat(&list.borrow(), usize::try_from(count).unwrap_or(0), lhs)?;
            *list.borrow_mut() = repeated;
            Ok(lhs.clone())
        }
        (Value::Set(set), BinaryOp::Or | BinaryOp::And | BinaryOp::Subtract | BinaryOp::Xor) => {
            let Value::Set(other) = rhs else {
                return Err(operand_error(lhs, rhs, op, true));
            };
            let combined = set_op(&set.borrow(), &other.borrow(), op);
            *set.borrow_mut() = combined;
            Ok(lhs.clone())
        }
        (Value::Dict(dict), BinaryOp::Or) => {
            let Value::Dict(other) = rhs else {
                return Err(operand_error(lhs, rhs, op, true));
            };
            let other = other.borrow().clone();
            dict.borrow_mut().update(&other);
            Ok(lhs.clone())
        }
        _ => binary(lhs, rhs, op).map_err(|err| match err {
            Fault::TypeMismatch(_) => operand_error(lhs, rhs, op, true),
            other => other,
        }),
    }
}

/// Length of the sequence a binary operation would build, for concatenation
/// and repetition. `None` when the operation does not build a sequence.
pub(crate) fn result_len_hint(lhs: &Value, rhs: &Value, op: BinaryOp) -> Option<usize> {
    match op {
        BinaryOp::Add => Some(sequence_len(lhs)?.saturating_add(sequence_len(rhs)?)),
        BinaryOp::Multiply => {
            let (len, count) = match (sequence_len(lhs), sequence_len(rhs)) {
                (Some(len), None) => (len, rhs.as_int()?),
                (None, Some(len)) => (len, lhs.as_int()?),
                _ => return None,
            };
            Some(len.saturating_mul(usize::try_from(count).unwrap_or(0)))
        }
        _ => None,
    }
}

fn sequence_len(value: &Value) -> Option<usize> {
    match value {
        Value::Str(s) => Some(s.len()),
        Value::Tuple(items) => Some(items.len()),
        Value::List(items) => Some(items.borrow().len()),
        _ => None,
    }
}

fn operand_error(lhs: &Value, rhs: &Value, op: BinaryOp, inplace: bool) -> Fault {
    let suffix = if inplace { "=" } else { "" };
    Fault::type_mismatch(format!(
        "unsupported operand type(s) for {op}{suffix}: '{}' and '{}'",
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn numbers(lhs: &Value, rhs: &Value) -> Option<(Number, Number)> {
    Some((lhs.as_number()?, rhs.as_number()?))
}

fn add(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    if let Some(pair) = numbers(lhs, rhs) {
        return match pair {
            (Number::Int(a), Number::Int(b)) => a.checked_add(b).map(|v| Some(Value::Int(v))).ok_or_else(Fault::overflow),
            (a, b) => Ok(Some(Value::Float(a.as_f64() + b.as_f64()))),
        };
    }
    Ok(match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(Value::from(format!("{a}{b}"))),
        (Value::Tuple(a), Value::Tuple(b)) => Some(Value::Tuple(a.iter().chain(b.iter()).cloned().collect())),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Some(Value::list(items))
        }
        _ => None,
    })
}

fn subtract(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    if let Some(pair) = numbers(lhs, rhs) {
        return match pair {
            (Number::Int(a), Number::Int(b)) => a.checked_sub(b).map(|v| Some(Value::Int(v))).ok_or_else(Fault::overflow),
            (a, b) => Ok(Some(Value::Float(a.as_f64() - b.as_f64()))),
        };
    }
    Ok(match (lhs, rhs) {
        (Value::Set(a), Value::Set(b)) => Some(Value::set(a.borrow().difference(&b.borrow()))),
        _ => None,
    })
}

fn multiply(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    if let Some(pair) = numbers(lhs, rhs) {
        return match pair {
            (Number::Int(a), Number::Int(b)) => a.checked_mul(b).map(|v| Some(Value::Int(v))).ok_or_else(Fault::overflow),
            (a, b) => Ok(Some(Value::Float(a.as_f64() * b.as_f64()))),
        };
    }
    let (sequence, count) = match (lhs.as_int(), rhs.as_int()) {
        (None, Some(count)) => (lhs, count),
        (Some(count), None) => (rhs, count),
        _ => return Ok(None),
    };
    let count = usize::try_from(count).unwrap_or(0);
    Ok(match sequence {
        Value::Str(s) => {
            repeated_len(s.len(), 1, count, sequence)?;
            Some(Value::from(s.repeat(count)))
        }
        Value::Tuple(items) => Some(Value::tuple(repeat(items, count, sequence)?)),
        Value::List(items) => Some(Value::list(repeat(&items.borrow(), count, sequence)?)),
        _ => None,
    })
}

fn repeat(items: &[Value], count: usize, sequence: &Value) -> RunResult<Vec<Value>> {
    let len = repeated_len(items.len(), size_of::<Value>(), count, sequence)?;
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(len);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    Ok(out)
}

/// Length of `len * count`, failing when the result could never be allocated.
fn repeated_len(len: usize, item_size: usize, count: usize, sequence: &Value) -> RunResult<usize> {
    len.checked_mul(count)
        .filter(|total| total.checked_mul(item_size).is_some_and(|bytes| bytes <= isize::MAX as usize))
        .ok_or_else(|| Fault::arithmetic(format!("repeated {} is too long", sequence.type_name())))
}

fn true_divide(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    let Some((a, b)) = numbers(lhs, rhs) else {
        return Ok(None);
    };
    let divisor = b.as_f64();
    if divisor == 0.0 {
        return Err(Fault::zero_division());
    }
    Ok(Some(Value::Float(a.as_f64() / divisor)))
}

fn floor_divide(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    let Some(pair) = numbers(lhs, rhs) else {
        return Ok(None);
    };
    match pair {
        (Number::Int(_), Number::Int(0)) => Err(Fault::zero_division()),
        (Number::Int(a), Number::Int(b)) => {
            let quotient = a.checked_div(b).ok_or_else(Fault::overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Ok(Some(Value::Int(if adjust { quotient - 1 } else { quotient })))
        }
        (a, b) => {
            let divisor = b.as_f64();
            if divisor == 0.0 {
                return Err(Fault::arithmetic("float floor division by zero"));
            }
            Ok(Some(Value::Float((a.as_f64() / divisor).floor())))
        }
    }
}

fn remainder(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    if matches!(lhs, Value::Str(_)) {
        return Err(Fault::unsupported("printf-style string formatting is not supported"));
    }
    let Some(pair) = numbers(lhs, rhs) else {
        return Ok(None);
    };
    match pair {
        (Number::Int(_), Number::Int(0)) => Err(Fault::arithmetic("integer modulo by zero")),
        (Number::Int(a), Number::Int(b)) => {
            let rem = a.wrapping_rem(b);
            let rem = if rem != 0 && ((rem < 0) != (b < 0)) { rem + b } else { rem };
            Ok(Some(Value::Int(rem)))
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            if b == 0.0 {
                return Err(Fault::arithmetic("float modulo"));
            }
            let rem = a % b;
            let rem = if rem != 0.0 && ((rem < 0.0) != (b < 0.0)) { rem + b } else { rem };
            Ok(Some(Value::Float(rem)))
        }
    }
}

fn power(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    let Some(pair) = numbers(lhs, rhs) else {
        return Ok(None);
    };
    match pair {
        (Number::Int(base), Number::Int(exp)) if exp >= 0 => int_power(base, exp).map(|v| Some(Value::Int(v))),
        (a, b) => {
            let (base, exp) = (a.as_f64(), b.as_f64());
            if base == 0.0 && exp < 0.0 {
                return Err(Fault::arithmetic("0.0 cannot be raised to a negative power"));
            }
            if base < 0.0 && exp.fract() != 0.0 {
                return Err(Fault::invalid_value("complex results are not supported"));
            }
            Ok(Some(Value::Float(base.powf(exp))))
        }
    }
}

fn int_power(base: i64, exp: i64) -> RunResult<i64> {
    match base {
        0 => Ok(i64::from(exp == 0)),
        1 => Ok(1),
        -1 => Ok(if exp % 2 == 0 { 1 } else { -1 }),
        _ => u32::try_from(exp)
            .ok()
            .and_then(|exp| base.checked_pow(exp))
            .ok_or_else(Fault::overflow),
    }
}

fn shift(lhs: &Value, rhs: &Value, left: bool) -> RunResult<Option<Value>> {
    let (Some(value), Some(count)) = (lhs.as_int(), rhs.as_int()) else {
        return Ok(None);
    };
    if count < 0 {
        return Err(Fault::invalid_value("negative shift count"));
    }
    let result = if left {
        if value == 0 {
            0
        } else if count >= 64 {
            return Err(Fault::overflow());
        } else {
            i64::try_from(i128::from(value) << count).map_err(|_| Fault::overflow())?
        }
    } else if count >= 64 {
        if value < 0 { -1 } else { 0 }
    } else {
        value >> count
    };
    Ok(Some(Value::Int(result)))
}

fn bitwise(lhs: &Value, rhs: &Value, op: BinaryOp) -> RunResult<Option<Value>> {
    Ok(match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(match op {
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            _ => a ^ b,
        })),
        (Value::Set(a), Value::Set(b)) => Some(Value::set(set_op(&a.borrow(), &b.borrow(), op))),
        (Value::Dict(a), Value::Dict(b)) if op == BinaryOp::Or => {
            let mut merged = a.borrow().clone();
            merged.update(&b.borrow());
            Some(Value::dict(merged))
        }
        _ => match (lhs.as_int(), rhs.as_int()) {
            (Some(a), Some(b)) => Some(Value::Int(match op {
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                _ => a ^ b,
            })),
            _ => None,
        },
    })
}

fn set_op(a: &Set, b: &Set, op: BinaryOp) -> Set {
    match op {
        BinaryOp::And => a.intersection(b),
        BinaryOp::Subtract => a.difference(b),
        BinaryOp::Xor => a.symmetric_difference(b),
        _ => a.union(b),
    }
}

/// `-x`
pub(crate) fn negative(value: &Value) -> RunResult<Value> {
    match value.as_number() {
        Some(Number::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(Fault::overflow),
        Some(Number::Float(f)) => Ok(Value::Float(-f)),
        None => Err(unary_error("-", value)),
    }
}

/// `+x`
pub(crate) fn positive(value: &Value) -> RunResult<Value> {
    match value.as_number() {
        Some(Number::Int(i)) => Ok(Value::Int(i)),
        Some(Number::Float(f)) => Ok(Value::Float(f)),
        None => Err(unary_error("+", value)),
    }
}

/// `~x`
pub(crate) fn invert(value: &Value) -> RunResult<Value> {
    value.as_int().map(|i| Value::Int(!i)).ok_or_else(|| unary_error("~", value))
}

fn unary_error(symbol: &str, value: &Value) -> Fault {
    Fault::type_mismatch(format!("bad operand type for unary {symbol}: '{}'", value.type_name()))
}

/// Applies a rich comparison.
pub(crate) fn compare(lhs: &Value, rhs: &Value, op: CompareOp) -> RunResult<bool> {
    match op {
        CompareOp::Eq => return Ok(lhs.py_eq(rhs)),
        CompareOp::Ne => return Ok(!lhs.py_eq(rhs)),
        _ => {}
    }
    let ordering = lhs.py_partial_cmp(rhs).map_err(|_| {
        Fault::type_mismatch(format!(
            "'{op}' not supported between instances of '{}' and '{}'",
            lhs.type_name(),
            rhs.type_name()
        ))
    })?;
    Ok(match (op, ordering) {
        (_, None) => false,
        (CompareOp::Lt, Some(ord)) => ord == Ordering::Less,
        (CompareOp::Le, Some(ord)) => ord != Ordering::Greater,
        (CompareOp::Gt, Some(ord)) => ord == Ordering::Greater,
        (_, Some(ord)) => ord != Ordering::Less,
    })
}

/// Python `item in container`.
pub(crate) fn contains(container: &Value, item: &Value) -> RunResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(Fault::type_mismatch(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Tuple(items) => Ok(items.iter().any(|candidate| candidate.py_eq(item))),
        Value::List(items) => Ok(items.borrow().iter().any(|candidate| candidate.py_eq(item))),
        Value::Dict(dict) => dict.borrow().contains_key(item),
        Value::Set(set) => set.borrow().contains(item),
        Value::Range(range) => Ok(match item.as_number() {
            Some(Number::Int(i)) => range.contains(i),
            Some(Number::Float(f)) => f.fract() == 0.0 && range.contains(f as i64),
            None => false,
        }),
        Value::Iter(shared) => {
            let mut iter = ValueIter::Shared(Rc::clone(shared));
            while let Some(candidate) = iter.next() {
                if candidate.py_eq(item) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(Fault::type_mismatch(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}
