//! Attribute opcodes: `LOAD_ATTR`, `LOAD_METHOD` and `STORE_ATTR`.

use std::rc::Rc;

use super::Frame;
use crate::{
    exception::{Fault, RunResult},
    types::{BoundMethod, MethodKind},
    value::Value,
};

/// Loads `name` from the value on top of the stack.
///
/// In method form a built-in method pushes `[method, receiver]`, so the
/// following `CALL` passes the receiver as `self`. Any other attribute pushes
/// `[attribute, NULL]`. In plain form only the attribute (a bound method for
/// methods) is pushed.
pub(super) fn load_attr(frame: &mut Frame, name: &str, method_form: bool) -> RunResult<()> {
    let owner = frame.pop()?;
    if let Some(kind) = MethodKind::resolve(&owner, name) {
        if method_form {
            frame.push(Value::Method(Rc::new(BoundMethod::unbound(kind))));
            frame.push(owner);
        } else {
            frame.push(Value::Method(Rc::new(BoundMethod::bound(kind, owner))));
        }
        return Ok(());
    }
    let value = data_attr(&owner, name)?;
    frame.push(value);
    if method_form {
        frame.push(Value::Null);
    }
    Ok(())
}

/// Non-method attributes of the built-in types.
fn data_attr(owner: &Value, name: &str) -> RunResult<Value> {
    let found = match (owner, name) {
        (Value::Function(function), "__name__" | "__qualname__") => Some(Value::str(function.name())),
        (Value::Function(function), "__defaults__") => Some(function.defaults_value()),
        (Value::Function(function), "__kwdefaults__") => Some(function.kwdefaults_value()),
        (Value::Function(function), "__code__") => Some(Value::Code(Rc::clone(function.code()))),
        (Value::Function(function), "__closure__") => Some(function.closure().unwrap_or(Value::None)),
        (Value::Builtin(native), "__name__" | "__qualname__") => Some(Value::str(native.name())),
        (Value::Code(code), "co_name") => Some(Value::str(code.name())),
        (Value::Range(range), "start") => Some(Value::Int(range.start)),
        (Value::Range(range), "stop") => Some(Value::Int(range.stop)),
        (Value::Range(range), "step") => Some(Value::Int(range.step)),
        (Value::Slice(slice), "start") => Some(slice.start.map_or(Value::None, Value::Int)),
        (Value::Slice(slice), "stop") => Some(slice.stop.map_or(Value::None, Value::Int)),
        (Value::Slice(slice), "step") => Some(slice.step.map_or(Value::None, Value::Int)),
        _ => None,
    };
    found.ok_or_else(|| {
        Fault::lookup(format!(
            "'{}' object has no attribute '{name}'",
            owner.type_name()
        ))
    })
}

/// `STORE_ATTR`: pops the owner, then the value. Only function default tables are writable.
pub(super) fn store_attr(frame: &mut Frame, name: &str) -> RunResult<()> {
    let owner = frame.pop()?;
    let value = frame.pop()?;
    match (&owner, name) {
        (Value::Function(function), "__defaults__") => function.set_defaults(value),
        (Value::Function(function), "__kwdefaults__") => function.set_kwdefaults(value),
        _ => Err(Fault::unsupported(format!(
            "cannot set attribute '{name}' on '{}' object",
            owner.type_name()
        ))),
    }
}
