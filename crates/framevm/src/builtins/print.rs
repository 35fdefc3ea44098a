use std::borrow::Cow;

use crate::{
    args::ArgValues,
    exception::{Fault, RunResult},
    io::PrintWriter,
    value::Value,
};

/// `print(*args, sep=' ', end='\n')`
pub(super) fn builtin_print(mut args: ArgValues, print: &mut dyn PrintWriter) -> RunResult<Value> {
    let sep = text_keyword(&mut args, "sep")?;
    let end = text_keyword(&mut args, "end")?;
    args.check_no_kwargs("print")?;

    for (index, value) in args.positional.iter().enumerate() {
        if index > 0 {
            match &sep {
                Some(sep) => print.stdout_write(Cow::Borrowed(sep.as_str()))?,
                None => print.stdout_push(' ')?,
            }
        }
        print.stdout_write(Cow::Owned(value.py_str()))?;
    }
    match &end {
        Some(end) => print.stdout_write(Cow::Borrowed(end.as_str()))?,
        None => print.stdout_push('\n')?,
    }
    Ok(Value::None)
}

/// Reads a `str`-or-`None` keyword; `None` means "use the default".
fn text_keyword(args: &mut ArgValues, key: &str) -> RunResult<Option<String>> {
    match args.take_keyword(key) {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.to_string())),
        Some(other) => Err(Fault::type_mismatch(format!(
            "{key} must be None or a string, not {}",
            other.type_name()
        ))),
    }
}
