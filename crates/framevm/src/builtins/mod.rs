//! Built-in functions and the default built-in scope.
//!
//! Every builtin is a [`NativeFunction`]: a host closure receiving the call's
//! arguments and the active print writer. Builtins never call back into
//! interpreted code.

mod collections;
mod convert;
mod iter;
mod numeric;
mod print;

use std::{fmt, rc::Rc};

use crate::{args::ArgValues, exception::RunResult, io::PrintWriter, namespace::Namespace, value::Value};

/// Signature of a native function body.
pub type NativeFn = dyn Fn(ArgValues, &mut dyn PrintWriter) -> RunResult<Value>;

/// A host-implemented callable stored in the built-in scope.
pub struct NativeFunction {
    name: Rc<str>,
    func: Box<NativeFn>,
}

impl NativeFunction {
    /// Wraps a host closure.
    pub fn new(
        name: impl Into<Rc<str>>,
        func: impl Fn(ArgValues, &mut dyn PrintWriter) -> RunResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the function.
    pub fn call(&self, args: ArgValues, print: &mut dyn PrintWriter) -> RunResult<Value> {
        (self.func)(args, print)
    }

    /// Wraps the function as a value ready to be stored in a scope.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Builtin(Rc::new(self))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Builtins that ignore the print writer.
type PureFn = fn(ArgValues) -> RunResult<Value>;

const PURE_BUILTINS: &[(&str, PureFn)] = &[
    ("len", collections::builtin_len),
    ("list", collections::builtin_list),
    ("tuple", collections::builtin_tuple),
    ("dict", collections::builtin_dict),
    ("set", collections::builtin_set),
    ("sorted", collections::builtin_sorted),
    ("reversed", collections::builtin_reversed),
    ("str", convert::builtin_str),
    ("int", convert::builtin_int),
    ("float", convert::builtin_float),
    ("bool", convert::builtin_bool),
    ("repr", convert::builtin_repr),
    ("range", iter::builtin_range),
    ("enumerate", iter::builtin_enumerate),
    ("zip", iter::builtin_zip),
    ("iter", iter::builtin_iter),
    ("next", iter::builtin_next),
    ("all", iter::builtin_all),
    ("any", iter::builtin_any),
    ("abs", numeric::builtin_abs),
    ("min", numeric::builtin_min),
    ("max", numeric::builtin_max),
    ("sum", numeric::builtin_sum),
];

/// Builds a fresh built-in scope holding the standard builtins.
///
/// Embedders can add their own capabilities to the returned scope with
/// [`Namespace::set`] and [`NativeFunction::into_value`].
#[must_use]
pub fn default_builtins() -> Namespace {
    let builtins = Namespace::new();
    builtins.set("print", NativeFunction::new("print", print::builtin_print).into_value());
    for &(name, func) in PURE_BUILTINS {
        builtins.set(name, NativeFunction::new(name, move |args, _| func(args)).into_value());
    }
    builtins
}
