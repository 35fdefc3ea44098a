//! Call-related opcodes: `CALL`, `CALL_KW`, `CALL_FUNCTION_EX`, `MAKE_FUNCTION`
//! and `SET_FUNCTION_ATTRIBUTE`.

use std::rc::Rc;

use indexmap::IndexMap;

use super::{Flow, Frame, Vm};
use crate::{
    args::ArgValues,
    exception::{Fault, RunResult},
    function::Function,
    io::PrintWriter,
    namespace::Namespace,
    resource::ResourceTracker,
    tracer::VmTracer,
    value::Value,
};

/// Outcome of invoking a callable.
#[derive(Debug)]
pub(super) enum CallResult {
    /// The call completed; push this value onto the caller's stack.
    Push(Value),
    /// An interpreted function was entered; the dispatch loop switches to this frame.
    Frame(Box<Frame>),
}

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> Vm<'_, T, P, Tr> {
    /// `CALL(argc)` and `CALL_KW(argc)`.
    ///
    /// Pops `argc` arguments, then the self-or-null slot, then the callable.
    /// The trailing `kw_names.len()` arguments are passed by keyword. A
    /// non-null self slot is passed as the first positional argument.
    pub(super) fn exec_call(
        &mut self,
        frame: &mut Frame,
        argc: usize,
        kw_names: Option<Rc<[Value]>>,
    ) -> RunResult<Flow> {
        let mut positional = frame.pop_n(argc)?;
        let keywords = match kw_names {
            Some(names) => split_keywords(&mut positional, &names)?,
            None => IndexMap::new(),
        };
        let marker = frame.pop()?;
        let callable = frame.pop()?;
        let mut args = ArgValues::with_keywords(positional, keywords);
        let callable = match (callable, marker) {
            // 3.11/3.12 put `NULL` below the callable.
            (Value::Null, callable) | (callable, Value::Null) => callable,
            (callable, receiver) => {
                args.prepend(receiver);
                callable
            }
        };
        self.finish_call(frame, callable, args)
    }

    /// `CALL_FUNCTION_EX(flags)`: arguments come from an iterable and, with flag
    /// bit 0, a mapping of keyword arguments.
    pub(super) fn exec_call_function_ex(&mut self, frame: &mut Frame, flags: u32) -> RunResult<Flow> {
        let keywords = if flags & 1 == 1 {
            match frame.pop()? {
                Value::Dict(dict) => dict
                    .borrow()
                    .iter()
                    .map(|(key, value)| match key {
                        Value::Str(name) => Ok((Rc::clone(name), value.clone())),
                        other => Err(Fault::type_mismatch(format!(
                            "keywords must be strings, not '{}'",
                            other.type_name()
                        ))),
                    })
                    .collect::<RunResult<IndexMap<_, _>>>()?,
                other => {
                    return Err(Fault::type_mismatch(format!(
                        "argument after ** must be a mapping, not '{}'",
                        other.type_name()
                    )));
                }
            }
        } else {
            IndexMap::new()
        };
        let positional = frame.pop()?.collect_items()?;
        let marker = frame.pop()?;
        let callable = frame.pop()?;
        let mut args = ArgValues::with_keywords(positional, keywords);
        let callable = match (callable, marker) {
            (Value::Null, callable) | (callable, Value::Null) => callable,
            (callable, receiver) => {
                args.prepend(receiver);
                callable
            }
        };
        self.finish_call(frame, callable, args)
    }

    fn finish_call(&mut self, frame: &mut Frame, callable: Value, args: ArgValues) -> RunResult<Flow> {
        match self.call(callable, args, &frame.builtins)? {
            CallResult::Push(value) => {
                frame.push(value);
                Ok(Flow::Next)
            }
            CallResult::Frame(callee) => Ok(Flow::Call(callee)),
        }
    }

    /// Invokes `callable`. Interpreted functions are not run here: their bound
    /// frame is handed back to the dispatch loop.
    pub(super) fn call(&mut self, callable: Value, args: ArgValues, builtins: &Namespace) -> RunResult<CallResult> {
        match callable {
            Value::Function(function) => {
                let bound = function.bind(args)?;
                let locals = function.seed_locals(bound);
                Ok(CallResult::Frame(Box::new(Frame::new_function(
                    &function,
                    locals,
                    builtins.clone(),
                ))))
            }
            Value::Builtin(native) => native.call(args, &mut *self.print).map(CallResult::Push),
            Value::Method(method) => method.call(args).map(CallResult::Push),
            other => Err(Fault::type_mismatch(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// `MAKE_FUNCTION(flags)`: pops the code object and, for the legacy flag
    /// form, the attribute values the flags name.
    pub(super) fn make_function(&mut self, frame: &mut Frame, flags: u32) -> RunResult<()> {
        let code = match frame.pop()? {
            Value::Code(code) => code,
            other => {
                return Err(Fault::type_mismatch(format!(
                    "MAKE_FUNCTION expected a code object, got '{}'",
                    other.type_name()
                )));
            }
        };
        let function = Function::new(code, frame.locals.clone(), frame.globals.clone());
        for flag in [0x08, 0x04, 0x02, 0x01] {
            if flags & flag != 0 {
                let value = frame.pop()?;
                apply_function_attribute(&function, flag, value)?;
            }
        }
        let defaults = function.defaults();
        self.tracer
            .on_make_function(defaults.positional.len(), defaults.keyword.len());
        frame.push(Value::Function(Rc::new(function)));
        Ok(())
    }
}

/// `SET_FUNCTION_ATTRIBUTE(flag)`: pops the function, then the attribute value.
pub(super) fn set_function_attribute(frame: &mut Frame, flag: u32) -> RunResult<()> {
    let function = frame.pop()?;
    let value = frame.pop()?;
    let Value::Function(func) = &function else {
        return Err(Fault::type_mismatch(format!(
            "SET_FUNCTION_ATTRIBUTE expected a function, got '{}'",
            function.type_name()
        )));
    };
    apply_function_attribute(func, flag, value)?;
    frame.push(function);
    Ok(())
}

fn apply_function_attribute(function: &Function, flag: u32, value: Value) -> RunResult<()> {
    match flag {
        0x01 => function.set_defaults(value),
        0x02 => function.set_kwdefaults(value),
        // annotations
        0x04 => Ok(()),
        0x08 => {
            function.set_closure(value);
            Ok(())
        }
        other => Err(Fault::unsupported(format!("unknown function attribute flag {other:#x}"))),
    }
}

/// Moves the trailing keyword arguments out of `positional`.
fn split_keywords(positional: &mut Vec<Value>, names: &[Value]) -> RunResult<IndexMap<Rc<str>, Value>> {
    let Some(split) = positional.len().checked_sub(names.len()) else {
        return Err(Fault::stack(format!(
            "{} keyword names given for {} arguments",
            names.len(),
            positional.len()
        )));
    };
    let values = positional.split_off(split);
    names
        .iter()
        .zip(values)
        .map(|(name, value)| match name {
            Value::Str(name) => Ok((Rc::clone(name), value)),
            other => Err(Fault::type_mismatch(format!(
                "keyword names must be strings, not '{}'",
                other.type_name()
            ))),
        })
        .collect()
}
