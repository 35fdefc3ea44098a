//! Activation records.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{
    bytecode::Code,
    exception::{Fault, RunResult},
    function::Function,
    namespace::Namespace,
    value::Value,
};

/// One activation of a code object.
///
/// A frame owns its operand stack exclusively. `pc` indexes the instruction
/// list (not the byte offset); the frame has finished once `pc` reaches the
/// instruction count.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(super) code: Rc<Code>,
    pub(super) pc: usize,
    pub(super) stack: SmallVec<[Value; 8]>,
    pub(super) locals: Namespace,
    pub(super) globals: Namespace,
    pub(super) builtins: Namespace,
    /// Live scope of the defining frame, consulted by `LOAD_DEREF`. `None` at module level.
    pub(super) defining_scope: Option<Namespace>,
    pub(super) return_value: Option<Value>,
    /// Keyword names announced by `KW_NAMES` for the next `CALL`.
    pub(super) kw_names: Option<Rc<[Value]>>,
}

impl Frame {
    /// Creates the module-level frame: locals and globals are the same scope.
    pub(crate) fn new_module(code: Rc<Code>, globals: Namespace, builtins: Namespace) -> Self {
        Self {
            code,
            pc: 0,
            stack: SmallVec::new(),
            locals: globals.clone(),
            globals,
            builtins,
            defining_scope: None,
            return_value: None,
            kw_names: None,
        }
    }

    /// Creates the frame of a function call with already bound locals.
    pub(crate) fn new_function(function: &Function, locals: Namespace, builtins: Namespace) -> Self {
        Self {
            code: Rc::clone(function.code()),
            pc: 0,
            stack: SmallVec::new(),
            locals,
            globals: function.globals().clone(),
            builtins,
            defining_scope: Some(function.defining_scope().clone()),
            return_value: None,
            kw_names: None,
        }
    }

    pub(super) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub(super) fn pop(&mut self) -> RunResult<Value> {
        self.stack.pop().ok_or_else(|| self.underflow(1))
    }

    /// Pops `n` values, returned deepest first.
    pub(super) fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        let len = self.stack.len();
        if n > len {
            return Err(self.underflow(n));
        }
        Ok(self.stack.drain(len - n..).collect())
    }

    /// Borrows the value `depth` slots below the top (0 is the top).
    pub(super) fn peek(&self, depth: usize) -> RunResult<&Value> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|index| self.stack.get(index))
            .ok_or_else(|| self.underflow(depth + 1))
    }

    /// Index into `stack` of the slot `depth` below the top.
    pub(super) fn slot(&self, depth: usize) -> RunResult<usize> {
        self.stack.len().checked_sub(depth + 1).ok_or_else(|| self.underflow(depth + 1))
    }

    fn underflow(&self, wanted: usize) -> Fault {
        Fault::stack(format!(
            "operand stack underflow in '{}': needed {wanted}, have {}",
            self.code.name(),
            self.stack.len()
        ))
    }

    /// Implicit name lookup: locals, then globals, then builtins.
    pub(super) fn lookup_name(&self, name: &str) -> RunResult<Value> {
        self.locals
            .get(name)
            .or_else(|| self.globals.get(name))
            .or_else(|| self.builtins.get(name))
            .ok_or_else(|| Fault::name_not_defined(name))
    }

    /// Global lookup: globals, then builtins.
    pub(super) fn lookup_global(&self, name: &str) -> RunResult<Value> {
        self.globals
            .get(name)
            .or_else(|| self.builtins.get(name))
            .ok_or_else(|| Fault::name_not_defined(name))
    }
}
