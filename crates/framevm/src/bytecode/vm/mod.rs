//! Frame-based virtual machine.
//!
//! Calls never recurse on the host stack: the dispatch loop keeps the running
//! frame in a local and parks suspended callers in an explicit frame stack.
//! A call pushes the caller and switches to the callee; when the callee's
//! `pc` reaches its instruction count the caller is resumed with the result.

mod attr;
mod binary;
mod call;
mod collections;
mod compare;
mod format;
mod frame;

use std::rc::Rc;

pub(crate) use frame::Frame;

use self::{
    attr::{load_attr, store_attr},
    binary::{call_intrinsic_1, unary_op},
    call::set_function_attribute,
    collections::{
        binary_slice, binary_subscr, build_const_key_map, build_map, build_set, build_slice, build_string,
        delete_subscr, dict_update, list_append, list_extend, map_add, set_add, set_update, store_slice,
        store_subscr, unpack_ex, unpack_sequence,
    },
    compare::{compare_op, contains_op, is_op},
    format::{convert_value, format_simple, format_value, format_with_spec_op},
};
use crate::{
    bytecode::{Code, Instruction, Opcode},
    exception::{Fault, RunResult},
    io::PrintWriter,
    namespace::Namespace,
    resource::ResourceTracker,
    tracer::VmTracer,
    types::ValueIter,
    value::Value,
};

/// What the dispatch loop does after an instruction.
pub(super) enum Flow {
    /// Continue with the following instruction.
    Next,
    /// Continue at this instruction index.
    Jump(usize),
    /// Capture the return value and finish the frame.
    Return(Value),
    /// Suspend the current frame and run this one.
    Call(Box<Frame>),
}

/// The dispatch loop and the frame stack of one run.
///
/// Borrows the host-supplied tracker, print writer and tracer for the
/// duration of a run.
pub(crate) struct Vm<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer> {
    /// Suspended callers, outermost first.
    frames: Vec<Frame>,
    tracker: &'a mut T,
    print: &'a mut P,
    tracer: &'a mut Tr,
}

impl<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer> Vm<'a, T, P, Tr> {
    pub(crate) fn new(tracker: &'a mut T, print: &'a mut P, tracer: &'a mut Tr) -> Self {
        Self {
            frames: Vec::new(),
            tracker,
            print,
            tracer,
        }
    }

    /// Runs module-level code in a fresh global scope.
    pub(crate) fn run_module(&mut self, code: Rc<Code>, builtins: Namespace) -> RunResult<Value> {
        self.tracer.on_call(code.name(), 1);
        let globals = Namespace::new();
        let frame = Frame::new_module(code, globals.clone(), builtins);
        let result = self.run_frame(frame).inspect_err(|fault| {
            self.tracer.on_fault(fault);
            self.frames.clear();
        });
        // functions defined at module level hold the globals that hold them
        globals.clear();
        result
    }

    fn run_frame(&mut self, mut current: Frame) -> RunResult<Value> {
        loop {
            if current.pc >= current.code.len() {
                let value = current.return_value.take().unwrap_or(Value::None);
                let Some(caller) = self.frames.pop() else {
                    self.tracer.on_return(0);
                    return Ok(value);
                };
                self.tracer.on_return(self.frames.len() + 1);
                current = caller;
                current.push(value);
                continue;
            }

            self.tracker.check_time()?;

            let code = Rc::clone(&current.code);
            let instr = &code.instructions()[current.pc];
            self.tracer
                .on_instruction(instr.offset, instr.opcode, current.stack.len(), self.frames.len() + 1);
            current.pc += 1;

            match self.step(&mut current, &code, instr)? {
                Flow::Next => {}
                Flow::Jump(index) => current.pc = index,
                Flow::Return(value) => {
                    current.return_value = Some(value);
                    current.pc = code.len();
                }
                Flow::Call(callee) => {
                    let depth = self.frames.len() + 1;
                    self.tracker.check_recursion_depth(depth)?;
                    self.tracer.on_call(callee.code.name(), depth + 1);
                    let caller = std::mem::replace(&mut current, *callee);
                    self.frames.push(caller);
                }
            }
        }
    }

    /// Executes one instruction against `frame`.
    fn step(&mut self, frame: &mut Frame, code: &Code, instr: &Instruction) -> RunResult<Flow> {
        match instr.opcode {
            // ============================================================
            // Bookkeeping
            // ============================================================
            Opcode::Nop
            | Opcode::Resume
            | Opcode::Cache
            | Opcode::ExtendedArg
            | Opcode::Precall
            | Opcode::MakeCell
            | Opcode::CopyFreeVars
            | Opcode::EndFor => {}

            // ============================================================
            // Stack manipulation
            // ============================================================
            Opcode::PopTop => {
                frame.pop()?;
            }
            Opcode::PushNull => frame.push(Value::Null),
            Opcode::Copy => copy(frame, instr.oparg as usize)?,
            Opcode::DupTop => copy(frame, 1)?,
            Opcode::Swap => swap(frame, instr.oparg as usize)?,
            Opcode::RotTwo => swap(frame, 2)?,
            Opcode::RotThree => {
                let start = frame.slot(2)?;
                frame.stack[start..].rotate_right(1);
            }

            // ============================================================
            // Constants and returns
            // ============================================================
            Opcode::LoadConst => frame.push(code.const_arg(instr)?.to_value()),
            Opcode::ReturnConst => return Ok(Flow::Return(code.const_arg(instr)?.to_value())),
            Opcode::ReturnValue => return Ok(Flow::Return(frame.pop()?)),

            // ============================================================
            // Names
            // ============================================================
            Opcode::LoadName => {
                let value = frame.lookup_name(code.name_arg(instr)?)?;
                frame.push(value);
            }
            Opcode::StoreName => {
                let value = frame.pop()?;
                frame.locals.set(Rc::clone(code.name_arg(instr)?), value);
            }
            Opcode::DeleteName => {
                let name = code.name_arg(instr)?;
                frame.locals.remove(name).ok_or_else(|| Fault::name_not_defined(name))?;
            }
            Opcode::LoadGlobal => {
                let value = frame.lookup_global(code.name_arg(instr)?)?;
                frame.push(value);
                if instr.oparg & 1 == 1 {
                    frame.push(Value::Null);
                }
            }
            Opcode::StoreGlobal => {
                let value = frame.pop()?;
                frame.globals.set(Rc::clone(code.name_arg(instr)?), value);
            }
            Opcode::DeleteGlobal => {
                let name = code.name_arg(instr)?;
                frame.globals.remove(name).ok_or_else(|| Fault::name_not_defined(name))?;
            }
            Opcode::LoadFast | Opcode::LoadFastCheck => {
                let value = load_fast(frame, code.name_arg(instr)?)?;
                frame.push(value);
            }
            Opcode::LoadFastAndClear => {
                let value = frame.locals.remove(code.name_arg(instr)?).unwrap_or(Value::Null);
                frame.push(value);
            }
            Opcode::LoadFastLoadFast => {
                let (first, second) = code.pair_arg(instr)?;
                let first = load_fast(frame, first)?;
                let second = load_fast(frame, second)?;
                frame.push(first);
                frame.push(second);
            }
            Opcode::StoreFast | Opcode::StoreDeref => {
                let value = frame.pop()?;
                store_fast(frame, code.name_arg(instr)?, value);
            }
            Opcode::StoreFastLoadFast => {
                let (store, load) = code.pair_arg(instr)?;
                let value = frame.pop()?;
                store_fast(frame, store, value);
                let value = load_fast(frame, load)?;
                frame.push(value);
            }
            Opcode::StoreFastStoreFast => {
                let (first, second) = code.pair_arg(instr)?;
                let value = frame.pop()?;
                store_fast(frame, first, value);
                let value = frame.pop()?;
                store_fast(frame, second, value);
            }
            Opcode::DeleteFast => {
                let name = code.name_arg(instr)?;
                frame.locals.remove(name).ok_or_else(|| Fault::name_not_defined(name))?;
            }
            Opcode::LoadDeref => {
                let value = self.load_deref(frame, code.name_arg(instr)?)?;
                frame.push(value);
            }
            Opcode::LoadClosure => frame.push(Value::Str(Rc::clone(code.name_arg(instr)?))),

            // ============================================================
            // Operators
            // ============================================================
            Opcode::UnaryNegative | Opcode::UnaryPositive | Opcode::UnaryNot | Opcode::UnaryInvert | Opcode::ToBool => {
                unary_op(frame, instr.opcode)?;
            }
            Opcode::BinaryOp => self.binary_op(frame, instr)?,
            Opcode::CompareOp => compare_op(frame, instr)?,
            Opcode::IsOp => is_op(frame, instr.oparg)?,
            Opcode::ContainsOp => contains_op(frame, instr.oparg)?,
            Opcode::CallIntrinsic1 => call_intrinsic_1(frame, instr.oparg)?,

            // ============================================================
            // Containers
            // ============================================================
            Opcode::BuildList => {
                let items = frame.pop_n(instr.oparg as usize)?;
                frame.push(Value::list(items));
            }
            Opcode::BuildTuple => {
                let items = frame.pop_n(instr.oparg as usize)?;
                frame.push(Value::tuple(items));
            }
            Opcode::BuildSet => build_set(frame, instr.oparg as usize)?,
            Opcode::BuildMap => build_map(frame, instr.oparg as usize)?,
            Opcode::BuildConstKeyMap => build_const_key_map(frame, instr.oparg as usize)?,
            Opcode::BuildString => build_string(frame, instr.oparg as usize)?,
            Opcode::BuildSlice => build_slice(frame, instr.oparg)?,
            Opcode::ListAppend => list_append(frame, instr.oparg as usize)?,
            Opcode::ListExtend => list_extend(frame, instr.oparg as usize)?,
            Opcode::ListToTuple => {
                let value = frame.pop()?;
                frame.push(Value::tuple(value.collect_items()?));
            }
            Opcode::SetAdd => set_add(frame, instr.oparg as usize)?,
            Opcode::SetUpdate => set_update(frame, instr.oparg as usize)?,
            Opcode::MapAdd => map_add(frame, instr.oparg as usize)?,
            Opcode::DictUpdate => dict_update(frame, instr.oparg as usize, false)?,
            Opcode::DictMerge => dict_update(frame, instr.oparg as usize, true)?,
            Opcode::BinarySubscr => binary_subscr(frame)?,
            Opcode::StoreSubscr => store_subscr(frame)?,
            Opcode::DeleteSubscr => delete_subscr(frame)?,
            Opcode::BinarySlice => binary_slice(frame)?,
            Opcode::StoreSlice => store_slice(frame)?,
            Opcode::UnpackSequence => unpack_sequence(frame, instr.oparg as usize)?,
            Opcode::UnpackEx => unpack_ex(frame, instr.oparg)?,

            // ============================================================
            // String formatting
            // ============================================================
            Opcode::FormatValue => format_value(frame, instr.oparg)?,
            Opcode::FormatSimple => format_simple(frame)?,
            Opcode::FormatWithSpec => format_with_spec_op(frame)?,
            Opcode::ConvertValue => convert_value(frame, instr.oparg)?,

            // ============================================================
            // Control flow
            // ============================================================
            Opcode::Jump
            | Opcode::JumpForward
            | Opcode::JumpBackward
            | Opcode::JumpBackwardNoInterrupt
            | Opcode::JumpAbsolute => return Ok(Flow::Jump(code.jump_index(instr)?)),
            Opcode::PopJumpIfTrue | Opcode::PopJumpIfFalse => {
                let value = frame.pop()?;
                if expect_bool(&value, instr.opcode)? == (instr.opcode == Opcode::PopJumpIfTrue) {
                    return Ok(Flow::Jump(code.jump_index(instr)?));
                }
            }
            Opcode::PopJumpIfNone | Opcode::PopJumpIfNotNone => {
                let value = frame.pop()?;
                if matches!(value, Value::None) == (instr.opcode == Opcode::PopJumpIfNone) {
                    return Ok(Flow::Jump(code.jump_index(instr)?));
                }
            }
            Opcode::JumpIfTrueOrPop | Opcode::JumpIfFalseOrPop => {
                let test = expect_bool(frame.peek(0)?, instr.opcode)?;
                if test == (instr.opcode == Opcode::JumpIfTrueOrPop) {
                    return Ok(Flow::Jump(code.jump_index(instr)?));
                }
                frame.pop()?;
            }
            Opcode::GetIter => {
                let value = frame.pop()?;
                let iter = match value {
                    Value::Iter(_) => value,
                    other => Value::iter(ValueIter::from_value(&other)?),
                };
                frame.push(iter);
            }
            Opcode::ForIter => return for_iter(frame, code, instr),

            // ============================================================
            // Calls, functions and attributes
            // ============================================================
            Opcode::Call => {
                let kw_names = frame.kw_names.take();
                return self.exec_call(frame, instr.oparg as usize, kw_names);
            }
            Opcode::CallKw => {
                let kw_names = frame.pop()?;
                let Value::Tuple(kw_names) = kw_names else {
                    return Err(Fault::type_mismatch(format!(
                        "CALL_KW expected a tuple of keyword names, got '{}'",
                        kw_names.type_name()
                    )));
                };
                return self.exec_call(frame, instr.oparg as usize, Some(kw_names));
            }
            Opcode::KwNames => {
                let Value::Tuple(names) = code.const_arg(instr)?.to_value() else {
                    return Err(Fault::type_mismatch("KW_NAMES expects a tuple constant"));
                };
                frame.kw_names = Some(names);
            }
            Opcode::CallFunctionEx => return self.exec_call_function_ex(frame, instr.oparg),
            Opcode::MakeFunction => self.make_function(frame, instr.oparg)?,
            Opcode::SetFunctionAttribute => set_function_attribute(frame, instr.oparg)?,
            Opcode::LoadAttr | Opcode::LoadMethod => {
                let method = instr.opcode == Opcode::LoadMethod || instr.oparg & 1 == 1;
                load_attr(frame, code.name_arg(instr)?, method)?;
            }
            Opcode::StoreAttr => store_attr(frame, code.name_arg(instr)?)?,
        }
        Ok(Flow::Next)
    }

    /// `LOAD_DEREF`: the frame's own locals first, then the live scope of the defining frame.
    fn load_deref(&mut self, frame: &Frame, name: &str) -> RunResult<Value> {
        if let Some(value) = frame.locals.get(name) {
            self.tracer.on_deref_load(name, false);
            return Ok(value);
        }
        if let Some(scope) = &frame.defining_scope
            && let Some(value) = scope.get(name)
        {
            self.tracer.on_deref_load(name, true);
            return Ok(value);
        }
        Err(Fault::name_not_defined(name))
    }
}

/// `COPY(i)`: pushes a copy of the i-th value from the top (1-based).
fn copy(frame: &mut Frame, index: usize) -> RunResult<()> {
    if index == 0 {
        return Err(Fault::stack("COPY needs a positive index"));
    }
    let value = frame.peek(index - 1)?.clone();
    frame.push(value);
    Ok(())
}

/// `SWAP(i)`: swaps the top value with the i-th from the top (1-based).
fn swap(frame: &mut Frame, index: usize) -> RunResult<()> {
    if index == 0 {
        return Err(Fault::stack("SWAP needs a positive index"));
    }
    let top = frame.slot(0)?;
    let other = frame.slot(index - 1)?;
    frame.stack.swap(top, other);
    Ok(())
}

fn load_fast(frame: &Frame, name: &str) -> RunResult<Value> {
    frame.locals.get(name).ok_or_else(|| Fault::name_not_defined(name))
}

/// Stores a local; storing the unbound marker deletes the name instead.
fn store_fast(frame: &Frame, name: &Rc<str>, value: Value) {
    if value.is_null() {
        frame.locals.remove(name);
    } else {
        frame.locals.set(Rc::clone(name), value);
    }
}

/// Conditional jumps require an actual bool; other values are never coerced.
fn expect_bool(value: &Value, opcode: Opcode) -> RunResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(Fault::type_mismatch(format!(
            "{opcode} expected a bool, got '{}'",
            other.type_name()
        ))),
    }
}

/// `FOR_ITER`: pushes the next item, or pops the exhausted iterator and leaves the loop.
///
/// The exit target may name the loop's `END_FOR`; it is skipped along with
/// the `POP_TOP` that follows it in 3.13 bytecode, since the iterator is
/// already gone.
fn for_iter(frame: &mut Frame, code: &Code, instr: &Instruction) -> RunResult<Flow> {
    let next = match frame.peek(0)? {
        Value::Iter(iter) => iter.borrow_mut().next(),
        other => {
            return Err(Fault::type_mismatch(format!(
                "'{}' object is not an iterator",
                other.type_name()
            )));
        }
    };
    if let Some(item) = next {
        frame.push(item);
        return Ok(Flow::Next);
    }
    frame.pop()?;
    let mut target = code.jump_index(instr)?;
    let instructions = code.instructions();
    if instructions.get(target).is_some_and(|next| next.opcode == Opcode::EndFor) {
        target += 1;
        if instructions.get(target).is_some_and(|next| next.opcode == Opcode::PopTop) {
            target += 1;
        }
    }
    Ok(Flow::Jump(target))
}
