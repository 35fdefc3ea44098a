//! Builder for assembling code objects programmatically.
//!
//! `CodeBuilder` assigns byte offsets (two bytes per instruction, as CPython's
//! wordcode does), keeps the constant and name tables in sync with the
//! instructions it emits, and patches forward jumps once their target is known.

use std::rc::Rc;

use indexmap::IndexMap;

use super::{
    code::{Arg, Code, CodeDef, Const, Instruction},
    op::{BinaryOp, CompareOp, Opcode},
};
use crate::exception::LoadError;

/// Size of one instruction in bytes.
const INSTRUCTION_SIZE: u32 = 2;

/// Builder for code objects.
///
/// # Usage
///
/// ```ignore
/// let mut builder = CodeBuilder::new("<module>");
/// builder.load_const(1);
/// builder.load_const(2);
/// builder.binary_op(BinaryOp::Add, false);
/// builder.emit(Opcode::ReturnValue);
/// let code = builder.build()?;
/// ```
#[derive(Debug, Default)]
pub struct CodeBuilder {
    name: Rc<str>,
    instructions: Vec<Instruction>,
    consts: Vec<Const>,
    names: Vec<Rc<str>>,
    /// Local names other than parameters, in first-use order.
    locals: Vec<Rc<str>>,
    posonly: Vec<Rc<str>>,
    positional: Vec<Rc<str>>,
    kwonly: Vec<Rc<str>>,
    var_args: Option<Rc<str>>,
    var_kwargs: Option<Rc<str>>,
    defaults: Vec<Const>,
    kwdefaults: IndexMap<Rc<str>, Const>,
}

/// A forward jump whose target has not been placed yet.
///
/// Returned by [`CodeBuilder::emit_jump`] and consumed by [`CodeBuilder::patch_jump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a jump label must be patched"]
pub struct JumpLabel(usize);

impl CodeBuilder {
    #[must_use]
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declares positional-only parameters.
    pub fn posonly_params(&mut self, names: &[&str]) -> &mut Self {
        self.posonly = names.iter().map(|name| Rc::from(*name)).collect();
        self
    }

    /// Declares positional-or-keyword parameters.
    pub fn params(&mut self, names: &[&str]) -> &mut Self {
        self.positional = names.iter().map(|name| Rc::from(*name)).collect();
        self
    }

    /// Declares keyword-only parameters.
    pub fn kwonly_params(&mut self, names: &[&str]) -> &mut Self {
        self.kwonly = names.iter().map(|name| Rc::from(*name)).collect();
        self
    }

    /// Declares the `*args` parameter.
    pub fn var_args(&mut self, name: &str) -> &mut Self {
        self.var_args = Some(Rc::from(name));
        self
    }

    /// Declares the `**kwargs` parameter.
    pub fn var_kwargs(&mut self, name: &str) -> &mut Self {
        self.var_kwargs = Some(Rc::from(name));
        self
    }

    /// Sets the defaults of the trailing positional parameters.
    pub fn defaults(&mut self, defaults: Vec<Const>) -> &mut Self {
        self.defaults = defaults;
        self
    }

    /// Sets the default of a keyword-only parameter.
    pub fn kwdefault(&mut self, name: &str, value: impl Into<Const>) -> &mut Self {
        self.kwdefaults.insert(Rc::from(name), value.into());
        self
    }

    /// Byte offset the next emitted instruction will have.
    #[must_use]
    pub fn current_offset(&self) -> u32 {
        self.instructions.len() as u32 * INSTRUCTION_SIZE
    }

    /// Emits an instruction with no argument.
    pub fn emit(&mut self, op: Opcode) {
        self.emit_with(op, 0, Arg::None);
    }

    /// Emits an instruction with a raw numeric argument (counts, flags, sub-codes).
    pub fn emit_arg(&mut self, op: Opcode, oparg: u32) {
        self.emit_with(op, oparg, Arg::None);
    }

    /// Emits an instruction with both a raw and a resolved argument.
    pub fn emit_with(&mut self, op: Opcode, oparg: u32, arg: Arg) {
        let offset = self.current_offset();
        self.instructions.push(Instruction::new(op, oparg, arg, offset));
    }

    /// Adds a constant to the pool, returning its index.
    pub fn add_const(&mut self, value: impl Into<Const>) -> u32 {
        self.consts.push(value.into());
        (self.consts.len() - 1) as u32
    }

    /// Interns a global/attribute name, returning its index in `names`.
    pub fn add_name(&mut self, name: &str) -> u32 {
        intern(&mut self.names, name)
    }

    /// Emits `LOAD_CONST`.
    pub fn load_const(&mut self, value: impl Into<Const>) {
        let value = value.into();
        let index = self.add_const(value.clone());
        self.emit_with(Opcode::LoadConst, index, Arg::Const(value));
    }

    /// Emits an instruction naming a variable.
    ///
    /// Local opcodes (`LOAD_FAST`, `STORE_DEREF`, ...) register the name as a
    /// local; the rest intern it in the global/attribute name table.
    pub fn emit_name(&mut self, op: Opcode, name: &str) {
        let index = if op.uses_varnames() {
            self.local_index(name)
        } else {
            self.add_name(name)
        };
        self.emit_with(op, index, Arg::Name(Rc::from(name)));
    }

    /// Emits `LOAD_GLOBAL`, optionally followed by the call-convention `NULL`.
    pub fn load_global(&mut self, name: &str, push_null: bool) {
        let index = self.add_name(name);
        self.emit_with(Opcode::LoadGlobal, (index << 1) | u32::from(push_null), Arg::Name(Rc::from(name)));
    }

    /// Emits `LOAD_ATTR`; the method form pushes a receiver for a following `CALL`.
    pub fn load_attr(&mut self, name: &str, method: bool) {
        let index = self.add_name(name);
        self.emit_with(Opcode::LoadAttr, (index << 1) | u32::from(method), Arg::Name(Rc::from(name)));
    }

    /// Emits `BINARY_OP` with the operator's numeric sub-code.
    pub fn binary_op(&mut self, op: BinaryOp, inplace: bool) {
        self.emit_arg(Opcode::BinaryOp, op.code(inplace));
    }

    /// Emits `COMPARE_OP` carrying the operator symbol.
    pub fn compare_op(&mut self, op: CompareOp) {
        let symbol: &'static str = op.into();
        self.emit_with(Opcode::CompareOp, op.oparg(), Arg::Name(Rc::from(symbol)));
    }

    /// Emits a forward jump, returning a label to patch later.
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        let label = JumpLabel(self.instructions.len());
        self.emit_with(op, u32::MAX, Arg::Int(-1));
        label
    }

    /// Points a forward jump at the next instruction to be emitted.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.current_offset();
        if let Some(instr) = self.instructions.get_mut(label.0) {
            instr.oparg = target;
            instr.arg = Arg::Int(i64::from(target));
        }
    }

    /// Emits a jump to an already known offset, typically a loop start.
    pub fn emit_jump_to(&mut self, op: Opcode, target: u32) {
        self.emit_with(op, target, Arg::Int(i64::from(target)));
    }

    /// Finishes the code object and validates it.
    ///
    /// Parameters take the first `varnames` slots; local indexes carried by
    /// already emitted instructions are renumbered to match.
    pub fn build(self) -> Result<Code, LoadError> {
        let mut varnames: Vec<Rc<str>> = Vec::new();
        let params = self
            .posonly
            .iter()
            .chain(&self.positional)
            .chain(&self.kwonly)
            .chain(&self.var_args)
            .chain(&self.var_kwargs);
        for name in params.chain(&self.locals) {
            intern(&mut varnames, name);
        }

        let mut instructions = self.instructions;
        for instr in &mut instructions {
            if instr.opcode.uses_varnames()
                && let Arg::Name(name) = &instr.arg
                && let Some(index) = varnames.iter().position(|candidate| candidate == name)
            {
                instr.oparg = index as u32;
            }
        }

        let def = CodeDef {
            name: self.name,
            instructions,
            consts: self.consts,
            names: self.names,
            varnames,
            posonly_count: self.posonly.len(),
            arg_count: self.posonly.len() + self.positional.len(),
            kwonly_count: self.kwonly.len(),
            has_varargs: self.var_args.is_some(),
            has_varkwargs: self.var_kwargs.is_some(),
            defaults: self.defaults,
            kwdefaults: self.kwdefaults,
        };
        let code = Code::from(def);
        code.validate()?;
        Ok(code)
    }

    fn local_index(&mut self, name: &str) -> u32 {
        intern(&mut self.locals, name)
    }
}

fn intern(table: &mut Vec<Rc<str>>, name: &str) -> u32 {
    let index = table.iter().position(|existing| &**existing == name).unwrap_or_else(|| {
        table.push(Rc::from(name));
        table.len() - 1
    });
    index as u32
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn opcodes(code: &Code) -> Vec<Opcode> {
        code.instructions().iter().map(|instr| instr.opcode).collect()
    }

    #[test]
    fn test_offsets_advance_by_two() {
        let mut builder = CodeBuilder::new("<module>");
        builder.load_const(1);
        builder.emit(Opcode::PopTop);
        builder.emit(Opcode::ReturnConst);
        let code = builder.build().unwrap();

        let offsets: Vec<u32> = code.instructions().iter().map(|instr| instr.offset).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
        assert_eq!(code.index_of(4), Some(2));
        assert_eq!(code.index_of(3), None);
    }

    #[test]
    fn test_forward_jump() {
        let mut builder = CodeBuilder::new("<module>");
        builder.load_const(true);
        let jump = builder.emit_jump(Opcode::PopJumpIfFalse);
        builder.load_const(1);
        builder.emit(Opcode::ReturnValue);
        builder.patch_jump(jump);
        builder.load_const(2);
        builder.emit(Opcode::ReturnValue);
        let code = builder.build().unwrap();

        let jump = &code.instructions()[1];
        assert_eq!(jump.oparg, 8);
        assert!(matches!(jump.arg, Arg::Int(8)));
        assert_eq!(code.jump_index(jump).unwrap(), 4);
    }

    #[test]
    fn test_backward_jump() {
        let mut builder = CodeBuilder::new("<module>");
        let loop_start = builder.current_offset();
        builder.emit(Opcode::Nop);
        builder.emit_jump_to(Opcode::JumpBackward, loop_start);
        let code = builder.build().unwrap();

        assert_eq!(code.jump_index(&code.instructions()[1]).unwrap(), 0);
    }

    #[test]
    fn test_unpatched_jump_fails_validation() {
        let mut builder = CodeBuilder::new("broken");
        let _ = builder.emit_jump(Opcode::Jump);
        builder.emit(Opcode::ReturnConst);

        let err = builder.build().unwrap_err();
        assert!(matches!(err, LoadError::Invalid { .. }), "{err}");
    }

    #[test]
    fn test_names_and_consts_are_tracked() {
        let mut builder = CodeBuilder::new("<module>");
        builder.load_global("print", true);
        builder.load_global("len", true);
        builder.load_global("print", false);
        builder.emit_name(Opcode::StoreName, "x");
        builder.load_const("hello");
        let code = builder.build().unwrap();

        let names: Vec<&str> = code.names().iter().map(|name| &**name).collect();
        assert_eq!(names, vec!["print", "len", "x"]);
        let opargs: Vec<u32> = code.instructions().iter().map(|instr| instr.oparg).collect();
        assert_eq!(opargs, vec![1, 3, 0, 2, 0]);
        assert_eq!(code.consts().len(), 1);
    }

    #[test]
    fn test_parameters_come_first_in_varnames() {
        let mut builder = CodeBuilder::new("f");
        builder.emit_name(Opcode::StoreFast, "tmp");
        builder.emit_name(Opcode::LoadFast, "a");
        builder
            .posonly_params(&["a"])
            .params(&["b"])
            .kwonly_params(&["c"])
            .var_args("args")
            .var_kwargs("kw");
        let code = builder.build().unwrap();

        let varnames: Vec<&str> = code.varnames().iter().map(|name| &**name).collect();
        assert_eq!(varnames, vec!["a", "b", "c", "args", "kw", "tmp"]);
        assert_eq!(code.instructions()[0].oparg, 5);
        assert_eq!(code.instructions()[1].oparg, 0);
        assert_eq!(code.signature().positional_count(), 2);
        assert_eq!(opcodes(&code), vec![Opcode::StoreFast, Opcode::LoadFast]);
    }

    #[test]
    fn test_compare_op_carries_symbol() {
        let mut builder = CodeBuilder::new("<module>");
        builder.compare_op(CompareOp::Ge);
        let code = builder.build().unwrap();

        let instr = &code.instructions()[0];
        assert_eq!(instr.oparg, (5 << 4) | 0b1100);
        assert!(matches!(&instr.arg, Arg::Name(symbol) if &**symbol == ">="));
    }

    #[test]
    fn test_too_many_defaults_rejected() {
        let mut builder = CodeBuilder::new("f");
        builder.params(&["a"]).defaults(vec![Const::Int(1), Const::Int(2)]);
        builder.emit(Opcode::ReturnConst);

        assert!(builder.build().is_err());
    }
}
