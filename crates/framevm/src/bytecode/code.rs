//! Code objects: immutable descriptions of a unit of compiled code.

use std::{fmt::Write as _, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::op::Opcode;
use crate::{
    exception::{Fault, LoadError, RunResult},
    signature::Signature,
    value::Value,
};

/// The resolved argument carried by an instruction.
///
/// Mirrors the `argval` of a disassembled CPython instruction: a jump target
/// offset, a name, a pair of names for the fused `*_FAST_*_FAST` forms,
/// or a constant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    #[default]
    None,
    Int(i64),
    Name(Rc<str>),
    Pair(Rc<str>, Rc<str>),
    Const(Const),
}

/// A single instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Raw numeric argument, used for counts, flags and sub-codes.
    #[serde(default)]
    pub oparg: u32,
    /// Resolved argument; takes precedence over `oparg` where both could apply.
    #[serde(default)]
    pub arg: Arg,
    /// Byte offset of the instruction within its code object.
    pub offset: u32,
}

impl Instruction {
    #[must_use]
    pub fn new(opcode: Opcode, oparg: u32, arg: Arg, offset: u32) -> Self {
        Self {
            opcode,
            oparg,
            arg,
            offset,
        }
    }
}

/// A compile-time constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Vec<Const>),
    Code(Rc<Code>),
}

impl Const {
    /// Converts the constant into a runtime value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::None => Value::None,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float(*f),
            Self::Str(s) => Value::Str(Rc::clone(s)),
            Self::Tuple(items) => Value::tuple(items.iter().map(Self::to_value).collect()),
            Self::Code(code) => Value::Code(Rc::clone(code)),
        }
    }
}

impl From<i64> for Const {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Const {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Const {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Const {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Const {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<Code> for Const {
    fn from(value: Code) -> Self {
        Self::Code(Rc::new(value))
    }
}

/// Plain-data form of a [`Code`], used for serialization and construction.
///
/// `arg_count` counts every positional parameter, positional-only ones included.
/// Parameter names occupy the front of `varnames` in the order
/// positional-only, positional-or-keyword, keyword-only, `*args`, `**kwargs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeDef {
    pub name: Rc<str>,
    pub instructions: Vec<Instruction>,
    pub consts: Vec<Const>,
    pub names: Vec<Rc<str>>,
    pub varnames: Vec<Rc<str>>,
    pub posonly_count: usize,
    pub arg_count: usize,
    pub kwonly_count: usize,
    pub has_varargs: bool,
    pub has_varkwargs: bool,
    /// Defaults for the trailing positional parameters.
    pub defaults: Vec<Const>,
    pub kwdefaults: IndexMap<Rc<str>, Const>,
}

/// An immutable code object.
///
/// Built from a [`CodeDef`]; the offset-to-index table and the call
/// signature are derived once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "CodeDef", into = "CodeDef")]
pub struct Code {
    def: CodeDef,
    /// Maps instruction byte offsets to positions in `def.instructions`.
    offsets: AHashMap<u32, usize>,
    signature: Signature,
}

impl From<CodeDef> for Code {
    fn from(def: CodeDef) -> Self {
        let offsets = def
            .instructions
            .iter()
            .enumerate()
            .map(|(index, instr)| (instr.offset, index))
            .collect();
        let signature = Signature::from_layout(
            &def.varnames,
            def.posonly_count,
            def.arg_count,
            def.kwonly_count,
            def.has_varargs,
            def.has_varkwargs,
        );
        Self {
            def,
            offsets,
            signature,
        }
    }
}

impl From<Code> for CodeDef {
    fn from(code: Code) -> Self {
        code.def
    }
}

impl Code {
    /// Decodes a code object from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        let code: Self = serde_json::from_str(json)?;
        code.validate()?;
        Ok(code)
    }

    /// Encodes the code object as JSON.
    pub fn to_json(&self) -> Result<String, LoadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serializes the code object to a compact binary form.
    pub fn dump(&self) -> Result<Vec<u8>, LoadError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Restores a code object from bytes produced by [`Code::dump`] and validates it.
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        let code: Self = postcard::from_bytes(bytes)?;
        code.validate()?;
        Ok(code)
    }

    /// Checks the structural invariants the VM relies on, recursing into nested code constants.
    ///
    /// * instruction offsets are unique and strictly increasing
    /// * every jump target names an existing instruction offset
    /// * the parameter counts fit inside `varnames`
    pub fn validate(&self) -> Result<(), LoadError> {
        let name = &self.def.name;
        let mut previous: Option<u32> = None;
        for instr in &self.def.instructions {
            if previous.is_some_and(|prev| instr.offset <= prev) {
                return Err(LoadError::invalid(
                    name,
                    format!("instruction offset {} is not increasing", instr.offset),
                ));
            }
            previous = Some(instr.offset);
        }

        for instr in &self.def.instructions {
            if instr.opcode.is_jump() {
                let target = self.jump_target_offset(instr);
                if !self.offsets.contains_key(&target) {
                    return Err(LoadError::invalid(
                        name,
                        format!("{} at offset {} jumps to unknown offset {target}", instr.opcode, instr.offset),
                    ));
                }
            }
            if let Arg::Const(constant) = &instr.arg {
                validate_const(constant)?;
            }
        }

        let def = &self.def;
        if def.posonly_count > def.arg_count {
            return Err(LoadError::invalid(name, "posonly_count exceeds arg_count"));
        }
        let params = def.arg_count + def.kwonly_count + usize::from(def.has_varargs) + usize::from(def.has_varkwargs);
        if params > def.varnames.len() {
            return Err(LoadError::invalid(
                name,
                format!("{params} parameters declared but only {} varnames", def.varnames.len()),
            ));
        }
        if def.defaults.len() > def.arg_count {
            return Err(LoadError::invalid(name, "more defaults than positional parameters"));
        }

        for constant in def.consts.iter().chain(&def.defaults) {
            validate_const(constant)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub(crate) fn name_rc(&self) -> &Rc<str> {
        &self.def.name
    }

    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.def.instructions
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.def.instructions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.def.instructions.is_empty()
    }

    #[must_use]
    pub fn consts(&self) -> &[Const] {
        &self.def.consts
    }

    #[must_use]
    pub fn names(&self) -> &[Rc<str>] {
        &self.def.names
    }

    #[must_use]
    pub fn varnames(&self) -> &[Rc<str>] {
        &self.def.varnames
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Initial positional defaults given to functions made from this code.
    #[must_use]
    pub fn defaults(&self) -> &[Const] {
        &self.def.defaults
    }

    /// Initial keyword-only defaults given to functions made from this code.
    #[must_use]
    pub fn kwdefaults(&self) -> &IndexMap<Rc<str>, Const> {
        &self.def.kwdefaults
    }

    /// Position of the instruction at byte offset `offset`, if any.
    #[must_use]
    pub fn index_of(&self, offset: u32) -> Option<usize> {
        self.offsets.get(&offset).copied()
    }

    /// Resolves the jump target of `instr` to an instruction index.
    pub(crate) fn jump_index(&self, instr: &Instruction) -> RunResult<usize> {
        let target = self.jump_target_offset(instr);
        self.index_of(target).ok_or_else(|| {
            Fault::stack(format!(
                "{} at offset {} in '{}' jumps to unknown offset {target}",
                instr.opcode, instr.offset, self.def.name
            ))
        })
    }

    fn jump_target_offset(&self, instr: &Instruction) -> u32 {
        match instr.arg {
            Arg::Int(target) => u32::try_from(target).unwrap_or(u32::MAX),
            _ => instr.oparg,
        }
    }

    /// Resolves the name an instruction refers to.
    ///
    /// A `Name` argument wins; otherwise `oparg` indexes `varnames` for local
    /// opcodes and `names` for the rest (shifted right by one for the opcodes
    /// whose low bit is a flag).
    pub(crate) fn name_arg<'a>(&'a self, instr: &'a Instruction) -> RunResult<&'a Rc<str>> {
        if let Arg::Name(name) = &instr.arg {
            return Ok(name);
        }
        let (table, index) = if instr.opcode.uses_varnames() {
            (&self.def.varnames, instr.oparg)
        } else if matches!(instr.opcode, Opcode::LoadGlobal | Opcode::LoadAttr) {
            (&self.def.names, instr.oparg >> 1)
        } else {
            (&self.def.names, instr.oparg)
        };
        table.get(index as usize).ok_or_else(|| self.missing_arg(instr, "a name"))
    }

    /// Resolves the pair of local names used by the fused `*_FAST_*_FAST` opcodes.
    ///
    /// Without a `Pair` argument, `oparg` packs two `varnames` indexes as `(first << 4) | second`.
    pub(crate) fn pair_arg<'a>(&'a self, instr: &'a Instruction) -> RunResult<(&'a Rc<str>, &'a Rc<str>)> {
        if let Arg::Pair(first, second) = &instr.arg {
            return Ok((first, second));
        }
        let first = self.def.varnames.get((instr.oparg >> 4) as usize);
        let second = self.def.varnames.get((instr.oparg & 0xF) as usize);
        match (first, second) {
            (Some(first), Some(second)) => Ok((first, second)),
            _ => Err(self.missing_arg(instr, "a pair of names")),
        }
    }

    /// Resolves the constant an instruction refers to.
    pub(crate) fn const_arg<'a>(&'a self, instr: &'a Instruction) -> RunResult<&'a Const> {
        if let Arg::Const(constant) = &instr.arg {
            return Ok(constant);
        }
        self.def
            .consts
            .get(instr.oparg as usize)
            .ok_or_else(|| self.missing_arg(instr, "a constant"))
    }

    fn missing_arg(&self, instr: &Instruction, what: &str) -> Fault {
        Fault::stack(format!(
            "{} at offset {} in '{}' has no {what} argument",
            instr.opcode, instr.offset, self.def.name
        ))
    }

    /// Counts how often each opcode appears, including in nested code constants.
    ///
    /// Opcodes appear in the order they are first encountered.
    #[must_use]
    pub fn count_operations(&self) -> IndexMap<Opcode, usize> {
        let mut counts = IndexMap::new();
        self.count_into(&mut counts);
        counts
    }

    fn count_into(&self, counts: &mut IndexMap<Opcode, usize>) {
        for instr in &self.def.instructions {
            *counts.entry(instr.opcode).or_insert(0) += 1;
        }
        for nested in self.nested_code() {
            nested.count_into(counts);
        }
    }

    /// Nested code objects reachable from constants and instruction arguments.
    ///
    /// Every code object in the constant pool counts once. An instruction
    /// argument whose `oparg` selects a code object in the pool is that pool
    /// entry and is skipped; other code arguments are added unless they are
    /// the very same object.
    fn nested_code(&self) -> Vec<&Rc<Code>> {
        let mut found: Vec<&Rc<Self>> = Vec::new();
        for constant in &self.def.consts {
            collect_code(constant, &mut found);
        }
        for instr in &self.def.instructions {
            let Arg::Const(constant) = &instr.arg else {
                continue;
            };
            let pool_entry = matches!(constant, Const::Code(_))
                && matches!(self.def.consts.get(instr.oparg as usize), Some(Const::Code(_)));
            if !pool_entry {
                collect_code(constant, &mut found);
            }
        }
        found
    }

    /// Renders a human-readable listing, nested code objects after their parent.
    #[must_use]
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out);
        out
    }

    fn disassemble_into(&self, out: &mut String) {
        let _ = writeln!(out, "Disassembly of <code object {}>:", self.def.name);
        for instr in &self.def.instructions {
            let name: &'static str = instr.opcode.into();
            let _ = write!(out, "{:>6} {name:<24} {:>4}", instr.offset, instr.oparg);
            match &instr.arg {
                Arg::None => {}
                Arg::Int(value) if instr.opcode.is_jump() => {
                    let _ = write!(out, " (to {value})");
                }
                Arg::Int(value) => {
                    let _ = write!(out, " ({value})");
                }
                Arg::Name(name) => {
                    let _ = write!(out, " ({name})");
                }
                Arg::Pair(first, second) => {
                    let _ = write!(out, " ({first}, {second})");
                }
                Arg::Const(Const::Code(code)) => {
                    let _ = write!(out, " (<code object {}>)", code.name());
                }
                Arg::Const(constant) => {
                    let _ = write!(out, " ({})", constant.to_value().py_repr());
                }
            }
            out.push('\n');
        }
        for nested in self.nested_code() {
            out.push('\n');
            nested.disassemble_into(out);
        }
    }
}

fn collect_code<'a>(constant: &'a Const, found: &mut Vec<&'a Rc<Code>>) {
    match constant {
        Const::Code(code) => {
            if !found.iter().any(|seen| Rc::ptr_eq(seen, code)) {
                found.push(code);
            }
        }
        Const::Tuple(items) => {
            for item in items {
                collect_code(item, found);
            }
        }
        _ => {}
    }
}

fn validate_const(constant: &Const) -> Result<(), LoadError> {
    match constant {
        Const::Code(code) => code.validate(),
        Const::Tuple(items) => items.iter().try_for_each(validate_const),
        _ => Ok(()),
    }
}
