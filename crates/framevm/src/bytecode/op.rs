//! Opcode and operator sub-code definitions.
//!
//! Opcodes are identified by their CPython names (`LOAD_CONST`, `BINARY_OP`, ...)
//! both in the JSON form and in disassembly. An unknown name fails to decode.

use std::str::FromStr;

use crate::exception::{Fault, RunResult};

/// An instruction opcode.
///
/// Covers the CPython 3.11-3.13 instruction families the VM executes.
/// Pure bookkeeping opcodes (`NOP`, `RESUME`, `CACHE`, ...) are accepted and do nothing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    // bookkeeping
    Nop,
    Resume,
    Cache,
    ExtendedArg,
    Precall,
    MakeCell,
    CopyFreeVars,
    // stack manipulation
    PopTop,
    PushNull,
    Copy,
    Swap,
    DupTop,
    RotTwo,
    RotThree,
    EndFor,
    // loads and stores
    LoadConst,
    ReturnConst,
    LoadName,
    StoreName,
    DeleteName,
    LoadGlobal,
    StoreGlobal,
    DeleteGlobal,
    LoadFast,
    LoadFastCheck,
    LoadFastAndClear,
    LoadFastLoadFast,
    StoreFast,
    StoreFastLoadFast,
    StoreFastStoreFast,
    DeleteFast,
    LoadDeref,
    StoreDeref,
    LoadClosure,
    // unary, binary and comparison operators
    UnaryNegative,
    UnaryPositive,
    UnaryNot,
    UnaryInvert,
    ToBool,
    BinaryOp,
    CompareOp,
    IsOp,
    ContainsOp,
    #[strum(serialize = "CALL_INTRINSIC_1")]
    #[serde(rename = "CALL_INTRINSIC_1")]
    CallIntrinsic1,
    // containers
    BuildList,
    BuildTuple,
    BuildSet,
    BuildMap,
    BuildConstKeyMap,
    BuildString,
    BuildSlice,
    ListAppend,
    ListExtend,
    ListToTuple,
    SetAdd,
    SetUpdate,
    MapAdd,
    DictUpdate,
    DictMerge,
    BinarySubscr,
    StoreSubscr,
    DeleteSubscr,
    BinarySlice,
    StoreSlice,
    UnpackSequence,
    UnpackEx,
    // string formatting
    FormatValue,
    FormatSimple,
    FormatWithSpec,
    ConvertValue,
    // control flow
    Jump,
    JumpForward,
    JumpBackward,
    JumpBackwardNoInterrupt,
    JumpAbsolute,
    PopJumpIfTrue,
    PopJumpIfFalse,
    PopJumpIfNone,
    PopJumpIfNotNone,
    JumpIfTrueOrPop,
    JumpIfFalseOrPop,
    GetIter,
    ForIter,
    ReturnValue,
    // calls, functions and attributes
    Call,
    CallKw,
    KwNames,
    CallFunctionEx,
    MakeFunction,
    SetFunctionAttribute,
    LoadAttr,
    LoadMethod,
    StoreAttr,
}

impl Opcode {
    /// Returns true if the instruction's argument is an absolute jump target offset.
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jump
                | Self::JumpForward
                | Self::JumpBackward
                | Self::JumpBackwardNoInterrupt
                | Self::JumpAbsolute
                | Self::PopJumpIfTrue
                | Self::PopJumpIfFalse
                | Self::PopJumpIfNone
                | Self::PopJumpIfNotNone
                | Self::JumpIfTrueOrPop
                | Self::JumpIfFalseOrPop
                | Self::ForIter
        )
    }

    /// Returns true if the opcode's name argument indexes the local variable table.
    #[must_use]
    pub fn uses_varnames(self) -> bool {
        matches!(
            self,
            Self::LoadFast
                | Self::LoadFastCheck
                | Self::LoadFastAndClear
                | Self::StoreFast
                | Self::DeleteFast
                | Self::LoadDeref
                | Self::StoreDeref
                | Self::LoadClosure
                | Self::MakeCell
        )
    }

    /// Returns true if executing the opcode ends the current frame.
    #[must_use]
    pub fn is_return(self) -> bool {
        matches!(self, Self::ReturnValue | Self::ReturnConst)
    }
}

/// Sub-codes of `BINARY_OP`, numbered as in CPython's `NB_*` table.
///
/// Values 13..=25 are the in-place (`+=` etc.) forms of 0..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "&")]
    And,
    #[strum(serialize = "//")]
    FloorDivide,
    #[strum(serialize = "<<")]
    Lshift,
    #[strum(serialize = "@")]
    MatrixMultiply,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "%")]
    Remainder,
    #[strum(serialize = "|")]
    Or,
    #[strum(serialize = "**")]
    Power,
    #[strum(serialize = ">>")]
    Rshift,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "/")]
    TrueDivide,
    #[strum(serialize = "^")]
    Xor,
}

impl BinaryOp {
    const ALL: [Self; 13] = [
        Self::Add,
        Self::And,
        Self::FloorDivide,
        Self::Lshift,
        Self::MatrixMultiply,
        Self::Multiply,
        Self::Remainder,
        Self::Or,
        Self::Power,
        Self::Rshift,
        Self::Subtract,
        Self::TrueDivide,
        Self::Xor,
    ];

    /// Decodes a `BINARY_OP` oparg into the operator and whether it is the in-place form.
    #[must_use]
    pub fn from_code(code: u32) -> Option<(Self, bool)> {
        let code = usize::try_from(code).ok()?;
        match code {
            0..13 => Some((Self::ALL[code], false)),
            13..26 => Some((Self::ALL[code - 13], true)),
            _ => None,
        }
    }

    /// Decodes an operator symbol such as `"+"` or `"+="`.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<(Self, bool)> {
        let (symbol, inplace) = match symbol.strip_suffix('=') {
            Some(stripped) if !stripped.is_empty() => (stripped, true),
            _ => (symbol, false),
        };
        let op = Self::ALL.into_iter().find(|op| {
            let name: &'static str = op.into();
            name == symbol
        })?;
        Some((op, inplace))
    }

    /// Encodes the operator back into its `BINARY_OP` oparg.
    #[must_use]
    pub fn code(self, inplace: bool) -> u32 {
        let index = Self::ALL.iter().position(|op| *op == self).unwrap_or_default() as u32;
        if inplace { index + 13 } else { index }
    }
}

// Comparison mask bits stored in the low nibble of a 3.12+ `COMPARE_OP` oparg.
const COMPARISON_LESS_THAN: u32 = 0b0010;
const COMPARISON_GREATER_THAN: u32 = 0b0100;
const COMPARISON_EQUALS: u32 = 0b1000;
const COMPARISON_NOT_EQUALS: u32 = 0b0111;

/// Rich comparison operators used by `COMPARE_OP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr)]
pub enum CompareOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

impl CompareOp {
    /// Decodes a legacy integer comparison index into `('<', '<=', '==', '!=', '>', '>=')`.
    #[must_use]
    pub fn from_index(index: i64) -> Option<Self> {
        Some(match index {
            0 => Self::Lt,
            1 => Self::Le,
            2 => Self::Eq,
            3 => Self::Ne,
            4 => Self::Gt,
            5 => Self::Ge,
            _ => return None,
        })
    }

    /// Decodes a raw 3.12/3.13 `COMPARE_OP` oparg.
    ///
    /// 3.12 encodes `(index << 4) | mask` and 3.13 encodes
    /// `(index << 5) | to_bool << 4 | mask`; the low four bits are the
    /// comparison mask in both layouts, so the operator is read from there.
    #[must_use]
    pub fn from_oparg(oparg: u32) -> Option<Self> {
        Some(match oparg & 0xf {
            COMPARISON_LESS_THAN => Self::Lt,
            0b1010 => Self::Le,
            COMPARISON_EQUALS => Self::Eq,
            COMPARISON_NOT_EQUALS => Self::Ne,
            COMPARISON_GREATER_THAN => Self::Gt,
            0b1100 => Self::Ge,
            _ => return None,
        })
    }

    /// Returns the 3.12 oparg encoding of this operator.
    #[must_use]
    pub fn oparg(self) -> u32 {
        let mask = match self {
            Self::Lt => COMPARISON_LESS_THAN,
            Self::Le => COMPARISON_LESS_THAN | COMPARISON_EQUALS,
            Self::Eq => COMPARISON_EQUALS,
            Self::Ne => COMPARISON_NOT_EQUALS,
            Self::Gt => COMPARISON_GREATER_THAN,
            Self::Ge => COMPARISON_GREATER_THAN | COMPARISON_EQUALS,
        };
        (self.index() << 4) | mask
    }

    /// Decodes a comparison symbol, reporting unknown symbols as unsupported.
    pub fn parse(symbol: &str) -> RunResult<Self> {
        Self::from_str(symbol).map_err(|_| Fault::unsupported(format!("unknown comparison operator '{symbol}'")))
    }

    /// Returns the integer index of this operator.
    #[must_use]
    pub fn index(self) -> u32 {
        match self {
            Self::Lt => 0,
            Self::Le => 1,
            Self::Eq => 2,
            Self::Ne => 3,
            Self::Gt => 4,
            Self::Ge => 5,
        }
    }
}
