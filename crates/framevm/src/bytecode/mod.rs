//! Code objects, opcodes and the frame-based virtual machine that executes them.
//!
//! # Module Structure
//!
//! - `op` - Opcode and operator sub-code enums
//! - `code` - Code objects, instructions and constants
//! - `builder` - `CodeBuilder` for assembling code programmatically
//! - `vm` - Frames and the dispatch loop

pub use builder::{CodeBuilder, JumpLabel};
pub use code::{Arg, Code, CodeDef, Const, Instruction};
pub use op::{BinaryOp, CompareOp, Opcode};
pub(crate) use vm::Vm;

mod builder;
mod code;
mod op;
mod vm;
