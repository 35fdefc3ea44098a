//! Comparison opcodes: `COMPARE_OP`, `IS_OP` and `CONTAINS_OP`.

use super::Frame;
use crate::{
    bytecode::{Arg, CompareOp, Instruction},
    exception::{Fault, RunResult},
    operators,
    value::Value,
};

/// `COMPARE_OP`: pops the right then the left operand and pushes a bool.
///
/// The operator comes from the symbol when present, then from an explicit
/// 3.11-style index, and otherwise from the raw 3.12/3.13 oparg.
pub(super) fn compare_op(frame: &mut Frame, instr: &Instruction) -> RunResult<()> {
    let op = match &instr.arg {
        Arg::Name(symbol) => CompareOp::parse(symbol)?,
        Arg::Int(index) => decode_index(*index)?,
        _ => CompareOp::from_oparg(instr.oparg).ok_or_else(|| {
            Fault::unsupported(format!("unknown comparison operator oparg {}", instr.oparg))
        })?,
    };
    let rhs = frame.pop()?;
    let lhs = frame.pop()?;
    frame.push(Value::Bool(operators::compare(&lhs, &rhs, op)?));
    Ok(())
}

fn decode_index(index: i64) -> RunResult<CompareOp> {
    CompareOp::from_index(index).ok_or_else(|| Fault::unsupported(format!("unknown comparison operator index {index}")))
}

/// `IS_OP(invert)`: identity test.
pub(super) fn is_op(frame: &mut Frame, invert: u32) -> RunResult<()> {
    let rhs = frame.pop()?;
    let lhs = frame.pop()?;
    frame.push(Value::Bool(lhs.is_identical(&rhs) != (invert == 1)));
    Ok(())
}

/// `CONTAINS_OP(invert)`: pops the container then the item.
pub(super) fn contains_op(frame: &mut Frame, invert: u32) -> RunResult<()> {
    let container = frame.pop()?;
    let item = frame.pop()?;
    frame.push(Value::Bool(operators::contains(&container, &item)? != (invert == 1)));
    Ok(())
}
