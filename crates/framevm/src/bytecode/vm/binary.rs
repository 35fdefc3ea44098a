//! Arithmetic and unary opcodes.

use super::{Frame, Vm};
use crate::{
    bytecode::{Arg, BinaryOp, Instruction, Opcode},
    exception::{Fault, RunResult},
    io::PrintWriter,
    operators,
    resource::ResourceTracker,
    tracer::VmTracer,
    value::Value,
};

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> Vm<'_, T, P, Tr> {
    /// `BINARY_OP`: pops the right then the left operand and pushes the result.
    ///
    /// Results that would grow a sequence are checked against the tracker first.
    pub(super) fn binary_op(&mut self, frame: &mut Frame, instr: &Instruction) -> RunResult<()> {
        let (op, inplace) = decode_binary_op(instr)?;
        let rhs = frame.pop()?;
        let lhs = frame.pop()?;
        if let Some(len) = operators::result_len_hint(&lhs, &rhs, op) {
            self.tracker.check_large_result(len)?;
        }
        let result = if inplace {
            operators::binary_inplace(&lhs, &rhs, op)?
        } else {
            operators::binary(&lhs, &rhs, op)?
        };
        frame.push(result);
        Ok(())
    }
}

/// The operator comes from the symbol argument when present, else from the numeric oparg.
fn decode_binary_op(instr: &Instruction) -> RunResult<(BinaryOp, bool)> {
    let decoded = match &instr.arg {
        Arg::Name(symbol) => BinaryOp::from_symbol(symbol),
        Arg::Int(code) => u32::try_from(*code).ok().and_then(BinaryOp::from_code),
        _ => BinaryOp::from_code(instr.oparg),
    };
    decoded.ok_or_else(|| match &instr.arg {
        Arg::Name(symbol) => Fault::unsupported(format!("unknown binary operator '{symbol}'")),
        _ => Fault::unsupported(format!("unknown binary operator code {}", instr.oparg)),
    })
}

/// `UNARY_NEGATIVE`, `UNARY_POSITIVE`, `UNARY_NOT`, `UNARY_INVERT` and `TO_BOOL`.
pub(super) fn unary_op(frame: &mut Frame, opcode: Opcode) -> RunResult<()> {
    let value = frame.pop()?;
    let result = match opcode {
        Opcode::UnaryNegative => operators::negative(&value)?,
        Opcode::UnaryPositive => operators::positive(&value)?,
        Opcode::UnaryInvert => operators::invert(&value)?,
        Opcode::UnaryNot => Value::Bool(!value.is_truthy()),
        _ => Value::Bool(value.is_truthy()),
    };
    frame.push(result);
    Ok(())
}

/// `CALL_INTRINSIC_1`: only the intrinsics produced by plain expressions are available.
pub(super) fn call_intrinsic_1(frame: &mut Frame, which: u32) -> RunResult<()> {
    let value = frame.pop()?;
    let result = match which {
        // INTRINSIC_UNARY_POSITIVE
        5 => operators::positive(&value)?,
        // INTRINSIC_LIST_TO_TUPLE
        6 => Value::tuple(value.collect_items()?),
        other => return Err(Fault::unsupported(format!("CALL_INTRINSIC_1 {other} is not supported"))),
    };
    frame.push(result);
    Ok(())
}
