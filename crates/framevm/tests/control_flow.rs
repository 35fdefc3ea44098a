//! Tests for jumps, loops and the strict-bool rule of conditional jumps.

use framevm::{
    BinaryOp, Code, CodeBuilder, CompareOp, Const, Fault, Opcode, RecordingTracer, TraceEvent, Value, VirtualMachine,
    default_builtins, run,
};
use pretty_assertions::assert_eq;

/// `total = 0; for i in range(n): total += i; return total`
fn range_sum(n: i64) -> Code {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(0);
    b.emit_name(Opcode::StoreName, "total");
    b.load_global("range", true);
    b.load_const(n);
    b.emit_arg(Opcode::Call, 1);
    b.emit(Opcode::GetIter);
    let loop_start = b.current_offset();
    let exit = b.emit_jump(Opcode::ForIter);
    b.emit_name(Opcode::StoreName, "i");
    b.emit_name(Opcode::LoadName, "total");
    b.emit_name(Opcode::LoadName, "i");
    b.binary_op(BinaryOp::Add, true);
    b.emit_name(Opcode::StoreName, "total");
    b.emit_jump_to(Opcode::JumpBackward, loop_start);
    b.patch_jump(exit);
    b.emit(Opcode::EndFor);
    b.emit(Opcode::PopTop);
    b.emit_name(Opcode::LoadName, "total");
    b.emit(Opcode::ReturnValue);
    b.build().unwrap()
}

#[test]
fn for_loop_over_range_sums_to_ten() {
    let result = run(range_sum(5), default_builtins()).unwrap();
    assert_eq!(result, Value::Int(10));
}

#[test]
fn for_loop_over_empty_range_skips_body() {
    let result = run(range_sum(0), default_builtins()).unwrap();
    assert_eq!(result, Value::Int(0));
}

/// `if x > 3: return "big" else: return "small"`
fn classify(x: i64) -> Value {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(x);
    b.load_const(3);
    b.compare_op(CompareOp::Gt);
    let otherwise = b.emit_jump(Opcode::PopJumpIfFalse);
    b.load_const("big");
    b.emit(Opcode::ReturnValue);
    b.patch_jump(otherwise);
    b.load_const("small");
    b.emit(Opcode::ReturnValue);
    run(b.build().unwrap(), default_builtins()).unwrap()
}

#[test]
fn pop_jump_if_false_takes_both_branches() {
    assert_eq!(classify(10).py_str(), "big");
    assert_eq!(classify(1).py_str(), "small");
}

/// `n = 1; while n < 100: n *= 2; return n`
#[test]
fn while_loop_with_backward_jump() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(1);
    b.emit_name(Opcode::StoreName, "n");
    let head = b.current_offset();
    b.emit_name(Opcode::LoadName, "n");
    b.load_const(100);
    b.compare_op(CompareOp::Lt);
    let exit = b.emit_jump(Opcode::PopJumpIfFalse);
    b.emit_name(Opcode::LoadName, "n");
    b.load_const(2);
    b.binary_op(BinaryOp::Multiply, true);
    b.emit_name(Opcode::StoreName, "n");
    b.emit_jump_to(Opcode::JumpBackward, head);
    b.patch_jump(exit);
    b.emit_name(Opcode::LoadName, "n");
    b.emit(Opcode::ReturnValue);

    let result = run(b.build().unwrap(), default_builtins()).unwrap();
    assert_eq!(result, Value::Int(128));
}

/// Conditional jumps never coerce: an int operand is a fault, not a truthy value.
#[test]
fn conditional_jump_on_int_is_type_mismatch() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(1);
    let target = b.emit_jump(Opcode::PopJumpIfTrue);
    b.load_const("not reached");
    b.emit(Opcode::ReturnValue);
    b.patch_jump(target);
    b.load_const("jumped");
    b.emit(Opcode::ReturnValue);

    let fault = run(b.build().unwrap(), default_builtins()).unwrap_err();
    assert!(matches!(fault, Fault::TypeMismatch(_)), "unexpected fault: {fault}");
    assert_eq!(fault.to_string(), "TypeMismatch: POP_JUMP_IF_TRUE expected a bool, got 'int'");
}

/// `TO_BOOL` makes any value acceptable to a conditional jump.
#[test]
fn to_bool_before_conditional_jump() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const("");
    b.emit(Opcode::ToBool);
    let empty = b.emit_jump(Opcode::PopJumpIfFalse);
    b.load_const("non-empty");
    b.emit(Opcode::ReturnValue);
    b.patch_jump(empty);
    b.load_const("empty");
    b.emit(Opcode::ReturnValue);

    let result = run(b.build().unwrap(), default_builtins()).unwrap();
    assert_eq!(result.py_str(), "empty");
}

#[test]
fn pop_jump_if_none() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(Const::None);
    let is_none = b.emit_jump(Opcode::PopJumpIfNone);
    b.load_const(false);
    b.emit(Opcode::ReturnValue);
    b.patch_jump(is_none);
    b.load_const(true);
    b.emit(Opcode::ReturnValue);

    let result = run(b.build().unwrap(), default_builtins()).unwrap();
    assert_eq!(result, Value::Bool(true));
}

/// Straight-line code ends with exactly the return value on the stack.
#[test]
fn straight_line_code_leaves_only_the_return_value() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(6);
    b.load_const(7);
    b.binary_op(BinaryOp::Multiply, false);
    b.emit_name(Opcode::StoreName, "x");
    b.emit_name(Opcode::LoadName, "x");
    b.emit(Opcode::ReturnValue);

    let mut vm = VirtualMachine::new(default_builtins()).with_tracer(RecordingTracer::new());
    let result = vm.run(b.build().unwrap()).unwrap();
    assert_eq!(result, Value::Int(42));

    let events = vm.tracer().events();
    let last_dispatch = events
        .iter()
        .rev()
        .find_map(|event| match event {
            TraceEvent::Instruction {
                opcode, stack_depth, ..
            } => Some((*opcode, *stack_depth)),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_dispatch, (Opcode::ReturnValue, 1));
    assert_eq!(events.last(), Some(&TraceEvent::Return { depth: 0 }));
}

/// Running off the end of the code without a return instruction yields `None`.
#[test]
fn falling_off_the_end_returns_none() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(1);
    b.emit_name(Opcode::StoreName, "x");

    let result = run(b.build().unwrap(), default_builtins()).unwrap();
    assert_eq!(result, Value::None);
}

/// `return 1 < 2` compiled by CPython 3.12 with the numeric `COMPARE_OP` oparg only.
fn compare_with_oparg(oparg: u32) -> Value {
    let json = format!(
        r#"{{ "name": "<module>", "instructions": [
            {{ "opcode": "LOAD_CONST", "arg": {{ "const": {{ "int": 1 }} }}, "offset": 0 }},
            {{ "opcode": "LOAD_CONST", "arg": {{ "const": {{ "int": 2 }} }}, "offset": 2 }},
            {{ "opcode": "COMPARE_OP", "oparg": {oparg}, "offset": 4 }},
            {{ "opcode": "RETURN_VALUE", "offset": 6 }}
        ] }}"#
    );
    run(Code::from_json(&json).unwrap(), default_builtins()).unwrap()
}

#[test]
fn compare_op_decodes_numeric_oparg() {
    // 3.12: (index << 4) | mask
    assert_eq!(compare_with_oparg(2), Value::Bool(true));
    assert_eq!(compare_with_oparg(40), Value::Bool(false));
    assert_eq!(compare_with_oparg(55), Value::Bool(true));
    assert_eq!(compare_with_oparg(92), Value::Bool(false));
    // 3.13: (index << 5) | to_bool << 4 | mask
    assert_eq!(compare_with_oparg(42), Value::Bool(true));
    assert_eq!(compare_with_oparg(18), Value::Bool(true));
    assert_eq!(compare_with_oparg(148), Value::Bool(false));
}

#[test]
fn compare_op_rejects_unknown_oparg() {
    let json = r#"{ "name": "<module>", "instructions": [
        { "opcode": "LOAD_CONST", "arg": { "const": { "int": 1 } }, "offset": 0 },
        { "opcode": "LOAD_CONST", "arg": { "const": { "int": 2 } }, "offset": 2 },
        { "opcode": "COMPARE_OP", "oparg": 16, "offset": 4 },
        { "opcode": "RETURN_VALUE", "offset": 6 }
    ] }"#;
    let fault = run(Code::from_json(json).unwrap(), default_builtins()).unwrap_err();
    assert_eq!(fault.to_string(), "UnsupportedOperation: unknown comparison operator oparg 16");
}
