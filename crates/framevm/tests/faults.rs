//! Tests that every fault kind stops execution and reaches the caller of `run`.

use std::rc::Rc;

use framevm::{
    Arg, BinaryOp, CodeBuilder, Fault, Opcode, RecordingTracer, TraceEvent, VirtualMachine, default_builtins, run,
};
use pretty_assertions::assert_eq;

fn run_module(build: impl FnOnce(&mut CodeBuilder)) -> Fault {
    let mut b = CodeBuilder::new("<module>");
    build(&mut b);
    run(b.build().unwrap(), default_builtins()).unwrap_err()
}

#[test]
fn undefined_name_is_name_not_defined() {
    let fault = run_module(|b| {
        b.emit_name(Opcode::LoadName, "missing");
        b.emit(Opcode::ReturnValue);
    });
    assert!(matches!(&fault, Fault::NameNotDefined(name) if &**name == "missing"));
    assert_eq!(fault.to_string(), "NameNotDefined: name 'missing' is not defined");
}

/// With no global or built-in of that name, `LOAD_GLOBAL` fails before the call.
#[test]
fn undefined_global_is_name_not_defined() {
    let fault = run_module(|b| {
        b.load_global("nope", true);
        b.emit_arg(Opcode::Call, 0);
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.kind(), "NameNotDefined");
}

#[test]
fn unbound_local_is_name_not_defined() {
    let fault = run_module(|b| {
        b.emit_name(Opcode::LoadFast, "x");
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.kind(), "NameNotDefined");
}

#[test]
fn pop_from_empty_stack_is_stack_fault() {
    let fault = run_module(|b| {
        b.emit(Opcode::PopTop);
    });
    assert!(matches!(fault, Fault::StackFault(_)), "unexpected fault: {fault}");
    assert_eq!(
        fault.to_string(),
        "StackFault: operand stack underflow in '<module>': needed 1, have 0"
    );
}

#[test]
fn build_list_deeper_than_stack_is_stack_fault() {
    let fault = run_module(|b| {
        b.load_const(1);
        b.emit_arg(Opcode::BuildList, 3);
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.kind(), "StackFault");
}

#[test]
fn unknown_binary_operator_code_is_unsupported() {
    let fault = run_module(|b| {
        b.load_const(1);
        b.load_const(2);
        b.emit_arg(Opcode::BinaryOp, 99);
        b.emit(Opcode::ReturnValue);
    });
    assert!(matches!(fault, Fault::UnsupportedOperation(_)), "unexpected fault: {fault}");
    assert_eq!(fault.to_string(), "UnsupportedOperation: unknown binary operator code 99");
}

#[test]
fn unknown_comparison_symbol_is_unsupported() {
    let fault = run_module(|b| {
        b.load_const(1);
        b.load_const(2);
        b.emit_with(Opcode::CompareOp, 0, Arg::Name(Rc::from("<>")));
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.kind(), "UnsupportedOperation");
}

#[test]
fn unsupported_intrinsic() {
    let fault = run_module(|b| {
        b.load_const(1);
        b.emit_arg(Opcode::CallIntrinsic1, 1);
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.kind(), "UnsupportedOperation");
}

#[test]
fn calling_an_int_is_type_mismatch() {
    let fault = run_module(|b| {
        b.emit(Opcode::PushNull);
        b.load_const(3);
        b.emit_arg(Opcode::Call, 0);
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.to_string(), "TypeMismatch: 'int' object is not callable");
}

#[test]
fn adding_int_and_str_is_type_mismatch() {
    let fault = run_module(|b| {
        b.load_const(1);
        b.load_const("a");
        b.binary_op(BinaryOp::Add, false);
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.kind(), "TypeMismatch");
}

#[test]
fn division_by_zero_is_arithmetic() {
    let fault = run_module(|b| {
        b.load_const(1);
        b.load_const(0);
        b.binary_op(BinaryOp::TrueDivide, false);
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.to_string(), "Arithmetic: division by zero");
}

/// A fault raised three frames deep aborts every frame: nothing after the
/// failing call runs and the tracer sees the fault once.
#[test]
fn fault_in_nested_call_aborts_all_frames() {
    let mut inner = CodeBuilder::new("inner");
    inner.load_global("undefined_thing", false);
    inner.emit(Opcode::ReturnValue);

    let mut outer = CodeBuilder::new("outer");
    outer.load_const(inner.build().unwrap());
    outer.emit(Opcode::MakeFunction);
    outer.emit(Opcode::PushNull);
    outer.emit_arg(Opcode::Call, 0);
    outer.emit(Opcode::ReturnValue);

    let mut module = CodeBuilder::new("<module>");
    module.load_const(outer.build().unwrap());
    module.emit(Opcode::MakeFunction);
    module.emit(Opcode::PushNull);
    module.emit_arg(Opcode::Call, 0);
    module.load_global("print", true);
    module.load_const("after");
    module.emit_arg(Opcode::Call, 1);
    module.emit(Opcode::ReturnValue);

    let mut vm = VirtualMachine::new(default_builtins()).with_tracer(RecordingTracer::new());
    let fault = vm.run(module.build().unwrap()).unwrap_err();
    assert_eq!(fault.to_string(), "NameNotDefined: name 'undefined_thing' is not defined");

    let events = vm.tracer().events();
    let calls: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Call { name, depth } => Some((name.as_str(), *depth)),
            _ => None,
        })
        .collect();
    assert_eq!(calls, vec![("<module>", 1), ("outer", 2), ("inner", 3)]);
    assert!(!events.iter().any(|event| matches!(event, TraceEvent::Return { .. })));
    assert_eq!(events.last(), Some(&TraceEvent::Fault { kind: "NameNotDefined" }));
}

/// A failed run leaves the machine usable for the next one.
#[test]
fn machine_runs_again_after_a_fault() {
    let mut failing = CodeBuilder::new("<module>");
    failing.emit(Opcode::PopTop);
    let failing = failing.build().unwrap();

    let mut ok = CodeBuilder::new("<module>");
    ok.load_const(7);
    ok.emit(Opcode::ReturnValue);
    let ok = ok.build().unwrap();

    let mut vm = VirtualMachine::new(default_builtins());
    assert_eq!(vm.run(failing).unwrap_err().kind(), "StackFault");
    assert_eq!(vm.run(ok).unwrap().py_repr(), "7");
}

/// Repetition whose result could never be allocated fails before allocating.
#[test]
fn oversized_repetition_is_arithmetic_fault() {
    let fault = run_module(|b| {
        b.load_const("ab");
        b.load_const(1_i64 << 62);
        b.binary_op(BinaryOp::Multiply, false);
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.to_string(), "Arithmetic: repeated str is too long");

    let fault = run_module(|b| {
        b.load_const(1);
        b.emit_arg(Opcode::BuildList, 1);
        b.load_const(i64::MAX);
        b.binary_op(BinaryOp::Multiply, true);
        b.emit(Opcode::ReturnValue);
    });
    assert_eq!(fault.to_string(), "Arithmetic: repeated list is too long");
}
