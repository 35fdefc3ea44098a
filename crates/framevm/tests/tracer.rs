//! Tests for the tracer hooks: event order, depths and the bundled tracers.

use framevm::{
    BinaryOp, Code, CodeBuilder, CoverageTracer, Opcode, ProfilingTracer, RecordingTracer, TraceEvent,
    VirtualMachine, default_builtins,
};
use pretty_assertions::assert_eq;

/// `def double(x): return x * 2` then `double(4)`.
fn call_double() -> Code {
    let mut double = CodeBuilder::new("double");
    double.params(&["x"]);
    double.emit_name(Opcode::LoadFast, "x");
    double.load_const(2);
    double.binary_op(BinaryOp::Multiply, false);
    double.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    b.load_const(double.build().unwrap());
    b.emit(Opcode::MakeFunction);
    b.emit(Opcode::PushNull);
    b.load_const(4);
    b.emit_arg(Opcode::Call, 1);
    b.emit(Opcode::ReturnValue);
    b.build().unwrap()
}

#[test]
fn recording_tracer_captures_full_trace() {
    let mut vm = VirtualMachine::new(default_builtins()).with_tracer(RecordingTracer::new());
    let result = vm.run(call_double()).unwrap();
    assert_eq!(result.py_repr(), "8");

    let instr = |offset, opcode, stack_depth| TraceEvent::Instruction {
        offset,
        opcode,
        stack_depth,
    };
    assert_eq!(
        vm.into_tracer().into_events(),
        vec![
            TraceEvent::Call {
                name: "<module>".to_owned(),
                depth: 1,
            },
            instr(0, Opcode::LoadConst, 0),
            instr(2, Opcode::MakeFunction, 1),
            TraceEvent::MakeFunction {
                defaults_count: 0,
                kwdefaults_count: 0,
            },
            instr(4, Opcode::PushNull, 1),
            instr(6, Opcode::LoadConst, 2),
            instr(8, Opcode::Call, 3),
            TraceEvent::Call {
                name: "double".to_owned(),
                depth: 2,
            },
            instr(0, Opcode::LoadFast, 0),
            instr(2, Opcode::LoadConst, 1),
            instr(4, Opcode::BinaryOp, 2),
            instr(6, Opcode::ReturnValue, 1),
            TraceEvent::Return { depth: 1 },
            instr(10, Opcode::ReturnValue, 1),
            TraceEvent::Return { depth: 0 },
        ]
    );
}

#[test]
fn recording_tracer_limit_caps_events() {
    let mut vm = VirtualMachine::new(default_builtins()).with_tracer(RecordingTracer::with_limit(3));
    vm.run(call_double()).unwrap();
    assert_eq!(vm.tracer().events().len(), 3);
}

#[test]
fn profiling_tracer_counts_opcodes_and_calls() {
    let mut vm = VirtualMachine::new(default_builtins()).with_tracer(ProfilingTracer::new());
    vm.run(call_double()).unwrap();
    let report = vm.tracer().report();

    assert_eq!(report.total_instructions, 10);
    assert_eq!(report.total_calls, 2);
    assert_eq!(report.max_depth, 2);
    assert_eq!(report.functions_created, 1);
    assert_eq!(report.opcode_counts[0], (Opcode::LoadConst, 3));
    assert_eq!(report.opcode_counts[1], (Opcode::ReturnValue, 2));
}

#[test]
fn coverage_tracer_records_offsets_per_code_object() {
    let mut vm = VirtualMachine::new(default_builtins()).with_tracer(CoverageTracer::new());
    vm.run(call_double()).unwrap();
    let tracer = vm.tracer();

    let mut module: Vec<u32> = tracer.covered_offsets("<module>").unwrap().iter().copied().collect();
    module.sort_unstable();
    assert_eq!(module, vec![0, 2, 4, 6, 8, 10]);

    let mut double: Vec<u32> = tracer.covered_offsets("double").unwrap().iter().copied().collect();
    double.sort_unstable();
    assert_eq!(double, vec![0, 2, 4, 6]);
    assert_eq!(tracer.coverage_count(), 10);
}
