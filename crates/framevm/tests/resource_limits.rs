//! Tests for host-configured resource limits.

use framevm::{
    BinaryOp, Code, CodeBuilder, Fault, LimitedTracker, Opcode, ResourceError, ResourceLimits, ResourceTracker,
    Value, VirtualMachine, default_builtins,
};
use pretty_assertions::assert_eq;

/// `while True: pass`
fn spin_forever() -> Code {
    let mut b = CodeBuilder::new("<module>");
    let head = b.current_offset();
    b.emit(Opcode::Nop);
    b.emit_jump_to(Opcode::JumpBackward, head);
    b.build().unwrap()
}

#[test]
fn operation_limit_stops_infinite_loop() {
    let mut vm = VirtualMachine::new(default_builtins())
        .with_tracker(LimitedTracker::new(ResourceLimits::new().max_operations(1_000)));
    let fault = vm.run(spin_forever()).unwrap_err();
    assert!(
        matches!(
            fault,
            Fault::Resource(ResourceError::Operation {
                limit: 1_000,
                count: 1_001
            })
        ),
        "unexpected fault: {fault}"
    );
    assert_eq!(fault.to_string(), "Resource: operation limit exceeded: 1001 > 1000");
}

#[test]
fn operation_count_matches_instructions_executed() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(1);
    b.load_const(2);
    b.binary_op(BinaryOp::Add, false);
    b.emit(Opcode::ReturnValue);

    let mut vm = VirtualMachine::new(default_builtins())
        .with_tracker(LimitedTracker::new(ResourceLimits::new().max_operations(4)));
    assert_eq!(vm.run(b.build().unwrap()).unwrap(), Value::Int(3));
    assert_eq!(vm.tracker().operation_count(), Some(4));
}

/// `"ab" * n`
fn repeat_string(n: i64) -> Code {
    let mut b = CodeBuilder::new("<module>");
    b.load_const("ab");
    b.load_const(n);
    b.binary_op(BinaryOp::Multiply, false);
    b.emit(Opcode::ReturnValue);
    b.build().unwrap()
}

#[test]
fn sequence_limit_rejects_large_repetition() {
    let mut vm = VirtualMachine::new(default_builtins())
        .with_tracker(LimitedTracker::new(ResourceLimits::new().max_sequence_len(100)));

    assert_eq!(vm.run(repeat_string(50)).unwrap().py_str().len(), 100);

    let fault = vm.run(repeat_string(1_000_000)).unwrap_err();
    assert!(
        matches!(
            fault,
            Fault::Resource(ResourceError::Size {
                limit: 100,
                requested: 2_000_000
            })
        ),
        "unexpected fault: {fault}"
    );
}

#[test]
fn limits_round_trip_through_json() {
    let limits = ResourceLimits::new().max_operations(10).max_sequence_len(20);
    let json = serde_json::to_string(&limits).unwrap();
    let decoded: ResourceLimits = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, limits);
}
