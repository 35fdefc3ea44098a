//! Tests for interpreted calls: function creation, defaults, closures over the
//! defining scope, recursion and the call conventions of the call opcodes.

use std::rc::Rc;

use framevm::{
    BinaryOp, Code, CodeBuilder, CollectStringPrint, CompareOp, Const, Fault, LimitedTracker, Opcode,
    RecordingTracer, ResourceError, ResourceLimits, TraceEvent, Value, VirtualMachine, default_builtins, run,
};
use pretty_assertions::assert_eq;

/// Emits `name = <function built from code>` at module level.
fn define(b: &mut CodeBuilder, name: &str, code: Code) {
    b.load_const(code);
    b.emit(Opcode::MakeFunction);
    b.emit_name(Opcode::StoreName, name);
}

/// `def count_down(n): return 0 if n == 0 else count_down(n - 1) + 1`
fn count_down() -> Code {
    let mut b = CodeBuilder::new("count_down");
    b.params(&["n"]);
    b.emit_name(Opcode::LoadFast, "n");
    b.load_const(0);
    b.compare_op(CompareOp::Eq);
    let recurse = b.emit_jump(Opcode::PopJumpIfFalse);
    b.load_const(0);
    b.emit(Opcode::ReturnValue);
    b.patch_jump(recurse);
    b.load_global("count_down", true);
    b.emit_name(Opcode::LoadFast, "n");
    b.load_const(1);
    b.binary_op(BinaryOp::Subtract, false);
    b.emit_arg(Opcode::Call, 1);
    b.load_const(1);
    b.binary_op(BinaryOp::Add, false);
    b.emit(Opcode::ReturnValue);
    b.build().unwrap()
}

/// `count_down(n)` at module level.
fn call_count_down(n: i64) -> Code {
    let mut b = CodeBuilder::new("<module>");
    define(&mut b, "count_down", count_down());
    b.emit_name(Opcode::LoadName, "count_down");
    b.emit(Opcode::PushNull);
    b.load_const(n);
    b.emit_arg(Opcode::Call, 1);
    b.emit(Opcode::ReturnValue);
    b.build().unwrap()
}

#[test]
fn recursive_function() {
    let result = run(call_count_down(10), default_builtins()).unwrap();
    assert_eq!(result, Value::Int(10));
}

/// The default tracker stops runaway recursion at 1000 frames.
#[test]
fn default_recursion_limit() {
    assert_eq!(
        run(call_count_down(900), default_builtins()).unwrap(),
        Value::Int(900)
    );
    let fault = run(call_count_down(5_000), default_builtins()).unwrap_err();
    assert_eq!(fault.kind(), "Resource");
    assert_eq!(
        fault.to_string(),
        "Resource: maximum recursion depth exceeded: 1001 > 1000"
    );
}

/// Interpreted recursion lives on the frame stack, so a depth far beyond what
/// the host stack could hold runs to completion once the limit is lifted.
#[test]
fn deep_recursion_does_not_use_host_stack() {
    let mut vm = VirtualMachine::new(default_builtins())
        .with_tracker(LimitedTracker::new(ResourceLimits::new().max_recursion_depth(None)));
    let result = vm.run(call_count_down(100_000)).unwrap();
    assert_eq!(result, Value::Int(100_000));
}

#[test]
fn configured_recursion_limit() {
    let mut vm = VirtualMachine::new(default_builtins())
        .with_tracker(LimitedTracker::new(ResourceLimits::new().max_recursion_depth(Some(50))));
    let fault = vm.run(call_count_down(100)).unwrap_err();
    assert!(
        matches!(
            fault,
            Fault::Resource(ResourceError::Recursion { limit: 50, depth: 51 })
        ),
        "unexpected fault: {fault}"
    );
}

/// `def add(a, b=10): return a + b`, defaults attached by `SET_FUNCTION_ATTRIBUTE`.
#[test]
fn defaults_from_set_function_attribute() {
    let mut add = CodeBuilder::new("add");
    add.params(&["a", "b"]);
    add.emit_name(Opcode::LoadFast, "a");
    add.emit_name(Opcode::LoadFast, "b");
    add.binary_op(BinaryOp::Add, false);
    add.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    b.load_const(Const::Tuple(vec![Const::Int(10)]));
    b.load_const(add.build().unwrap());
    b.emit(Opcode::MakeFunction);
    b.emit_arg(Opcode::SetFunctionAttribute, 0x01);
    b.emit_name(Opcode::StoreName, "add");
    b.emit_name(Opcode::LoadName, "add");
    b.emit(Opcode::PushNull);
    b.load_const(5);
    b.emit_arg(Opcode::Call, 1);
    b.emit_name(Opcode::LoadName, "add");
    b.load_attr("__defaults__", false);
    b.emit_arg(Opcode::BuildTuple, 2);
    b.emit(Opcode::ReturnValue);

    let result = run(b.build().unwrap(), default_builtins()).unwrap();
    assert_eq!(result.py_repr(), "(15, (10,))");
}

/// The legacy `MAKE_FUNCTION` flag form pops the defaults below the code object.
#[test]
fn defaults_from_make_function_flags() {
    let mut scale = CodeBuilder::new("scale");
    scale.params(&["x"]).kwonly_params(&["factor"]);
    scale.emit_name(Opcode::LoadFast, "x");
    scale.emit_name(Opcode::LoadFast, "factor");
    scale.binary_op(BinaryOp::Multiply, false);
    scale.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    b.load_const(3);
    b.load_const(Const::Tuple(vec![Const::from("factor")]));
    b.emit_arg(Opcode::BuildConstKeyMap, 1);
    b.load_const(scale.build().unwrap());
    b.emit_arg(Opcode::MakeFunction, 0x02);
    b.emit(Opcode::PushNull);
    b.load_const(7);
    b.emit_arg(Opcode::Call, 1);
    b.emit(Opcode::ReturnValue);

    let mut vm = VirtualMachine::new(default_builtins()).with_tracer(RecordingTracer::new());
    let result = vm.run(b.build().unwrap()).unwrap();
    assert_eq!(result, Value::Int(21));
    assert!(vm.tracer().events().contains(&TraceEvent::MakeFunction {
        defaults_count: 0,
        kwdefaults_count: 1,
    }));
}

/// `f(*(1, 2), **{"c": 3})` for `def f(a, b, c): return [a, b, c]`
#[test]
fn call_function_ex_unpacks_args_and_kwargs() {
    let mut f = CodeBuilder::new("f");
    f.params(&["a", "b", "c"]);
    f.emit_name(Opcode::LoadFast, "a");
    f.emit_name(Opcode::LoadFast, "b");
    f.emit_name(Opcode::LoadFast, "c");
    f.emit_arg(Opcode::BuildList, 3);
    f.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    b.load_const(f.build().unwrap());
    b.emit(Opcode::MakeFunction);
    b.emit(Opcode::PushNull);
    b.load_const(Const::Tuple(vec![Const::Int(1), Const::Int(2)]));
    b.load_const("c");
    b.load_const(3);
    b.emit_arg(Opcode::BuildMap, 1);
    b.emit_arg(Opcode::CallFunctionEx, 1);
    b.emit(Opcode::ReturnValue);

    let result = run(b.build().unwrap(), default_builtins()).unwrap();
    assert_eq!(result.py_repr(), "[1, 2, 3]");
}

/// A function's locals start as a copy of every name in its defining scope,
/// not only the free variables it uses.
#[test]
fn function_sees_names_of_defining_scope() {
    let mut peek = CodeBuilder::new("peek");
    peek.emit_name(Opcode::LoadFast, "secret");
    peek.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    b.load_const("hidden");
    b.emit_name(Opcode::StoreName, "secret");
    define(&mut b, "peek", peek.build().unwrap());
    b.emit_name(Opcode::LoadName, "peek");
    b.emit(Opcode::PushNull);
    b.emit_arg(Opcode::Call, 0);
    b.emit(Opcode::ReturnValue);

    let result = run(b.build().unwrap(), default_builtins()).unwrap();
    assert_eq!(result.py_str(), "hidden");
}

/// `LOAD_DEREF` falls back to the live defining scope, so it sees a name bound
/// there after the call started.
#[test]
fn load_deref_reads_live_defining_scope() {
    let mut setter = CodeBuilder::new("setter");
    setter.load_const(3);
    setter.emit_name(Opcode::StoreGlobal, "late");
    setter.load_const(Const::None);
    setter.emit(Opcode::ReturnValue);

    let mut reader = CodeBuilder::new("reader");
    reader.load_global("setter", true);
    reader.emit_arg(Opcode::Call, 0);
    reader.emit(Opcode::PopTop);
    reader.emit_name(Opcode::LoadDeref, "late");
    reader.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    define(&mut b, "setter", setter.build().unwrap());
    define(&mut b, "reader", reader.build().unwrap());
    b.emit_name(Opcode::LoadName, "reader");
    b.emit(Opcode::PushNull);
    b.emit_arg(Opcode::Call, 0);
    b.emit(Opcode::ReturnValue);

    let mut vm = VirtualMachine::new(default_builtins()).with_tracer(RecordingTracer::new());
    let result = vm.run(b.build().unwrap()).unwrap();
    assert_eq!(result, Value::Int(3));
    assert!(vm.tracer().events().contains(&TraceEvent::DerefLoad {
        name: "late".to_owned(),
        from_defining_scope: true,
    }));
}

/// A closure returned from its defining function still reads that function's names.
#[test]
fn closure_outlives_defining_call() {
    let mut inner = CodeBuilder::new("inner");
    inner.emit_name(Opcode::LoadDeref, "x");
    inner.emit(Opcode::ReturnValue);

    let mut outer = CodeBuilder::new("outer");
    outer.load_const(41);
    outer.emit_name(Opcode::StoreFast, "x");
    outer.load_const(inner.build().unwrap());
    outer.emit(Opcode::MakeFunction);
    outer.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    define(&mut b, "outer", outer.build().unwrap());
    b.emit_name(Opcode::LoadName, "outer");
    b.emit(Opcode::PushNull);
    b.emit_arg(Opcode::Call, 0);
    b.emit(Opcode::PushNull);
    b.emit_arg(Opcode::Call, 0);
    b.load_const(1);
    b.binary_op(BinaryOp::Add, false);
    b.emit(Opcode::ReturnValue);

    let result = run(b.build().unwrap(), default_builtins()).unwrap();
    assert_eq!(result, Value::Int(42));
}

/// Names a function stores stay in its own frame.
#[test]
fn function_stores_do_not_leak_into_caller() {
    let mut f = CodeBuilder::new("f");
    f.load_const("inner");
    f.emit_name(Opcode::StoreFast, "value");
    f.load_const(Const::None);
    f.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    b.load_const("outer");
    b.emit_name(Opcode::StoreName, "value");
    define(&mut b, "f", f.build().unwrap());
    b.emit_name(Opcode::LoadName, "f");
    b.emit(Opcode::PushNull);
    b.emit_arg(Opcode::Call, 0);
    b.emit(Opcode::PopTop);
    b.emit_name(Opcode::LoadName, "value");
    b.emit(Opcode::ReturnValue);

    let result = run(b.build().unwrap(), default_builtins()).unwrap();
    assert_eq!(result.py_str(), "outer");
}

#[test]
fn print_output_is_captured() {
    let mut b = CodeBuilder::new("<module>");
    b.load_global("print", true);
    b.load_const("total:");
    b.load_const(3);
    b.emit_arg(Opcode::Call, 2);
    b.emit(Opcode::ReturnValue);

    let mut vm = VirtualMachine::new(default_builtins()).with_print(CollectStringPrint::new());
    let result = vm.run(b.build().unwrap()).unwrap();
    assert_eq!(result, Value::None);
    assert_eq!(vm.print().output(), "total: 3\n");
}

#[test]
fn function_name_attribute() {
    let mut b = CodeBuilder::new("<module>");
    define(&mut b, "helper", CodeBuilder::new("helper").build().unwrap());
    b.emit_name(Opcode::LoadName, "helper");
    b.load_attr("__name__", false);
    b.emit(Opcode::ReturnValue);

    let result = run(Rc::new(b.build().unwrap()), default_builtins()).unwrap();
    assert_eq!(result.py_str(), "helper");
}
