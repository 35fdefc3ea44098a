use std::rc::Rc;

use framevm::{BinaryOp, Code, CodeBuilder, Opcode, Value, VirtualMachine, default_builtins, run};
use pretty_assertions::assert_eq;

/// `counter = counter + 1` if `counter` already exists, else `counter = 1`; returns `counter`.
fn bump_counter() -> Rc<Code> {
    let mut b = CodeBuilder::new("<module>");
    b.load_global("counter", false);
    b.load_const(1);
    b.binary_op(BinaryOp::Add, false);
    b.emit_name(Opcode::StoreGlobal, "counter");
    b.emit_name(Opcode::LoadName, "counter");
    b.emit(Opcode::ReturnValue);
    Rc::new(b.build().unwrap())
}

/// Verifies that repeated runs of one code object with one machine produce identical results.
#[test]
fn repeated_runs_produce_same_result() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const("hello");
    b.load_const(" world");
    b.binary_op(BinaryOp::Add, false);
    b.emit(Opcode::ReturnValue);
    let code = Rc::new(b.build().unwrap());

    let mut vm = VirtualMachine::new(default_builtins());
    for _ in 0..50 {
        let result = vm.run(Rc::clone(&code)).unwrap();
        assert_eq!(result.py_str(), "hello world");
    }
}

/// Globals written by one run are gone in the next: every run starts from a fresh global scope.
#[test]
fn globals_do_not_leak_between_runs() {
    let builtins = default_builtins();
    builtins.set("counter", Value::Int(0));
    let code = bump_counter();

    let mut vm = VirtualMachine::new(builtins);
    let first = vm.run(Rc::clone(&code)).unwrap();
    let second = vm.run(Rc::clone(&code)).unwrap();
    assert_eq!(first, Value::Int(1));
    assert_eq!(second, Value::Int(1));
}

/// The free `run` function behaves the same way across calls.
#[test]
fn independent_runs_are_idempotent() {
    let code = bump_counter();
    let builtins = default_builtins();
    builtins.set("counter", Value::Int(10));

    let results: Vec<Value> = (0..3)
        .map(|_| run(Rc::clone(&code), builtins.clone()).unwrap())
        .collect();
    assert_eq!(results, vec![Value::Int(11), Value::Int(11), Value::Int(11)]);
    assert_eq!(builtins.get("counter"), Some(Value::Int(10)));
}

/// Mutable values reachable from the built-in scope are shared, not copied, between runs.
#[test]
fn builtin_containers_are_shared_between_runs() {
    let builtins = default_builtins();
    builtins.set("log", Value::list(Vec::new()));

    let mut b = CodeBuilder::new("<module>");
    b.load_global("log", false);
    b.load_attr("append", true);
    b.load_const("entry");
    b.emit_arg(Opcode::Call, 1);
    b.emit(Opcode::PopTop);
    b.load_global("len", true);
    b.load_global("log", false);
    b.emit_arg(Opcode::Call, 1);
    b.emit(Opcode::ReturnValue);
    let code = Rc::new(b.build().unwrap());

    let mut vm = VirtualMachine::new(builtins);
    assert_eq!(vm.run(Rc::clone(&code)).unwrap(), Value::Int(1));
    assert_eq!(vm.run(code).unwrap(), Value::Int(2));
}

/// A module-level function refers to the globals that refer to it; the run
/// releases those bindings once it finishes so the pair can be freed.
#[test]
fn module_globals_are_released_after_run() {
    let mut body = CodeBuilder::new("f");
    body.load_const(1);
    body.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    b.load_const(body.build().unwrap());
    b.emit(Opcode::MakeFunction);
    b.emit_name(Opcode::StoreName, "f");
    b.emit_name(Opcode::LoadName, "f");
    b.emit(Opcode::ReturnValue);

    let Value::Function(function) = run(b.build().unwrap(), default_builtins()).unwrap() else {
        panic!("expected a function");
    };
    assert_eq!(function.name(), "f");
    assert!(function.globals().is_empty());
    assert_eq!(Rc::strong_count(&function), 1);
}
