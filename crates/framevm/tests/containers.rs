//! Tests for container construction, subscripting, unpacking and built-in methods.

use framevm::{BinaryOp, CodeBuilder, Const, Fault, Opcode, Value, default_builtins, run};
use pretty_assertions::assert_eq;

fn run_module(build: impl FnOnce(&mut CodeBuilder)) -> Result<Value, Fault> {
    let mut b = CodeBuilder::new("<module>");
    build(&mut b);
    run(b.build().unwrap(), default_builtins())
}

/// Builds `items = ["a", "b", "c"]` and `mapping = {item: index}` keyed by
/// those elements, then reads the keys back.
#[test]
fn mapping_keyed_by_list_elements_keeps_insertion_order() {
    let result = run_module(|b| {
        b.load_const("a");
        b.load_const("b");
        b.load_const("c");
        b.emit_arg(Opcode::BuildList, 3);
        b.emit_name(Opcode::StoreName, "items");
        for (index, key) in [0, 1, 2].into_iter().enumerate() {
            b.emit_name(Opcode::LoadName, "items");
            b.load_const(key);
            b.emit(Opcode::BinarySubscr);
            b.load_const(index as i64);
        }
        b.emit_arg(Opcode::BuildMap, 3);
        b.emit_name(Opcode::StoreName, "mapping");
        b.load_global("list", true);
        b.emit_name(Opcode::LoadName, "mapping");
        b.emit_arg(Opcode::Call, 1);
        b.emit_name(Opcode::LoadName, "items");
        b.emit_arg(Opcode::BuildTuple, 2);
        b.emit(Opcode::ReturnValue);
    })
    .unwrap();
    assert_eq!(result.py_repr(), "(['a', 'b', 'c'], ['a', 'b', 'c'])");
}

#[test]
fn build_const_key_map() {
    let result = run_module(|b| {
        b.load_const(1);
        b.load_const(2);
        b.load_const(Const::Tuple(vec![Const::from("x"), Const::from("y")]));
        b.emit_arg(Opcode::BuildConstKeyMap, 2);
        b.emit(Opcode::ReturnValue);
    })
    .unwrap();
    assert_eq!(result.py_repr(), "{'x': 1, 'y': 2}");
}

/// `xs = []; xs.append(1); xs.append(2); return xs`
#[test]
fn list_append_through_method_call() {
    let result = run_module(|b| {
        b.emit_arg(Opcode::BuildList, 0);
        b.emit_name(Opcode::StoreName, "xs");
        for item in [1, 2] {
            b.emit_name(Opcode::LoadName, "xs");
            b.load_attr("append", true);
            b.load_const(item);
            b.emit_arg(Opcode::Call, 1);
            b.emit(Opcode::PopTop);
        }
        b.emit_name(Opcode::LoadName, "xs");
        b.emit(Opcode::ReturnValue);
    })
    .unwrap();
    assert_eq!(result.py_repr(), "[1, 2]");
}

/// `d = {}; d["k"] = 5; del d["k"]; return len(d)`
#[test]
fn store_and_delete_subscript() {
    let result = run_module(|b| {
        b.emit_arg(Opcode::BuildMap, 0);
        b.emit_name(Opcode::StoreName, "d");
        b.load_const(5);
        b.emit_name(Opcode::LoadName, "d");
        b.load_const("k");
        b.emit(Opcode::StoreSubscr);
        b.emit_name(Opcode::LoadName, "d");
        b.load_const("k");
        b.emit(Opcode::DeleteSubscr);
        b.load_global("len", true);
        b.emit_name(Opcode::LoadName, "d");
        b.emit_arg(Opcode::Call, 1);
        b.emit(Opcode::ReturnValue);
    })
    .unwrap();
    assert_eq!(result, Value::Int(0));
}

/// `a, *rest, z = (1, 2, 3, 4); return (a, rest, z)`
#[test]
fn starred_unpacking() {
    let result = run_module(|b| {
        b.load_const(Const::Tuple((1..=4).map(Const::Int).collect()));
        b.emit_arg(Opcode::UnpackEx, 1 | (1 << 8));
        b.emit_name(Opcode::StoreName, "a");
        b.emit_name(Opcode::StoreName, "rest");
        b.emit_name(Opcode::StoreName, "z");
        b.emit_name(Opcode::LoadName, "a");
        b.emit_name(Opcode::LoadName, "rest");
        b.emit_name(Opcode::LoadName, "z");
        b.emit_arg(Opcode::BuildTuple, 3);
        b.emit(Opcode::ReturnValue);
    })
    .unwrap();
    assert_eq!(result.py_repr(), "(1, [2, 3], 4)");
}

#[test]
fn unpack_sequence_length_mismatch() {
    let fault = run_module(|b| {
        b.load_const(Const::Tuple((1..=3).map(Const::Int).collect()));
        b.emit_arg(Opcode::UnpackSequence, 2);
        b.emit(Opcode::ReturnValue);
    })
    .unwrap_err();
    assert_eq!(
        fault.to_string(),
        "InvalidValue: too many values to unpack (expected 2)"
    );
}

/// `"-".join(["a", "b"]) + "!"`
#[test]
fn string_method_and_concatenation() {
    let result = run_module(|b| {
        b.load_const("-");
        b.load_attr("join", true);
        b.load_const("a");
        b.load_const("b");
        b.emit_arg(Opcode::BuildList, 2);
        b.emit_arg(Opcode::Call, 1);
        b.load_const("!");
        b.binary_op(BinaryOp::Add, false);
        b.emit(Opcode::ReturnValue);
    })
    .unwrap();
    assert_eq!(result.py_str(), "a-b!");
}

#[test]
fn list_index_out_of_range_is_lookup_fault() {
    let fault = run_module(|b| {
        b.emit_arg(Opcode::BuildList, 0);
        b.load_const(3);
        b.emit(Opcode::BinarySubscr);
        b.emit(Opcode::ReturnValue);
    })
    .unwrap_err();
    assert_eq!(fault.kind(), "Lookup");
}

/// `[1, 2, 3, 4][1:3]`
#[test]
fn binary_slice_of_list() {
    let result = run_module(|b| {
        for item in 1..=4 {
            b.load_const(item);
        }
        b.emit_arg(Opcode::BuildList, 4);
        b.load_const(1);
        b.load_const(3);
        b.emit(Opcode::BinarySlice);
        b.emit(Opcode::ReturnValue);
    })
    .unwrap();
    assert_eq!(result.py_repr(), "[2, 3]");
}

#[test]
fn contains_op_on_set() {
    let result = run_module(|b| {
        b.load_const(2);
        b.load_const(1);
        b.load_const(2);
        b.emit_arg(Opcode::BuildSet, 2);
        b.emit_arg(Opcode::ContainsOp, 0);
        b.emit(Opcode::ReturnValue);
    })
    .unwrap();
    assert_eq!(result, Value::Bool(true));
}
