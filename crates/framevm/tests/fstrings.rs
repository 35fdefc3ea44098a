//! Tests for the f-string opcodes, in both the 3.11/3.12 `FORMAT_VALUE` form
//! and the 3.13 `CONVERT_VALUE` / `FORMAT_SIMPLE` / `FORMAT_WITH_SPEC` form.

use framevm::{CodeBuilder, Opcode, default_builtins, run};
use pretty_assertions::assert_eq;

fn run_to_string(build: impl FnOnce(&mut CodeBuilder)) -> String {
    let mut b = CodeBuilder::new("<module>");
    build(&mut b);
    b.emit(Opcode::ReturnValue);
    run(b.build().unwrap(), default_builtins()).unwrap().py_str()
}

/// `f"x={1.23456:.2f}, n={42!r:>5}"` with `FORMAT_VALUE`.
#[test]
fn format_value_with_spec_and_conversion() {
    let out = run_to_string(|b| {
        b.load_const("x=");
        b.load_const(1.23456);
        b.load_const(".2f");
        b.emit_arg(Opcode::FormatValue, 0x04);
        b.load_const(", n=");
        b.load_const(42);
        b.load_const(">5");
        b.emit_arg(Opcode::FormatValue, 0x02 | 0x04);
        b.emit_arg(Opcode::BuildString, 4);
    });
    assert_eq!(out, "x=1.23, n=   42");
}

/// `f"{name!r}: {count:,}"` with the 3.13 opcodes.
#[test]
fn convert_and_format_with_spec() {
    let out = run_to_string(|b| {
        b.load_const("widget");
        b.emit_arg(Opcode::ConvertValue, 2);
        b.emit(Opcode::FormatSimple);
        b.load_const(": ");
        b.load_const(1_234_567);
        b.load_const(",");
        b.emit(Opcode::FormatWithSpec);
        b.emit_arg(Opcode::BuildString, 3);
    });
    assert_eq!(out, "'widget': 1,234,567");
}

#[test]
fn format_simple_uses_str() {
    let out = run_to_string(|b| {
        b.load_const(true);
        b.emit(Opcode::FormatSimple);
        b.load_const(" ");
        b.load_const(2.5);
        b.emit(Opcode::FormatSimple);
        b.emit_arg(Opcode::BuildString, 3);
    });
    assert_eq!(out, "True 2.5");
}

#[test]
fn fill_align_and_sign() {
    let out = run_to_string(|b| {
        b.load_const(7);
        b.load_const("*^+7d");
        b.emit(Opcode::FormatWithSpec);
    });
    assert_eq!(out, "**+7***");
}
