//! Tests for argument binding, both through `Signature::bind` directly and
//! through calls of interpreted functions.

use std::rc::Rc;

use framevm::{
    ArgValues, BindError, CodeBuilder, Const, Defaults, Fault, Opcode, Signature, Value, default_builtins, run,
};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;

/// `def f(a, /, b=5, **kw)`
fn posonly_default_varkw() -> (Signature, Defaults) {
    let varnames: Vec<Rc<str>> = ["a", "b", "kw"].into_iter().map(Rc::from).collect();
    let signature = Signature::from_layout(&varnames, 1, 2, 0, false, true);
    let defaults = Defaults {
        positional: vec![Value::Int(5)],
        keyword: IndexMap::new(),
    };
    (signature, defaults)
}

fn args(positional: Vec<i64>, keywords: &[(&str, i64)]) -> ArgValues {
    ArgValues::with_keywords(
        positional.into_iter().map(Value::Int).collect(),
        keywords
            .iter()
            .map(|(name, value)| (Rc::from(*name), Value::Int(*value)))
            .collect(),
    )
}

/// Renders a bind result as `name=repr` pairs in parameter order.
fn render(signature: &Signature, defaults: &Defaults, args: ArgValues) -> Result<String, BindError> {
    let bound = signature.bind(args, defaults)?;
    Ok(bound
        .iter()
        .map(|(name, value)| format!("{name}={}", value.py_repr()))
        .collect::<Vec<_>>()
        .join(", "))
}

#[test]
fn missing_optional_parameter_takes_default() {
    let (signature, defaults) = posonly_default_varkw();
    assert_eq!(
        render(&signature, &defaults, args(vec![1], &[])),
        Ok("a=1, b=5, kw={}".to_owned())
    );
}

#[test]
fn unknown_keyword_goes_to_varkw() {
    let (signature, defaults) = posonly_default_varkw();
    assert_eq!(
        render(&signature, &defaults, args(vec![1], &[("b", 2), ("c", 3)])),
        Ok("a=1, b=2, kw={'c': 3}".to_owned())
    );
}

/// With `**kw` present a keyword naming a filled positional-only parameter is still rejected.
#[test]
fn posonly_by_keyword_is_rejected() {
    let (signature, defaults) = posonly_default_varkw();
    assert_eq!(
        render(&signature, &defaults, args(vec![1], &[("a", 9)])),
        Err(BindError::PositionalOnlyPassedAsKeyword)
    );
}

/// `def f(a, /)`
fn posonly_only() -> Signature {
    let varnames: Vec<Rc<str>> = vec![Rc::from("a")];
    Signature::from_layout(&varnames, 1, 1, 0, false, false)
}

#[test]
fn posonly_by_keyword_without_varkw_is_rejected() {
    assert_eq!(
        render(&posonly_only(), &Defaults::default(), args(vec![], &[("a", 1)])),
        Err(BindError::PositionalOnlyPassedAsKeyword)
    );
}

/// The positional-only check runs before the surplus positional check.
#[test]
fn posonly_by_keyword_wins_over_too_many_positional() {
    assert_eq!(
        render(&posonly_only(), &Defaults::default(), args(vec![1, 2], &[("a", 1)])),
        Err(BindError::PositionalOnlyPassedAsKeyword)
    );
    assert_eq!(
        render(&posonly_only(), &Defaults::default(), args(vec![1, 2], &[])),
        Err(BindError::TooManyPositionalArguments)
    );
}

#[test]
fn positional_and_keyword_for_same_parameter_is_rejected() {
    let (signature, defaults) = posonly_default_varkw();
    assert_eq!(
        render(&signature, &defaults, args(vec![1, 2], &[("b", 3)])),
        Err(BindError::MultipleValuesForArgument)
    );
}

#[test]
fn surplus_positional_without_varargs_is_rejected() {
    let (signature, defaults) = posonly_default_varkw();
    assert_eq!(
        render(&signature, &defaults, args(vec![1, 2, 3], &[])),
        Err(BindError::TooManyPositionalArguments)
    );
}

#[test]
fn missing_required_positional_is_rejected() {
    let (signature, defaults) = posonly_default_varkw();
    assert_eq!(
        render(&signature, &defaults, args(vec![], &[])),
        Err(BindError::MissingPositionalArguments)
    );
}

/// `def g(x, *rest, flag, limit=3)`
#[test]
fn varargs_and_keyword_only_parameters() {
    let varnames: Vec<Rc<str>> = ["x", "flag", "limit", "rest"].into_iter().map(Rc::from).collect();
    let signature = Signature::from_layout(&varnames, 0, 1, 2, true, false);
    let mut keyword = IndexMap::new();
    keyword.insert(Rc::from("limit"), Value::Int(3));
    let defaults = Defaults {
        positional: vec![],
        keyword,
    };

    assert_eq!(
        render(&signature, &defaults, args(vec![1, 2, 3], &[("flag", 0)])),
        Ok("x=1, flag=0, limit=3, rest=(2, 3)".to_owned())
    );
    assert_eq!(
        render(&signature, &defaults, args(vec![1], &[])),
        Err(BindError::MissingKeywordOnlyArguments)
    );
    assert_eq!(
        render(&signature, &defaults, args(vec![1], &[("flag", 0), ("other", 1)])),
        Err(BindError::TooManyKeywordArguments)
    );
}

/// Builds a module that defines `f(a, /, b=5, **kw)` returning `(a, b, kw)`,
/// calls it with `1` and the given keywords, and returns the call's result.
fn call_posonly_function(keywords: &[(&str, i64)]) -> Result<Value, Fault> {
    let mut body = CodeBuilder::new("f");
    body.posonly_params(&["a"])
        .params(&["b"])
        .var_kwargs("kw")
        .defaults(vec![Const::Int(5)]);
    body.emit_name(Opcode::LoadFast, "a");
    body.emit_name(Opcode::LoadFast, "b");
    body.emit_name(Opcode::LoadFast, "kw");
    body.emit_arg(Opcode::BuildTuple, 3);
    body.emit(Opcode::ReturnValue);
    let body = body.build().unwrap();

    let mut module = CodeBuilder::new("<module>");
    module.load_const(body);
    module.emit(Opcode::MakeFunction);
    module.emit_name(Opcode::StoreName, "f");
    module.emit_name(Opcode::LoadName, "f");
    module.emit(Opcode::PushNull);
    module.load_const(1);
    for (_, value) in keywords {
        module.load_const(*value);
    }
    let names = keywords.iter().map(|(name, _)| Const::from(*name)).collect();
    module.load_const(Const::Tuple(names));
    module.emit_arg(Opcode::CallKw, 1 + keywords.len() as u32);
    module.emit(Opcode::ReturnValue);
    run(module.build().unwrap(), default_builtins())
}

#[test]
fn interpreted_call_binds_defaults_and_varkw() {
    let result = call_posonly_function(&[("c", 3)]).unwrap();
    assert_eq!(result.py_repr(), "(1, 5, {'c': 3})");
}

#[test]
fn interpreted_call_reports_binding_fault() {
    let fault = call_posonly_function(&[("a", 9)]).unwrap_err();
    assert!(
        matches!(
            fault,
            Fault::Binding {
                error: BindError::PositionalOnlyPassedAsKeyword,
                ..
            }
        ),
        "unexpected fault: {fault}"
    );
    assert_eq!(
        fault.to_string(),
        "BindingError: f(): Positional-only argument passed as keyword argument"
    );
}
