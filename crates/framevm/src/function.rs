use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    args::ArgValues,
    bytecode::Code,
    exception::{Fault, RunResult},
    namespace::Namespace,
    signature::Bound,
    types::Dict,
    value::Value,
};

/// Default values applied when a call leaves parameters unbound.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    /// Defaults for the trailing positional parameters.
    pub positional: Vec<Value>,
    /// Defaults for keyword-only parameters, by name.
    pub keyword: IndexMap<Rc<str>, Value>,
}

/// A function created by `MAKE_FUNCTION`.
///
/// Holds the code object, the current default tables and a handle to the
/// scope the function was defined in. That handle is live: names the
/// defining frame binds after the function was created are still visible
/// through it.
#[derive(Debug)]
pub struct Function {
    code: Rc<Code>,
    defaults: RefCell<Defaults>,
    /// Locals of the defining frame.
    defining_scope: Namespace,
    /// Globals of the defining frame.
    globals: Namespace,
    /// Cell tuple attached by `SET_FUNCTION_ATTRIBUTE`. Kept for introspection only;
    /// free variables resolve through `defining_scope`.
    closure: RefCell<Option<Value>>,
}

impl Function {
    /// Creates a function whose defaults start as the code object's own defaults.
    #[must_use]
    pub fn new(code: Rc<Code>, defining_scope: Namespace, globals: Namespace) -> Self {
        let defaults = Defaults {
            positional: code.defaults().iter().map(crate::bytecode::Const::to_value).collect(),
            keyword: code
                .kwdefaults()
                .iter()
                .map(|(name, value)| (Rc::clone(name), value.to_value()))
                .collect(),
        };
        Self {
            code,
            defaults: RefCell::new(defaults),
            defining_scope,
            globals,
            closure: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.code.name()
    }

    #[must_use]
    pub fn code(&self) -> &Rc<Code> {
        &self.code
    }

    #[must_use]
    pub fn defining_scope(&self) -> &Namespace {
        &self.defining_scope
    }

    #[must_use]
    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    /// Binds call arguments against the function's signature and current defaults.
    pub fn bind(&self, args: ArgValues) -> RunResult<Bound> {
        self.code
            .signature()
            .bind(args, &self.defaults.borrow())
            .map_err(|error| Fault::Binding {
                function: Rc::clone(self.code.name_rc()),
                error,
            })
    }

    /// Builds the local scope of a new call: a snapshot of the defining scope
    /// overlaid with the bound arguments.
    #[must_use]
    pub fn seed_locals(&self, bound: Bound) -> Namespace {
        let locals = self.defining_scope.snapshot();
        for (name, value) in bound {
            locals.set(name, value);
        }
        locals
    }

    #[must_use]
    pub fn defaults(&self) -> Defaults {
        self.defaults.borrow().clone()
    }

    /// `__defaults__`: a tuple, or `None` when there are no positional defaults.
    #[must_use]
    pub fn defaults_value(&self) -> Value {
        let defaults = self.defaults.borrow();
        if defaults.positional.is_empty() {
            Value::None
        } else {
            Value::tuple(defaults.positional.clone())
        }
    }

    /// `__kwdefaults__`: a dict, or `None` when there are no keyword-only defaults.
    #[must_use]
    pub fn kwdefaults_value(&self) -> Value {
        let defaults = self.defaults.borrow();
        if defaults.keyword.is_empty() {
            return Value::None;
        }
        let mut dict = Dict::new();
        for (name, value) in &defaults.keyword {
            dict.insert_str(Rc::clone(name), value.clone());
        }
        Value::dict(dict)
    }

    /// Replaces the positional defaults from a tuple (or `None` to clear them).
    pub fn set_defaults(&self, value: Value) -> RunResult<()> {
        let positional = match value {
            Value::None => Vec::new(),
            Value::Tuple(items) => items.to_vec(),
            other => {
                return Err(Fault::type_mismatch(format!(
                    "__defaults__ must be set to a tuple object, not '{}'",
                    other.type_name()
                )));
            }
        };
        if positional.len() > self.code.signature().positional_count() {
            return Err(Fault::invalid_value(format!(
                "{}() has {} positional parameters but {} defaults were given",
                self.name(),
                self.code.signature().positional_count(),
                positional.len()
            )));
        }
        self.defaults.borrow_mut().positional = positional;
        Ok(())
    }

    /// Replaces the keyword-only defaults from a dict with string keys (or `None` to clear them).
    pub fn set_kwdefaults(&self, value: Value) -> RunResult<()> {
        let keyword = match value {
            Value::None => IndexMap::new(),
            Value::Dict(dict) => dict
                .borrow()
                .iter()
                .map(|(key, value)| match key {
                    Value::Str(name) => Ok((Rc::clone(name), value.clone())),
                    other => Err(Fault::type_mismatch(format!(
                        "keyword default names must be strings, not '{}'",
                        other.type_name()
                    ))),
                })
                .collect::<RunResult<_>>()?,
            other => {
                return Err(Fault::type_mismatch(format!(
                    "__kwdefaults__ must be set to a dict object, not '{}'",
                    other.type_name()
                )));
            }
        };
        self.defaults.borrow_mut().keyword = keyword;
        Ok(())
    }

    pub(crate) fn set_closure(&self, cells: Value) {
        *self.closure.borrow_mut() = Some(cells);
    }

    /// The cell tuple attached at creation, if any.
    #[must_use]
    pub fn closure(&self) -> Option<Value> {
        self.closure.borrow().clone()
    }
}
