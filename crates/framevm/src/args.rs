use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    exception::{Fault, RunResult},
    value::Value,
};

/// Arguments of a single call: positional values and keyword values in call order.
#[derive(Debug, Clone, Default)]
pub struct ArgValues {
    pub positional: Vec<Value>,
    pub keywords: IndexMap<Rc<str>, Value>,
}

impl ArgValues {
    #[must_use]
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_keywords(positional: Vec<Value>, keywords: IndexMap<Rc<str>, Value>) -> Self {
        Self { positional, keywords }
    }

    /// Total number of arguments, positional and keyword.
    #[must_use]
    pub fn count(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    /// Prepends a receiver, as done for bound-method calls.
    pub(crate) fn prepend(&mut self, receiver: Value) {
        self.positional.insert(0, receiver);
    }

    /// Checks that no keyword arguments were passed.
    pub fn check_no_kwargs(&self, name: &str) -> RunResult<()> {
        match self.keywords.keys().next() {
            None => Ok(()),
            Some(key) => Err(Fault::type_mismatch(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            ))),
        }
    }

    /// Checks that zero arguments were passed.
    pub fn check_zero_args(self, name: &str) -> RunResult<()> {
        self.check_no_kwargs(name)?;
        if self.positional.is_empty() {
            Ok(())
        } else {
            Err(arg_count_error(name, "no arguments", self.positional.len()))
        }
    }

    /// Checks that exactly one positional argument was passed, returning it.
    pub fn get_one_arg(self, name: &str) -> RunResult<Value> {
        self.check_no_kwargs(name)?;
        let [a]: [Value; 1] = self
            .positional
            .try_into()
            .map_err(|args: Vec<Value>| arg_count_error(name, "exactly one argument", args.len()))?;
        Ok(a)
    }

    /// Checks that exactly two positional arguments were passed, returning them as a tuple.
    pub fn get_two_args(self, name: &str) -> RunResult<(Value, Value)> {
        self.check_no_kwargs(name)?;
        let [a, b]: [Value; 2] = self
            .positional
            .try_into()
            .map_err(|args: Vec<Value>| arg_count_error(name, "exactly 2 arguments", args.len()))?;
        Ok((a, b))
    }

    /// Checks that one or two positional arguments were passed.
    pub fn get_one_two_args(self, name: &str) -> RunResult<(Value, Option<Value>)> {
        self.check_no_kwargs(name)?;
        let count = self.positional.len();
        let mut args = self.positional.into_iter();
        match (args.next(), args.next(), count) {
            (Some(a), None, 1) => Ok((a, None)),
            (Some(a), Some(b), 2) => Ok((a, Some(b))),
            (_, _, 0) => Err(arg_count_error(name, "at least 1 argument", 0)),
            _ => Err(arg_count_error(name, "at most 2 arguments", count)),
        }
    }

    /// Checks that between zero and `max` positional arguments were passed.
    pub fn get_up_to(self, name: &str, max: usize) -> RunResult<Vec<Value>> {
        self.check_no_kwargs(name)?;
        if self.positional.len() > max {
            return Err(arg_count_error(name, &format!("at most {max} arguments"), self.positional.len()));
        }
        Ok(self.positional)
    }

    /// Removes and returns a keyword argument, if present.
    pub fn take_keyword(&mut self, key: &str) -> Option<Value> {
        self.keywords.shift_remove(key)
    }
}

fn arg_count_error(name: &str, expected: &str, given: usize) -> Fault {
    Fault::type_mismatch(format!("{name}() takes {expected} ({given} given)"))
}
