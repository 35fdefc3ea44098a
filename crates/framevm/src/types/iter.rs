use std::{cell::RefCell, rc::Rc};

use crate::{
    exception::{Fault, RunResult},
    value::Value,
};

/// The state of an iteration, as produced by `GET_ITER` and the iterator builtins.
#[derive(Debug)]
pub enum ValueIter {
    Range { next: i64, stop: i64, step: i64 },
    /// Iterates a list by position, so items appended during the loop are visited.
    List { list: Rc<RefCell<Vec<Value>>>, index: usize },
    /// Iterates a fixed snapshot: tuple items, string characters, dict keys or set members.
    Items { items: Rc<[Value]>, index: usize },
    Enumerate { inner: Box<ValueIter>, count: i64 },
    Zip(Vec<ValueIter>),
    /// Advances an iterator value that other handles can also advance.
    Shared(Rc<RefCell<ValueIter>>),
}

impl ValueIter {
    /// Starts iterating a value, or reports it as not iterable.
    pub fn from_value(value: &Value) -> RunResult<Self> {
        Ok(match value {
            Value::Range(range) => Self::Range {
                next: range.start,
                stop: range.stop,
                step: range.step,
            },
            Value::List(list) => Self::List {
                list: Rc::clone(list),
                index: 0,
            },
            Value::Tuple(items) => Self::items(Rc::clone(items)),
            Value::Str(s) => Self::items(s.chars().map(|c| Value::from(c.to_string())).collect()),
            Value::Dict(dict) => Self::items(dict.borrow().keys().cloned().collect()),
            Value::Set(set) => Self::items(set.borrow().iter().cloned().collect()),
            Value::Iter(shared) => Self::Shared(Rc::clone(shared)),
            other => {
                return Err(Fault::type_mismatch(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        })
    }

    #[must_use]
    pub fn items(items: Rc<[Value]>) -> Self {
        Self::Items { items, index: 0 }
    }

    /// Advances the iteration, returning `None` once exhausted.
    #[expect(clippy::should_implement_trait, reason = "iteration is driven by FOR_ITER, not for loops")]
    pub fn next(&mut self) -> Option<Value> {
        match self {
            Self::Range { next, stop, step } => {
                let more = if *step > 0 { *next < *stop } else { *next > *stop };
                if !more {
                    return None;
                }
                let value = *next;
                *next = next.checked_add(*step).unwrap_or(*stop);
                Some(Value::Int(value))
            }
            Self::List { list, index } => {
                let item = list.borrow().get(*index).cloned()?;
                *index += 1;
                Some(item)
            }
            Self::Items { items, index } => {
                let item = items.get(*index).cloned()?;
                *index += 1;
                Some(item)
            }
            Self::Enumerate { inner, count } => {
                let item = inner.next()?;
                let pair = Value::tuple(vec![Value::Int(*count), item]);
                *count = count.saturating_add(1);
                Some(pair)
            }
            Self::Zip(iters) => {
                if iters.is_empty() {
                    return None;
                }
                let items = iters.iter_mut().map(Self::next).collect::<Option<Vec<_>>>()?;
                Some(Value::tuple(items))
            }
            Self::Shared(shared) => shared.borrow_mut().next(),
        }
    }
}
