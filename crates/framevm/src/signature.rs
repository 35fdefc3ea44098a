//! Function signature representation and argument binding.
//!
//! A signature is derived from a code object's parameter layout. Binding maps
//! a call's positional and keyword arguments onto parameter names, applying
//! defaults and collecting extras into `*args` / `**kwargs`.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{args::ArgValues, exception::BindError, function::Defaults, types::Dict, value::Value};

/// The parameter structure of a code object.
///
/// Parameters occupy the front of the code object's `varnames` in the order
/// ```text
/// [posonly][positional-or-keyword][keyword-only][*args?][**kwargs?]
/// ```
/// Default values are not part of the signature: they live on the
/// [`Function`](crate::Function) and can be replaced after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    /// Positional-only parameters, e.g. `a, b` in `def f(a, b, /): ...`
    posonly: Vec<Rc<str>>,
    /// Positional-or-keyword parameters.
    positional: Vec<Rc<str>>,
    /// Keyword-only parameters, e.g. `c` in `def f(*, c): ...`
    kwonly: Vec<Rc<str>>,
    /// Variable positional parameter name, e.g. `args` in `def f(*args): ...`
    var_args: Option<Rc<str>>,
    /// Variable keyword parameter name, e.g. `kwargs` in `def f(**kwargs): ...`
    var_kwargs: Option<Rc<str>>,
    bind_mode: BindMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum BindMode {
    /// Only positional-or-keyword parameters.
    ///
    /// Calls passing exactly one positional argument per parameter and no
    /// keywords bind with a straight zip.
    #[default]
    Simple,
    Complex,
}

/// Output of a successful bind: parameter name to value, in parameter order.
pub type Bound = IndexMap<Rc<str>, Value>;

impl Signature {
    /// Derives a signature from a code object's parameter layout.
    ///
    /// Counts that overrun `varnames` are clamped; [`Code::validate`](crate::Code::validate)
    /// reports such layouts as invalid.
    #[must_use]
    pub fn from_layout(
        varnames: &[Rc<str>],
        posonly_count: usize,
        arg_count: usize,
        kwonly_count: usize,
        has_varargs: bool,
        has_varkwargs: bool,
    ) -> Self {
        let mut names = varnames.iter().cloned();
        let posonly: Vec<_> = names.by_ref().take(posonly_count.min(arg_count)).collect();
        let positional: Vec<_> = names.by_ref().take(arg_count.saturating_sub(posonly_count)).collect();
        let kwonly: Vec<_> = names.by_ref().take(kwonly_count).collect();
        let var_args = if has_varargs { names.next() } else { None };
        let var_kwargs = if has_varkwargs { names.next() } else { None };

        let bind_mode = if posonly.is_empty() && kwonly.is_empty() && var_args.is_none() && var_kwargs.is_none() {
            BindMode::Simple
        } else {
            BindMode::Complex
        };
        Self {
            posonly,
            positional,
            kwonly,
            var_args,
            var_kwargs,
            bind_mode,
        }
    }

    /// Number of parameters that accept positional arguments.
    #[must_use]
    pub fn positional_count(&self) -> usize {
        self.posonly.len() + self.positional.len()
    }

    #[must_use]
    pub fn posonly(&self) -> &[Rc<str>] {
        &self.posonly
    }

    #[must_use]
    pub fn kwonly(&self) -> &[Rc<str>] {
        &self.kwonly
    }

    #[must_use]
    pub fn var_args(&self) -> Option<&Rc<str>> {
        self.var_args.as_ref()
    }

    #[must_use]
    pub fn var_kwargs(&self) -> Option<&Rc<str>> {
        self.var_kwargs.as_ref()
    }

    fn positional_names(&self) -> impl Iterator<Item = &Rc<str>> {
        self.posonly.iter().chain(&self.positional)
    }

    /// Binds call arguments to parameter names.
    ///
    /// Rules are applied in a fixed order and the first failing rule decides the error:
    ///
    /// 1. without `**kwargs`, a keyword naming a positional-only parameter is rejected
    /// 2. without `*args`, surplus positional arguments are rejected
    /// 3. positional arguments fill positional parameters left to right, extras go to `*args`
    /// 4. keywords fill positional-or-keyword parameters; a parameter already bound positionally is an error
    /// 5. keywords fill keyword-only parameters
    /// 6. unbound parameters take their defaults, or the bind fails as missing
    /// 7. leftover keywords go to `**kwargs`, or the bind fails
    ///
    /// `*args` and `**kwargs` are always bound, to an empty tuple / dict when nothing was collected.
    ///
    /// With `**kwargs` present, a keyword naming a positional-only parameter that was
    /// already filled positionally is still rejected as `PositionalOnlyPassedAsKeyword`.
    pub fn bind(&self, args: ArgValues, defaults: &Defaults) -> Result<Bound, BindError> {
        let ArgValues { positional, mut keywords } = args;

        if self.bind_mode == BindMode::Simple && keywords.is_empty() && positional.len() == self.positional.len() {
            return Ok(self.positional.iter().cloned().zip(positional).collect());
        }

        // 1.
        if self.var_kwargs.is_none() && self.posonly.iter().any(|name| keywords.contains_key(name)) {
            return Err(BindError::PositionalOnlyPassedAsKeyword);
        }

        // 2.
        let positional_count = self.positional_count();
        if self.var_args.is_none() && positional.len() > positional_count {
            return Err(BindError::TooManyPositionalArguments);
        }

        // 3.
        let filled = positional.len().min(positional_count);
        let mut positional = positional.into_iter();
        let mut slots: Vec<Option<Value>> = positional.by_ref().take(filled).map(Some).collect();
        slots.resize(positional_count, None);
        let extra: Vec<Value> = positional.collect();

        if self.posonly[..filled.min(self.posonly.len())]
            .iter()
            .any(|name| keywords.contains_key(name))
        {
            return Err(BindError::PositionalOnlyPassedAsKeyword);
        }

        // 4.
        for (index, name) in self.positional.iter().enumerate() {
            let slot = &mut slots[self.posonly.len() + index];
            if let Some(value) = keywords.shift_remove(name) {
                if slot.is_some() {
                    return Err(BindError::MultipleValuesForArgument);
                }
                *slot = Some(value);
            }
        }

        // 5.
        let mut kwonly_slots: Vec<Option<Value>> =
            self.kwonly.iter().map(|name| keywords.shift_remove(name)).collect();

        // 6.
        let first_default = positional_count.saturating_sub(defaults.positional.len());
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                if index < first_default {
                    return Err(BindError::MissingPositionalArguments);
                }
                *slot = Some(defaults.positional[index - first_default].clone());
            }
        }
        for (name, slot) in self.kwonly.iter().zip(&mut kwonly_slots) {
            if slot.is_none() {
                match defaults.keyword.get(name) {
                    Some(value) => *slot = Some(value.clone()),
                    None => return Err(BindError::MissingKeywordOnlyArguments),
                }
            }
        }

        // 7.
        if self.var_kwargs.is_none() && !keywords.is_empty() {
            return Err(BindError::TooManyKeywordArguments);
        }

        let mut bound = Bound::with_capacity(positional_count + self.kwonly.len() + 2);
        for (name, slot) in self.positional_names().zip(slots) {
            if let Some(value) = slot {
                bound.insert(Rc::clone(name), value);
            }
        }
        for (name, slot) in self.kwonly.iter().zip(kwonly_slots) {
            if let Some(value) = slot {
                bound.insert(Rc::clone(name), value);
            }
        }
        if let Some(name) = &self.var_args {
            bound.insert(Rc::clone(name), Value::tuple(extra));
        }
        if let Some(name) = &self.var_kwargs {
            let mut dict = Dict::new();
            for (key, value) in keywords {
                dict.insert_str(key, value);
            }
            bound.insert(Rc::clone(name), Value::dict(dict));
        }
        Ok(bound)
    }
}
