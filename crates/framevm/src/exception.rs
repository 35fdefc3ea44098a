//! Faults raised while loading or executing code.
//!
//! Every fault is a hard stop: it aborts the frame that raised it and unwinds
//! through every enclosing frame until it reaches the [`VirtualMachine`](crate::VirtualMachine)
//! boundary. There is no in-VM exception handling.

use std::{borrow::Cow, fmt, rc::Rc};

use strum::IntoStaticStr;

use crate::resource::ResourceError;

/// Result type alias for operations that can fault during execution.
pub type RunResult<T> = Result<T, Fault>;

/// Reasons an argument binding can fail.
///
/// The variants are mutually exclusive; the binder reports the first rule
/// that applies, in the order the rules are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum BindError {
    /// A positional-only parameter was supplied by keyword.
    PositionalOnlyPassedAsKeyword,
    /// More positional arguments than positional parameters and no `*args`.
    TooManyPositionalArguments,
    /// A parameter received a value both positionally and by keyword.
    MultipleValuesForArgument,
    /// A positional parameter has neither an argument nor a default.
    MissingPositionalArguments,
    /// A keyword-only parameter has neither an argument nor a default.
    MissingKeywordOnlyArguments,
    /// Keyword arguments were left over and there is no `**kwargs`.
    TooManyKeywordArguments,
}

impl BindError {
    /// Human-readable description of the failure.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::PositionalOnlyPassedAsKeyword => "Positional-only argument passed as keyword argument",
            Self::TooManyPositionalArguments => "Too many positional arguments",
            Self::MultipleValuesForArgument => "Multiple values for arguments",
            Self::MissingPositionalArguments => "Missing positional arguments",
            Self::MissingKeywordOnlyArguments => "Missing keyword-only arguments",
            Self::TooManyKeywordArguments => "Too many keyword arguments",
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for BindError {}

/// A non-recoverable execution error.
///
/// The variant name doubles as the fault kind reported by the CLI
/// (via `Into<&'static str>`).
#[derive(Debug, Clone, IntoStaticStr)]
pub enum Fault {
    /// An implicit or explicit name lookup failed in every scope it consults.
    NameNotDefined(Rc<str>),
    /// Unknown arithmetic/comparison sub-code, or an operation the VM does not implement.
    UnsupportedOperation(Cow<'static, str>),
    /// Calling a function failed to bind its arguments.
    Binding { function: Rc<str>, error: BindError },
    /// An operand had the wrong type, e.g. a conditional jump tested a non-bool.
    TypeMismatch(Cow<'static, str>),
    /// Internal invariant violation: operand stack underflow or a bad jump target.
    ///
    /// Indicates malformed code rather than a user error.
    StackFault(Cow<'static, str>),
    /// Division by zero or integer overflow.
    Arithmetic(Cow<'static, str>),
    /// Index out of range or missing mapping key.
    Lookup(Cow<'static, str>),
    /// A value of the right type but an unusable content, e.g. `int("abc")`.
    InvalidValue(Cow<'static, str>),
    /// A host-configured resource limit was exceeded.
    Resource(ResourceError),
}

impl Fault {
    pub(crate) fn name_not_defined(name: &str) -> Self {
        Self::NameNotDefined(Rc::from(name))
    }

    pub(crate) fn unsupported(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    pub(crate) fn type_mismatch(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    pub(crate) fn stack(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::StackFault(msg.into())
    }

    pub(crate) fn arithmetic(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Arithmetic(msg.into())
    }

    pub(crate) fn lookup(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Lookup(msg.into())
    }

    pub(crate) fn invalid_value(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub(crate) fn zero_division() -> Self {
        Self::arithmetic("division by zero")
    }

    pub(crate) fn overflow() -> Self {
        Self::arithmetic("integer result out of range")
    }

    /// Returns the fault kind, e.g. `"TypeMismatch"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameNotDefined(name) => write!(f, "NameNotDefined: name '{name}' is not defined"),
            Self::Binding { function, error } => write!(f, "BindingError: {function}(): {error}"),
            Self::Resource(err) => write!(f, "Resource: {err}"),
            Self::UnsupportedOperation(msg)
            | Self::TypeMismatch(msg)
            | Self::StackFault(msg)
            | Self::Arithmetic(msg)
            | Self::Lookup(msg)
            | Self::InvalidValue(msg) => write!(f, "{}: {msg}", self.kind()),
        }
    }
}

impl std::error::Error for Fault {}

impl From<ResourceError> for Fault {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

/// Error produced while loading or validating a [`Code`](crate::Code).
#[derive(Debug)]
pub enum LoadError {
    /// The JSON form could not be decoded (this includes unknown opcode names).
    Json(serde_json::Error),
    /// The binary form could not be decoded.
    Binary(postcard::Error),
    /// The code decoded but is structurally invalid.
    Invalid { code: Rc<str>, reason: String },
}

impl LoadError {
    pub(crate) fn invalid(code: &Rc<str>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            code: Rc::clone(code),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid code json: {err}"),
            Self::Binary(err) => write!(f, "invalid code binary: {err}"),
            Self::Invalid { code, reason } => write!(f, "invalid code object '{code}': {reason}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<postcard::Error> for LoadError {
    fn from(err: postcard::Error) -> Self {
        Self::Binary(err)
    }
}
