//! Container and helper types backing the [`Value`](crate::Value) variants.

mod dict;
mod iter;
mod method;
mod range;
mod set;
mod slice;

pub use dict::Dict;
pub use iter::ValueIter;
pub use method::{BoundMethod, MethodKind};
pub use range::Range;
pub use set::Set;
pub use slice::Slice;

pub(crate) use method::{dict_from_value, normalize_index, set_from_value, sort_values};
