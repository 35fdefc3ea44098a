use std::fmt;

use crate::{
    exception::{Fault, RunResult},
    value::Value,
};

/// A slice object, as built by `BUILD_SLICE`. Bounds are integers or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl Slice {
    /// Builds a slice from `None` or integer bound values.
    pub fn from_values(start: &Value, stop: &Value, step: &Value) -> RunResult<Self> {
        Ok(Self {
            start: bound(start)?,
            stop: bound(stop)?,
            step: bound(step)?,
        })
    }

    /// Clamps the slice to a sequence of `len` items, returning `(start, stop, step)`
    /// the way Python's `slice.indices()` does.
    pub fn indices(&self, len: usize) -> RunResult<(i64, i64, i64)> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(Fault::invalid_value("slice step cannot be zero"));
        }
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
        let clamp = |bound: Option<i64>, default: i64| match bound {
            None => default,
            Some(value) if value < 0 => value.saturating_add(len).max(lower),
            Some(value) => value.min(upper),
        };
        let start = clamp(self.start, if step < 0 { upper } else { lower });
        let stop = clamp(self.stop, if step < 0 { lower } else { upper });
        Ok((start, stop, step))
    }

    /// Positions selected by the slice within a sequence of `len` items, in slice order.
    pub fn positions(&self, len: usize) -> RunResult<Vec<usize>> {
        let (start, stop, step) = self.indices(len)?;
        let mut positions = Vec::new();
        let mut index = start;
        while (step > 0 && index < stop) || (step < 0 && index > stop) {
            positions.push(index as usize);
            match index.checked_add(step) {
                Some(next) => index = next,
                None => break,
            }
        }
        Ok(positions)
    }
}

fn bound(value: &Value) -> RunResult<Option<i64>> {
    match value {
        Value::None => Ok(None),
        other => other
            .as_int()
            .map(Some)
            .ok_or_else(|| Fault::type_mismatch(format!("slice indices must be integers or None, not '{}'", other.type_name()))),
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |bound: Option<i64>| bound.map_or_else(|| "None".to_owned(), |value| value.to_string());
        write!(f, "slice({}, {}, {})", show(self.start), show(self.stop), show(self.step))
    }
}
