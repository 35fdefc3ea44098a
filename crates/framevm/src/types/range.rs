use crate::exception::{Fault, RunResult};

/// An arithmetic progression, as produced by `range()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    /// Creates a range; a zero step is rejected.
    pub fn new(start: i64, stop: i64, step: i64) -> RunResult<Self> {
        if step == 0 {
            return Err(Fault::invalid_value("range() arg 3 must not be zero"));
        }
        Ok(Self { start, stop, step })
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        let (start, stop, step) = (i128::from(self.start), i128::from(self.stop), i128::from(self.step));
        let len = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / -step + 1
        } else {
            0
        };
        usize::try_from(len).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at a non-negative position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let value = i128::from(self.start) + index as i128 * i128::from(self.step);
        i64::try_from(value).ok()
    }

    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            self.start <= value && value < self.stop
        } else {
            self.stop < value && value <= self.start
        };
        in_bounds && (i128::from(value) - i128::from(self.start)) % i128::from(self.step) == 0
    }

    /// Python equality compares the produced sequences, not the parameters.
    #[must_use]
    pub fn same_sequence(&self, other: &Self) -> bool {
        let len = self.len();
        if len != other.len() {
            return false;
        }
        match len {
            0 => true,
            1 => self.start == other.start,
            _ => self.start == other.start && self.step == other.step,
        }
    }
}
