use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::{
    exception::RunResult,
    value::{HashKey, Value},
};

/// A set of hashable values, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Set {
    items: IndexMap<HashKey, Value>,
}

impl Set {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> RunResult<Self> {
        let mut set = Self::new();
        for value in values {
            set.add(value)?;
        }
        Ok(set)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adds a value, returning false if an equal value was already present.
    pub fn add(&mut self, value: Value) -> RunResult<bool> {
        let hash_key = value.hash_key()?;
        if self.items.contains_key(&hash_key) {
            return Ok(false);
        }
        self.items.insert(hash_key, value);
        Ok(true)
    }

    pub fn contains(&self, value: &Value) -> RunResult<bool> {
        Ok(self.items.contains_key(&value.hash_key()?))
    }

    /// Removes a value, returning false if it was absent.
    pub fn remove(&mut self, value: &Value) -> RunResult<bool> {
        Ok(self.items.shift_remove(&value.hash_key()?).is_some())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.values()
    }

    fn contains_key(&self, key: &HashKey) -> bool {
        self.items.contains_key(key)
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut items = self.items.clone();
        for (key, value) in &other.items {
            items.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Self { items }
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.filtered(|key| other.contains_key(key))
    }

    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.filtered(|key| !other.contains_key(key))
    }

    #[must_use]
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let mut result = self.difference(other);
        for (key, value) in &other.items {
            if !self.contains_key(key) {
                result.items.insert(key.clone(), value.clone());
            }
        }
        result
    }

    fn filtered(&self, keep: impl Fn(&HashKey) -> bool) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|(key, _)| keep(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }

    fn is_subset(&self, other: &Self) -> bool {
        self.items.keys().all(|key| other.contains_key(key))
    }

    /// Python `==`: same members, order ignored.
    #[must_use]
    pub fn py_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_subset(other)
    }

    /// Subset ordering: `Less` for a proper subset, `None` when neither contains the other.
    #[must_use]
    pub fn subset_order(&self, other: &Self) -> Option<Ordering> {
        match (self.is_subset(other), other.is_subset(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}
