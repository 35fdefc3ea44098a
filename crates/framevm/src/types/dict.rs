use std::rc::Rc;

use indexmap::{IndexMap, map::Entry};

use crate::{
    exception::RunResult,
    value::{HashKey, Value},
};

/// An insertion-ordered mapping.
///
/// Entries keep the key value they were first inserted with; re-assigning an
/// equal key (`d[1.0] = x` after `d[1] = y`) only replaces the value.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: IndexMap<HashKey, (Value, Value)>,
}

impl Dict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Builds a dict from key/value pairs; later duplicates overwrite earlier values.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> RunResult<Self> {
        let mut dict = Self::new();
        for (key, value) in pairs {
            dict.insert(key, value)?;
        }
        Ok(dict)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> RunResult<Option<Value>> {
        let hash_key = key.hash_key()?;
        Ok(self.entries.get(&hash_key).map(|(_, value)| value.clone()))
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.entries
            .get(&HashKey::Str(Rc::from(key)))
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &Value) -> RunResult<bool> {
        Ok(self.entries.contains_key(&key.hash_key()?))
    }

    /// Inserts or replaces a value, returning the previous value for an equal key.
    pub fn insert(&mut self, key: Value, value: Value) -> RunResult<Option<Value>> {
        let hash_key = key.hash_key()?;
        Ok(self.insert_hashed(hash_key, key, value))
    }

    /// Inserts with a string key, which is always hashable.
    pub fn insert_str(&mut self, key: Rc<str>, value: Value) -> Option<Value> {
        self.insert_hashed(HashKey::Str(Rc::clone(&key)), Value::Str(key), value)
    }

    fn insert_hashed(&mut self, hash_key: HashKey, key: Value, value: Value) -> Option<Value> {
        match self.entries.entry(hash_key) {
            Entry::Occupied(mut entry) => Some(std::mem::replace(&mut entry.get_mut().1, value)),
            Entry::Vacant(entry) => {
                entry.insert((key, value));
                None
            }
        }
    }

    /// Removes a key, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &Value) -> RunResult<Option<Value>> {
        let hash_key = key.hash_key()?;
        Ok(self.entries.shift_remove(&hash_key).map(|(_, value)| value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(key, value)| (key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|(_, value)| value)
    }

    /// Copies every entry of `other` into `self`.
    pub fn update(&mut self, other: &Self) {
        for (hash_key, (key, value)) in &other.entries {
            self.insert_hashed(hash_key.clone(), key.clone(), value.clone());
        }
    }

    /// Python `==`: same keys mapping to equal values, order ignored.
    #[must_use]
    pub fn py_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.entries.iter().all(|(hash_key, (_, value))| {
                other
                    .entries
                    .get(hash_key)
                    .is_some_and(|(_, other_value)| value.py_eq(other_value))
            })
    }
}
