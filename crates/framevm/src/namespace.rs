use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::value::Value;

/// A shared, mutable name-to-value scope.
///
/// Cloning a `Namespace` clones the handle, not the contents: both handles see
/// the same mapping. Module-level frames use one handle as both their local
/// and global scope; every frame descending from one run shares the global handle.
#[derive(Clone, Default)]
pub struct Namespace(Rc<RefCell<IndexMap<Rc<str>, Value>>>);

impl Namespace {
    /// Creates a fresh, empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    pub fn set(&self, name: impl Into<Rc<str>>, value: Value) {
        self.0.borrow_mut().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.0.borrow_mut().shift_remove(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Unbinds every name. The removed values are dropped after the scope is released.
    pub fn clear(&self) {
        let bindings = std::mem::take(&mut *self.0.borrow_mut());
        drop(bindings);
    }

    /// Names currently bound, in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<Rc<str>> {
        self.0.borrow().keys().cloned().collect()
    }

    /// A new, independent scope holding the same bindings as this one.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self(Rc::new(RefCell::new(self.0.borrow().clone())))
    }

    /// Returns true if both handles refer to the same scope.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Copies the bindings out of the scope.
    #[must_use]
    pub fn to_map(&self) -> IndexMap<Rc<str>, Value> {
        self.0.borrow().clone()
    }
}

impl From<IndexMap<Rc<str>, Value>> for Namespace {
    fn from(map: IndexMap<Rc<str>, Value>) -> Self {
        Self(Rc::new(RefCell::new(map)))
    }
}

impl<K: Into<Rc<str>>> FromIterator<(K, Value)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(|(k, v)| (k.into(), v)).collect::<IndexMap<_, _>>())
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // values can refer back to this scope through captured functions, so only names are shown
        f.debug_set().entries(self.0.borrow().keys()).finish()
    }
}
