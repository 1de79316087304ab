//! Variable bindings for a compile run.
//!
//! All values of a run live in one append-only stash. A [`Scope`] is only a
//! map from names to stash slots, so copying a scope is cheap: the copy sees
//! every binding of its parent, writes to those bindings land in the shared
//! slot, and names first declared in the copy stay invisible to the parent.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// Name to stash index.
pub type Pointers = HashMap<String, usize>;

#[derive(Debug, Clone)]
pub struct Scope {
    stash: Rc<RefCell<Vec<Value>>>,
    pointers: Pointers,
}

impl Scope {
    /// A root scope holding the given parameters.
    pub fn new<I, K>(parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut scope = Self::from_stash(Vec::new());
        for (name, value) in parameters {
            scope.set(&name.into(), value);
        }
        scope
    }

    /// A scope over a stash persisted from an earlier run. No names are
    /// visible until pointers are restored.
    pub fn from_stash(stash: Vec<Value>) -> Self {
        Self {
            stash: Rc::new(RefCell::new(stash)),
            pointers: Pointers::new(),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.pointers.contains_key(name)
    }

    /// The value bound to `name`, if the name is visible here.
    pub fn get(&self, name: &str) -> Option<Value> {
        let index = *self.pointers.get(name)?;
        self.stash.borrow().get(index).cloned()
    }

    /// Write through an existing binding, or declare `name` in this scope.
    pub fn set(&mut self, name: &str, value: Value) {
        let mut stash = self.stash.borrow_mut();
        match self.pointers.get(name) {
            Some(&index) => stash[index] = value,
            None => {
                stash.push(value);
                self.pointers.insert(name.to_string(), stash.len() - 1);
            }
        }
    }

    /// A child scope sharing this scope's stash and bindings.
    pub fn copy(&self) -> Scope {
        self.copy_with(self.pointers.clone())
    }

    /// A scope over the same stash with the given bindings.
    pub fn copy_with(&self, pointers: Pointers) -> Scope {
        Scope {
            stash: Rc::clone(&self.stash),
            pointers,
        }
    }

    pub fn pointers(&self) -> &Pointers {
        &self.pointers
    }

    pub fn set_pointers(&mut self, pointers: Pointers) {
        self.pointers = pointers;
    }

    /// Snapshot of every value in the run.
    pub fn stash(&self) -> Vec<Value> {
        self.stash.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get_var() {
        let scope = Scope::new([("x", Value::Number(42.0))]);
        assert!(scope.exists("x"));
        assert_eq!(scope.get("x"), Some(Value::Number(42.0)));
    }

    #[test]
    fn test_undefined_var() {
        let scope = Scope::new(Vec::<(String, Value)>::new());
        assert!(!scope.exists("x"));
        assert_eq!(scope.get("x"), None);
    }

    #[test]
    fn test_copy_writes_through_to_parent_binding() {
        let mut outer = Scope::new([("x", Value::Number(1.0))]);
        let mut inner = outer.copy();
        inner.set("x", Value::Number(2.0));
        assert_eq!(outer.get("x"), Some(Value::Number(2.0)));

        outer.set("x", Value::Number(3.0));
        assert_eq!(inner.get("x"), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_copy_declarations_do_not_leak() {
        let outer = Scope::new([("x", Value::Number(1.0))]);
        let mut inner = outer.copy();
        inner.set("y", Value::Number(2.0));
        assert!(inner.exists("y"));
        assert!(!outer.exists("y"));
    }

    #[test]
    fn test_restore_from_stash() {
        let mut scope = Scope::new([("x", Value::Number(1.0))]);
        scope.set("y", "kept".into());
        let pointers = scope.pointers().clone();
        let stash = scope.stash();

        let mut restored = Scope::from_stash(stash);
        assert!(!restored.exists("y"));
        restored.set_pointers(pointers);
        assert_eq!(restored.get("y"), Some("kept".into()));
    }
}
