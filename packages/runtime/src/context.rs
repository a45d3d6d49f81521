//! The execution context shared by a task and all of its descendants.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// A mutable, string-keyed map shared by every task in one process tree.
///
/// Cloning a `Context` clones the handle, not the map: a forked child writes
/// into the same map its parent reads. Writes are last-writer-wins.
#[derive(Clone, Default)]
pub struct Context {
    entries: Rc<RefCell<BTreeMap<String, Value>>>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding `entries`.
    pub fn from_map(entries: BTreeMap<String, Value>) -> Self {
        Self {
            entries: Rc::new(RefCell::new(entries)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.borrow_mut().insert(key.into(), value.into());
    }

    /// Shallow-merge `partial` into the context.
    pub fn merge(&self, partial: BTreeMap<String, Value>) {
        self.entries.borrow_mut().extend(partial);
    }

    /// Copy the whole context out as a map value.
    pub fn snapshot(&self) -> Value {
        Value::Map(self.entries.borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whether two handles share the same map.
    pub fn same_as(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }
}

impl From<BTreeMap<String, Value>> for Context {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::from_map(entries)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collection_literals::btree;

    #[test]
    fn clones_share_the_map() {
        let context = Context::new();
        let child = context.clone();
        child.set("user", "alice");

        assert_eq!(context.get("user"), Some(Value::from("alice")));
        assert!(context.same_as(&child));
        assert!(!context.same_as(&Context::new()));
    }

    #[test]
    fn merge_overwrites_existing_keys() {
        let context = Context::from_map(btree! {
            "a".to_string() => Value::from(1),
            "b".to_string() => Value::from(2),
        });
        context.merge(btree! { "b".to_string() => Value::from(3) });

        assert_eq!(context.len(), 2);
        assert_eq!(
            context.snapshot(),
            Value::Map(btree! {
                "a".to_string() => Value::from(1),
                "b".to_string() => Value::from(3),
            })
        );
    }
}
