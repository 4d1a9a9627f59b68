//! Name bindings handed to the code-execution capability.

use std::collections::{BTreeSet, HashMap};

use crate::Value;

/// A working copy of the session namespace.
///
/// Tracks which names were written or deleted so that only those are merged
/// back into the shared store.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    vars: HashMap<String, Value>,
    changed: BTreeSet<String>,
    removed: BTreeSet<String>,
}

/// Writes and deletions recorded on a [`Bindings`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub set: Vec<(String, Value)>,
    pub removed: Vec<String>,
}

impl Changes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }
}

impl Bindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Bind a name, recording the write.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.removed.remove(&name);
        self.changed.insert(name.clone());
        self.vars.insert(name, value);
    }

    /// Unbind a name, recording the deletion.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let old = self.vars.remove(name)?;
        self.changed.remove(name);
        self.removed.insert(name.to_string());
        Some(old)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Extract the recorded writes and deletions.
    #[must_use]
    pub fn into_changes(mut self) -> Changes {
        let set = self
            .changed
            .iter()
            .filter_map(|name| self.vars.remove(name).map(|v| (name.clone(), v)))
            .collect();
        Changes {
            set,
            removed: self.removed.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, Value)> for Bindings {
    /// Seed bindings without marking anything as changed.
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
            ..Self::default()
        }
    }
}
