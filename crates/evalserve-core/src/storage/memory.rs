//! In-memory session store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;

use crate::{
    Bindings, Changes, Value,
    traits::{StoreError, VariableStore},
};

/// In-memory store implementation.
///
/// A single lock guards the whole namespace. Data is lost on restart.
pub struct MemoryStore {
    vars: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vars: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VariableStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .vars
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(name)
            .cloned())
    }

    async fn set(&self, name: &str, value: Value) -> Result<(), StoreError> {
        self.vars
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(name.to_string(), value);

        Ok(())
    }

    async fn snapshot(&self) -> Result<Bindings, StoreError> {
        let vars = self
            .vars
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        Ok(vars
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }

    async fn apply(&self, changes: Changes) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut vars = self
            .vars
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        for name in &changes.removed {
            vars.remove(name);
        }
        for (name, value) in changes.set {
            vars.insert(name, value);
        }

        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .vars
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::new();
        store.set("x", Value::Int(1)).await.unwrap();
        store.set("x", "two".into()).await.unwrap();
        assert_eq!(store.get("x").await.unwrap(), Some(Value::from("two")));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_names_are_case_sensitive() {
        let store = MemoryStore::new();
        store.set("X", Value::Int(1)).await.unwrap();
        assert_eq!(store.get("x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_snapshot_and_apply() {
        let store = MemoryStore::new();
        store.set("a", Value::Int(1)).await.unwrap();
        store.set("b", Value::Int(2)).await.unwrap();

        let mut bindings = store.snapshot().await.unwrap();
        bindings.set("c", Value::Int(3));
        bindings.remove("a");

        // A write that lands between snapshot and apply is kept.
        store.set("b", Value::Int(20)).await.unwrap();
        store.apply(bindings.into_changes()).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), Some(Value::Int(20)));
        assert_eq!(store.get("c").await.unwrap(), Some(Value::Int(3)));
    }

    #[tokio::test]
    async fn test_concurrent_distinct_writers() {
        let store = Arc::new(MemoryStore::new());
        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    for round in 0..10 {
                        store
                            .set(&format!("v{i}"), Value::Int(i * 100 + round))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        futures::future::join_all(tasks).await;

        assert_eq!(store.len().await.unwrap(), 32);
        for i in 0..32 {
            assert_eq!(
                store.get(&format!("v{i}")).await.unwrap(),
                Some(Value::Int(i * 100 + 9))
            );
        }
    }
}
