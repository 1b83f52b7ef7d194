//! Launch blackboard
//!
//! Key/value store shared by every tweaker of one launch. Tweakers use it to
//! hand data to tweakers that run after them.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Blackboard {
    entries: RwLock<HashMap<String, Value>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, returning the previous value
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.write().insert(key.into(), value)
    }

    /// Serialize and store `value` under `key`
    pub fn put<T: Serialize>(&self, key: impl Into<String>, value: &T) -> anyhow::Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    /// Fetch and deserialize the value under `key`
    ///
    /// Returns `Ok(None)` when the key is absent and an error when the stored
    /// value does not have the requested shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_returns_previous() {
        let board = Blackboard::new();
        assert!(board.set("profile", json!("dev")).is_none());
        assert_eq!(board.set("profile", json!("prod")), Some(json!("dev")));
        assert_eq!(board.get("profile"), Some(json!("prod")));
    }

    #[test]
    fn test_typed_access() {
        let board = Blackboard::new();
        board.put("mixins", &vec!["a.json", "b.json"]).unwrap();

        let mixins: Vec<String> = board.get_as("mixins").unwrap().unwrap();
        assert_eq!(mixins, vec!["a.json", "b.json"]);
        assert!(board.get_as::<u32>("mixins").is_err());
        assert!(board.get_as::<u32>("absent").unwrap().is_none());
        assert_eq!(board.keys(), vec!["mixins"]);
    }
}
