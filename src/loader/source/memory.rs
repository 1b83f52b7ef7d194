//! In-memory code source

use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;

use crate::loader::traits::ModuleSource;

/// Code source holding entries in memory
///
/// Useful for embedding generated modules and for tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    label: String,
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Builder-style insert
    pub fn with_entry(self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.write().insert(path.into(), bytes.into());
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ModuleSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory:{}", self.label)
    }

    fn contains(&self, path: &str) -> bool {
        self.entries.read().contains_key(path)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.entries
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }
}
