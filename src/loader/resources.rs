//! Resource cache
//!
//! Remembers what the search path returned for each source name, including
//! misses. A miss is never rescanned until it is cleared with
//! [`ResourceCache::clear_negative_entries`], typically after a source that
//! may hold it has been added.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::trace;

use crate::loader::name::ModuleName;
use crate::loader::search_path::{Located, SearchPath};

/// Located bytes and misses, keyed by source name
#[derive(Debug, Default)]
pub struct ResourceCache {
    found: RwLock<HashMap<ModuleName, Located>>,
    missing: RwLock<HashSet<ModuleName>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached lookup of `name` on `search_path`
    pub fn locate(&self, name: &ModuleName, search_path: &SearchPath) -> Option<Located> {
        if let Some(found) = self.found.read().get(name) {
            return Some(found.clone());
        }
        if self.missing.read().contains(name) {
            trace!("Resource {} is cached as missing", name);
            return None;
        }

        match search_path.locate(name) {
            Some(found) => {
                self.found.write().insert(name.clone(), found.clone());
                Some(found)
            }
            None => {
                self.missing.write().insert(name.clone());
                None
            }
        }
    }

    /// Forget cached misses for `names` so the next lookup rescans
    pub fn clear_negative_entries<I>(&self, names: I)
    where
        I: IntoIterator<Item = ModuleName>,
    {
        let mut missing = self.missing.write();
        for name in names {
            missing.remove(&name);
        }
    }

    /// Whether a lookup of `name` is cached as a miss
    pub fn is_missing(&self, name: &ModuleName) -> bool {
        self.missing.read().contains(name)
    }
}
