//! Search path
//!
//! Ordered, mutable list of code sources. Lookup scans sources in priority
//! order (insertion order) and takes the first one that contains the module.
//! The list stays mutable for the lifetime of the process; names that are
//! already cached are never re-resolved.

use parking_lot::RwLock;
use std::io;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::loader::name::ModuleName;
use crate::loader::traits::ModuleSource;

/// Raw bytes located on the search path
#[derive(Debug, Clone)]
pub struct Located {
    /// Untransformed bytes
    pub bytes: Vec<u8>,
    /// Description of the source that supplied them
    pub source: String,
}

/// Ordered collection of code sources
pub struct SearchPath {
    sources: RwLock<Vec<Arc<dyn ModuleSource>>>,
    extension: String,
    reserved_name_fallback: bool,
}

impl SearchPath {
    /// Create an empty search path for modules stored with `extension`
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            extension: extension.into(),
            reserved_name_fallback: true,
        }
    }

    /// Enable or disable the `_<name>` lookup for reserved device names
    pub fn with_reserved_name_fallback(mut self, enabled: bool) -> Self {
        self.reserved_name_fallback = enabled;
        self
    }

    /// Append a source; its priority is its position
    pub fn add_source(&self, source: Arc<dyn ModuleSource>) {
        debug!("Adding search path source {}", source.describe());
        self.sources.write().push(source);
    }

    /// Insert a source at `index`, clamped to the current length
    pub fn insert_source(&self, index: usize, source: Arc<dyn ModuleSource>) {
        let mut sources = self.sources.write();
        let index = index.min(sources.len());
        debug!(
            "Inserting search path source {} at position {}",
            source.describe(),
            index
        );
        sources.insert(index, source);
    }

    /// Source descriptions in priority order
    pub fn sources(&self) -> Vec<String> {
        self.sources.read().iter().map(|s| s.describe()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// Extension appended to source paths
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Locate the raw bytes of `name`
    pub fn locate(&self, name: &ModuleName) -> Option<Located> {
        if self.reserved_name_fallback {
            if let Some(alias) = name.reserved_alias() {
                if let Some(found) = self.scan(&alias) {
                    return Some(found);
                }
            }
        }
        self.scan(name)
    }

    fn scan(&self, name: &ModuleName) -> Option<Located> {
        let path = name.source_path(&self.extension);
        // Snapshot so sources can be appended while we read
        let sources: Vec<Arc<dyn ModuleSource>> = self.sources.read().clone();

        for source in &sources {
            if !source.contains(&path) {
                continue;
            }
            match source.read(&path) {
                Ok(bytes) => {
                    trace!("Loading {} from {}", name, source.describe());
                    return Some(Located {
                        bytes,
                        source: source.describe(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Problem reading {} from {}: {}", path, source.describe(), e);
                    continue;
                }
            }
        }

        trace!("Failed to find module resource {}", path);
        None
    }
}

impl std::fmt::Debug for SearchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchPath")
            .field("sources", &self.sources())
            .field("extension", &self.extension)
            .finish()
    }
}
