//! Code sources
//!
//! Directory, archive and in-memory implementations of [`ModuleSource`].

pub mod archive;
pub mod directory;
pub mod memory;

pub use archive::ArchiveSource;
pub use directory::DirectorySource;
pub use memory::MemorySource;

use std::path::Path;
use std::sync::Arc;

use crate::loader::traits::ModuleSource;

/// Open a source for `path`: directories as [`DirectorySource`], anything
/// else as an archive.
pub fn open_source<P: AsRef<Path>>(path: P) -> anyhow::Result<Arc<dyn ModuleSource>> {
    let path = path.as_ref();
    if path.is_dir() {
        Ok(Arc::new(DirectorySource::new(path)))
    } else {
        Ok(Arc::new(ArchiveSource::open(path)?))
    }
}
