//! Archive-backed code source
//!
//! Reads entries from a zip archive. The entry index is built once when the
//! archive is opened; reads go through a mutex because the archive reader
//! needs exclusive access.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::loader::traits::ModuleSource;

/// Code source backed by a zip archive
pub struct ArchiveSource {
    path: PathBuf,
    entries: HashSet<String>,
    archive: Mutex<ZipArchive<File>>,
}

impl ArchiveSource {
    /// Open the archive at `path` and index its file entries
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| anyhow::anyhow!("Failed to open archive {:?}: {}", path, e))?;
        let archive = ZipArchive::new(file)
            .map_err(|e| anyhow::anyhow!("Failed to read archive {:?}: {}", path, e))?;
        let entries: HashSet<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        debug!("Indexed {} entries in archive {:?}", entries.len(), path);
        Ok(Self {
            path,
            entries,
            archive: Mutex::new(archive),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl ModuleSource for ArchiveSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn contains(&self, path: &str) -> bool {
        self.entries.contains(path)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        if !self.entries.contains(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()));
        }
        let mut archive = self.archive.lock();
        let entry = archive.by_name(path).map_err(io::Error::other)?;
        let declared = entry.size();
        read_entry(entry, declared)
    }
}

/// Upper bound on the buffer preallocated from an entry's declared size
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// Read an entry to the end
///
/// The declared size comes from the archive header and is only used as a
/// capped capacity hint.
fn read_entry<R: Read>(mut reader: R, declared: u64) -> io::Result<Vec<u8>> {
    let hint = usize::try_from(declared.min(MAX_PREALLOCATION)).unwrap_or(0);
    let mut bytes = Vec::with_capacity(hint);
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}
