//! Directory-backed code source

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::loader::traits::ModuleSource;

/// Code source rooted at a directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` under the root, refusing anything that escapes it
    fn entry_path(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl ModuleSource for DirectorySource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn contains(&self, path: &str) -> bool {
        self.entry_path(path).map_or(false, |p| p.is_file())
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let full = self.entry_path(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("invalid entry path {}", path))
        })?;
        fs::read(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_nested_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app/core")).unwrap();
        fs::write(dir.path().join("app/core/Main.bin"), b"main").unwrap();

        let source = DirectorySource::new(dir.path());
        assert!(source.contains("app/core/Main.bin"));
        assert!(!source.contains("app/core/Other.bin"));
        assert_eq!(source.read("app/core/Main.bin").unwrap(), b"main");
        assert_eq!(
            source.read("app/core/Other.bin").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path().join("inner"));
        assert!(!source.contains("../secret.bin"));
        assert!(source.read("/etc/passwd").is_err());
    }

    #[test]
    fn test_directories_are_not_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app")).unwrap();
        let source = DirectorySource::new(dir.path());
        assert!(!source.contains("app"));
    }
}
