//! Module names
//!
//! A module name is the universal key across the cache, the exclusion registry
//! and the search path. Names are stored dot-separated; slash-separated input
//! is normalised on construction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved device names that cannot be used as file names on Windows.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Normalised, immutable module name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    /// Create a module name, converting `/` separators to `.`
    pub fn new(name: impl AsRef<str>) -> Self {
        let normalized = name.as_ref().replace('/', ".");
        Self(normalized.trim_matches('.').to_string())
    }

    /// Dot-separated form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this name starts with `prefix` (compared in dot form)
    #[inline]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Path of this module inside a code source
    ///
    /// `a.b.C` with extension `bin` becomes `a/b/C.bin`. An empty extension
    /// yields the bare path.
    pub fn source_path(&self, extension: &str) -> String {
        let path = self.0.replace('.', "/");
        if extension.is_empty() {
            path
        } else {
            format!("{}.{}", path, extension.trim_start_matches('.'))
        }
    }

    /// Escaped alias for names that collide with reserved device names
    ///
    /// Only top-level names are affected; returns `None` otherwise.
    pub fn reserved_alias(&self) -> Option<ModuleName> {
        if self.0.contains('.') {
            return None;
        }
        let upper = self.0.to_uppercase();
        RESERVED_NAMES
            .iter()
            .any(|reserved| upper.starts_with(reserved))
            .then(|| ModuleName(format!("_{}", self.0)))
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ModuleName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&String> for ModuleName {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl From<ModuleName> for String {
    fn from(name: ModuleName) -> Self {
        name.0
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
