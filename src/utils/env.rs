//! Environment variable utilities
//!
//! Provides helpers for reading optional, boolean and list-valued
//! environment variables.

use std::path::PathBuf;

/// Get environment variable as Option
///
/// Returns `Some(value)` if set, `None` if not set.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get environment variable as boolean
///
/// Returns `true` if value is "true", "1", "yes", "on" (case-insensitive).
/// Returns `false` otherwise or if not set.
pub fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(false)
}

/// Get environment variable as a comma-separated list
///
/// Entries are trimmed and empty entries dropped. Unset gives an empty list.
pub fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Get environment variable as a platform path list (`:` or `;` separated)
pub fn env_paths(key: &str) -> Vec<PathBuf> {
    std::env::var_os(key)
        .map(|v| {
            std::env::split_paths(&v)
                .filter(|p| !p.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_bool() {
        std::env::set_var("LAUNCHWRAP_TEST_BOOL", "Yes");
        assert!(env_bool("LAUNCHWRAP_TEST_BOOL"));
        std::env::set_var("LAUNCHWRAP_TEST_BOOL", "0");
        assert!(!env_bool("LAUNCHWRAP_TEST_BOOL"));
        std::env::remove_var("LAUNCHWRAP_TEST_BOOL");
        assert!(!env_bool("LAUNCHWRAP_TEST_BOOL"));
    }

    #[test]
    #[serial]
    fn test_env_list_trims_and_drops_empty() {
        std::env::set_var("LAUNCHWRAP_TEST_LIST", " coremod, ,mixins ,");
        assert_eq!(env_list("LAUNCHWRAP_TEST_LIST"), vec!["coremod", "mixins"]);
        std::env::remove_var("LAUNCHWRAP_TEST_LIST");
        assert!(env_list("LAUNCHWRAP_TEST_LIST").is_empty());
    }

    #[test]
    #[serial]
    fn test_env_paths() {
        let joined = std::env::join_paths(["/opt/mods", "/opt/libs.zip"]).unwrap();
        std::env::set_var("LAUNCHWRAP_TEST_PATHS", &joined);
        assert_eq!(
            env_paths("LAUNCHWRAP_TEST_PATHS"),
            vec![PathBuf::from("/opt/mods"), PathBuf::from("/opt/libs.zip")]
        );
        std::env::remove_var("LAUNCHWRAP_TEST_PATHS");
        assert!(env_paths("LAUNCHWRAP_TEST_PATHS").is_empty());
    }
}
