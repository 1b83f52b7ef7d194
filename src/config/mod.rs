//! Configuration management for launchwrap
//!
//! Handles configuration loading and validation for the loader, the launch
//! defaults and logging.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::env::{env_bool, env_opt};

/// Environment variable overriding [`LoaderConfig::dump_dir`]
pub const ENV_DUMP_DIR: &str = "LAUNCHWRAP_DUMP_DIR";
/// Environment variable overriding [`LoaderConfig::dump_stages`]
pub const ENV_DUMP_STAGES: &str = "LAUNCHWRAP_DUMP_STAGES";
/// Environment variable overriding [`LoaderConfig::dump_changed_only`]
pub const ENV_DUMP_CHANGED_ONLY: &str = "LAUNCHWRAP_DUMP_CHANGED_ONLY";

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Extension of module entries inside code sources
    #[serde(default = "default_module_extension")]
    pub module_extension: String,

    /// Prefixes resolved by the parent resolver, never transformed
    #[serde(default = "default_delegate_prefixes")]
    pub delegate_prefixes: Vec<String>,

    /// Prefixes loaded untransformed and uncached on every request
    #[serde(default)]
    pub reload_prefixes: Vec<String>,

    /// Directory transformed modules are dumped to (disabled when unset)
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,

    /// Also dump the input and every intermediate transform stage
    #[serde(default)]
    pub dump_stages: bool,

    /// Only dump modules the transform chain actually changed
    #[serde(default)]
    pub dump_changed_only: bool,

    /// Offer names this loader cannot resolve to its child resolvers
    #[serde(default)]
    pub child_fallback: bool,

    /// Look up `_<name>` first for names colliding with reserved device names
    #[serde(default = "default_true")]
    pub reserved_name_fallback: bool,
}

fn default_true() -> bool {
    true
}

fn default_module_extension() -> String {
    "bin".to_string()
}

fn default_delegate_prefixes() -> Vec<String> {
    ["std.", "core.", "alloc.", "launchwrap."]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            module_extension: default_module_extension(),
            delegate_prefixes: default_delegate_prefixes(),
            reload_prefixes: Vec::new(),
            dump_dir: None,
            dump_stages: false,
            dump_changed_only: false,
            child_fallback: false,
            reserved_name_fallback: true,
        }
    }
}

/// Launch defaults, merged with environment and command line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchDefaults {
    /// Entry module name
    #[serde(default)]
    pub entry_module: Option<String>,

    /// Tweaker identifiers, applied in order
    #[serde(default)]
    pub tweakers: Vec<String>,

    /// Extra search path sources (directories or archives)
    #[serde(default)]
    pub sources: Vec<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter, e.g. "info" or "launchwrap::loader=debug"
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchConfig {
    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub launch: LaunchDefaults,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl LaunchConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: LaunchConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: LaunchConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON {:?}", path))?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load by extension (`.json` as JSON, anything else as TOML), apply
    /// environment overrides and validate.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path)?,
            _ => Self::from_toml_file(path)?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_opt(ENV_DUMP_DIR).filter(|d| !d.is_empty()) {
            self.loader.dump_dir = Some(PathBuf::from(dir));
        }
        if env_opt(ENV_DUMP_STAGES).is_some() {
            self.loader.dump_stages = env_bool(ENV_DUMP_STAGES);
        }
        if env_opt(ENV_DUMP_CHANGED_ONLY).is_some() {
            self.loader.dump_changed_only = env_bool(ENV_DUMP_CHANGED_ONLY);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.loader.validate()?;

        if let Some(entry) = &self.launch.entry_module {
            if entry.trim().is_empty() {
                return Err(anyhow::anyhow!("entry_module must not be empty when set"));
            }
        }

        if self.launch.tweakers.iter().any(|t| t.trim().is_empty()) {
            return Err(anyhow::anyhow!("tweaker identifiers must not be empty"));
        }

        Ok(())
    }
}

impl LoaderConfig {
    /// Validate loader configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.module_extension.contains('/') || self.module_extension.contains('\\') {
            return Err(anyhow::anyhow!(
                "module_extension must not contain path separators: {}",
                self.module_extension
            ));
        }

        // An empty prefix would match every module
        for prefix in self.delegate_prefixes.iter().chain(&self.reload_prefixes) {
            if prefix.is_empty() {
                return Err(anyhow::anyhow!("exclusion prefixes must not be empty"));
            }
        }

        Ok(())
    }
}
