//! Command-line surface
//!
//! Parses launcher flags and merges them with configuration defaults and the
//! environment into a [`LaunchRequest`]. [`LaunchArgs::run`] drives a whole
//! launch from parsed flags.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::LaunchConfig;
use crate::launch::sequencer::{LaunchError, LaunchPlan, LaunchRequest, LaunchSequencer};
use crate::launch::tweaker::TweakerCatalog;
use crate::loader::{Loader, ModuleHost};
use crate::utils::env::{env_list, env_opt, env_paths};
use crate::utils::logging::init_logging_from_config;

/// Environment variable naming the entry module
pub const ENV_ENTRY: &str = "LAUNCHWRAP_ENTRY";
/// Comma-separated tweaker identifiers
pub const ENV_TWEAKERS: &str = "LAUNCHWRAP_TWEAKERS";
/// Path list of extra code sources
pub const ENV_SOURCES: &str = "LAUNCHWRAP_SOURCES";

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "launchwrap", about = "Launch an entry module through a transforming loader")]
pub struct LaunchArgs {
    /// Entry module name
    #[arg(long = "entry", value_name = "MODULE")]
    pub entry: Option<String>,

    /// Tweaker to apply (repeatable, applied in order)
    #[arg(long = "tweak", value_name = "ID")]
    pub tweakers: Vec<String>,

    /// Extra code source, a directory or archive (repeatable)
    #[arg(long = "source", value_name = "PATH")]
    pub sources: Vec<PathBuf>,

    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,

    /// Arguments passed to the entry module
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub passthrough: Vec<String>,
}

impl LaunchArgs {
    /// Load the configuration named by `--config`, or defaults
    pub fn load_config(&self) -> anyhow::Result<LaunchConfig> {
        match &self.config {
            Some(path) => LaunchConfig::load(path),
            None => {
                let mut config = LaunchConfig::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration, initialise logging, then run the tweak phase and
    /// the entry module on a fresh loader over `host`
    ///
    /// `--log-filter` replaces the configured filter. Returns the plan the
    /// entry module was launched with.
    pub fn run(
        self,
        catalog: TweakerCatalog,
        host: Arc<dyn ModuleHost>,
    ) -> Result<LaunchPlan, LaunchError> {
        let config = self
            .load_config()
            .map_err(|e| LaunchError::Config(format!("{:#}", e)))?;

        let mut logging = config.logging.clone().unwrap_or_default();
        if let Some(filter) = &self.log_filter {
            logging.filter = Some(filter.clone());
        }
        init_logging_from_config(Some(&logging));

        let loader = Arc::new(Loader::with_config(&config.loader, host));
        let sequencer = LaunchSequencer::new(loader, catalog);
        let request = self.into_request(&config);
        info!(
            "Launching with {} tweakers and {} extra sources",
            request.tweakers.len(),
            request.extra_sources.len()
        );

        let plan = sequencer.prepare(request)?;
        sequencer.launch(&plan)?;
        Ok(plan)
    }

    /// Merge config, environment and flags
    ///
    /// Tweakers and sources accumulate in that order. The entry module from
    /// the flag wins over the environment, which wins over the config.
    pub fn into_request(self, config: &LaunchConfig) -> LaunchRequest {
        let entry_module = self
            .entry
            .or_else(|| env_opt(ENV_ENTRY).filter(|e| !e.is_empty()))
            .or_else(|| config.launch.entry_module.clone());

        let mut tweakers = config.launch.tweakers.clone();
        tweakers.extend(env_list(ENV_TWEAKERS));
        tweakers.extend(self.tweakers);

        let mut extra_sources = config.launch.sources.clone();
        extra_sources.extend(env_paths(ENV_SOURCES));
        extra_sources.extend(self.sources);

        LaunchRequest {
            entry_module,
            tweakers,
            extra_sources,
            passthrough_args: self.passthrough,
        }
    }
}
