//! launchwrap - launch bootstrap with a transforming module loader
//!
//! Intercepts module loading for a hosted runtime: every module requested by
//! name is located on an ordered search path, passed through a chain of byte
//! transformers and only then defined into the host. Before the entry module
//! is loaded, a tweak phase lets configured tweakers extend the search path,
//! register transformers and exclusions, and rewrite the launch arguments.
//!
//! ## Components
//!
//! 1. **Loader** (`loader`): search path, exclusion registry, transform chain
//!    and a single-flight module cache with negative caching
//! 2. **Launch sequence** (`launch`): tweak queue, blackboard, entry invocation
//! 3. **Configuration** (`config`): TOML/JSON files with environment overrides
//!
//! ## Design Principles
//!
//! 1. **Owned registries**: every loader owns its state; nothing is global
//! 2. **Fail fast**: a name that failed once is never retried
//! 3. **Frozen after tweaking**: transformers and exclusions are fixed once the
//!    entry module starts loading

pub mod config;
pub mod launch;
pub mod loader;
pub mod utils;

pub use config::{LaunchConfig, LaunchDefaults, LoaderConfig, LoggingConfig};
pub use launch::{
    ArgsMutation, LaunchArgs, LaunchError, LaunchPlan, LaunchRequest, LaunchSequencer, Tweaker,
    TweakerCatalog,
};
pub use loader::{
    DefinedModule, ExclusionMode, LoadError, Loader, ModuleHost, ModuleName, ModuleResolver,
    ModuleSource, NameMapper, RegistrationError, Transformer,
};
