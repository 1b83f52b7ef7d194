//! Tweaker trait and catalog
//!
//! A tweaker is a pre-launch configuration unit. It first extends the loader
//! (search path, transform chain, exclusions), then may rewrite the launch
//! arguments and queue further tweakers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::launch::blackboard::Blackboard;
use crate::launch::sequencer::{LaunchError, TweakStage};
use crate::loader::traits::into_cause;
use crate::loader::{ExclusionRegistry, Loader, SearchPath, TransformChain};

/// Handles a tweaker may use while injecting into the loader
pub struct TweakContext<'a> {
    loader: &'a Loader,
    blackboard: &'a Blackboard,
}

impl<'a> TweakContext<'a> {
    pub fn new(loader: &'a Loader, blackboard: &'a Blackboard) -> Self {
        Self { loader, blackboard }
    }

    pub fn loader(&self) -> &'a Loader {
        self.loader
    }

    pub fn search_path(&self) -> &'a SearchPath {
        self.loader.search_path()
    }

    pub fn transformers(&self) -> &'a TransformChain {
        self.loader.transformers()
    }

    pub fn exclusions(&self) -> &'a ExclusionRegistry {
        self.loader.exclusions()
    }

    pub fn blackboard(&self) -> &'a Blackboard {
        self.blackboard
    }
}

/// Entry module and arguments as seen by the next tweaker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchArguments {
    pub entry_module: Option<String>,
    pub args: Vec<String>,
}

/// Changes a tweaker requests after its injection step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgsMutation {
    /// Replacement entry module
    pub entry_module: Option<String>,
    /// Replacement argument list
    pub args: Option<Vec<String>>,
    /// Tweaker identifiers appended to the remaining queue
    pub extra_tweakers: Vec<String>,
}

impl ArgsMutation {
    /// No changes
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry_module = Some(entry.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_tweaker(mut self, id: impl Into<String>) -> Self {
        self.extra_tweakers.push(id.into());
        self
    }

    /// Apply to `current`, returning the tweakers to queue
    pub fn apply_to(self, current: &mut LaunchArguments) -> Vec<String> {
        if let Some(entry) = self.entry_module {
            current.entry_module = Some(entry);
        }
        if let Some(args) = self.args {
            current.args = args;
        }
        self.extra_tweakers
    }
}

/// Pre-launch configuration unit
///
/// Tweakers run one at a time on the launching thread, never concurrently.
pub trait Tweaker: Send {
    /// Tweaker identifier, used in logs and errors
    fn name(&self) -> &str;

    /// Register sources, transformers and exclusions
    fn inject_into_loader(&mut self, ctx: &TweakContext<'_>) -> anyhow::Result<()>;

    /// Rewrite the launch arguments
    fn mutate_args(&mut self, current: &LaunchArguments) -> anyhow::Result<ArgsMutation> {
        let _ = current;
        Ok(ArgsMutation::unchanged())
    }
}

/// Factory constructing a fresh tweaker
pub type TweakerFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn Tweaker>> + Send + Sync>;

/// Registry mapping tweaker identifiers to factories
#[derive(Clone, Default)]
pub struct TweakerCatalog {
    factories: HashMap<String, TweakerFactory>,
}

impl TweakerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `id`, replacing any previous one
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Tweaker>> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered identifiers in sorted order
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Construct the tweaker registered under `id`
    pub fn construct(&self, id: &str) -> Result<Box<dyn Tweaker>, LaunchError> {
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| LaunchError::UnknownTweaker(id.to_string()))?;
        factory().map_err(|e| LaunchError::TweakerFailure {
            tweaker: id.to_string(),
            stage: TweakStage::Construct,
            cause: into_cause(e),
        })
    }
}

impl std::fmt::Debug for TweakerCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TweakerCatalog")
            .field("ids", &self.ids())
            .finish()
    }
}
