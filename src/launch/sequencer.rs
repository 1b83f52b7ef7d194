//! Tweak phase and launch sequencer
//!
//! Drains the tweaker queue in order, letting each tweaker extend the loader
//! and rewrite the launch arguments, freezes the loader, then resolves the
//! entry module and hands control to it.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::launch::blackboard::Blackboard;
use crate::launch::tweaker::{LaunchArguments, TweakContext, TweakerCatalog};
use crate::loader::traits::{into_cause, Cause};
use crate::loader::{LoadError, Loader, ModuleName, RegistrationError};

/// Step of a tweaker that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweakStage {
    Construct,
    Inject,
    MutateArgs,
}

impl fmt::Display for TweakStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TweakStage::Construct => write!(f, "construction"),
            TweakStage::Inject => write!(f, "loader injection"),
            TweakStage::MutateArgs => write!(f, "argument mutation"),
        }
    }
}

/// Launch errors
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Unknown tweaker: {0}")]
    UnknownTweaker(String),

    #[error("Tweaker {tweaker} failed during {stage}: {cause}")]
    TweakerFailure {
        tweaker: String,
        stage: TweakStage,
        #[source]
        cause: Cause,
    },

    #[error("No entry module was configured")]
    MissingEntryModule,

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Entry module {module} failed: {cause}")]
    EntryFailed {
        module: ModuleName,
        #[source]
        cause: Cause,
    },

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Post-parse launch request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest {
    pub entry_module: Option<String>,
    pub tweakers: Vec<String>,
    pub extra_sources: Vec<PathBuf>,
    pub passthrough_args: Vec<String>,
}

/// Outcome of the tweak phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub entry_module: ModuleName,
    pub args: Vec<String>,
    /// Tweakers that ran, in order
    pub applied_tweakers: Vec<String>,
}

/// Runs the tweak phase and launches the entry module
pub struct LaunchSequencer {
    loader: Arc<Loader>,
    catalog: TweakerCatalog,
    blackboard: Arc<Blackboard>,
}

impl LaunchSequencer {
    pub fn new(loader: Arc<Loader>, catalog: TweakerCatalog) -> Self {
        Self {
            loader,
            catalog,
            blackboard: Arc::new(Blackboard::new()),
        }
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    pub fn blackboard(&self) -> &Arc<Blackboard> {
        &self.blackboard
    }

    /// Run the tweak phase
    ///
    /// Extra sources are appended first. Tweakers run strictly in queue
    /// order; tweakers queued by a mutation are appended to the remaining
    /// queue. Any tweaker error aborts before a single module is loaded.
    /// On success the loader is frozen, so a loader runs one tweak phase.
    pub fn prepare(&self, request: LaunchRequest) -> Result<LaunchPlan, LaunchError> {
        if self.loader.is_frozen() {
            return Err(RegistrationError::Frozen {
                what: "tweakers".to_string(),
            }
            .into());
        }

        for source in &request.extra_sources {
            self.loader.add_source_path(source).map_err(|e| {
                LaunchError::Config(format!("cannot open source {:?}: {:#}", source, e))
            })?;
        }

        let mut current = LaunchArguments {
            entry_module: request.entry_module,
            args: request.passthrough_args,
        };
        let mut queue = request.tweakers;
        let mut visited = HashSet::new();
        let mut applied = Vec::new();
        let ctx = TweakContext::new(&self.loader, &self.blackboard);

        let mut index = 0;
        while index < queue.len() {
            let id = queue[index].clone();
            index += 1;

            if !visited.insert(id.clone()) {
                warn!("Tweaker {} has already been visited, skipping", id);
                continue;
            }

            info!("Loading tweaker {}", id);
            let mut tweaker = self.catalog.construct(&id)?;
            tweaker
                .inject_into_loader(&ctx)
                .map_err(|e| tweak_failure(&id, TweakStage::Inject, e))?;
            let mutation = tweaker
                .mutate_args(&current)
                .map_err(|e| tweak_failure(&id, TweakStage::MutateArgs, e))?;

            let queued = mutation.apply_to(&mut current);
            if !queued.is_empty() {
                info!("Tweaker {} queued {:?}", id, queued);
                queue.extend(queued);
            }
            applied.push(id);
        }

        self.loader.freeze();

        let entry_module = current
            .entry_module
            .filter(|entry| !entry.trim().is_empty())
            .ok_or(LaunchError::MissingEntryModule)?;

        Ok(LaunchPlan {
            entry_module: ModuleName::new(entry_module),
            args: current.args,
            applied_tweakers: applied,
        })
    }

    /// Resolve the entry module and invoke its entry operation
    pub fn launch(&self, plan: &LaunchPlan) -> Result<(), LaunchError> {
        info!("Launching {}", plan.entry_module);
        let module = self.loader.resolve(plan.entry_module.clone()).map_err(|e| {
            error!("Unable to resolve entry module {}: {}", plan.entry_module, e);
            LaunchError::Load(e)
        })?;

        self.loader
            .host()
            .invoke_entry(&module, &plan.args)
            .map_err(|e| LaunchError::EntryFailed {
                module: plan.entry_module.clone(),
                cause: into_cause(e),
            })
    }

    /// Prepare then launch
    pub fn run(&self, request: LaunchRequest) -> Result<(), LaunchError> {
        let plan = self.prepare(request).map_err(|e| {
            error!("Tweak phase failed: {}", e);
            e
        })?;
        self.launch(&plan)
    }
}

fn tweak_failure(id: &str, stage: TweakStage, e: anyhow::Error) -> LaunchError {
    LaunchError::TweakerFailure {
        tweaker: id.to_string(),
        stage,
        cause: into_cause(e),
    }
}

impl fmt::Debug for LaunchSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchSequencer")
            .field("loader", &self.loader)
            .field("catalog", &self.catalog)
            .finish()
    }
}
