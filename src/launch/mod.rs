//! Launch sequence
//!
//! Runs the tweak phase (tweakers extend the loader and rewrite launch
//! arguments), freezes the loader and invokes the entry module.

pub mod args;
pub mod blackboard;
pub mod sequencer;
pub mod tweaker;

pub use args::LaunchArgs;
pub use blackboard::Blackboard;
pub use sequencer::{LaunchError, LaunchPlan, LaunchRequest, LaunchSequencer, TweakStage};
pub use tweaker::{ArgsMutation, LaunchArguments, TweakContext, Tweaker, TweakerCatalog, TweakerFactory};
