//! Transforming module loader
//!
//! Resolves module names to defined modules through an ordered search path,
//! an exclusion registry and a transform chain.
//!
//! ## Resolution
//!
//! - **Negative cache**: names that failed once fail fast forever after, and
//!   search path misses are not rescanned until cleared
//! - **Exclusions**: `delegate` names go to the parent resolver, `reload-per-instance`
//!   names are read from the search path and defined untransformed, uncached
//! - **Single flight**: concurrent requests for one name run the pipeline once
//! - **Cycle detection**: a resolution that would wait on itself fails instead of hanging
//! - **Name mapping**: an optional mapper renames modules between storage and definition
//! - **Child fallback**: failed names may be offered to child resolvers

pub mod cache;
pub mod dump;
pub mod exclusion;
#[allow(clippy::module_inception)]
pub mod loader;
pub mod name;
pub mod resources;
pub mod search_path;
pub mod source;
pub mod traits;
pub mod transform;

pub use exclusion::{ExclusionMode, ExclusionRegistry, ExclusionRule};
pub use loader::Loader;
pub use name::ModuleName;
pub use resources::ResourceCache;
pub use search_path::{Located, SearchPath};
pub use source::{open_source, ArchiveSource, DirectorySource, MemorySource};
pub use traits::{
    DefinedModule, HostHandle, LoadError, ModuleHost, ModuleOrigin, ModuleResolver,
    ModuleSource, NameMapper, RegistrationError, Transformer,
};
pub use transform::{StageObserver, TransformChain};
