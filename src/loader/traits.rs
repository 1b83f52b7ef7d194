//! Loader traits and interfaces
//!
//! Defines the collaborator traits the loader talks to (transformers, code
//! sources, the host runtime, parent resolvers), the defined-module handle and
//! the loader error types.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::loader::loader::Loader;
use crate::loader::name::ModuleName;

/// Shared, cloneable error cause
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Opaque handle a host attaches to a defined module
pub type HostHandle = Arc<dyn Any + Send + Sync>;

/// Convert an `anyhow` error into a shareable cause
pub(crate) fn into_cause(err: anyhow::Error) -> Cause {
    let boxed: Box<dyn StdError + Send + Sync + 'static> = err.into();
    Arc::from(boxed)
}

/// How a module came to be defined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Loaded from a search path source and passed through the transform chain
    Transformed {
        /// Description of the source that supplied the raw bytes
        source: String,
    },
    /// Loaded from a search path source without transformation, never cached
    Reloaded {
        /// Description of the source that supplied the raw bytes
        source: String,
    },
    /// Defined by a parent resolver
    Delegated,
}

static NEXT_DEFINITION_ID: AtomicU64 = AtomicU64::new(1);

/// A module that has been defined into the running process
pub struct DefinedModule {
    name: ModuleName,
    bytes: Arc<[u8]>,
    origin: ModuleOrigin,
    definition_id: u64,
    handle: Option<HostHandle>,
}

impl DefinedModule {
    /// Create a defined module record
    ///
    /// Every call gets a fresh definition id, so two records for the same name
    /// are distinguishable.
    pub fn new(
        name: ModuleName,
        bytes: impl Into<Arc<[u8]>>,
        origin: ModuleOrigin,
        handle: Option<HostHandle>,
    ) -> Self {
        Self {
            name,
            bytes: bytes.into(),
            origin,
            definition_id: NEXT_DEFINITION_ID.fetch_add(1, Ordering::Relaxed),
            handle,
        }
    }

    /// Module name
    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    /// Bytes the module was defined from (post-transform)
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// How this module was defined
    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    /// Process-unique id of this definition
    pub fn definition_id(&self) -> u64 {
        self.definition_id
    }

    /// Host handle, if the host attached one
    pub fn handle(&self) -> Option<&HostHandle> {
        self.handle.as_ref()
    }

    /// Host handle downcast to a concrete type
    pub fn handle_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.handle.as_ref().and_then(|h| h.downcast_ref::<T>())
    }
}

impl fmt::Debug for DefinedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinedModule")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .field("origin", &self.origin)
            .field("definition_id", &self.definition_id)
            .finish()
    }
}

/// A single transformation pass over a module's bytes
///
/// Transformers are called for every module that reaches the transform chain
/// and must return the input unchanged for names they do not handle.
pub trait Transformer: Send + Sync {
    /// Identity reported in failures and dumps
    fn name(&self) -> &str;

    /// Transform `input` for module `module`
    fn transform(&self, module: &ModuleName, input: Vec<u8>) -> anyhow::Result<Vec<u8>>;
}

/// Maps requested module names onto the names modules are stored and
/// defined under
///
/// Both directions must return `requested` unchanged for names the mapper
/// does not know.
pub trait NameMapper: Send + Sync {
    /// Identity reported in logs and registration errors
    fn name(&self) -> &str;

    /// Name the module is transformed, defined and cached under
    fn map_name(&self, requested: &ModuleName) -> ModuleName;

    /// Name the module's raw bytes are stored under in code sources
    fn unmap_name(&self, requested: &ModuleName) -> ModuleName;
}

/// A code source consulted by the search path
///
/// Paths are relative, `/`-separated source paths as produced by
/// [`ModuleName::source_path`].
pub trait ModuleSource: Send + Sync {
    /// Human readable location, e.g. a directory or archive path
    fn describe(&self) -> String;

    /// Whether this source holds an entry at `path`
    fn contains(&self, path: &str) -> bool;

    /// Read the entry at `path`; `io::ErrorKind::NotFound` when absent
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// The host runtime modules are defined into
pub trait ModuleHost: Send + Sync {
    /// Define `bytes` under `name`
    ///
    /// Definition may call back into `loader.resolve` for the dependencies the
    /// module references, from this thread or others.
    fn define(&self, loader: &Loader, name: &ModuleName, bytes: &[u8])
        -> anyhow::Result<Option<HostHandle>>;

    /// Invoke the designated entry operation of `module`
    fn invoke_entry(&self, module: &DefinedModule, args: &[String]) -> anyhow::Result<()>;
}

/// Anything that can resolve a module name to a defined module
///
/// Implemented by [`Loader`]; used for parent delegation.
pub trait ModuleResolver: Send + Sync {
    /// Resolve `name` to a defined module
    fn resolve_module(&self, name: &ModuleName) -> Result<Arc<DefinedModule>, LoadError>;
}

/// Module resolution errors
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("Module not found: {0}")]
    ModuleNotFound(ModuleName),

    #[error("Transformer {transformer} failed on module {module}: {cause}")]
    TransformFailure {
        module: ModuleName,
        transformer: String,
        #[source]
        cause: Cause,
    },

    #[error("Failed to define module {module}: {cause}")]
    DefinitionFailed {
        module: ModuleName,
        #[source]
        cause: Cause,
    },

    #[error("Cyclic resolution of {module}: {}", format_chain(.chain))]
    CyclicResolution {
        module: ModuleName,
        chain: Vec<ModuleName>,
    },
}

impl LoadError {
    /// Name of the module the error is about
    pub fn module(&self) -> &ModuleName {
        match self {
            LoadError::ModuleNotFound(module)
            | LoadError::TransformFailure { module, .. }
            | LoadError::DefinitionFailed { module, .. }
            | LoadError::CyclicResolution { module, .. } => module,
        }
    }

    /// Whether this is a plain not-found
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::ModuleNotFound(_))
    }
}

fn format_chain(chain: &[ModuleName]) -> String {
    chain
        .iter()
        .map(ModuleName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Registration attempted after the loader was frozen
#[derive(Debug, Clone, Error)]
pub enum RegistrationError {
    #[error("Cannot register {what} after the loader was frozen")]
    Frozen { what: String },

    #[error("Cannot install name mapper {what}: {existing} is already installed")]
    MapperInstalled { what: String, existing: String },
}
