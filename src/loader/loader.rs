//! Loader implementation
//!
//! Resolves module names to defined modules: consults the cache and the
//! exclusion registry, locates raw bytes on the search path, runs the
//! transform chain and defines the result into the host. Names this loader
//! cannot resolve may be offered to child resolvers.

use parking_lot::RwLock;
use std::cell::RefCell;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::loader::cache::{Claim, ModuleCache};
use crate::loader::dump::TransformDump;
use crate::loader::exclusion::{ExclusionMode, ExclusionRegistry};
use crate::loader::name::ModuleName;
use crate::loader::resources::ResourceCache;
use crate::loader::search_path::SearchPath;
use crate::loader::source::open_source;
use crate::loader::transform::{StageObserver, TransformChain};
use crate::loader::traits::{
    into_cause, DefinedModule, LoadError, ModuleHost, ModuleOrigin, ModuleResolver, NameMapper,
    RegistrationError, Transformer,
};

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Resolutions in progress on this thread, as (loader id, name)
    static ACTIVE: RefCell<Vec<(u64, ModuleName)>> = RefCell::new(Vec::new());
}

/// Marks a resolution as in progress on the current thread
struct ActiveResolution;

impl ActiveResolution {
    fn enter(loader: u64, name: &ModuleName) -> Result<Self, LoadError> {
        if let Some(chain) = active_chain(loader, name) {
            return Err(LoadError::CyclicResolution {
                module: name.clone(),
                chain,
            });
        }
        ACTIVE.with(|stack| stack.borrow_mut().push((loader, name.clone())));
        Ok(Self)
    }
}

impl Drop for ActiveResolution {
    fn drop(&mut self) {
        ACTIVE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Chain `name -> ... -> name` if `name` is already being resolved by this
/// loader on the current thread.
fn active_chain(loader: u64, name: &ModuleName) -> Option<Vec<ModuleName>> {
    ACTIVE.with(|stack| {
        let stack = stack.borrow();
        let start = stack
            .iter()
            .position(|(id, active)| *id == loader && active == name)?;
        let mut chain: Vec<ModuleName> = stack[start..]
            .iter()
            .filter(|(id, _)| *id == loader)
            .map(|(_, active)| active.clone())
            .collect();
        chain.push(name.clone());
        Some(chain)
    })
}

/// Transforming module loader
pub struct Loader {
    id: u64,
    search_path: SearchPath,
    transformers: TransformChain,
    exclusions: ExclusionRegistry,
    cache: ModuleCache,
    resources: ResourceCache,
    host: Arc<dyn ModuleHost>,
    parent: Option<Arc<dyn ModuleResolver>>,
    children: RwLock<Vec<Arc<dyn ModuleResolver>>>,
    child_fallback: bool,
    dump: Option<TransformDump>,
}

impl Loader {
    /// Create a loader with default configuration
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self::with_config(&LoaderConfig::default(), host)
    }

    /// Create a loader from configuration
    ///
    /// Installs the configured delegate prefixes, then the reload prefixes,
    /// before anything else can register rules.
    pub fn with_config(config: &LoaderConfig, host: Arc<dyn ModuleHost>) -> Self {
        let exclusions = ExclusionRegistry::new();
        for prefix in &config.delegate_prefixes {
            // A fresh registry is never frozen
            let _ = exclusions.add_rule(prefix, ExclusionMode::Delegate);
        }
        for prefix in &config.reload_prefixes {
            let _ = exclusions.add_rule(prefix, ExclusionMode::ReloadPerInstance);
        }

        Self {
            id: NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed),
            search_path: SearchPath::new(config.module_extension.clone())
                .with_reserved_name_fallback(config.reserved_name_fallback),
            transformers: TransformChain::new(),
            exclusions,
            cache: ModuleCache::new(),
            resources: ResourceCache::new(),
            host,
            parent: None,
            children: RwLock::new(Vec::new()),
            child_fallback: config.child_fallback,
            dump: config.dump_dir.as_ref().and_then(TransformDump::create).map(|dump| {
                dump.with_stages(config.dump_stages)
                    .with_changed_only(config.dump_changed_only)
            }),
        }
    }

    /// Set the resolver that delegated names are sent to
    pub fn with_parent(mut self, parent: Arc<dyn ModuleResolver>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Add a resolver offered the names this loader fails to resolve
    ///
    /// Children are only consulted when child fallback is enabled in the
    /// loader configuration, in the order they were added.
    pub fn add_child(&self, child: Arc<dyn ModuleResolver>) {
        if !self.child_fallback {
            warn!("Child resolver added to loader {} with child fallback disabled", self.id);
        }
        self.children.write().push(child);
    }

    /// Process-unique loader id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    pub fn transformers(&self) -> &TransformChain {
        &self.transformers
    }

    pub fn exclusions(&self) -> &ExclusionRegistry {
        &self.exclusions
    }

    pub fn host(&self) -> &Arc<dyn ModuleHost> {
        &self.host
    }

    /// Directory transform stages are dumped to, if enabled
    pub fn dump_dir(&self) -> Option<&Path> {
        self.dump.as_ref().map(TransformDump::root)
    }

    /// Open `path` as a code source and append it to the search path
    pub fn add_source_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.search_path.add_source(open_source(path)?);
        Ok(())
    }

    /// Close transformer and exclusion registration
    pub fn freeze(&self) {
        self.transformers.freeze();
        self.exclusions.freeze();
        info!(
            "Loader {} frozen with {} transformers and {} exclusion rules",
            self.id,
            self.transformers.len(),
            self.exclusions.rules().len()
        );
    }

    pub fn is_frozen(&self) -> bool {
        self.transformers.is_frozen()
    }

    /// Install the name mapper through the loader handle
    pub fn set_name_mapper(&self, mapper: Arc<dyn NameMapper>) -> Result<(), RegistrationError> {
        self.transformers.set_name_mapper(mapper)
    }

    /// Register a transformer through the loader handle
    pub fn register_transformer(
        &self,
        transformer: Arc<dyn Transformer>,
    ) -> Result<(), RegistrationError> {
        self.transformers.register(transformer)
    }

    /// Module already defined by this loader
    pub fn cached(&self, name: impl Into<ModuleName>) -> Option<Arc<DefinedModule>> {
        self.cache.get(&name.into())
    }

    /// Whether `name` failed before and will fail fast
    pub fn is_invalid(&self, name: impl Into<ModuleName>) -> bool {
        self.cache.is_invalid(&name.into())
    }

    /// Number of modules defined and cached by this loader
    pub fn defined_count(&self) -> usize {
        self.cache.defined_count()
    }

    /// Untransformed bytes stored under `name`, without defining anything
    pub fn raw_bytes(&self, name: impl Into<ModuleName>) -> Option<Vec<u8>> {
        self.resources
            .locate(&name.into(), &self.search_path)
            .map(|found| found.bytes)
    }

    /// Forget cached search path misses for `names`
    ///
    /// Names already marked invalid by a failed resolution stay invalid.
    pub fn clear_negative_entries<I>(&self, names: I)
    where
        I: IntoIterator,
        I::Item: Into<ModuleName>,
    {
        self.resources
            .clear_negative_entries(names.into_iter().map(Into::into));
    }

    /// Resolve `name` to a defined module
    ///
    /// Blocks until the resolution completes. Concurrent resolutions of one
    /// name run the pipeline once; every caller gets the same outcome.
    pub fn resolve(&self, name: impl Into<ModuleName>) -> Result<Arc<DefinedModule>, LoadError> {
        let name = name.into();
        if name.as_str().is_empty() {
            return Err(LoadError::ModuleNotFound(name));
        }

        if self.cache.is_invalid(&name) {
            debug!("Module {} is cached as invalid", name);
            return Err(LoadError::ModuleNotFound(name));
        }
        if let Some(module) = self.cache.get(&name) {
            return Ok(module);
        }

        match self.exclusions.classify(&name) {
            Some(ExclusionMode::Delegate) => return self.delegate(&name),
            Some(ExclusionMode::ReloadPerInstance) => return self.reload(&name),
            None => {}
        }

        let defined = self.transformers.mapped_name(&name);
        let guard = match self.cache.claim(&defined) {
            Ok(Claim::Ready(module)) => return Ok(module),
            Ok(Claim::Invalid) => return Err(LoadError::ModuleNotFound(name)),
            Ok(Claim::Owner(guard)) => guard,
            Err(LoadError::CyclicResolution { module, chain }) => {
                let chain = active_chain(self.id, &module).unwrap_or(chain);
                return Err(LoadError::CyclicResolution { module, chain });
            }
            Err(e) => return Err(e),
        };

        let outcome = match self.load_transformed(&name, &defined) {
            Err(e) if self.child_fallback && !matches!(e, LoadError::CyclicResolution { .. }) => {
                self.from_children(&defined).ok_or(e)
            }
            outcome => outcome,
        };
        if let Err(e) = &outcome {
            debug!("Resolution of {} failed, marking invalid: {}", defined, e);
        }
        guard.complete(outcome)
    }

    fn from_children(&self, name: &ModuleName) -> Option<Arc<DefinedModule>> {
        // Snapshot so children can be added while one of them resolves
        let children: Vec<Arc<dyn ModuleResolver>> = self.children.read().clone();
        for child in &children {
            match child.resolve_module(name) {
                Ok(module) => {
                    debug!("Resolved {} through a child resolver", name);
                    return Some(module);
                }
                Err(e) => debug!("Child resolver could not resolve {}: {}", name, e),
            }
        }
        None
    }

    fn delegate(&self, name: &ModuleName) -> Result<Arc<DefinedModule>, LoadError> {
        debug!("Delegating {} to parent resolver", name);
        match &self.parent {
            Some(parent) => parent.resolve_module(name),
            None => Err(LoadError::ModuleNotFound(name.clone())),
        }
    }

    fn reload(&self, name: &ModuleName) -> Result<Arc<DefinedModule>, LoadError> {
        let _active = ActiveResolution::enter(self.id, name)?;
        debug!("Reloading {} without transformation", name);
        let located = self
            .search_path
            .locate(name)
            .ok_or_else(|| LoadError::ModuleNotFound(name.clone()))?;
        self.define(
            name,
            located.bytes,
            ModuleOrigin::Reloaded {
                source: located.source,
            },
        )
    }

    /// Normal path: `requested` is located under its unmapped name, then
    /// transformed and defined as `name`
    fn load_transformed(
        &self,
        requested: &ModuleName,
        name: &ModuleName,
    ) -> Result<Arc<DefinedModule>, LoadError> {
        let _active = ActiveResolution::enter(self.id, name)?;
        let stored = self.transformers.unmapped_name(requested);
        let located = self
            .resources
            .locate(&stored, &self.search_path)
            .ok_or_else(|| LoadError::ModuleNotFound(name.clone()))?;

        let bytes = match &self.dump {
            Some(dump) => {
                let extension = self.search_path.extension();
                let mut session = dump.session(name, extension, self.transformers.len());
                let bytes = self.transformers.apply_observed(
                    name,
                    located.bytes,
                    Some(&mut session as &mut dyn StageObserver),
                )?;
                session.finish(&bytes);
                bytes
            }
            None => self.transformers.apply(name, located.bytes)?,
        };

        self.define(
            name,
            bytes,
            ModuleOrigin::Transformed {
                source: located.source,
            },
        )
    }

    fn define(
        &self,
        name: &ModuleName,
        bytes: Vec<u8>,
        origin: ModuleOrigin,
    ) -> Result<Arc<DefinedModule>, LoadError> {
        let handle = self
            .host
            .define(self, name, &bytes)
            .map_err(|e| LoadError::DefinitionFailed {
                module: name.clone(),
                cause: into_cause(e),
            })?;
        debug!("Defined {} ({} bytes)", name, bytes.len());
        Ok(Arc::new(DefinedModule::new(name.clone(), bytes, origin, handle)))
    }
}

impl ModuleResolver for Loader {
    fn resolve_module(&self, name: &ModuleName) -> Result<Arc<DefinedModule>, LoadError> {
        self.resolve(name.clone())
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("id", &self.id)
            .field("search_path", &self.search_path)
            .field("transformers", &self.transformers.names())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
