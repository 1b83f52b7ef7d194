//! Transform chain
//!
//! Ordered sequence of transformers applied to a module's raw bytes. Later
//! transformers observe the output of earlier ones; nothing is ever removed.
//! The chain also carries the optional name mapper, installed once.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::loader::name::ModuleName;
use crate::loader::traits::{into_cause, LoadError, NameMapper, RegistrationError, Transformer};

/// Observer of intermediate transform output
///
/// Called once with stage 0 for the input and once per transformer after it
/// has run, with the 1-based position of that transformer.
pub trait StageObserver {
    fn observe(&mut self, stage: usize, transformer: Option<&str>, bytes: &[u8]);
}

impl<F> StageObserver for F
where
    F: FnMut(usize, Option<&str>, &[u8]),
{
    fn observe(&mut self, stage: usize, transformer: Option<&str>, bytes: &[u8]) {
        self(stage, transformer, bytes)
    }
}

/// Ordered transformer pipeline
#[derive(Default)]
pub struct TransformChain {
    transformers: RwLock<Vec<Arc<dyn Transformer>>>,
    mapper: RwLock<Option<Arc<dyn NameMapper>>>,
    frozen: AtomicBool,
}

impl TransformChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transformer
    pub fn register(&self, transformer: Arc<dyn Transformer>) -> Result<(), RegistrationError> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(RegistrationError::Frozen {
                what: format!("transformer {}", transformer.name()),
            });
        }
        debug!("Registered transformer {}", transformer.name());
        self.transformers.write().push(transformer);
        Ok(())
    }

    /// Install the name mapper; only one may be installed
    pub fn set_name_mapper(&self, mapper: Arc<dyn NameMapper>) -> Result<(), RegistrationError> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(RegistrationError::Frozen {
                what: format!("name mapper {}", mapper.name()),
            });
        }
        let mut slot = self.mapper.write();
        if let Some(existing) = slot.as_ref() {
            return Err(RegistrationError::MapperInstalled {
                what: mapper.name().to_string(),
                existing: existing.name().to_string(),
            });
        }
        info!("Installed name mapper {}", mapper.name());
        *slot = Some(mapper);
        Ok(())
    }

    /// Name `requested` is defined and cached under
    pub fn mapped_name(&self, requested: &ModuleName) -> ModuleName {
        match self.mapper.read().as_ref() {
            Some(mapper) => mapper.map_name(requested),
            None => requested.clone(),
        }
    }

    /// Name the raw bytes of `requested` are stored under
    pub fn unmapped_name(&self, requested: &ModuleName) -> ModuleName {
        match self.mapper.read().as_ref() {
            Some(mapper) => mapper.unmap_name(requested),
            None => requested.clone(),
        }
    }

    /// Names of registered transformers in order
    pub fn names(&self) -> Vec<String> {
        self.transformers
            .read()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transformers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.read().is_empty()
    }

    /// Reject further registration
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Run every transformer over `bytes` in registration order
    pub fn apply(&self, module: &ModuleName, bytes: Vec<u8>) -> Result<Vec<u8>, LoadError> {
        self.apply_observed(module, bytes, None)
    }

    /// Like [`apply`](Self::apply), reporting each stage to `observer`
    ///
    /// The first failing transformer aborts the whole pass; the remaining
    /// transformers do not run.
    pub fn apply_observed(
        &self,
        module: &ModuleName,
        mut bytes: Vec<u8>,
        mut observer: Option<&mut dyn StageObserver>,
    ) -> Result<Vec<u8>, LoadError> {
        // Snapshot so no lock is held while transformers run; they may resolve
        // other modules.
        let transformers: Vec<Arc<dyn Transformer>> = self.transformers.read().clone();

        trace!("Beginning transform of {} ({} bytes)", module, bytes.len());
        if let Some(obs) = observer.as_deref_mut() {
            obs.observe(0, None, &bytes);
        }

        for (index, transformer) in transformers.iter().enumerate() {
            trace!(
                "Before transformer {} on {}: {} bytes",
                transformer.name(),
                module,
                bytes.len()
            );
            bytes = transformer
                .transform(module, bytes)
                .map_err(|e| LoadError::TransformFailure {
                    module: module.clone(),
                    transformer: transformer.name().to_string(),
                    cause: into_cause(e),
                })?;
            trace!(
                "After transformer {} on {}: {} bytes",
                transformer.name(),
                module,
                bytes.len()
            );
            if let Some(obs) = observer.as_deref_mut() {
                obs.observe(index + 1, Some(transformer.name()), &bytes);
            }
        }

        trace!("Ending transform of {} ({} bytes)", module, bytes.len());
        Ok(bytes)
    }
}
