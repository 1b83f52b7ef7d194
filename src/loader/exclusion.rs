//! Exclusion registry
//!
//! Prefix rules that keep modules away from the transform chain. Rules are
//! evaluated in registration order and the first matching prefix wins, so
//! registration order is part of the contract tweakers rely on.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::loader::name::ModuleName;
use crate::loader::traits::RegistrationError;

/// What to do with a module whose name matches a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionMode {
    /// Never transform; ask the parent resolver for the module
    Delegate,
    /// Never transform or cache; load from the search path on every request
    ReloadPerInstance,
}

/// A single prefix rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    /// Name prefix, compared in dot form
    pub prefix: String,
    /// Mode applied to matching names
    pub mode: ExclusionMode,
}

/// Ordered set of exclusion rules
#[derive(Debug, Default)]
pub struct ExclusionRegistry {
    rules: RwLock<Vec<ExclusionRule>>,
    frozen: AtomicBool,
}

impl ExclusionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule
    ///
    /// Prefixes may be given in slash form; they are normalised to dots the
    /// way [`ModuleName::new`] normalises names. Leading separators are
    /// dropped, a trailing one is kept as the namespace boundary.
    pub fn add_rule(
        &self,
        prefix: impl AsRef<str>,
        mode: ExclusionMode,
    ) -> Result<(), RegistrationError> {
        let prefix = normalize_prefix(prefix.as_ref());
        if self.frozen.load(Ordering::Acquire) {
            return Err(RegistrationError::Frozen {
                what: format!("exclusion rule {}", prefix),
            });
        }
        debug!("Adding {:?} exclusion for prefix {}", mode, prefix);
        self.rules.write().push(ExclusionRule { prefix, mode });
        Ok(())
    }

    /// Mode of the first rule whose prefix matches `name`
    pub fn classify(&self, name: &ModuleName) -> Option<ExclusionMode> {
        self.rules
            .read()
            .iter()
            .find(|rule| name.has_prefix(&rule.prefix))
            .map(|rule| rule.mode)
    }

    /// Snapshot of all rules in registration order
    pub fn rules(&self) -> Vec<ExclusionRule> {
        self.rules.read().clone()
    }

    /// Reject further registration
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Whether registration has been closed
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    prefix.replace('/', ".").trim_start_matches('.').to_string()
}
