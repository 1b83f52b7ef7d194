//! Module cache
//!
//! Maps module names to their defined module or an invalid marker, and tracks
//! in-flight resolutions as tickets so that concurrent requests for the same
//! name collapse into one execution of the pipeline.
//!
//! ## Deadlock detection
//!
//! Before a thread blocks on another thread's ticket it walks the wait-for
//! graph (thread -> name it waits on -> owning thread). Reaching itself means
//! the wait can never finish, and the claim fails with
//! [`LoadError::CyclicResolution`] instead of hanging.

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

use crate::loader::name::ModuleName;
use crate::loader::traits::{DefinedModule, LoadError};

type Outcome = Result<Arc<DefinedModule>, LoadError>;

/// An in-flight resolution
struct Ticket {
    owner: ThreadId,
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

impl Ticket {
    fn new() -> Self {
        Self {
            owner: thread::current().id(),
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> Outcome {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut outcome);
        }
    }

    fn finish(&self, result: Outcome) {
        *self.outcome.lock() = Some(result);
        self.ready.notify_all();
    }
}

enum Slot {
    InFlight(Arc<Ticket>),
    Defined(Arc<DefinedModule>),
    Invalid,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<ModuleName, Slot>,
    /// Thread -> name whose ticket it is blocked on
    waiting: HashMap<ThreadId, ModuleName>,
}

impl CacheState {
    /// Chain of names from `start` back to the current thread, if waiting on
    /// `start` would close a cycle.
    fn wait_cycle(&self, me: ThreadId, start: &ModuleName) -> Option<Vec<ModuleName>> {
        let mut chain = vec![start.clone()];
        let mut visited = HashSet::new();
        let mut current = start.clone();
        loop {
            let owner = match self.slots.get(&current) {
                Some(Slot::InFlight(ticket)) => ticket.owner,
                _ => return None,
            };
            if owner == me {
                return Some(chain);
            }
            if !visited.insert(owner) {
                return None;
            }
            current = self.waiting.get(&owner)?.clone();
            chain.push(current.clone());
        }
    }
}

/// Result of claiming a name in the cache
pub enum Claim<'a> {
    /// Already defined, or defined by another thread while we waited
    Ready(Arc<DefinedModule>),
    /// Previously failed; caller must fail fast
    Invalid,
    /// The caller owns the resolution and must complete the guard
    Owner(FlightGuard<'a>),
}

/// Shared cache of resolved and invalid module names
#[derive(Default)]
pub struct ModuleCache {
    state: Mutex<CacheState>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for resolution
    ///
    /// Blocks while another thread owns the name. Returns an error when the
    /// wait would deadlock, or the owner's failure if it failed.
    pub fn claim(&self, name: &ModuleName) -> Result<Claim<'_>, LoadError> {
        let me = thread::current().id();
        let ticket = {
            let mut state = self.state.lock();
            let in_flight = match state.slots.get(name) {
                Some(Slot::Defined(module)) => return Ok(Claim::Ready(module.clone())),
                Some(Slot::Invalid) => return Ok(Claim::Invalid),
                Some(Slot::InFlight(ticket)) => Some(ticket.clone()),
                None => None,
            };
            match in_flight {
                Some(ticket) => {
                    if let Some(chain) = state.wait_cycle(me, name) {
                        return Err(LoadError::CyclicResolution {
                            module: name.clone(),
                            chain,
                        });
                    }
                    state.waiting.insert(me, name.clone());
                    ticket
                }
                None => {
                    let ticket = Arc::new(Ticket::new());
                    state
                        .slots
                        .insert(name.clone(), Slot::InFlight(ticket.clone()));
                    return Ok(Claim::Owner(FlightGuard {
                        cache: self,
                        name: name.clone(),
                        ticket,
                        finished: false,
                    }));
                }
            }
        };

        debug!("Waiting for in-flight resolution of {}", name);
        let outcome = ticket.wait();
        self.state.lock().waiting.remove(&me);
        outcome.map(Claim::Ready)
    }

    /// Defined module for `name`, if resolution completed successfully
    pub fn get(&self, name: &ModuleName) -> Option<Arc<DefinedModule>> {
        match self.state.lock().slots.get(name) {
            Some(Slot::Defined(module)) => Some(module.clone()),
            _ => None,
        }
    }

    /// Whether `name` carries the invalid marker
    pub fn is_invalid(&self, name: &ModuleName) -> bool {
        matches!(self.state.lock().slots.get(name), Some(Slot::Invalid))
    }

    /// Number of successfully defined modules
    pub fn defined_count(&self) -> usize {
        self.state
            .lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Defined(_)))
            .count()
    }

    fn settle(&self, name: &ModuleName, ticket: &Ticket, outcome: Outcome) {
        {
            let mut state = self.state.lock();
            let slot = match &outcome {
                Ok(module) => Slot::Defined(module.clone()),
                Err(_) => Slot::Invalid,
            };
            state.slots.insert(name.clone(), slot);
        }
        ticket.finish(outcome);
    }
}

/// Ownership of an in-flight resolution
///
/// Must be finished with [`complete`](FlightGuard::complete). If dropped
/// unfinished (the owner unwound), the name is marked invalid and waiters are
/// released with `ModuleNotFound`.
pub struct FlightGuard<'a> {
    cache: &'a ModuleCache,
    name: ModuleName,
    ticket: Arc<Ticket>,
    finished: bool,
}

impl FlightGuard<'_> {
    /// Record the outcome, wake waiters and return the outcome to the owner
    pub fn complete(mut self, outcome: Outcome) -> Outcome {
        self.finished = true;
        self.cache.settle(&self.name, &self.ticket, outcome.clone());
        outcome
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.settle(
                &self.name,
                &self.ticket,
                Err(LoadError::ModuleNotFound(self.name.clone())),
            );
        }
    }
}
