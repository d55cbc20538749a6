//! Revertible CAFs.
//!
//! While the keep flag is set, every CAF built through [`Closure::caf_in`]
//! (or [`Closure::caf`] for the process-wide registry) is recorded. A revert
//! resets each recorded CAF to unevaluated and empties the registry, so the
//! next force recomputes it against whatever the code now reads. Hosts call
//! this on interactive reload.
//!
//! Revert does not synchronise with in-flight evaluation of the same CAFs.
//! It is memory-safe at any time, but a CAF being evaluated during a revert
//! may end up holding the stale value; hosts quiesce their capabilities
//! first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tracing::debug;

use crate::runtime::config::RtsConfig;
use crate::runtime::error::RtsResult;
use crate::runtime::stg::{Closure, StgContext};

use super::kind::{ThunkCode, ThunkKind};
use super::Thunk;

/// Global CAF registry instance
static GLOBAL_REGISTRY: LazyLock<CafRegistry> = LazyLock::new(CafRegistry::new);

pub struct CafRegistry {
    keep: AtomicBool,
    verbose: AtomicBool,
    revertible: Mutex<Vec<Closure>>,
}

impl CafRegistry {
    /// Empty registry with the keep flag off.
    pub fn new() -> Self {
        Self {
            keep: AtomicBool::new(false),
            verbose: AtomicBool::new(false),
            revertible: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide registry used by [`Closure::caf`].
    pub fn global() -> &'static CafRegistry {
        &GLOBAL_REGISTRY
    }

    /// Seed the keep flag and logging from configuration.
    pub fn apply_config(&self, config: &RtsConfig) {
        self.keep.store(config.keep_cafs, Ordering::SeqCst);
        self.verbose.store(config.debug.gccafs, Ordering::Relaxed);
    }

    pub fn set_keep_cafs(&self) {
        self.keep.store(true, Ordering::SeqCst);
    }

    pub fn reset_keep_cafs(&self) {
        self.keep.store(false, Ordering::SeqCst);
    }

    pub fn should_keep_cafs(&self) -> bool {
        self.keep.load(Ordering::SeqCst)
    }

    /// Record `caf` as revertible.
    pub fn register(&self, caf: &Closure) {
        let mut list = self.revertible.lock();
        list.push(caf.clone());
        if self.verbose.load(Ordering::Relaxed) {
            debug!(target: "lazyrts::caf", caf = %caf.node_id(), registered = list.len(), "registered CAF");
        }
    }

    /// Reset every registered CAF to unevaluated and empty the registry.
    /// Returns how many CAFs were reverted.
    pub fn revert(&self) -> usize {
        let reverted = {
            let mut list = self.revertible.lock();
            for caf in list.iter() {
                if let Some(thunk) = caf.as_thunk() {
                    thunk.set_indirection(None);
                }
            }
            std::mem::take(&mut *list)
        };
        let count = reverted.len();
        // released outside the lock
        drop(reverted);
        if self.verbose.load(Ordering::Relaxed) {
            debug!(target: "lazyrts::caf", count, "reverted CAFs");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.revertible.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CafRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CafRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CafRegistry")
            .field("keep", &self.should_keep_cafs())
            .field("len", &self.len())
            .finish()
    }
}

/// Turn on keep mode for the process-wide registry.
pub fn set_keep_cafs() {
    CafRegistry::global().set_keep_cafs();
}

pub fn reset_keep_cafs() {
    CafRegistry::global().reset_keep_cafs();
}

pub fn should_keep_cafs() -> bool {
    CafRegistry::global().should_keep_cafs()
}

/// Revert every CAF in the process-wide registry.
pub fn revert_cafs() -> usize {
    CafRegistry::global().revert()
}

impl Closure {
    /// Top-level constant registered with the process-wide registry.
    pub fn caf<F>(code: F) -> Closure
    where
        F: Fn(&mut StgContext) -> RtsResult<Closure> + Send + Sync + 'static,
    {
        Self::caf_in(CafRegistry::global(), code)
    }

    /// Top-level constant, recorded in `registry` if its keep flag is set.
    pub fn caf_in<F>(registry: &CafRegistry, code: F) -> Closure
    where
        F: Fn(&mut StgContext) -> RtsResult<Closure> + Send + Sync + 'static,
    {
        let code: ThunkCode = Arc::new(code);
        let caf = Closure::from_thunk(Thunk::new(ThunkKind::Caf(code)));
        if registry.should_keep_cafs() {
            registry.register(&caf);
        }
        caf
    }
}
