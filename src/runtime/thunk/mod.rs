//! Suspended computations and the update protocol.
//!
//! # Design
//!
//! A [`Thunk`] is one atomic indirection slot plus a [`ThunkKind`] holding
//! the suspended computation and its free variables. The slot moves through
//!
//! ```text
//! empty ──claim──> black hole ──attach──> locked ──> blocking queue
//!   │                  │                                  │
//!   └──────────────────┴────────── update ────────────────┴──> value
//!
//! value ──CAF revert──> empty
//! ```
//!
//! and every transition is a CAS on the slot. The fast path (slot already
//! holds a value) is one load plus the slot's reader count.
//!
//! By default entry does not claim: two tasks may evaluate the same thunk at
//! once and the first CAS to install a value wins; the loser adopts the
//! winner's value. With `eager_blackholing` entry claims first and a second
//! task waits on a blocking queue instead of duplicating the work.

mod ap;
mod caf;
mod indirection;
mod kind;
mod selector;
mod update;

pub use caf::{reset_keep_cafs, revert_cafs, set_keep_cafs, should_keep_cafs, CafRegistry};
pub use kind::ThunkCode;
pub use selector::SelectorKind;

use std::fmt;
use std::sync::Arc;

use crate::runtime::error::RtsResult;
use crate::runtime::sched::TaskId;
use crate::runtime::stg::{Closure, StgContext};

use indirection::{Indirectee, IndirectionSlot};
use kind::{FreeVars, ThunkKind};

/// A suspended computation with an updatable result.
pub struct Thunk {
    indirectee: IndirectionSlot,
    kind: ThunkKind,
}

/// Point-in-time view of a thunk's slot.
#[derive(Debug, Clone)]
pub enum ThunkState {
    Unevaluated,
    BlackHole { owner: TaskId },
    Locked { owner: Option<TaskId> },
    BlockingQueue { owner: TaskId, waiters: usize },
    Evaluated(Closure),
}

impl ThunkState {
    pub fn is_evaluated(&self) -> bool {
        matches!(self, ThunkState::Evaluated(_))
    }

    pub fn is_under_evaluation(&self) -> bool {
        matches!(self, ThunkState::BlackHole { .. } | ThunkState::BlockingQueue { .. })
    }
}

impl Thunk {
    pub(crate) fn new(kind: ThunkKind) -> Self {
        Self {
            indirectee: IndirectionSlot::new(),
            kind,
        }
    }

    /// The memoized value, if the thunk has been updated.
    #[inline]
    pub fn get_evaluated(&self) -> Option<Closure> {
        match self.indirectee.load().get() {
            Some(Indirectee::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn state(&self) -> ThunkState {
        match self.indirectee.load().get() {
            None => ThunkState::Unevaluated,
            Some(Indirectee::BlackHole { owner }) => ThunkState::BlackHole { owner: *owner },
            Some(Indirectee::Locked { owner }) => ThunkState::Locked { owner: *owner },
            Some(Indirectee::Queue(bq)) => ThunkState::BlockingQueue {
                owner: bq.owner(),
                waiters: bq.len(),
            },
            Some(Indirectee::Value(v)) => ThunkState::Evaluated(v.clone()),
        }
    }

    pub fn is_caf(&self) -> bool {
        matches!(self.kind, ThunkKind::Caf(_))
    }

    /// Claim the thunk for the current task (empty to black hole).
    ///
    /// A successful claim must be followed by [`Thunk::update_code`] or
    /// [`Thunk::abandon`], otherwise contenders wait forever.
    pub fn claim(&self, ctx: &StgContext) -> bool {
        let snap = self.indirectee.load();
        snap.is_empty()
            && self
                .indirectee
                .compare_exchange(&snap, Some(Indirectee::BlackHole { owner: ctx.task_id() }))
                .is_some()
    }

    /// Lock an unevaluated thunk. Fails if it is under evaluation, locked,
    /// or already evaluated.
    pub fn try_lock(&self) -> bool {
        let snap = self.indirectee.load();
        snap.is_empty()
            && self
                .indirectee
                .compare_exchange(&snap, Some(Indirectee::Locked { owner: None }))
                .is_some()
    }

    /// Release a [`Thunk::try_lock`]. Returns `false` if the lock was not held
    /// (for instance because the thunk was updated meanwhile).
    pub fn unlock(&self) -> bool {
        let snap = self.indirectee.load();
        match snap.get() {
            Some(Indirectee::Locked { owner: None }) => self.indirectee.compare_exchange(&snap, None).is_some(),
            _ => false,
        }
    }

    /// Overwrite the slot. `None` resets the thunk to unevaluated, which is
    /// only meaningful for CAFs: other kinds release their free variables
    /// when updated and cannot run again.
    ///
    /// Waiters of a displaced blocking queue are woken so they re-read the
    /// slot.
    pub fn set_indirection(&self, value: Option<Closure>) {
        let displaced = self.indirectee.swap(value.map(Indirectee::Value));
        if let Some(Indirectee::Queue(bq)) = displaced.get() {
            bq.wake_all();
        }
    }

    /// Drop the free variables of the suspended computation.
    pub fn clear_free_variables(&self) {
        self.kind.clear_free_variables();
    }

    pub fn free_variables_cleared(&self) -> bool {
        self.kind.free_variables_cleared()
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        let state = match self.indirectee.load().get() {
            None => "unevaluated",
            Some(Indirectee::BlackHole { .. }) => "black hole",
            Some(Indirectee::Locked { .. }) => "locked",
            Some(Indirectee::Queue(_)) => "blocking queue",
            Some(Indirectee::Value(_)) => "evaluated",
        };
        format!("{}, {}", self.kind.describe(), state)
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thunk[{}]", self.describe())
    }
}

impl Closure {
    /// Generic updatable thunk. Values captured by `code` are its free
    /// variables and are released once the thunk is updated.
    pub fn thunk<F>(code: F) -> Closure
    where
        F: Fn(&mut StgContext) -> RtsResult<Closure> + Send + Sync + 'static,
    {
        let code: ThunkCode = Arc::new(code);
        Closure::from_thunk(Thunk::new(ThunkKind::Updatable(FreeVars::new(code))))
    }
}
