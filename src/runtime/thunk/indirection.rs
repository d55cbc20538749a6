//! The thunk's single mutable field.
//!
//! # Design
//!
//! The slot is an `AtomicPtr` to an immutable boxed [`Indirectee`]; null is
//! the empty state. Every transition publishes a fresh box with a CAS (or a
//! swap, for CAF revert). Readers dereference a loaded pointer without
//! locking, so a displaced box cannot be freed straight away: it moves to the
//! `retired` list.
//!
//! Every [`Snapshot`] is counted in `readers`, and the count is raised before
//! the pointer is loaded. A box only reaches the retired list after it was
//! unlinked, so once the count drops to zero no snapshot can still point at a
//! retired box and the list is freed. Until then a pointer value cannot be
//! reused while a snapshot of it exists, so CAS comparisons are ABA-free.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::sched::{BlockingQueue, TaskId};
use crate::runtime::stg::Closure;

/// What a non-empty indirection slot holds.
pub(crate) enum Indirectee {
    /// Evaluation in progress by `owner`.
    BlackHole { owner: TaskId },
    /// Short-lived lock: a blocking queue is being attached, or the thunk
    /// was locked with `try_lock` (`owner` is `None`).
    Locked { owner: Option<TaskId> },
    /// Evaluation in progress, with waiters.
    Queue(Arc<BlockingQueue>),
    /// Evaluated.
    Value(Closure),
}

impl Indirectee {
    /// Task that owns the evaluation, if one is in progress.
    pub(crate) fn owner(&self) -> Option<TaskId> {
        match self {
            Indirectee::BlackHole { owner } => Some(*owner),
            Indirectee::Locked { owner } => *owner,
            Indirectee::Queue(bq) => Some(bq.owner()),
            Indirectee::Value(_) => None,
        }
    }
}

/// A loaded slot value. The node it points at stays alive until the
/// snapshot is dropped.
pub(crate) struct Snapshot<'a> {
    slot: &'a IndirectionSlot,
    raw: *mut Indirectee,
}

impl Snapshot<'_> {
    /// `None` for the empty state.
    #[inline]
    pub(crate) fn get(&self) -> Option<&Indirectee> {
        // SAFETY: `readers` was raised before `raw` was loaded, and retired
        // nodes are only freed while `readers` is zero.
        unsafe { self.raw.as_ref() }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.raw.is_null()
    }
}

impl Drop for Snapshot<'_> {
    fn drop(&mut self) {
        if self.slot.readers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.slot.reclaim();
        }
    }
}

pub(crate) struct IndirectionSlot {
    head: AtomicPtr<Indirectee>,
    readers: AtomicUsize,
    retired: Mutex<Vec<Box<Indirectee>>>,
}

impl IndirectionSlot {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            readers: AtomicUsize::new(0),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Count a new reader. The returned snapshot has no node yet.
    #[inline]
    fn pin(&self) -> Snapshot<'_> {
        self.readers.fetch_add(1, Ordering::SeqCst);
        Snapshot {
            slot: self,
            raw: ptr::null_mut(),
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> Snapshot<'_> {
        let mut snap = self.pin();
        snap.raw = self.head.load(Ordering::SeqCst);
        snap
    }

    /// Replace `current` with `new`. On success returns the snapshot of the
    /// newly published state; on failure the slot is unchanged.
    pub(crate) fn compare_exchange(&self, current: &Snapshot<'_>, new: Option<Indirectee>) -> Option<Snapshot<'_>> {
        let mut published = self.pin();
        let new_raw = Self::into_raw(new);
        match self
            .head
            .compare_exchange(current.raw, new_raw, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(old) => {
                self.retire(old);
                published.raw = new_raw;
                Some(published)
            }
            Err(_) => {
                if !new_raw.is_null() {
                    // SAFETY: never published, so no other reference exists.
                    drop(unsafe { Box::from_raw(new_raw) });
                }
                None
            }
        }
    }

    /// Unconditionally replace the contents, returning what was displaced.
    pub(crate) fn swap(&self, new: Option<Indirectee>) -> Snapshot<'_> {
        let mut displaced = self.pin();
        let old = self.head.swap(Self::into_raw(new), Ordering::SeqCst);
        self.retire(old);
        displaced.raw = old;
        displaced
    }

    fn into_raw(node: Option<Indirectee>) -> *mut Indirectee {
        match node {
            Some(n) => Box::into_raw(Box::new(n)),
            None => ptr::null_mut(),
        }
    }

    fn retire(&self, old: *mut Indirectee) {
        if !old.is_null() {
            // SAFETY: `old` was produced by `into_raw` and has just been
            // unlinked; ownership moves to the retired list.
            let boxed = unsafe { Box::from_raw(old) };
            self.retired.lock().push(boxed);
        }
    }

    /// Free retired nodes if no snapshot is live. Skipped when another
    /// thread holds the list; the next quiescent drop retries.
    fn reclaim(&self) {
        let freed = match self.retired.try_lock() {
            Some(mut list) if !list.is_empty() && self.readers.load(Ordering::SeqCst) == 0 => std::mem::take(&mut *list),
            _ => return,
        };
        // dropped outside the lock; a stale value may own a large subgraph
        drop(freed);
    }

    #[cfg(test)]
    pub(crate) fn retired_len(&self) -> usize {
        self.retired.lock().len()
    }
}

impl Drop for IndirectionSlot {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        if !head.is_null() {
            // SAFETY: exclusive access; the head is owned by the slot.
            drop(unsafe { Box::from_raw(head) });
        }
    }
}
