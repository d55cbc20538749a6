//! Entry, update and blackhole cooperation.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread;

use tracing::{trace, warn};

use crate::runtime::error::{barf, RtsError, RtsResult};
use crate::runtime::sched::{BlockingQueue, MessageBlackHole, WhyBlocked};
use crate::runtime::stg::{Closure, NodeId, StgContext};

use super::indirection::Indirectee;
use super::Thunk;

impl Thunk {
    /// One evaluation step of `this` (which must be the closure wrapping
    /// `self`). Returns the value in WHNF.
    pub(crate) fn enter(&self, this: &Closure, ctx: &mut StgContext) -> RtsResult<Closure> {
        let eager = ctx.config().eager_blackholing;
        self.force(this, ctx, eager)
    }

    /// Entry that never duplicates another task's evaluation: claims the
    /// thunk, or waits for the task that holds it.
    pub(crate) fn black_hole(&self, this: &Closure, ctx: &mut StgContext) -> RtsResult<Closure> {
        self.force(this, ctx, true)
    }

    fn force(&self, this: &Closure, ctx: &mut StgContext, claim: bool) -> RtsResult<Closure> {
        let me = ctx.task_id();
        loop {
            let snap = self.indirectee.load();
            let step = match snap.get() {
                Some(Indirectee::Value(v)) => Step::Done(v.clone()),
                None if claim => {
                    let claimed = self
                        .indirectee
                        .compare_exchange(&snap, Some(Indirectee::BlackHole { owner: me }))
                        .is_some();
                    if !claimed {
                        continue;
                    }
                    Step::Run { claimed: true }
                }
                None => Step::Run { claimed: false },
                Some(ind) if ind.owner() == Some(me) => Step::Loop,
                Some(_) => Step::Wait,
            };
            // not held while evaluating or parked
            drop(snap);
            match step {
                Step::Done(v) => return Ok(v),
                Step::Run { claimed } => {
                    if claimed {
                        trace!(target: "lazyrts::thunk", thunk = %this.node_id(), task = %me, "claimed");
                    }
                    if let Some(v) = self.run(this, ctx, claimed)? {
                        return Ok(v);
                    }
                    if self.indirectee.load().is_empty() && self.kind.free_variables_cleared() {
                        return Err(barf(RtsError::Cleared { thunk: this.node_id() }));
                    }
                }
                Step::Loop => return Err(barf(RtsError::Loop { thunk: this.node_id() })),
                Step::Wait => self.wait_for_owner(this, ctx)?,
            }
        }
    }

    /// Run the suspended code under an update frame and install its result.
    /// `Ok(None)` means a concurrent update already released the code.
    fn run(&self, this: &Closure, ctx: &mut StgContext, claimed: bool) -> RtsResult<Option<Closure>> {
        let mut frame = UpdateFrame::push(self, ctx, this.node_id(), claimed)?;
        let outcome = match self.kind.thunk_enter(&mut frame) {
            Ok(Some(r)) => r.evaluate(&mut frame).map(Some),
            other => other,
        };
        match outcome {
            Ok(Some(r)) => Ok(Some(frame.update(r))),
            // dropping the frame gives up the claim
            other => other,
        }
    }

    /// Install `result` as this thunk's value and release its waiters.
    ///
    /// If another evaluation already installed a value, `result` is
    /// discarded and the installed value returned. The value is written with
    /// a CAS, so exactly one value is ever installed.
    pub fn update_code(&self, ctx: &StgContext, result: Closure) -> Closure {
        let me = ctx.task_id();
        if ctx.config().debug.sanity && !result.is_value() {
            warn!(target: "lazyrts::thunk", result = ?result, "updating thunk with a non-value");
        }
        loop {
            let snap = self.indirectee.load();
            if let Some(Indirectee::Value(v)) = snap.get() {
                trace!(target: "lazyrts::thunk", task = %me, "update lost race");
                ctx.capability().check_blocking_queues(ctx.task());
                return v.clone();
            }
            if self
                .indirectee
                .compare_exchange(&snap, Some(Indirectee::Value(result.clone())))
                .is_none()
            {
                continue;
            }
            self.kind.clear_free_variables();
            match snap.get() {
                None => {}
                Some(Indirectee::BlackHole { owner }) if *owner == me => {}
                Some(Indirectee::Queue(bq)) if bq.owner() == me => {
                    ctx.capability().wake_blocking_queue(bq);
                }
                Some(Indirectee::Queue(bq)) => {
                    ctx.capability().wake_blocking_queue(bq);
                    ctx.capability().check_blocking_queues(ctx.task());
                }
                Some(_) => ctx.capability().check_blocking_queues(ctx.task()),
            }
            trace!(target: "lazyrts::thunk", task = %me, value = ?result, "updated");
            return result;
        }
    }

    /// Give up a claim held by the current task, resetting the thunk to
    /// unevaluated and waking any waiters so they retry.
    pub fn abandon(&self, ctx: &StgContext) {
        let me = ctx.task_id();
        loop {
            let snap = self.indirectee.load();
            let queue = match snap.get() {
                Some(Indirectee::BlackHole { owner }) if *owner == me => None,
                Some(Indirectee::Locked { owner: Some(owner) }) if *owner == me => None,
                Some(Indirectee::Queue(bq)) if bq.owner() == me => Some(Arc::clone(bq)),
                _ => return,
            };
            if self.indirectee.compare_exchange(&snap, None).is_some() {
                trace!(target: "lazyrts::thunk", task = %me, "abandoned claim");
                if let Some(bq) = queue {
                    ctx.capability().wake_blocking_queue(&bq);
                }
                return;
            }
        }
    }

    /// Register `msg` as waiting for the owner of this thunk. Returns whether
    /// the calling task must suspend.
    fn attach(&self, this: &Closure, msg: &Arc<MessageBlackHole>, ctx: &StgContext) -> RtsResult<bool> {
        let me = ctx.task_id();
        loop {
            let snap = self.indirectee.load();
            match snap.get() {
                None | Some(Indirectee::Value(_)) => return Ok(false),
                Some(Indirectee::BlackHole { owner }) => {
                    let owner = *owner;
                    if owner == me {
                        return Err(barf(RtsError::Loop { thunk: this.node_id() }));
                    }
                    let Some(locked) = self
                        .indirectee
                        .compare_exchange(&snap, Some(Indirectee::Locked { owner: Some(owner) }))
                    else {
                        continue;
                    };
                    let bq = BlockingQueue::new(owner, this.downgrade());
                    bq.push(Arc::clone(msg));
                    // registered before publishing, so the owner's update
                    // always finds either the queue or the lock
                    let blocked = ctx.capability().message_black_hole(msg, &bq);
                    if self
                        .indirectee
                        .compare_exchange(&locked, Some(Indirectee::Queue(Arc::clone(&bq))))
                        .is_none()
                    {
                        bq.close();
                        return Ok(false);
                    }
                    trace!(target: "lazyrts::thunk", thunk = %this.node_id(), owner = %owner, "created blocking queue");
                    return Ok(blocked);
                }
                Some(Indirectee::Locked { .. }) => {
                    std::hint::spin_loop();
                    std::thread::yield_now();
                }
                Some(Indirectee::Queue(bq)) => {
                    if bq.owner() == me {
                        return Err(barf(RtsError::Loop { thunk: this.node_id() }));
                    }
                    if bq.push(Arc::clone(msg)) {
                        return Ok(ctx.capability().message_black_hole(msg, bq));
                    }
                }
            }
        }
    }

    /// Suspend the current task until the thunk's owner finishes (or gives
    /// up). The caller re-reads the slot afterwards.
    fn wait_for_owner(&self, this: &Closure, ctx: &mut StgContext) -> RtsResult<()> {
        let task = Arc::clone(ctx.task());
        let msg = MessageBlackHole::new(Arc::clone(&task), this.downgrade());
        if self.attach(this, &msg, ctx)? {
            trace!(target: "lazyrts::thunk", thunk = %this.node_id(), task = %task.id(), "blocked on black hole");
            task.block_on(WhyBlocked::BlockedOnBlackHole, msg);
            ctx.capability().blocked_loop(&task);
        }
        Ok(())
    }
}

enum Step {
    Done(Closure),
    Run { claimed: bool },
    Loop,
    Wait,
}

/// Live update frame of a running thunk.
///
/// Dropping the frame pops it from the task's stack and, unless the thunk
/// was updated through it, gives up the claim. This also runs when the
/// suspended code panics, so the thunk can be retried and its waiters are
/// released.
struct UpdateFrame<'a> {
    thunk: &'a Thunk,
    ctx: &'a mut StgContext,
    id: NodeId,
    claimed: bool,
}

impl<'a> UpdateFrame<'a> {
    fn push(thunk: &'a Thunk, ctx: &'a mut StgContext, id: NodeId, claimed: bool) -> RtsResult<Self> {
        if let Err(e) = ctx.push_update_frame(id) {
            if claimed {
                thunk.abandon(ctx);
            }
            return Err(e);
        }
        Ok(Self {
            thunk,
            ctx,
            id,
            claimed,
        })
    }

    fn update(mut self, result: Closure) -> Closure {
        let installed = self.thunk.update_code(&*self.ctx, result);
        self.claimed = false;
        installed
    }
}

impl Deref for UpdateFrame<'_> {
    type Target = StgContext;

    fn deref(&self) -> &StgContext {
        &*self.ctx
    }
}

impl DerefMut for UpdateFrame<'_> {
    fn deref_mut(&mut self) -> &mut StgContext {
        &mut *self.ctx
    }
}

impl Drop for UpdateFrame<'_> {
    fn drop(&mut self) {
        self.ctx.pop_update_frame(self.id);
        if self.claimed {
            if thread::panicking() {
                warn!(target: "lazyrts::thunk", thunk = %self.id, task = %self.ctx.task_id(), "evaluation panicked, releasing claim");
            }
            self.thunk.abandon(&*self.ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::config::RtsConfig;
    use crate::runtime::sched::{Capability, Task, WorkerCapability};
    use crate::runtime::thunk::ThunkState;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ctx_on(cap: &Arc<WorkerCapability>, config: &Arc<RtsConfig>) -> StgContext {
        let cap: Arc<dyn Capability> = Arc::clone(cap) as Arc<dyn Capability>;
        StgContext::new(Task::new(), cap, Arc::clone(config))
    }

    #[test]
    fn test_waiter_attached_before_update_is_woken() {
        let config = Arc::new(RtsConfig::default().with_eager_blackholing());
        let cap = WorkerCapability::standalone(&config);
        let owner_ctx = ctx_on(&cap, &config);

        let t = Closure::thunk(|_ctx| Ok(Closure::int(5)));
        let thunk = t.as_thunk().unwrap();
        assert!(thunk.claim(&owner_ctx));

        let waiter = {
            let t = t.clone();
            let cap = Arc::clone(&cap);
            let config = Arc::clone(&config);
            thread::spawn(move || {
                let mut ctx = ctx_on(&cap, &config);
                t.evaluate(&mut ctx).map(|v| v.as_value().and_then(|v| v.as_int()))
            })
        };

        // wait until the waiter has published its queue
        while !matches!(thunk.state(), ThunkState::BlockingQueue { waiters: 1, .. }) {
            thread::sleep(Duration::from_millis(1));
        }
        let v = thunk.update_code(&owner_ctx, Closure::int(5));
        assert_eq!(waiter.join().unwrap().unwrap(), Some(5));
        assert!(t.get_evaluated().unwrap().ptr_eq(&v));
        assert_eq!(cap.pending_queues(), 0);
    }

    #[test]
    fn test_attach_after_update_does_not_block() {
        let config = Arc::new(RtsConfig::default().with_eager_blackholing());
        let cap = WorkerCapability::standalone(&config);
        let owner_ctx = ctx_on(&cap, &config);
        let waiter_ctx = ctx_on(&cap, &config);

        let t = Closure::thunk(|_ctx| Ok(Closure::int(1)));
        let thunk = t.as_thunk().unwrap();
        assert!(thunk.claim(&owner_ctx));
        thunk.update_code(&owner_ctx, Closure::int(1));

        let msg = MessageBlackHole::new(Arc::clone(waiter_ctx.task()), t.downgrade());
        assert!(!thunk.attach(&t, &msg, &waiter_ctx).unwrap());
        assert!(!waiter_ctx.task().is_blocked());
    }

    #[test]
    fn test_abandon_wakes_waiters() {
        let config = Arc::new(RtsConfig::default().with_eager_blackholing());
        let cap = WorkerCapability::standalone(&config);
        let owner_ctx = ctx_on(&cap, &config);
        let waiter_ctx = ctx_on(&cap, &config);

        let t = Closure::thunk(|_ctx| Ok(Closure::int(1)));
        let thunk = t.as_thunk().unwrap();
        assert!(thunk.claim(&owner_ctx));

        let msg = MessageBlackHole::new(Arc::clone(waiter_ctx.task()), t.downgrade());
        assert!(thunk.attach(&t, &msg, &waiter_ctx).unwrap());
        assert!(matches!(thunk.state(), ThunkState::BlockingQueue { owner, waiters: 1 } if owner == owner_ctx.task_id()));

        thunk.abandon(&owner_ctx);
        assert!(matches!(thunk.state(), ThunkState::Unevaluated));
        // permit granted by the wake, so parking returns at once
        waiter_ctx.task().park();
    }

    #[test]
    fn test_lost_update_keeps_first_value() {
        let ctx_a = StgContext::standalone(RtsConfig::default());
        let ctx_b = StgContext::standalone(RtsConfig::default());
        let t = Closure::thunk(|_ctx| Ok(Closure::int(0)));
        let thunk = t.as_thunk().unwrap();
        let first = thunk.update_code(&ctx_a, Closure::int(1));
        let second = thunk.update_code(&ctx_b, Closure::int(1));
        assert!(second.ptr_eq(&first));
    }

    #[test]
    fn test_panicking_owner_releases_claim() {
        let config = Arc::new(RtsConfig::default().with_eager_blackholing());
        let cap = WorkerCapability::standalone(&config);
        let mut ctx = ctx_on(&cap, &config);
        let attempts = Arc::new(AtomicUsize::new(0));
        let t = {
            let attempts = Arc::clone(&attempts);
            Closure::thunk(move |_ctx| {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("evaluation blew up");
                }
                Ok(Closure::int(6))
            })
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| t.evaluate(&mut ctx)));
        assert!(outcome.is_err());
        assert!(matches!(t.as_thunk().unwrap().state(), ThunkState::Unevaluated));
        assert_eq!(ctx.depth(), 0);

        // no stale frame, so this is a retry and not a cycle
        let v = t.evaluate(&mut ctx).unwrap();
        assert_eq!(v.as_value().and_then(|v| v.as_int()), Some(6));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panic_in_nested_thunk_unwinds_every_frame() {
        let mut ctx = StgContext::standalone(RtsConfig::default().with_eager_blackholing());
        let inner = Closure::thunk(|_ctx| -> RtsResult<Closure> { panic!("inner failed") });
        let outer = {
            let inner = inner.clone();
            Closure::thunk(move |ctx| inner.evaluate(ctx))
        };

        assert!(panic::catch_unwind(AssertUnwindSafe(|| outer.evaluate(&mut ctx))).is_err());
        assert_eq!(ctx.depth(), 0);
        assert!(matches!(inner.as_thunk().unwrap().state(), ThunkState::Unevaluated));
        assert!(matches!(outer.as_thunk().unwrap().state(), ThunkState::Unevaluated));
    }
}
