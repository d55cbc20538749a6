//! The scheduler interface consumed by the thunk protocol, and a reference
//! implementation.
//!
//! [`WorkerCapability`] suspends a logical thread by parking the OS thread
//! that runs it (one task per worker at a time). Capabilities created by
//! [`WorkerCapability::group`] share one queue map so any of them can wake a
//! waiter registered through another.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::runtime::config::RtsConfig;

use super::{BlockingQueue, MessageBlackHole, TaskRef};

/// Next capability ID counter
static NEXT_CAPABILITY_ID: AtomicU64 = AtomicU64::new(0);

/// What the thunk protocol needs from the scheduler.
pub trait Capability: Send + Sync {
    fn id(&self) -> u64;

    /// Register `msg` as waiting on `queue`. Returns whether the caller must
    /// actually suspend; `false` means the thunk resolved in the meantime.
    fn message_black_hole(&self, msg: &Arc<MessageBlackHole>, queue: &Arc<BlockingQueue>) -> bool;

    /// Yield `task` until it is woken.
    fn blocked_loop(&self, task: &TaskRef);

    /// Wake every waiter of a queue whose thunk has resolved.
    fn wake_blocking_queue(&self, queue: &Arc<BlockingQueue>);

    /// Re-check blocking reasons of waiters that may now be runnable.
    fn check_blocking_queues(&self, task: &TaskRef);
}

/// Reference capability backed by task permits.
pub struct WorkerCapability {
    id: u64,
    queues: Arc<DashMap<u64, Arc<BlockingQueue>>>,
    trace_scheduler: bool,
}

impl WorkerCapability {
    pub fn new(queues: Arc<DashMap<u64, Arc<BlockingQueue>>>, trace_scheduler: bool) -> Self {
        Self {
            id: NEXT_CAPABILITY_ID.fetch_add(1, Ordering::Relaxed),
            queues,
            trace_scheduler,
        }
    }

    /// A capability with a private queue map.
    pub fn standalone(config: &RtsConfig) -> Arc<Self> {
        Arc::new(Self::new(Arc::new(DashMap::new()), config.debug.scheduler))
    }

    /// `config.capabilities` capabilities sharing one queue map.
    pub fn group(config: &RtsConfig) -> Vec<Arc<Self>> {
        let queues = Arc::new(DashMap::new());
        (0..config.capabilities.max(1))
            .map(|_| Arc::new(Self::new(Arc::clone(&queues), config.debug.scheduler)))
            .collect()
    }

    /// Number of queues currently registered.
    pub fn pending_queues(&self) -> usize {
        self.queues.len()
    }
}

impl Capability for WorkerCapability {
    fn id(&self) -> u64 {
        self.id
    }

    fn message_black_hole(&self, msg: &Arc<MessageBlackHole>, queue: &Arc<BlockingQueue>) -> bool {
        self.queues.insert(queue.id(), Arc::clone(queue));
        if queue.is_closed() {
            self.queues.remove(&queue.id());
            return false;
        }
        if self.trace_scheduler {
            debug!(
                target: "lazyrts::sched",
                cap = self.id,
                task = %msg.task.id(),
                owner = %queue.owner(),
                "task blocked on black hole"
            );
        }
        true
    }

    fn blocked_loop(&self, task: &TaskRef) {
        trace!(target: "lazyrts::sched", cap = self.id, task = %task.id(), "parking");
        task.park();
        trace!(target: "lazyrts::sched", cap = self.id, task = %task.id(), "resumed");
    }

    fn wake_blocking_queue(&self, queue: &Arc<BlockingQueue>) {
        self.queues.remove(&queue.id());
        let woken = queue.wake_all();
        if self.trace_scheduler {
            debug!(target: "lazyrts::sched", cap = self.id, queue = queue.id(), woken, "woke blocking queue");
        }
    }

    fn check_blocking_queues(&self, task: &TaskRef) {
        let ready: Vec<u64> = self
            .queues
            .iter()
            .filter(|entry| entry.value().is_closed() || entry.value().is_resolved())
            .map(|entry| *entry.key())
            .collect();
        for id in ready {
            if let Some((_, queue)) = self.queues.remove(&id) {
                let woken = queue.wake_all();
                if self.trace_scheduler {
                    debug!(
                        target: "lazyrts::sched",
                        cap = self.id,
                        task = %task.id(),
                        queue = id,
                        woken,
                        "released waiters"
                    );
                }
            }
        }
    }
}

impl fmt::Debug for WorkerCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerCapability")
            .field("id", &self.id)
            .field("pending_queues", &self.queues.len())
            .finish()
    }
}
