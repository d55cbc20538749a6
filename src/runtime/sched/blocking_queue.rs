//! Blackhole wait messages and the queues that collect them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::stg::WeakClosure;

use super::{TaskId, TaskRef};

/// Next queue ID counter
static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// "Task `task` is waiting for `thunk`."
pub struct MessageBlackHole {
    pub task: TaskRef,
    pub thunk: WeakClosure,
}

impl MessageBlackHole {
    pub fn new(task: TaskRef, thunk: WeakClosure) -> Arc<Self> {
        Arc::new(Self { task, thunk })
    }
}

impl fmt::Debug for MessageBlackHole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBlackHole")
            .field("task", &self.task.id())
            .finish()
    }
}

struct Waiters {
    messages: Vec<Arc<MessageBlackHole>>,
    closed: bool,
}

/// Tasks waiting on one black-holed thunk.
///
/// Once closed (drained) a queue accepts no further messages; a task whose
/// push fails re-reads the thunk instead.
pub struct BlockingQueue {
    id: u64,
    owner: TaskId,
    thunk: WeakClosure,
    inner: Mutex<Waiters>,
}

impl BlockingQueue {
    pub fn new(owner: TaskId, thunk: WeakClosure) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            owner,
            thunk,
            inner: Mutex::new(Waiters {
                messages: Vec::new(),
                closed: false,
            }),
        })
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Task evaluating the thunk this queue waits on.
    #[inline]
    pub fn owner(&self) -> TaskId {
        self.owner
    }

    pub fn thunk(&self) -> &WeakClosure {
        &self.thunk
    }

    /// Add a waiter. Returns `false` if the queue was already drained.
    pub fn push(&self, msg: Arc<MessageBlackHole>) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.messages.push(msg);
        true
    }

    /// Close the queue and take its waiters.
    pub fn close(&self) -> Vec<Arc<MessageBlackHole>> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        std::mem::take(&mut inner.messages)
    }

    /// Close the queue and wake every waiter. Returns how many were woken.
    pub fn wake_all(&self) -> usize {
        let waiters = self.close();
        for msg in &waiters {
            msg.task.wake();
        }
        waiters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Whether the thunk has been evaluated (or is gone), so waiters can go.
    pub fn is_resolved(&self) -> bool {
        match self.thunk.upgrade() {
            Some(thunk) => thunk.get_evaluated().is_some(),
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for BlockingQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BlockingQueue")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("waiters", &inner.messages.len())
            .field("closed", &inner.closed)
            .finish()
    }
}
