//! Logical threads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::MessageBlackHole;

/// Next task ID counter
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a logical thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn fresh() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Why a task is not runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhyBlocked {
    NotBlocked,
    BlockedOnBlackHole,
}

struct TaskState {
    why_blocked: WhyBlocked,
    block_info: Option<Arc<MessageBlackHole>>,
    /// Set by `wake`, consumed by `park`. A wake that arrives before the
    /// park is kept here instead of being lost.
    permit: bool,
}

/// A logical thread of evaluation.
pub struct Task {
    id: TaskId,
    state: Mutex<TaskState>,
    wakeup: Condvar,
}

pub type TaskRef = Arc<Task>;

impl Task {
    pub fn new() -> TaskRef {
        Arc::new(Task {
            id: TaskId::fresh(),
            state: Mutex::new(TaskState {
                why_blocked: WhyBlocked::NotBlocked,
                block_info: None,
                permit: false,
            }),
            wakeup: Condvar::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn why_blocked(&self) -> WhyBlocked {
        self.state.lock().why_blocked
    }

    pub fn is_blocked(&self) -> bool {
        self.why_blocked() != WhyBlocked::NotBlocked
    }

    /// The message this task is blocked on, if any.
    pub fn block_info(&self) -> Option<Arc<MessageBlackHole>> {
        self.state.lock().block_info.clone()
    }

    /// Record the reason this task is about to suspend.
    pub fn block_on(&self, why: WhyBlocked, msg: Arc<MessageBlackHole>) {
        let mut state = self.state.lock();
        state.why_blocked = why;
        state.block_info = Some(msg);
    }

    /// Suspend the calling OS thread until [`Task::wake`] is called.
    ///
    /// Returns immediately if a wake is already pending. Wakeups may be
    /// spurious; callers re-check the condition they waited for.
    pub fn park(&self) {
        let mut state = self.state.lock();
        while !state.permit {
            self.wakeup.wait(&mut state);
        }
        state.permit = false;
        state.why_blocked = WhyBlocked::NotBlocked;
        state.block_info = None;
    }

    pub fn wake(&self) {
        let mut state = self.state.lock();
        state.permit = true;
        self.wakeup.notify_one();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("why_blocked", &self.why_blocked())
            .finish()
    }
}
