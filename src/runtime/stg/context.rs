//! Per-task evaluation context.
//!
//! Each logical thread of evaluation owns one [`StgContext`]. It names the
//! task and the capability it runs on, carries the unboxed return registers
//! written by selectors, and keeps the stack of thunks whose update frames are
//! live (used to report `<<loop>>` when a task re-enters its own thunk).

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::runtime::config::RtsConfig;
use crate::runtime::error::{barf, RtsError, RtsResult};
use crate::runtime::interpreter::Interpreter;
use crate::runtime::sched::{Capability, TaskId, TaskRef, Task, WorkerCapability};

use super::{Closure, NodeId};

/// Return registers. Selectors write the selected field here.
#[derive(Debug, Default, Clone)]
pub struct Registers {
    pub r1: Option<Closure>,
    pub int: i32,
    pub long: i64,
    pub float: f32,
    pub double: f64,
}

/// Evaluation context of one task.
pub struct StgContext {
    task: TaskRef,
    cap: Arc<dyn Capability>,
    config: Arc<RtsConfig>,
    interpreter: Option<Arc<dyn Interpreter>>,
    update_frames: Vec<NodeId>,
    /// Members of `update_frames`, for constant-time re-entry checks.
    active_frames: HashSet<NodeId>,
    registers: Registers,
}

impl StgContext {
    pub fn new(task: TaskRef, cap: Arc<dyn Capability>, config: Arc<RtsConfig>) -> Self {
        Self {
            task,
            cap,
            config,
            interpreter: None,
            update_frames: Vec::new(),
            active_frames: HashSet::new(),
            registers: Registers::default(),
        }
    }

    /// Context with a fresh task on a private capability.
    pub fn standalone(config: RtsConfig) -> Self {
        let config = Arc::new(config);
        let cap: Arc<dyn Capability> = WorkerCapability::standalone(&config);
        Self::new(Task::new(), cap, config)
    }

    /// Install the bytecode interpreter used to run compiled closures.
    pub fn with_interpreter(mut self, interpreter: Arc<dyn Interpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    #[inline]
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    #[inline]
    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    #[inline]
    pub fn capability(&self) -> &Arc<dyn Capability> {
        &self.cap
    }

    #[inline]
    pub fn config(&self) -> &RtsConfig {
        &self.config
    }

    pub fn interpreter(&self) -> Option<&Arc<dyn Interpreter>> {
        self.interpreter.as_ref()
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Number of live update frames.
    pub fn depth(&self) -> usize {
        self.update_frames.len()
    }

    /// Record that this task is about to run `thunk`'s code.
    ///
    /// Fails with [`RtsError::Loop`] if the thunk is already under evaluation
    /// further down this task's stack.
    pub(crate) fn push_update_frame(&mut self, thunk: NodeId) -> RtsResult<()> {
        if !self.active_frames.insert(thunk) {
            return Err(barf(RtsError::Loop { thunk }));
        }
        self.update_frames.push(thunk);
        Ok(())
    }

    /// Pop `thunk`'s frame together with any frames above it.
    pub(crate) fn pop_update_frame(&mut self, thunk: NodeId) {
        if !self.active_frames.contains(&thunk) {
            return;
        }
        if let Some(pos) = self.update_frames.iter().rposition(|id| *id == thunk) {
            for id in self.update_frames.drain(pos..) {
                self.active_frames.remove(&id);
            }
        }
    }
}

impl fmt::Debug for StgContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StgContext")
            .field("task", &self.task.id())
            .field("capability", &self.cap.id())
            .field("depth", &self.update_frames.len())
            .finish()
    }
}
