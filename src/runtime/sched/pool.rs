//! Reference host: one OS worker per capability.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CapabilityPool                        │
//! │                                                              │
//! │  ┌─────────┐    ┌────────────────────────────────────────┐  │
//! │  │ Sender  │───>│  Bounded Channel (capabilities * 4)    │  │
//! │  └─────────┘    └────────────────────────────────────────┘  │
//! │                           │                                  │
//! │          ┌────────────────┼────────────────┐                │
//! │          ▼                ▼                ▼                │
//! │   ┌────────────┐   ┌────────────┐   ┌────────────┐         │
//! │   │ capability │   │ capability │   │ capability │         │
//! │   │     0      │   │     1      │   │    N-1     │         │
//! │   └────────────┘   └────────────┘   └────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each job runs as a fresh logical task with its own [`StgContext`] on the
//! worker's capability. All capabilities of a pool share one blocking-queue
//! map. A task that blocks on a black hole parks its worker until woken.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::runtime::config::RtsConfig;
use crate::runtime::interpreter::Interpreter;
use crate::runtime::stg::StgContext;

use super::{Capability, Task, WorkerCapability};

/// A boxed job that can be sent across threads
type BoxedJob = Box<dyn FnOnce(&mut StgContext) + Send + 'static>;

/// Fixed set of capabilities, each driven by one worker thread.
pub struct CapabilityPool {
    sender: Sender<BoxedJob>,
    workers: Vec<JoinHandle<()>>,
    num_capabilities: usize,
}

impl CapabilityPool {
    /// Start `config.capabilities` workers.
    pub fn new(config: RtsConfig) -> Result<Self, PoolError> {
        Self::start(config, None)
    }

    /// Start workers whose contexts run compiled closures with `interpreter`.
    pub fn with_interpreter(config: RtsConfig, interpreter: Arc<dyn Interpreter>) -> Result<Self, PoolError> {
        Self::start(config, Some(interpreter))
    }

    fn start(config: RtsConfig, interpreter: Option<Arc<dyn Interpreter>>) -> Result<Self, PoolError> {
        config.validate().map_err(|e| PoolError::Config(e.to_string()))?;
        let config = Arc::new(config);
        let caps = WorkerCapability::group(&config);
        let num_capabilities = caps.len();

        let (sender, receiver) = bounded::<BoxedJob>(num_capabilities * 4);
        let receiver = Arc::new(receiver);

        let mut workers = Vec::with_capacity(num_capabilities);
        for cap in caps {
            let rx = Arc::clone(&receiver);
            let config = Arc::clone(&config);
            let interpreter = interpreter.clone();
            let cap_id = cap.id();
            let handle = thread::Builder::new()
                .name(format!("capability-{}", cap_id))
                .spawn(move || worker_loop(rx, cap, config, interpreter))
                .map_err(|e| PoolError::Spawn(e.to_string()))?;
            workers.push(handle);
        }
        debug!(target: "lazyrts::sched", capabilities = num_capabilities, "capability pool started");

        Ok(Self {
            sender,
            workers,
            num_capabilities,
        })
    }

    pub fn num_capabilities(&self) -> usize {
        self.num_capabilities
    }

    /// Run `f` as a new task and get a receiver for its result.
    pub fn spawn<F, R>(&self, f: F) -> Result<ResultReceiver<R>, PoolError>
    where
        F: FnOnce(&mut StgContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_sender, result_receiver) = bounded(1);

        let job: BoxedJob = Box::new(move |ctx| {
            let result = f(ctx);
            // receiver may have been dropped
            let _ = result_sender.send(result);
        });

        self.sender.send(job).map_err(|_| PoolError::ShutDown)?;

        Ok(ResultReceiver {
            receiver: result_receiver,
        })
    }

    /// Run `f` as a new task without waiting for a result.
    pub fn spawn_detached<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce(&mut StgContext) + Send + 'static,
    {
        self.sender.send(Box::new(f)).map_err(|_| PoolError::ShutDown)
    }

    /// Stop accepting jobs, run the queued ones and wait for the workers.
    pub fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if worker.join().is_err() {
                warn!(target: "lazyrts::sched", "capability worker panicked");
            }
        }
    }
}

impl fmt::Debug for CapabilityPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityPool")
            .field("num_capabilities", &self.num_capabilities)
            .finish()
    }
}

/// Worker thread main loop
fn worker_loop(
    receiver: Arc<Receiver<BoxedJob>>,
    cap: Arc<WorkerCapability>,
    config: Arc<RtsConfig>,
    interpreter: Option<Arc<dyn Interpreter>>,
) {
    let cap: Arc<dyn Capability> = cap;
    // recv fails once the channel is closed and drained
    while let Ok(job) = receiver.recv() {
        let mut ctx = StgContext::new(Task::new(), Arc::clone(&cap), Arc::clone(&config));
        if let Some(interp) = &interpreter {
            ctx = ctx.with_interpreter(Arc::clone(interp));
        }
        let task = ctx.task_id();
        if panic::catch_unwind(AssertUnwindSafe(|| job(&mut ctx))).is_err() {
            // the job's claims were released while unwinding
            warn!(target: "lazyrts::sched", %task, "job panicked, worker continues");
        }
    }
}

/// A receiver for the result of a spawned job
pub struct ResultReceiver<T> {
    receiver: Receiver<T>,
}

impl<T> ResultReceiver<T> {
    /// Block until the result is available
    pub fn recv(self) -> Result<T, RecvError> {
        self.receiver.recv().map_err(|_| RecvError)
    }
}

/// Errors raised by [`CapabilityPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The configuration failed validation
    Config(String),
    /// A worker thread could not be started
    Spawn(String),
    /// Every worker has exited
    ShutDown,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Config(msg) => write!(f, "Invalid pool configuration: {}", msg),
            PoolError::Spawn(msg) => write!(f, "Failed to spawn capability worker: {}", msg),
            PoolError::ShutDown => write!(f, "Capability pool has been shut down"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Error returned when the job was dropped before producing a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job dropped before producing a result")
    }
}

impl std::error::Error for RecvError {}
