//! Scheduler-facing interfaces.
//!
//! The thunk protocol talks to the scheduler only through the [`Capability`]
//! trait, [`Task`] handles and [`BlockingQueue`]s. [`WorkerCapability`] and
//! [`CapabilityPool`] are a small reference host that parks OS threads; a
//! production scheduler would implement [`Capability`] over its own run
//! queues instead.

pub mod blocking_queue;
pub mod capability;
pub mod pool;
pub mod task;

pub use blocking_queue::{BlockingQueue, MessageBlackHole};
pub use capability::{Capability, WorkerCapability};
pub use pool::{CapabilityPool, PoolError, RecvError, ResultReceiver};
pub use task::{Task, TaskId, TaskRef, WhyBlocked};
