//! The thunk/value graph and its update protocol.

pub mod config;
pub mod error;
pub mod interpreter;
pub mod logging;
pub mod sched;
pub mod stg;
pub mod thunk;

pub use config::{ConfigError, DebugFlags, RtsConfig};
pub use error::{RtsError, RtsResult};
pub use interpreter::{Bco, BcoBitmap, Interpreter};
pub use sched::{
    BlockingQueue, Capability, CapabilityPool, MessageBlackHole, PoolError, Task, TaskId, TaskRef,
    WhyBlocked, WorkerCapability,
};
pub use stg::{
    Arg, Args, Closure, DataCon, Field, Function, Node, NodeId, ObjectRef, Registers, StgContext, Value,
    WeakClosure,
};
pub use thunk::{
    reset_keep_cafs, revert_cafs, set_keep_cafs, should_keep_cafs, CafRegistry, SelectorKind, Thunk,
    ThunkCode, ThunkState,
};
