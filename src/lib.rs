//! lazyrts - Thunk/Value Graph Core
//!
//! This library is the execution core of a lazy graph-reduction runtime. It
//! represents suspended computations (thunks) and evaluated values as nodes
//! of a shared, concurrently mutated graph, and guarantees that each thunk is
//! updated at most once even when several workers force it at the same time.
//!
//! # Architecture
//!
//! 1. **Closures** (`runtime::stg`)
//!    - [`Closure`] is a shared handle to a node: a [`Value`] or a [`Thunk`]
//!    - `enter`, `evaluate`, `get_evaluated` and the apply family
//!      (`apply_v` ... `apply_pppppp`) work on any node
//!    - Values include constructors with typed field accessors, native
//!      functions and compiled bytecode closures
//!
//! 2. **Thunks** (`runtime::thunk`)
//!    - One atomic indirection slot per thunk, mutated only by CAS
//!    - Generic, application (`Ap`), selector and CAF variants
//!    - Optional eager blackholing with blocking queues
//!    - Revertible CAF registry for interactive reload
//!
//! 3. **Scheduler interface** (`runtime::sched`)
//!    - [`Capability`] trait consumed by the update protocol
//!    - A reference host ([`CapabilityPool`]) that runs each job as a task
//!      on one of a fixed set of worker threads
//!
//! # Example
//!
//! ```rust
//! use lazyrts::{Closure, RtsConfig, StgContext};
//!
//! let mut ctx = StgContext::standalone(RtsConfig::default());
//! let add = Closure::function("add", 2, |_ctx, args| {
//!     let x = args[0].as_ptr().and_then(|c| c.as_value()?.as_long()).unwrap_or(0);
//!     let y = args[1].as_ptr().and_then(|c| c.as_value()?.as_long()).unwrap_or(0);
//!     Ok(Closure::long(x + y))
//! });
//! let sum = Closure::ap(add, [Closure::long(20), Closure::long(22)]);
//!
//! let v = sum.evaluate(&mut ctx).unwrap();
//! assert_eq!(v.as_value().and_then(|v| v.as_long()), Some(42));
//! // memoized: the same node comes back
//! assert!(sum.evaluate(&mut ctx).unwrap().ptr_eq(&v));
//! ```
//!
//! # Configuration
//!
//! [`RtsConfig`] is read from TOML; see [`runtime::config`] for the keys.
//! Logging goes through `tracing`; [`runtime::logging::init`] installs a
//! subscriber for hosts that have none.

pub mod runtime;

pub use runtime::{
    revert_cafs, set_keep_cafs, reset_keep_cafs, should_keep_cafs, Arg, Args, Bco, BcoBitmap,
    BlockingQueue, CafRegistry, Capability, CapabilityPool, Closure, ConfigError, DataCon, DebugFlags,
    Field, Function, Interpreter, MessageBlackHole, Node, NodeId, ObjectRef, PoolError, Registers,
    RtsConfig, RtsError, RtsResult, SelectorKind, StgContext, Task, TaskId, TaskRef, Thunk, ThunkCode,
    ThunkState, Value, WeakClosure, WhyBlocked, WorkerCapability,
};
