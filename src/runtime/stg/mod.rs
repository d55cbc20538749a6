//! Graph nodes and the uniform calling surface.
//!
//! Every node in the thunk/value graph is reached through a [`Closure`]
//! handle. A node is either a terminal [`Value`] or a suspended
//! [`Thunk`](crate::runtime::thunk::Thunk); callers use `enter`, `evaluate`,
//! `get_evaluated` and the apply family without caring which.

pub mod args;
pub mod closure;
pub mod context;
pub mod data_con;
pub mod value;

pub use args::{Arg, Args, ObjectRef};
pub use closure::{Closure, Node, NodeId, WeakClosure};
pub use context::{Registers, StgContext};
pub use data_con::{DataCon, Field};
pub use value::{Function, NativeCode, Value};
