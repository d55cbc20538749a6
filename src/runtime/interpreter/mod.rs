//! Compiled closures and the hook to the bytecode interpreter.
//!
//! The instruction set and its execution live outside this crate. A host
//! installs an [`Interpreter`] on each [`StgContext`]; applying a
//! [`Value::Bco`](crate::runtime::stg::Value::Bco) closure hands the closure
//! and its arguments to it.

mod bco;

pub use bco::{Bco, BcoBitmap};

use crate::runtime::error::RtsResult;
use crate::runtime::stg::{Args, Closure, StgContext};

/// Entry point of an external bytecode interpreter.
pub trait Interpreter: Send + Sync {
    /// Run `bco` saturated with `args`, returning the resulting closure.
    fn run(&self, ctx: &mut StgContext, bco: &Bco, args: Args) -> RtsResult<Closure>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::config::RtsConfig;
    use crate::runtime::error::RtsError;
    use std::sync::Arc;

    /// Returns the first pointer sub-closure, or the argument count.
    struct FirstPtr;

    impl Interpreter for FirstPtr {
        fn run(&self, _ctx: &mut StgContext, bco: &Bco, args: Args) -> RtsResult<Closure> {
            if args.len() != bco.arity() {
                return Err(RtsError::Interpreter(format!("expected {} args", bco.arity())));
            }
            Ok(bco.ptrs().first().cloned().unwrap_or_else(|| Closure::int(args.len() as i32)))
        }
    }

    fn sample() -> Closure {
        let bco = Bco::new(vec![0u8], vec![], vec![Closure::long(99)], 1, BcoBitmap::from_pointer_slots(&[true])).unwrap();
        Closure::bco(bco)
    }

    #[test]
    fn test_bco_is_a_value() {
        let c = sample();
        assert!(c.is_value());
        assert!(c.get_evaluated().is_some());
    }

    #[test]
    fn test_apply_without_interpreter() {
        let mut ctx = StgContext::standalone(RtsConfig::default());
        let c = sample();
        let err = c.apply_p(&mut ctx, Closure::int(0)).unwrap_err();
        assert_eq!(err, RtsError::NoInterpreter { node: c.node_id() });
    }

    #[test]
    fn test_apply_runs_installed_interpreter() {
        let mut ctx = StgContext::standalone(RtsConfig::default()).with_interpreter(Arc::new(FirstPtr));
        let r = sample().apply_p(&mut ctx, Closure::int(0)).unwrap();
        assert_eq!(r.as_value().unwrap().as_long(), Some(99));
    }
}
