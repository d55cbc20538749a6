//! Saturated-application thunks.

use smallvec::SmallVec;

use crate::runtime::error::RtsResult;
use crate::runtime::stg::{Arg, Args, Closure, StgContext};

use super::kind::{FreeVars, ThunkKind};
use super::Thunk;

#[derive(Clone)]
pub(crate) struct ApBody {
    pub(crate) fun: Closure,
    pub(crate) args: SmallVec<[Closure; 6]>,
}

/// Apply the stored function with the apply-family member matching the
/// number of stored arguments.
pub(crate) fn enter(body: &ApBody, ctx: &mut StgContext) -> RtsResult<Closure> {
    let f = &body.fun;
    match body.args.as_slice() {
        [] => f.evaluate(ctx),
        [a] => f.apply_p(ctx, a.clone()),
        [a, b] => f.apply_pp(ctx, a.clone(), b.clone()),
        [a, b, c] => f.apply_ppp(ctx, a.clone(), b.clone(), c.clone()),
        [a, b, c, d] => f.apply_pppp(ctx, a.clone(), b.clone(), c.clone(), d.clone()),
        [a, b, c, d, e] => f.apply_ppppp(ctx, a.clone(), b.clone(), c.clone(), d.clone(), e.clone()),
        [a, b, c, d, e, g] => {
            f.apply_pppppp(ctx, a.clone(), b.clone(), c.clone(), d.clone(), e.clone(), g.clone())
        }
        more => {
            let args: Args = more.iter().cloned().map(Arg::Ptr).collect();
            f.apply(ctx, args)
        }
    }
}

impl Closure {
    /// Thunk for `fun` applied to `args`. The function and the arguments are
    /// released once the thunk is updated.
    pub fn ap(fun: Closure, args: impl IntoIterator<Item = Closure>) -> Closure {
        let body = ApBody {
            fun,
            args: args.into_iter().collect(),
        };
        Closure::from_thunk(Thunk::new(ThunkKind::Ap(FreeVars::new(body))))
    }
}
