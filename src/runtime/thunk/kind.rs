//! Thunk variants and their free variables.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::error::RtsResult;
use crate::runtime::stg::{Closure, StgContext};

use super::ap::{self, ApBody};
use super::selector::{self, SelectorBody, SelectorKind};

/// Suspended code of a generic thunk or CAF.
pub type ThunkCode = Arc<dyn Fn(&mut StgContext) -> RtsResult<Closure> + Send + Sync>;

/// Free variables of a thunk, dropped once the thunk is updated.
pub(crate) struct FreeVars<T>(Mutex<Option<T>>);

impl<T: Clone> FreeVars<T> {
    pub(crate) fn new(vars: T) -> Self {
        FreeVars(Mutex::new(Some(vars)))
    }

    /// A copy to evaluate with, or `None` once cleared.
    pub(crate) fn snapshot(&self) -> Option<T> {
        self.0.lock().clone()
    }

    pub(crate) fn clear(&self) {
        let taken = self.0.lock().take();
        // drop outside the lock; may release large subgraphs
        drop(taken);
    }

    pub(crate) fn is_cleared(&self) -> bool {
        self.0.lock().is_none()
    }
}

pub(crate) enum ThunkKind {
    /// Arbitrary suspended code; its captures are its free variables.
    Updatable(FreeVars<ThunkCode>),
    /// Saturated application of stored pointer arguments.
    Ap(FreeVars<ApBody>),
    /// Projection of one field of a constructed value.
    Selector(SelectorKind, FreeVars<SelectorBody>),
    /// Top-level constant. The code is kept so the CAF can be re-run after a
    /// revert.
    Caf(ThunkCode),
}

impl ThunkKind {
    /// Run the suspended computation. `Ok(None)` means the free variables
    /// were cleared by a concurrent update and the slot should be re-read.
    pub(crate) fn thunk_enter(&self, ctx: &mut StgContext) -> RtsResult<Option<Closure>> {
        match self {
            ThunkKind::Updatable(vars) => match vars.snapshot() {
                Some(code) => code(ctx).map(Some),
                None => Ok(None),
            },
            ThunkKind::Ap(vars) => match vars.snapshot() {
                Some(body) => ap::enter(&body, ctx).map(Some),
                None => Ok(None),
            },
            ThunkKind::Selector(kind, vars) => match vars.snapshot() {
                Some(body) => selector::enter(*kind, &body, ctx).map(Some),
                None => Ok(None),
            },
            ThunkKind::Caf(code) => code(ctx).map(Some),
        }
    }

    pub(crate) fn clear_free_variables(&self) {
        match self {
            ThunkKind::Updatable(vars) => vars.clear(),
            ThunkKind::Ap(vars) => vars.clear(),
            ThunkKind::Selector(_, vars) => vars.clear(),
            ThunkKind::Caf(_) => {}
        }
    }

    pub(crate) fn free_variables_cleared(&self) -> bool {
        match self {
            ThunkKind::Updatable(vars) => vars.is_cleared(),
            ThunkKind::Ap(vars) => vars.is_cleared(),
            ThunkKind::Selector(_, vars) => vars.is_cleared(),
            ThunkKind::Caf(_) => false,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            ThunkKind::Updatable(_) => "thunk".to_string(),
            ThunkKind::Ap(vars) => match vars.snapshot() {
                Some(body) => format!("ap/{}", body.args.len()),
                None => "ap".to_string(),
            },
            ThunkKind::Selector(kind, vars) => match vars.snapshot() {
                Some(body) => format!("sel_{}[{}]", kind.suffix(), body.index),
                None => format!("sel_{}", kind.suffix()),
            },
            ThunkKind::Caf(_) => "caf".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_drops_captures() {
        let captured = Closure::int(5);
        let weak = captured.downgrade();
        let code: ThunkCode = {
            let captured = captured.clone();
            Arc::new(move |_ctx: &mut StgContext| -> RtsResult<Closure> { Ok(captured.clone()) })
        };
        drop(captured);

        let kind = ThunkKind::Updatable(FreeVars::new(code));
        assert!(weak.upgrade().is_some());
        assert!(!kind.free_variables_cleared());
        kind.clear_free_variables();
        assert!(kind.free_variables_cleared());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_caf_code_survives_clear() {
        let kind = ThunkKind::Caf(Arc::new(|_ctx: &mut StgContext| -> RtsResult<Closure> { Ok(Closure::int(1)) }));
        kind.clear_free_variables();
        assert!(!kind.free_variables_cleared());
        assert_eq!(kind.describe(), "caf");
    }
}
