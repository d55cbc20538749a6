//! The [`Closure`] handle and the apply family.
//!
//! # Design
//!
//! A closure is an `Arc` to a [`Node`], which is a tagged union of the two
//! node kinds. Node identity is pointer identity: two handles denote the same
//! node iff [`Closure::ptr_eq`]. Cloning a handle only bumps the reference
//! count, which is how sub-terms are shared across the graph.
//!
//! ```text
//! Closure ──> Node::Value(Value)                 terminal
//!         └─> Node::Thunk(Thunk) ──indirectee──> Value closure once updated
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use smallvec::smallvec;
use tracing::debug;

use crate::runtime::error::{barf, RtsError, RtsResult};
use crate::runtime::interpreter::Bco;
use crate::runtime::thunk::Thunk;

use super::{Arg, Args, DataCon, Field, Function, ObjectRef, StgContext, Value};

/// Identity of a graph node, used in diagnostics and for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:#x}", self.0)
    }
}

/// What a graph node is.
pub enum Node {
    Value(Value),
    Thunk(Thunk),
}

/// Shared handle to a graph node.
#[derive(Clone)]
pub struct Closure(Arc<Node>);

/// Non-owning handle; does not keep the node reachable.
#[derive(Clone)]
pub struct WeakClosure(Weak<Node>);

impl WeakClosure {
    pub fn upgrade(&self) -> Option<Closure> {
        self.0.upgrade().map(Closure)
    }
}

impl fmt::Debug for WeakClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(c) => write!(f, "Weak({:?})", c),
            None => write!(f, "Weak(<dropped>)"),
        }
    }
}

impl Closure {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn from_value(value: Value) -> Self {
        Closure(Arc::new(Node::Value(value)))
    }

    pub(crate) fn from_thunk(thunk: Thunk) -> Self {
        Closure(Arc::new(Node::Thunk(thunk)))
    }

    pub fn int(i: i32) -> Self {
        Self::from_value(Value::Int(i))
    }

    pub fn long(l: i64) -> Self {
        Self::from_value(Value::Long(l))
    }

    pub fn float(x: f32) -> Self {
        Self::from_value(Value::Float(x))
    }

    pub fn double(d: f64) -> Self {
        Self::from_value(Value::Double(d))
    }

    pub fn object(o: ObjectRef) -> Self {
        Self::from_value(Value::Object(o))
    }

    /// Constructed value with the given tag and payload.
    pub fn data(tag: u32, fields: Vec<Field>) -> Self {
        Self::from_value(Value::Data(DataCon::new(tag, fields)))
    }

    /// Native function of fixed arity.
    pub fn function<F>(name: &str, arity: usize, code: F) -> Self
    where
        F: Fn(&mut StgContext, Args) -> RtsResult<Closure> + Send + Sync + 'static,
    {
        Self::from_value(Value::Function(Function::new(name, arity, code)))
    }

    /// Compiled bytecode closure. Construction performs no computation.
    pub fn bco(bco: Bco) -> Self {
        Self::from_value(Value::Bco(bco))
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[inline]
    pub fn node(&self) -> &Node {
        &self.0
    }

    #[inline]
    pub fn node_id(&self) -> NodeId {
        NodeId(Arc::as_ptr(&self.0) as *const () as usize)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Closure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakClosure {
        WeakClosure(Arc::downgrade(&self.0))
    }

    /// Number of strong handles to this node (reachability checks in tests).
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    #[inline]
    pub fn is_value(&self) -> bool {
        matches!(self.node(), Node::Value(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self.node() {
            Node::Value(v) => Some(v),
            Node::Thunk(_) => None,
        }
    }

    pub fn as_thunk(&self) -> Option<&Thunk> {
        match self.node() {
            Node::Thunk(t) => Some(t),
            Node::Value(_) => None,
        }
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Perform one evaluation step.
    ///
    /// Entering a value is a contract violation and yields the fatal
    /// [`RtsError::ValueEntered`].
    pub fn enter(&self, ctx: &mut StgContext) -> RtsResult<Closure> {
        match self.node() {
            Node::Value(v) => Err(barf(RtsError::ValueEntered {
                node: self.node_id(),
                description: v.describe(),
            })),
            Node::Thunk(t) => t.enter(self, ctx),
        }
    }

    /// Force to weak head normal form.
    pub fn evaluate(&self, ctx: &mut StgContext) -> RtsResult<Closure> {
        let mut current = self.clone();
        loop {
            if let Some(v) = current.get_evaluated() {
                return Ok(v);
            }
            current = current.enter(ctx)?;
        }
    }

    /// The WHNF of this node if it is already known, without blocking.
    pub fn get_evaluated(&self) -> Option<Closure> {
        match self.node() {
            Node::Value(_) => Some(self.clone()),
            Node::Thunk(t) => t.get_evaluated(),
        }
    }

    /// Serialised entry: waits for another task's evaluation instead of
    /// duplicating it. Values return themselves.
    pub fn black_hole(&self, ctx: &mut StgContext) -> RtsResult<Closure> {
        match self.node() {
            Node::Value(_) => Ok(self.clone()),
            Node::Thunk(t) => t.black_hole(self, ctx),
        }
    }

    // ------------------------------------------------------------------
    // Apply family
    // ------------------------------------------------------------------

    /// Saturated application to an arbitrary argument list.
    ///
    /// A thunk is forced (or its memoized value used) before application.
    pub fn apply(&self, ctx: &mut StgContext, args: Args) -> RtsResult<Closure> {
        if ctx.config().debug.apply {
            debug!(
                target: "lazyrts::apply",
                node = %self.node_id(),
                shape = %super::args::shape_of(&args),
                "apply"
            );
        }
        match self.node() {
            Node::Value(v) => v.apply(self, ctx, args),
            Node::Thunk(t) => {
                let fun = match t.get_evaluated() {
                    Some(v) => v,
                    None => self.enter(ctx)?,
                };
                fun.apply(ctx, args)
            }
        }
    }

    pub fn apply_v(&self, ctx: &mut StgContext) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Void])
    }

    pub fn apply_n(&self, ctx: &mut StgContext, n: i32) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Int(n)])
    }

    pub fn apply_l(&self, ctx: &mut StgContext, l: i64) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Long(l)])
    }

    pub fn apply_f(&self, ctx: &mut StgContext, f: f32) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Float(f)])
    }

    pub fn apply_d(&self, ctx: &mut StgContext, d: f64) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Double(d)])
    }

    pub fn apply_o(&self, ctx: &mut StgContext, o: ObjectRef) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Object(o)])
    }

    pub fn apply_p(&self, ctx: &mut StgContext, p: Closure) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Ptr(p)])
    }

    pub fn apply_pv(&self, ctx: &mut StgContext, p: Closure) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Ptr(p), Arg::Void])
    }

    pub fn apply_pp(&self, ctx: &mut StgContext, p1: Closure, p2: Closure) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Ptr(p1), Arg::Ptr(p2)])
    }

    pub fn apply_ppv(&self, ctx: &mut StgContext, p1: Closure, p2: Closure) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Ptr(p1), Arg::Ptr(p2), Arg::Void])
    }

    pub fn apply_ppp(
        &self,
        ctx: &mut StgContext,
        p1: Closure,
        p2: Closure,
        p3: Closure,
    ) -> RtsResult<Closure> {
        self.apply(ctx, smallvec![Arg::Ptr(p1), Arg::Ptr(p2), Arg::Ptr(p3)])
    }

    pub fn apply_pppv(
        &self,
        ctx: &mut StgContext,
        p1: Closure,
        p2: Closure,
        p3: Closure,
    ) -> RtsResult<Closure> {
        self.apply(
            ctx,
            smallvec![Arg::Ptr(p1), Arg::Ptr(p2), Arg::Ptr(p3), Arg::Void],
        )
    }

    pub fn apply_pppp(
        &self,
        ctx: &mut StgContext,
        p1: Closure,
        p2: Closure,
        p3: Closure,
        p4: Closure,
    ) -> RtsResult<Closure> {
        self.apply(
            ctx,
            smallvec![Arg::Ptr(p1), Arg::Ptr(p2), Arg::Ptr(p3), Arg::Ptr(p4)],
        )
    }

    pub fn apply_ppppp(
        &self,
        ctx: &mut StgContext,
        p1: Closure,
        p2: Closure,
        p3: Closure,
        p4: Closure,
        p5: Closure,
    ) -> RtsResult<Closure> {
        self.apply(
            ctx,
            smallvec![
                Arg::Ptr(p1),
                Arg::Ptr(p2),
                Arg::Ptr(p3),
                Arg::Ptr(p4),
                Arg::Ptr(p5)
            ],
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply_pppppp(
        &self,
        ctx: &mut StgContext,
        p1: Closure,
        p2: Closure,
        p3: Closure,
        p4: Closure,
        p5: Closure,
        p6: Closure,
    ) -> RtsResult<Closure> {
        self.apply(
            ctx,
            smallvec![
                Arg::Ptr(p1),
                Arg::Ptr(p2),
                Arg::Ptr(p3),
                Arg::Ptr(p4),
                Arg::Ptr(p5),
                Arg::Ptr(p6)
            ],
        )
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Value(v) => write!(f, "{:?}", v),
            Node::Thunk(t) => write!(f, "Thunk{}[{}]", self.node_id(), t.describe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::config::RtsConfig;

    fn ctx() -> StgContext {
        StgContext::standalone(RtsConfig::default())
    }

    fn add() -> Closure {
        Closure::function("add", 2, |_ctx, args| {
            let a = args[0].as_ptr().and_then(|c| c.as_value()?.as_long()).unwrap_or(0);
            let b = args[1].as_ptr().and_then(|c| c.as_value()?.as_long()).unwrap_or(0);
            Ok(Closure::long(a + b))
        })
    }

    #[test]
    fn test_entering_value_is_fatal() {
        let mut ctx = ctx();
        let v = Closure::int(42);
        let err = v.enter(&mut ctx).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, RtsError::ValueEntered { node, .. } if node == v.node_id()));
    }

    #[test]
    fn test_value_evaluates_to_itself() {
        let mut ctx = ctx();
        let v = Closure::long(7);
        assert!(v.get_evaluated().unwrap().ptr_eq(&v));
        assert!(v.evaluate(&mut ctx).unwrap().ptr_eq(&v));
        assert!(v.black_hole(&mut ctx).unwrap().ptr_eq(&v));
    }

    #[test]
    fn test_exact_application() {
        let mut ctx = ctx();
        let r = add().apply_pp(&mut ctx, Closure::long(2), Closure::long(3)).unwrap();
        assert_eq!(r.as_value().unwrap().as_long(), Some(5));
    }

    #[test]
    fn test_under_saturated_application() {
        let mut ctx = ctx();
        let f = add();
        let err = f.apply_p(&mut ctx, Closure::long(1)).unwrap_err();
        assert_eq!(
            err,
            RtsError::ArityMismatch {
                node: f.node_id(),
                arity: 2,
                supplied: 1
            }
        );
    }

    #[test]
    fn test_over_saturated_application() {
        let mut ctx = ctx();
        // const returns `add`, which then consumes the remaining two arguments
        let konst = Closure::function("const-add", 1, |_ctx, _args| Ok(add()));
        let r = konst
            .apply_ppp(&mut ctx, Closure::int(0), Closure::long(4), Closure::long(6))
            .unwrap();
        assert_eq!(r.as_value().unwrap().as_long(), Some(10));
    }

    #[test]
    fn test_apply_void_and_unboxed_shapes() {
        let mut ctx = ctx();
        let unit = Closure::function("unit", 1, |_ctx, args| {
            assert!(matches!(args[0], Arg::Void));
            Ok(Closure::int(1))
        });
        assert_eq!(unit.apply_v(&mut ctx).unwrap().as_value().unwrap().as_int(), Some(1));

        let neg = Closure::function("neg", 1, |_ctx, args| Ok(Closure::double(-args[0].as_double().unwrap_or(0.0))));
        let r = neg.apply_d(&mut ctx, 2.5).unwrap();
        assert_eq!(r.as_value().unwrap().as_double(), Some(-2.5));
    }

    #[test]
    fn test_applying_non_function() {
        let mut ctx = ctx();
        let err = Closure::int(3).apply_n(&mut ctx, 1).unwrap_err();
        assert!(matches!(err, RtsError::NotAFunction { .. }));
    }

    #[test]
    fn test_applying_thunk_forces_it_first() {
        let mut ctx = ctx();
        let fun = Closure::thunk(|_ctx| Ok(add()));
        let r = fun.apply_pp(&mut ctx, Closure::long(20), Closure::long(22)).unwrap();
        assert_eq!(r.as_value().unwrap().as_long(), Some(42));
        assert!(fun.get_evaluated().is_some());
    }

    #[test]
    fn test_weak_handle() {
        let c = Closure::int(1);
        let w = c.downgrade();
        assert!(w.upgrade().unwrap().ptr_eq(&c));
        drop(c);
        assert!(w.upgrade().is_none());
    }
}
