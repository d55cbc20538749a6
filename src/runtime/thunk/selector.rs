//! Selector thunks: project one field of a lazily produced constructor.
//!
//! The selected field is also written to the matching return register of the
//! calling context, so a caller that only needs the unboxed field can read it
//! from there without touching the heap result.

use crate::runtime::error::{RtsError, RtsResult};
use crate::runtime::stg::{Closure, StgContext, Value};

use super::kind::{FreeVars, ThunkKind};
use super::Thunk;

/// Which typed accessor a selector uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Ptr,
    Int,
    Long,
    Float,
    Double,
}

impl SelectorKind {
    pub(crate) fn suffix(self) -> &'static str {
        match self {
            SelectorKind::Ptr => "p",
            SelectorKind::Int => "i",
            SelectorKind::Long => "l",
            SelectorKind::Float => "f",
            SelectorKind::Double => "d",
        }
    }
}

#[derive(Clone)]
pub(crate) struct SelectorBody {
    pub(crate) index: usize,
    pub(crate) producer: Closure,
}

pub(crate) fn enter(kind: SelectorKind, body: &SelectorBody, ctx: &mut StgContext) -> RtsResult<Closure> {
    let whnf = body.producer.evaluate(ctx)?;
    let con = match whnf.as_value() {
        Some(Value::Data(con)) => con,
        other => {
            return Err(RtsError::NotAConstructor {
                node: body.producer.node_id(),
                description: other.map_or_else(|| "thunk".to_string(), Value::describe),
            })
        }
    };
    let i = body.index;
    let regs = ctx.registers_mut();
    match kind {
        SelectorKind::Ptr => {
            let field = con.field_as_pointer(i)?;
            regs.r1 = Some(field.clone());
            Ok(field)
        }
        SelectorKind::Int => {
            let v = con.field_as_int(i)?;
            regs.int = v;
            Ok(Closure::int(v))
        }
        SelectorKind::Long => {
            let v = con.field_as_long(i)?;
            regs.long = v;
            Ok(Closure::long(v))
        }
        SelectorKind::Float => {
            let v = con.field_as_float(i)?;
            regs.float = v;
            Ok(Closure::float(v))
        }
        SelectorKind::Double => {
            let v = con.field_as_double(i)?;
            regs.double = v;
            Ok(Closure::double(v))
        }
    }
}

impl Closure {
    /// Thunk selecting field `index` of whatever `producer` evaluates to.
    pub fn selector(kind: SelectorKind, index: usize, producer: Closure) -> Closure {
        let body = SelectorBody { index, producer };
        Closure::from_thunk(Thunk::new(ThunkKind::Selector(kind, FreeVars::new(body))))
    }

    pub fn selector_p(index: usize, producer: Closure) -> Closure {
        Self::selector(SelectorKind::Ptr, index, producer)
    }

    pub fn selector_i(index: usize, producer: Closure) -> Closure {
        Self::selector(SelectorKind::Int, index, producer)
    }

    pub fn selector_l(index: usize, producer: Closure) -> Closure {
        Self::selector(SelectorKind::Long, index, producer)
    }

    pub fn selector_f(index: usize, producer: Closure) -> Closure {
        Self::selector(SelectorKind::Float, index, producer)
    }

    pub fn selector_d(index: usize, producer: Closure) -> Closure {
        Self::selector(SelectorKind::Double, index, producer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::config::RtsConfig;
    use crate::runtime::stg::Field;

    fn ctx() -> StgContext {
        StgContext::standalone(RtsConfig::default())
    }

    #[test]
    fn test_pointer_selector_returns_field_identity() {
        let mut ctx = ctx();
        let f1 = Closure::long(1);
        let fields = vec![Field::Ptr(Closure::long(0)), Field::Ptr(f1.clone()), Field::Ptr(Closure::long(2))];
        let producer = Closure::thunk(move |_ctx| Ok(Closure::data(1, fields.clone())));
        let sel = Closure::selector_p(1, producer);

        let first = sel.evaluate(&mut ctx).unwrap();
        assert!(first.ptr_eq(&f1));
        assert!(ctx.registers().r1.as_ref().unwrap().ptr_eq(&f1));
        let second = sel.evaluate(&mut ctx).unwrap();
        assert!(second.ptr_eq(&first));
    }

    #[test]
    fn test_selected_thunk_field_is_forced() {
        let mut ctx = ctx();
        let lazy_field = Closure::thunk(|_ctx| Ok(Closure::int(8)));
        let producer = Closure::data(2, vec![Field::Ptr(lazy_field.clone())]);
        let sel = Closure::selector_p(0, producer);
        let r = sel.evaluate(&mut ctx).unwrap();
        assert_eq!(r.as_value().unwrap().as_int(), Some(8));
        assert!(lazy_field.get_evaluated().unwrap().ptr_eq(&r));
    }

    #[test]
    fn test_unboxed_selectors_fill_registers() {
        let mut ctx = ctx();
        let producer = Closure::data(
            1,
            vec![Field::Int(3), Field::Long(4), Field::Float(0.5), Field::Double(0.25)],
        );
        let i = Closure::selector_i(0, producer.clone()).evaluate(&mut ctx).unwrap();
        assert_eq!(i.as_value().unwrap().as_int(), Some(3));
        assert_eq!(ctx.registers().int, 3);

        let l = Closure::selector_l(1, producer.clone()).evaluate(&mut ctx).unwrap();
        assert_eq!(l.as_value().unwrap().as_long(), Some(4));
        assert_eq!(ctx.registers().long, 4);

        Closure::selector_f(2, producer.clone()).evaluate(&mut ctx).unwrap();
        assert_eq!(ctx.registers().float, 0.5);

        let sel_d = Closure::selector_d(3, producer);
        let d = sel_d.evaluate(&mut ctx).unwrap();
        assert_eq!(ctx.registers().double, 0.25);
        assert!(sel_d.get_evaluated().unwrap().ptr_eq(&d));
    }

    #[test]
    fn test_selector_on_non_constructor() {
        let mut ctx = ctx();
        let producer = Closure::int(0);
        let err = Closure::selector_p(0, producer.clone()).evaluate(&mut ctx).unwrap_err();
        assert!(matches!(err, RtsError::NotAConstructor { node, .. } if node == producer.node_id()));
    }

    #[test]
    fn test_wrong_field_type() {
        let mut ctx = ctx();
        let producer = Closure::data(1, vec![Field::Int(1)]);
        let sel = Closure::selector_d(0, producer);
        let err = sel.evaluate(&mut ctx).unwrap_err();
        assert!(matches!(err, RtsError::FieldType { .. }));
        // failed evaluation leaves the thunk unevaluated
        assert!(sel.get_evaluated().is_none());
    }
}
