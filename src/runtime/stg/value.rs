//! Terminal (WHNF) nodes.
//!
//! A [`Value`] is never entered: reaching one through `enter` means the graph
//! was built wrong upstream, and is reported as a fatal error by
//! [`Closure::enter`]. Values are applied through the apply family; only
//! functions and compiled closures accept arguments.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::runtime::error::{RtsError, RtsResult};
use crate::runtime::interpreter::Bco;

use super::{Args, Closure, DataCon, ObjectRef, StgContext};

/// Native entry code of a [`Function`]. Receives exactly `arity` arguments.
pub type NativeCode = dyn Fn(&mut StgContext, Args) -> RtsResult<Closure> + Send + Sync;

/// A function value implemented by host code.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    arity: usize,
    code: Arc<NativeCode>,
}

impl Function {
    pub fn new<F>(name: &str, arity: usize, code: F) -> Self
    where
        F: Fn(&mut StgContext, Args) -> RtsResult<Closure> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            arity,
            code: Arc::new(code),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Saturated call: `args.len()` must equal the arity.
    #[inline]
    fn call(&self, ctx: &mut StgContext, args: Args) -> RtsResult<Closure> {
        (self.code)(ctx, args)
    }
}

/// An already-reduced node.
#[derive(Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(ObjectRef),
    Data(DataCon),
    Function(Function),
    /// Compiled bytecode closure
    Bco(Bco),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Long(_) => "Long",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::Object(_) => "Object",
            Value::Data(_) => "Data",
            Value::Function(_) => "Function",
            Value::Bco(_) => "Bco",
        }
    }

    /// One-line description that does not walk into sub-closures.
    pub fn describe(&self) -> String {
        match self {
            Value::Int(i) => format!("Int({})", i),
            Value::Long(l) => format!("Long({})", l),
            Value::Float(x) => format!("Float({})", x),
            Value::Double(d) => format!("Double({})", d),
            Value::Object(_) => "Object".to_string(),
            Value::Data(con) => format!("Con{}/{}", con.tag(), con.arity()),
            Value::Function(func) => format!("Function({}/{})", func.name(), func.arity()),
            Value::Bco(bco) => format!("Bco(arity {})", bco.arity()),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataCon> {
        match self {
            Value::Data(con) => Some(con),
            _ => None,
        }
    }

    /// Apply this value, reached through `this`, to `args`.
    pub(crate) fn apply(&self, this: &Closure, ctx: &mut StgContext, mut args: Args) -> RtsResult<Closure> {
        match self {
            Value::Function(func) => match args.len().cmp(&func.arity()) {
                Ordering::Equal => func.call(ctx, args),
                Ordering::Greater => {
                    let rest: Args = args.drain(func.arity()..).collect();
                    let result = func.call(ctx, args)?;
                    result.apply(ctx, rest)
                }
                Ordering::Less => Err(RtsError::ArityMismatch {
                    node: this.node_id(),
                    arity: func.arity(),
                    supplied: args.len(),
                }),
            },
            Value::Bco(bco) => {
                let interpreter = ctx
                    .interpreter()
                    .cloned()
                    .ok_or(RtsError::NoInterpreter { node: this.node_id() })?;
                interpreter.run(ctx, bco, args)
            }
            other => Err(RtsError::NotAFunction {
                node: this.node_id(),
                description: other.describe(),
            }),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Data(con) => write!(f, "{:?}", con),
            other => f.write_str(&other.describe()),
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<DataCon> for Value {
    fn from(con: DataCon) -> Self {
        Value::Data(con)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}
