//! Apply-family arguments.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::Closure;

/// Opaque host object passed through the `O` argument shape.
pub type ObjectRef = Arc<dyn Any + Send + Sync>;

/// Argument vector; the fixed apply shapes carry at most six.
pub type Args = SmallVec<[Arg; 6]>;

/// One argument of a saturated application.
#[derive(Clone)]
pub enum Arg {
    /// Pointer to another graph node (`P`)
    Ptr(Closure),
    /// Unboxed 32-bit integer (`N`)
    Int(i32),
    /// Unboxed 64-bit integer (`L`)
    Long(i64),
    /// Unboxed single-precision float (`F`)
    Float(f32),
    /// Unboxed double-precision float (`D`)
    Double(f64),
    /// Host object (`O`)
    Object(ObjectRef),
    /// Trailing unit argument (`V`)
    Void,
}

impl Arg {
    /// Short name of the argument shape, as used in the apply method names.
    pub fn shape(&self) -> char {
        match self {
            Arg::Ptr(_) => 'P',
            Arg::Int(_) => 'N',
            Arg::Long(_) => 'L',
            Arg::Float(_) => 'F',
            Arg::Double(_) => 'D',
            Arg::Object(_) => 'O',
            Arg::Void => 'V',
        }
    }

    pub fn as_ptr(&self) -> Option<&Closure> {
        match self {
            Arg::Ptr(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Arg::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Arg::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Arg::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Arg::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Arg::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Ptr(c) => write!(f, "Ptr({:?})", c),
            Arg::Int(i) => write!(f, "Int({})", i),
            Arg::Long(l) => write!(f, "Long({})", l),
            Arg::Float(x) => write!(f, "Float({})", x),
            Arg::Double(d) => write!(f, "Double({})", d),
            Arg::Object(_) => write!(f, "Object(..)"),
            Arg::Void => write!(f, "Void"),
        }
    }
}

/// Shape signature of an argument list, e.g. `"PPV"`.
pub fn shape_of(args: &[Arg]) -> String {
    args.iter().map(Arg::shape).collect()
}
