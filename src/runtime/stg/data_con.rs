//! Multi-field constructed values and their typed field accessors.

use std::fmt;

use crate::runtime::error::{RtsError, RtsResult};

use super::Closure;

/// One payload slot of a constructed value.
#[derive(Clone)]
pub enum Field {
    Ptr(Closure),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Field {
    fn type_name(&self) -> &'static str {
        match self {
            Field::Ptr(_) => "pointer",
            Field::Int(_) => "int",
            Field::Long(_) => "long",
            Field::Float(_) => "float",
            Field::Double(_) => "double",
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Ptr(c) => write!(f, "{:?}", c),
            Field::Int(i) => write!(f, "{}", i),
            Field::Long(l) => write!(f, "{}L", l),
            Field::Float(x) => write!(f, "{}f", x),
            Field::Double(d) => write!(f, "{}d", d),
        }
    }
}

/// A saturated data constructor: a tag plus its payload.
#[derive(Clone)]
pub struct DataCon {
    tag: u32,
    fields: Vec<Field>,
}

impl DataCon {
    pub fn new(tag: u32, fields: Vec<Field>) -> Self {
        Self { tag, fields }
    }

    /// Constructor tag (1-based, as assigned by the code generator)
    #[inline]
    pub fn tag(&self) -> u32 {
        self.tag
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn field(&self, index: usize) -> RtsResult<&Field> {
        self.fields.get(index).ok_or(RtsError::FieldOutOfRange {
            index,
            arity: self.fields.len(),
        })
    }

    fn mismatch(index: usize, expected: &'static str, found: &Field) -> RtsError {
        RtsError::FieldType {
            index,
            expected,
            found: found.type_name(),
        }
    }

    pub fn field_as_pointer(&self, index: usize) -> RtsResult<Closure> {
        match self.field(index)? {
            Field::Ptr(c) => Ok(c.clone()),
            other => Err(Self::mismatch(index, "pointer", other)),
        }
    }

    pub fn field_as_int(&self, index: usize) -> RtsResult<i32> {
        match self.field(index)? {
            Field::Int(i) => Ok(*i),
            other => Err(Self::mismatch(index, "int", other)),
        }
    }

    pub fn field_as_long(&self, index: usize) -> RtsResult<i64> {
        match self.field(index)? {
            Field::Long(l) => Ok(*l),
            other => Err(Self::mismatch(index, "long", other)),
        }
    }

    pub fn field_as_float(&self, index: usize) -> RtsResult<f32> {
        match self.field(index)? {
            Field::Float(x) => Ok(*x),
            other => Err(Self::mismatch(index, "float", other)),
        }
    }

    pub fn field_as_double(&self, index: usize) -> RtsResult<f64> {
        match self.field(index)? {
            Field::Double(d) => Ok(*d),
            other => Err(Self::mismatch(index, "double", other)),
        }
    }
}

impl fmt::Debug for DataCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Con{}", self.tag)?;
        f.debug_list().entries(self.fields.iter()).finish()
    }
}
