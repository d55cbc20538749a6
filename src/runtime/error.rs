//! Runtime error types.
//!
//! This module defines [`RtsError`] and [`RtsResult`] for the closure/thunk
//! core. Three variants are contract violations ([`RtsError::ValueEntered`],
//! [`RtsError::Loop`] and [`RtsError::Cleared`]); everything else is a
//! call-protocol error raised by the apply family or the typed field
//! accessors.

use std::fmt;

use tracing::error;

use super::stg::NodeId;

// =============================================================================
// RtsResult and RtsError
// =============================================================================

/// Error types for closure entry, application and field projection
#[derive(Debug, Clone, PartialEq)]
pub enum RtsError {
    /// A fully evaluated node was entered (double update or corrupt graph)
    ValueEntered { node: NodeId, description: String },

    /// A thunk was forced while already under evaluation by the same task
    Loop { thunk: NodeId },

    /// A thunk was reset after its free variables had been released, so it
    /// cannot be evaluated again
    Cleared { thunk: NodeId },

    /// Applied something that is not a function
    NotAFunction { node: NodeId, description: String },

    /// Function applied to fewer arguments than its arity
    ArityMismatch {
        node: NodeId,
        arity: usize,
        supplied: usize,
    },

    /// Selector producer did not reduce to a constructed value
    NotAConstructor { node: NodeId, description: String },

    /// Constructor field index past the end of the payload
    FieldOutOfRange { index: usize, arity: usize },

    /// Constructor field accessed through the wrong typed accessor
    FieldType {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// A compiled closure was applied but no interpreter is installed
    NoInterpreter { node: NodeId },

    /// Error reported by the external bytecode interpreter
    Interpreter(String),

    /// Pointer bitmap does not describe the closure's arguments
    InvalidBitmap { arity: usize, size: usize },
}

impl RtsError {
    /// Fatal errors terminate the current computation; there is no safe
    /// continuation for the logical thread that raised them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RtsError::ValueEntered { .. } | RtsError::Loop { .. } | RtsError::Cleared { .. }
        )
    }
}

impl fmt::Display for RtsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtsError::ValueEntered { node, description } => {
                write!(f, "{} ({}) entered", description, node)
            }
            RtsError::Loop { thunk } => write!(f, "<<loop>> forcing thunk {}", thunk),
            RtsError::Cleared { thunk } => {
                write!(f, "Thunk {} was reset after its free variables were released", thunk)
            }
            RtsError::NotAFunction { node, description } => {
                write!(f, "Cannot apply {} ({}): not a function", description, node)
            }
            RtsError::ArityMismatch {
                node,
                arity,
                supplied,
            } => write!(
                f,
                "Function {} of arity {} applied to {} argument(s)",
                node, arity, supplied
            ),
            RtsError::NotAConstructor { node, description } => {
                write!(f, "Selector producer {} reduced to {}, expected a constructor", node, description)
            }
            RtsError::FieldOutOfRange { index, arity } => {
                write!(f, "Field index {} out of range for constructor with {} field(s)", index, arity)
            }
            RtsError::FieldType {
                index,
                expected,
                found,
            } => write!(f, "Field {}: expected {}, found {}", index, expected, found),
            RtsError::NoInterpreter { node } => {
                write!(f, "No bytecode interpreter installed to run {}", node)
            }
            RtsError::Interpreter(msg) => write!(f, "Interpreter error: {}", msg),
            RtsError::InvalidBitmap { arity, size } => write!(
                f,
                "Pointer bitmap covers {} slot(s) but closure has arity {}",
                size, arity
            ),
        }
    }
}

impl std::error::Error for RtsError {}

/// Result type for runtime operations
pub type RtsResult<T> = Result<T, RtsError>;

/// Report an internal contract violation.
///
/// Logs at error level and hands the error back so callers can `return
/// Err(barf(..))`.
#[cold]
pub(crate) fn barf(err: RtsError) -> RtsError {
    error!(target: "lazyrts::barf", "{}", err);
    err
}
