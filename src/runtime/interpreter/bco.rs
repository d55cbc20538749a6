//! Compiled bytecode closures.

use std::fmt;
use std::sync::Arc;

use crate::runtime::error::{RtsError, RtsResult};
use crate::runtime::stg::Closure;

/// Pointer map of a compiled closure's argument-stack slots.
///
/// Bit `i` of the packed words is set when slot `i` holds a pointer; clear
/// bits are raw words the collector must not trace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BcoBitmap {
    size: usize,
    words: Vec<u32>,
}

impl BcoBitmap {
    pub fn new(size: usize, words: Vec<u32>) -> Self {
        Self { size, words }
    }

    pub fn from_pointer_slots(slots: &[bool]) -> Self {
        let mut words = vec![0u32; slots.len().div_ceil(32)];
        for (i, is_ptr) in slots.iter().enumerate() {
            if *is_ptr {
                words[i / 32] |= 1 << (i % 32);
            }
        }
        Self {
            size: slots.len(),
            words,
        }
    }

    /// Number of slots described.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Slots outside the described range, or past the packed words, are not
    /// pointers.
    pub fn is_pointer_slot(&self, slot: usize) -> bool {
        if slot >= self.size {
            return false;
        }
        self.words
            .get(slot / 32)
            .is_some_and(|w| w & (1 << (slot % 32)) != 0)
    }
}

/// A compiled closure: immutable code plus the metadata the interpreter and
/// the collector consume.
#[derive(Clone)]
pub struct Bco {
    instrs: Arc<[u8]>,
    literals: Arc<[u8]>,
    ptrs: Vec<Closure>,
    arity: usize,
    bitmap: BcoBitmap,
}

impl Bco {
    pub fn new(
        instrs: impl Into<Arc<[u8]>>,
        literals: impl Into<Arc<[u8]>>,
        ptrs: Vec<Closure>,
        arity: usize,
        bitmap: BcoBitmap,
    ) -> RtsResult<Self> {
        if bitmap.size() < arity {
            return Err(RtsError::InvalidBitmap {
                arity,
                size: bitmap.size(),
            });
        }
        Ok(Self {
            instrs: instrs.into(),
            literals: literals.into(),
            ptrs,
            arity,
            bitmap,
        })
    }

    pub fn instrs(&self) -> &[u8] {
        &self.instrs
    }

    pub fn literals(&self) -> &[u8] {
        &self.literals
    }

    /// Sub-closures referenced by the instruction stream, in order.
    pub fn ptrs(&self) -> &[Closure] {
        &self.ptrs
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn bitmap(&self) -> &BcoBitmap {
        &self.bitmap
    }
}

impl fmt::Debug for Bco {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bco")
            .field("instrs", &self.instrs.len())
            .field("literals", &self.literals.len())
            .field("ptrs", &self.ptrs.len())
            .field("arity", &self.arity)
            .field("bitmap", &self.bitmap)
            .finish()
    }
}
