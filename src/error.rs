use thiserror::Error;

/// Out of memory error.
///
/// Returned when the node pools cannot grow to fit an insertion, either because
/// the tree's memory budget would be exceeded or because the system allocator refused.
/// The tree is left untouched when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Allocator is out of memory! (requested {requested} bytes, {available} available)")]
pub struct OOMError {
    requested: usize,
    available: usize,
}

impl OOMError {
    pub(crate) fn new(requested: usize, available: usize) -> Self {
        Self {
            requested,
            available,
        }
    }

    /// Bytes the failed operation needed to reserve.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Bytes that were still available under the budget.
    pub fn available(&self) -> usize {
        self.available
    }
}

/// Errors from the dead tuple store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TidError {
    #[error("offset {offset} does not fit in {bits} offset bits")]
    OffsetOutOfRange { offset: u16, bits: u32 },

    #[error(transparent)]
    OutOfMemory(#[from] OOMError),
}
