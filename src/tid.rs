//! Dead tuple set on top of [`BfmTree`].
//!
//! A tuple identifier is packed into one integer, block number in the high bits
//! and offset in the low `offset_bits` bits. The low 6 bits of that integer pick
//! a bit in a 64-bit value, the rest is the tree key, so the tuples of one heap
//! page share a handful of keys.

use crate::{error::TidError, BfmTree};

const VALUE_BITS_LOG2: u32 = 6;
const VALUE_BIT_MASK: u64 = (1 << VALUE_BITS_LOG2) - 1;

/// Physical location of a tuple: heap block and line pointer offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemPointer {
    pub block: u32,
    pub offset: u16,
}

impl ItemPointer {
    pub fn new(block: u32, offset: u16) -> Self {
        Self { block, offset }
    }
}

/// A set of tuple identifiers, stored as bitmaps in a radix tree.
///
/// ```
/// use bfm_tree::{ItemPointer, TidStore};
///
/// let mut dead = TidStore::new();
/// dead.add_tuples(7, &[1, 2, 40]).unwrap();
///
/// assert!(dead.contains(ItemPointer::new(7, 40)));
/// assert!(!dead.contains(ItemPointer::new(7, 3)));
/// assert_eq!(dead.len(), 3);
/// ```
pub struct TidStore {
    tree: BfmTree,
    offset_bits: u32,
    tuples: usize,
}

impl Default for TidStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TidStore {
    /// Offset bits for 8 KiB heap pages, which hold at most 291 tuples.
    pub const DEFAULT_OFFSET_BITS: u32 = 9;

    pub fn new() -> Self {
        Self::with_offset_bits(Self::DEFAULT_OFFSET_BITS)
    }

    /// # Panics
    ///
    /// Panics if `offset_bits` is larger than 16, the width of an offset.
    pub fn with_offset_bits(offset_bits: u32) -> Self {
        assert!(offset_bits <= 16, "offsets are 16 bits wide");
        Self {
            tree: BfmTree::new(),
            offset_bits,
            tuples: 0,
        }
    }

    /// Uses `tree` as backing storage, typically one built with a memory limit.
    ///
    /// # Panics
    ///
    /// Panics if `tree` is not empty.
    pub fn with_tree(tree: BfmTree, offset_bits: u32) -> Self {
        assert!(tree.is_empty(), "backing tree must start out empty");
        Self {
            tree,
            ..Self::with_offset_bits(offset_bits)
        }
    }

    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }

    fn encode(&self, tid: ItemPointer) -> Result<(u64, u64), TidError> {
        if (tid.offset as u64) >> self.offset_bits != 0 {
            return Err(TidError::OffsetOutOfRange {
                offset: tid.offset,
                bits: self.offset_bits,
            });
        }
        let packed = ((tid.block as u64) << self.offset_bits) | tid.offset as u64;
        Ok((packed >> VALUE_BITS_LOG2, 1 << (packed & VALUE_BIT_MASK)))
    }

    /// Marks `tid`. Returns true if it was not marked before.
    pub fn insert(&mut self, tid: ItemPointer) -> Result<bool, TidError> {
        let (key, bit) = self.encode(tid)?;
        let old = self.tree.lookup(key).unwrap_or(0);
        if old & bit != 0 {
            return Ok(false);
        }
        self.tree.set(key, old | bit)?;
        self.tuples += 1;
        Ok(true)
    }

    /// Marks every `offset` of `block` and returns how many were new.
    ///
    /// All offsets are validated before anything is stored. On out of memory,
    /// the offsets stored before the failing key stay marked.
    pub fn add_tuples(&mut self, block: u32, offsets: &[u16]) -> Result<usize, TidError> {
        let mut encoded = offsets
            .iter()
            .map(|offset| self.encode(ItemPointer::new(block, *offset)))
            .collect::<Result<Vec<_>, _>>()?;
        encoded.sort_unstable();

        let mut added = 0;
        let mut i = 0;
        while i < encoded.len() {
            let key = encoded[i].0;
            let mut bits = 0;
            while i < encoded.len() && encoded[i].0 == key {
                bits |= encoded[i].1;
                i += 1;
            }

            let old = self.tree.lookup(key).unwrap_or(0);
            let new = old | bits;
            if new != old {
                self.tree.set(key, new)?;
                let fresh = (new ^ old).count_ones() as usize;
                self.tuples += fresh;
                added += fresh;
            }
        }
        Ok(added)
    }

    /// Whether `tid` is marked. Offsets out of range are never marked.
    pub fn contains(&self, tid: ItemPointer) -> bool {
        match self.encode(tid) {
            Ok((key, bit)) => self.tree.lookup(key).is_some_and(|bits| bits & bit != 0),
            Err(_) => false,
        }
    }

    /// Unmarks `tid`. Returns true if it was marked.
    pub fn remove(&mut self, tid: ItemPointer) -> bool {
        let Ok((key, bit)) = self.encode(tid) else {
            return false;
        };
        let Some(old) = self.tree.lookup(key) else {
            return false;
        };
        if old & bit == 0 {
            return false;
        }

        if old == bit {
            self.tree.delete(key);
        } else {
            self.tree.inner.update(key, old & !bit);
        }
        self.tuples -= 1;
        true
    }

    /// Number of marked tuples.
    pub fn len(&self) -> usize {
        self.tuples
    }

    pub fn is_empty(&self) -> bool {
        self.tuples == 0
    }

    /// The backing tree, e.g. for [`BfmTree::stats`].
    pub fn tree(&self) -> &BfmTree {
        &self.tree
    }
}
