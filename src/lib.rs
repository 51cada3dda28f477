#![doc = include_str!("../README.md")]
#![allow(clippy::len_without_is_empty)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod alloc;
mod dump;
mod error;
mod nodes;
pub mod search;
mod stats;
mod tid;
mod tree;

#[cfg(test)]
mod tests;

pub use error::{OOMError, TidError};
pub use nodes::{Family, NodeKind};
pub use stats::{LevelStats, TreeStats};
pub use tid::{ItemPointer, TidStore};

use tree::RawTree;

/// An adaptive radix tree mapping `u64` keys to `u64` values.
///
/// Each level consumes 8 bits of the key. Nodes start with room for a single
/// entry and move through six size classes (1, 4, 16, 32, 128 and 256 entries)
/// as they fill up. The tree is only as tall as its largest key needs.
pub struct BfmTree {
    inner: RawTree,
}

impl Default for BfmTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BfmTree {
    /// Create an empty [BfmTree].
    ///
    /// # Examples
    ///
    /// ```
    /// use bfm_tree::BfmTree;
    /// let tree = BfmTree::new();
    /// assert!(tree.is_empty());
    /// ```
    #[inline]
    pub fn new() -> Self {
        BfmTree {
            inner: RawTree::new(None),
        }
    }

    /// Create an empty tree whose nodes may occupy at most `bytes` bytes.
    ///
    /// Inserts that would exceed the budget fail with [OOMError] and leave the
    /// tree unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use bfm_tree::BfmTree;
    /// let mut tree = BfmTree::with_memory_limit(64);
    ///
    /// tree.set(1, 1).unwrap();
    /// assert!(tree.set(1 << 40, 2).is_err());
    /// assert_eq!(tree.lookup(1), Some(1));
    /// assert_eq!(tree.lookup(1 << 40), None);
    /// ```
    pub fn with_memory_limit(bytes: usize) -> Self {
        BfmTree {
            inner: RawTree::new(Some(bytes)),
        }
    }

    /// The memory budget this tree was created with, if any.
    pub fn memory_limit(&self) -> Option<usize> {
        self.inner.alloc.memory_limit()
    }

    /// Returns the value stored under `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bfm_tree::BfmTree;
    /// let mut tree = BfmTree::new();
    ///
    /// tree.set(1024, 1).unwrap();
    /// assert_eq!(tree.lookup(1024), Some(1));
    /// assert_eq!(tree.lookup(1), None);
    /// ```
    #[inline]
    pub fn lookup(&self, key: u64) -> Option<u64> {
        self.inner.lookup(key)
    }

    /// Insert or overwrite the value of `key`; returns true if the key was already present.
    ///
    /// # Examples
    ///
    /// ```
    /// use bfm_tree::BfmTree;
    /// let mut tree = BfmTree::new();
    ///
    /// assert_eq!(tree.set(7, 1), Ok(false));
    /// assert_eq!(tree.set(7, 2), Ok(true));
    /// assert_eq!(tree.lookup(7), Some(2));
    /// assert_eq!(tree.len(), 1);
    /// ```
    #[inline]
    pub fn set(&mut self, key: u64, value: u64) -> Result<bool, OOMError> {
        self.inner.set(key, value)
    }

    /// Removes `key` from the tree; returns true if it was present.
    ///
    /// Nodes left empty are freed all the way up; nodes are never shrunk to a
    /// smaller size class.
    ///
    /// # Examples
    ///
    /// ```
    /// use bfm_tree::BfmTree;
    /// let mut tree = BfmTree::new();
    ///
    /// tree.set(5, 50).unwrap();
    /// assert!(tree.delete(5));
    /// assert!(!tree.delete(5));
    /// assert!(tree.is_empty());
    /// ```
    #[inline]
    pub fn delete(&mut self, key: u64) -> bool {
        self.inner.delete(key)
    }

    /// Number of key-value pairs in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.entries()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.root.is_none()
    }

    /// Largest key the tree can hold without growing taller, `None` when empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use bfm_tree::BfmTree;
    /// let mut tree = BfmTree::new();
    /// assert_eq!(tree.max_key(), None);
    ///
    /// tree.set(3, 0).unwrap();
    /// assert_eq!(tree.max_key(), Some(0xFF));
    /// tree.set(0x1_0000, 0).unwrap();
    /// assert_eq!(tree.max_key(), Some(0xFF_FFFF));
    /// ```
    pub fn max_key(&self) -> Option<u64> {
        self.inner.root.map(|_| self.inner.max_val)
    }

    /// Number of levels from the root to the leaves, 0 when empty.
    pub fn height(&self) -> usize {
        self.inner
            .root_shift()
            .map(|shift| shift as usize / 8 + 1)
            .unwrap_or(0)
    }

    /// Calls `f` on every key-value pair in ascending key order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bfm_tree::BfmTree;
    /// let mut tree = BfmTree::new();
    /// tree.set(300, 3).unwrap();
    /// tree.set(2, 1).unwrap();
    ///
    /// let mut sum = 0;
    /// tree.for_each(|k, v| sum += k * v);
    /// assert_eq!(sum, 902);
    /// ```
    pub fn for_each<F: FnMut(u64, u64)>(&self, f: F) {
        self.inner.for_each(f)
    }

    /// All key-value pairs in ascending key order.
    pub fn to_vec(&self) -> Vec<(u64, u64)> {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|k, v| out.push((k, v)));
        out
    }

    /// Node counts and memory usage of the tree.
    ///
    /// # Examples
    ///
    /// ```
    /// use bfm_tree::{BfmTree, NodeKind};
    /// let mut tree = BfmTree::new();
    /// for key in 0..5 {
    ///     tree.set(key, key).unwrap();
    /// }
    ///
    /// let stats = tree.stats();
    /// assert_eq!(stats.entries(), 5);
    /// assert_eq!(stats.leaf_nodes(NodeKind::K16), 1);
    /// println!("{stats}");
    /// ```
    pub fn stats(&self) -> TreeStats {
        self.inner.stats()
    }

    /// Human readable rendering of every node, for debugging.
    pub fn dump(&self) -> String {
        self.inner.dump()
    }
}
