mod chunk_array;
mod node_128;
mod node_256;

use std::fmt::{self, Display, Formatter};

pub(crate) use chunk_array::ChunkArray;
pub(crate) use node_128::Node128;
pub(crate) use node_256::Node256;

/// Number of key bits consumed per tree level.
pub(crate) const FANOUT: u8 = 8;

/// Shift of the tallest possible root, whose chunk is the top byte of a u64 key.
pub(crate) const MAX_SHIFT: u8 = 56;

#[inline]
pub(crate) fn chunk_of(key: u64, shift: u8) -> u8 {
    (key >> shift) as u8
}

/// Largest key a tree whose root sits at `shift` can hold.
#[inline]
pub(crate) fn max_val_for_shift(shift: u8) -> u64 {
    debug_assert!(shift <= MAX_SHIFT && shift % FANOUT == 0);
    if shift == MAX_SHIFT {
        u64::MAX
    } else {
        (1u64 << (shift + FANOUT)) - 1
    }
}

/// Root shift needed to represent `key`.
#[inline]
pub(crate) fn shift_for_key(key: u64) -> u8 {
    if key == 0 {
        0
    } else {
        let top_bit = 63 - key.leading_zeros() as u8;
        top_bit / FANOUT * FANOUT
    }
}

/// The six node size classes, ordered by capacity.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "stats", derive(serde::Serialize))]
pub enum NodeKind {
    K1 = 0,
    K4 = 1,
    K16 = 2,
    K32 = 3,
    K128 = 4,
    K256 = 5,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::K1,
        NodeKind::K4,
        NodeKind::K16,
        NodeKind::K32,
        NodeKind::K128,
        NodeKind::K256,
    ];

    /// Maximum number of entries a node of this class holds.
    pub const fn capacity(self) -> usize {
        match self {
            NodeKind::K1 => 1,
            NodeKind::K4 => 4,
            NodeKind::K16 => 16,
            NodeKind::K32 => 32,
            NodeKind::K128 => 128,
            NodeKind::K256 => 256,
        }
    }

    /// The class a full node of this class grows into.
    pub const fn grown(self) -> Option<NodeKind> {
        match self {
            NodeKind::K1 => Some(NodeKind::K4),
            NodeKind::K4 => Some(NodeKind::K16),
            NodeKind::K16 => Some(NodeKind::K32),
            NodeKind::K32 => Some(NodeKind::K128),
            NodeKind::K128 => Some(NodeKind::K256),
            NodeKind::K256 => None,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.capacity())
    }
}

/// Inner nodes hold children, leaf nodes hold values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "stats", derive(serde::Serialize))]
pub enum Family {
    Inner,
    Leaf,
}

impl Display for Family {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Family::Inner => write!(f, "inner"),
            Family::Leaf => write!(f, "leaf"),
        }
    }
}

/// Handle to a node living in one of the allocator pools.
///
/// The handle names the pool (family and size class) and the slot in it, so it
/// stays valid exactly as long as the node is not freed or grown.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct NodeRef {
    family: Family,
    kind: NodeKind,
    idx: u32,
}

impl NodeRef {
    pub(crate) fn new(family: Family, kind: NodeKind, idx: u32) -> Self {
        Self { family, kind, idx }
    }

    #[inline]
    pub(crate) fn family(&self) -> Family {
        self.family
    }

    #[inline]
    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub(crate) fn idx(&self) -> usize {
        self.idx as usize
    }
}

/// Placeholder for unoccupied child slots, never dereferenced.
impl Default for NodeRef {
    fn default() -> Self {
        Self {
            family: Family::Inner,
            kind: NodeKind::K1,
            idx: u32::MAX,
        }
    }
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.family, self.kind, self.idx)
    }
}

/// Fields shared by every node.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Header {
    /// Key bits consumed by the levels below this node; 0 for leaves.
    pub(crate) shift: u8,
    /// Slice of the key that selects this node from its parent.
    pub(crate) chunk: u8,
    pub(crate) count: u16,
    /// Non-owning back-edge, `None` for the root.
    pub(crate) parent: Option<NodeRef>,
}

impl Header {
    pub(crate) fn new(shift: u8) -> Self {
        Self {
            shift,
            chunk: 0,
            count: 0,
            parent: None,
        }
    }
}

/// Physical layout of one size class.
///
/// Every method gets the node's logical `count`, which is the only bound that
/// may be trusted; slots past it hold stale data.
pub(crate) trait Body: Sized {
    type Slot: Copy;

    const KIND: NodeKind;

    fn empty() -> Self;

    fn get(&self, count: usize, chunk: u8) -> Option<&Self::Slot>;

    fn get_mut(&mut self, count: usize, chunk: u8) -> Option<&mut Self::Slot>;

    /// Requires `count < capacity` and `chunk` to be absent.
    fn insert(&mut self, count: usize, chunk: u8, slot: Self::Slot);

    fn remove(&mut self, count: usize, chunk: u8) -> Option<Self::Slot>;

    /// Visits `(slot index, chunk, slot)` in ascending chunk order.
    fn for_each<F: FnMut(usize, u8, &Self::Slot)>(&self, count: usize, f: F);
}

pub(crate) struct Node<B: Body> {
    pub(crate) header: Header,
    pub(crate) body: B,
}

impl<B: Body> Node<B> {
    pub(crate) fn new(header: Header) -> Self {
        Self {
            header: Header { count: 0, ..header },
            body: B::empty(),
        }
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.header.count as usize
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.count() == B::KIND.capacity()
    }

    #[inline]
    pub(crate) fn get(&self, chunk: u8) -> Option<&B::Slot> {
        self.body.get(self.count(), chunk)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, chunk: u8) -> Option<&mut B::Slot> {
        let count = self.count();
        self.body.get_mut(count, chunk)
    }

    pub(crate) fn insert(&mut self, chunk: u8, slot: B::Slot) {
        assert!(!self.is_full(), "inserting into a full {} node", B::KIND);
        debug_assert!(self.get(chunk).is_none());

        self.body.insert(self.count(), chunk, slot);
        self.header.count += 1;
    }

    pub(crate) fn remove(&mut self, chunk: u8) -> Option<B::Slot> {
        let old = self.body.remove(self.count(), chunk)?;
        self.header.count -= 1;
        debug_assert!(self.get(chunk).is_none());
        Some(old)
    }

    pub(crate) fn for_each<F: FnMut(usize, u8, &B::Slot)>(&self, f: F) {
        self.body.for_each(self.count(), f)
    }

    /// Copies every entry into a fresh node of class `T`, keeping the header.
    pub(crate) fn grow_into<T: Body<Slot = B::Slot>>(&self) -> Node<T> {
        debug_assert!(T::KIND.capacity() > B::KIND.capacity());

        let mut grown = Node::<T>::new(self.header);
        self.for_each(|_, chunk, slot| grown.insert(chunk, *slot));
        debug_assert_eq!(grown.count(), self.count());
        grown
    }
}
