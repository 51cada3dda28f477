//! Per-class node pools.
//!
//! Every (family, size class) pair owns a slab of equally sized nodes. Freed
//! nodes go on the slab's free list and are handed out again before the slab
//! grows. Nodes refer to each other by [`NodeRef`] handles into these slabs,
//! never by pointer.
//!
//! Mutating tree operations first [`NodeAllocator::reserve`] everything they are
//! going to allocate, so the allocation calls that follow cannot fail.

use std::mem;

use crate::error::OOMError;
use crate::nodes::{Body, ChunkArray, Family, Header, Node, Node128, Node256, NodeKind, NodeRef};

const NO_FREE: u32 = u32::MAX;

enum Entry<T> {
    Occupied(T),
    Vacant { next_free: u32 },
}

pub(crate) struct Slab<T> {
    entries: Vec<Entry<T>>,
    next_free: u32,
    live: usize,
}

impl<T> Slab<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_free: NO_FREE,
            live: 0,
        }
    }

    fn free_slots(&self) -> usize {
        self.entries.len() - self.live
    }

    /// Makes sure `n` more inserts need no reallocation.
    fn try_reserve(&mut self, n: usize) -> Result<(), std::collections::TryReserveError> {
        let need = n.saturating_sub(self.free_slots());
        self.entries.try_reserve(need)
    }

    fn insert(&mut self, value: T) -> u32 {
        self.live += 1;
        if self.next_free != NO_FREE {
            let idx = self.next_free;
            match mem::replace(&mut self.entries[idx as usize], Entry::Occupied(value)) {
                Entry::Vacant { next_free } => self.next_free = next_free,
                Entry::Occupied(_) => unreachable!("free list points at a live node"),
            }
            idx
        } else {
            assert!(self.entries.len() < NO_FREE as usize, "node pool exhausted");
            debug_assert!(self.entries.len() < self.entries.capacity());
            self.entries.push(Entry::Occupied(value));
            (self.entries.len() - 1) as u32
        }
    }

    fn remove(&mut self, idx: usize) -> T {
        let vacant = Entry::Vacant {
            next_free: self.next_free,
        };
        match mem::replace(&mut self.entries[idx], vacant) {
            Entry::Occupied(value) => {
                self.next_free = idx as u32;
                self.live -= 1;
                value
            }
            Entry::Vacant { .. } => panic!("double free of node {idx}"),
        }
    }

    fn get(&self, idx: usize) -> &T {
        match &self.entries[idx] {
            Entry::Occupied(value) => value,
            Entry::Vacant { .. } => panic!("dangling node reference {idx}"),
        }
    }

    fn get_mut(&mut self, idx: usize) -> &mut T {
        match &mut self.entries[idx] {
            Entry::Occupied(value) => value,
            Entry::Vacant { .. } => panic!("dangling node reference {idx}"),
        }
    }

    fn capacity_bytes(&self) -> usize {
        self.entries.capacity() * mem::size_of::<Entry<T>>()
    }
}

/// Runs `$body` with `$n` bound to the node behind `$node`, whatever its class.
macro_rules! with_node {
    ($pools:expr, $node:expr, |$n:ident| $body:expr) => {{
        let idx = $node.idx();
        match $node.kind() {
            NodeKind::K1 => {
                let $n = $pools.n1.get(idx);
                $body
            }
            NodeKind::K4 => {
                let $n = $pools.n4.get(idx);
                $body
            }
            NodeKind::K16 => {
                let $n = $pools.n16.get(idx);
                $body
            }
            NodeKind::K32 => {
                let $n = $pools.n32.get(idx);
                $body
            }
            NodeKind::K128 => {
                let $n = $pools.n128.get(idx);
                $body
            }
            NodeKind::K256 => {
                let $n = $pools.n256.get(idx);
                $body
            }
        }
    }};
}

macro_rules! with_node_mut {
    ($pools:expr, $node:expr, |$n:ident| $body:expr) => {{
        let idx = $node.idx();
        match $node.kind() {
            NodeKind::K1 => {
                let $n = $pools.n1.get_mut(idx);
                $body
            }
            NodeKind::K4 => {
                let $n = $pools.n4.get_mut(idx);
                $body
            }
            NodeKind::K16 => {
                let $n = $pools.n16.get_mut(idx);
                $body
            }
            NodeKind::K32 => {
                let $n = $pools.n32.get_mut(idx);
                $body
            }
            NodeKind::K128 => {
                let $n = $pools.n128.get_mut(idx);
                $body
            }
            NodeKind::K256 => {
                let $n = $pools.n256.get_mut(idx);
                $body
            }
        }
    }};
}

/// The six pools of one node family. `S` is what a slot holds: child handles
/// for inner nodes, values for leaves.
pub(crate) struct Pools<S: Copy + Default> {
    family: Family,
    n1: Slab<Node<ChunkArray<S, 1>>>,
    n4: Slab<Node<ChunkArray<S, 4>>>,
    n16: Slab<Node<ChunkArray<S, 16>>>,
    n32: Slab<Node<ChunkArray<S, 32>>>,
    n128: Slab<Node<Node128<S>>>,
    n256: Slab<Node<Node256<S>>>,
}

impl<S: Copy + Default> Pools<S> {
    fn new(family: Family) -> Self {
        Self {
            family,
            n1: Slab::new(),
            n4: Slab::new(),
            n16: Slab::new(),
            n32: Slab::new(),
            n128: Slab::new(),
            n256: Slab::new(),
        }
    }

    /// Size in bytes of one node of `kind`.
    pub(crate) fn node_size(kind: NodeKind) -> usize {
        match kind {
            NodeKind::K1 => mem::size_of::<Node<ChunkArray<S, 1>>>(),
            NodeKind::K4 => mem::size_of::<Node<ChunkArray<S, 4>>>(),
            NodeKind::K16 => mem::size_of::<Node<ChunkArray<S, 16>>>(),
            NodeKind::K32 => mem::size_of::<Node<ChunkArray<S, 32>>>(),
            NodeKind::K128 => mem::size_of::<Node<Node128<S>>>(),
            NodeKind::K256 => mem::size_of::<Node<Node256<S>>>(),
        }
    }

    pub(crate) fn live_nodes(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::K1 => self.n1.live,
            NodeKind::K4 => self.n4.live,
            NodeKind::K16 => self.n16.live,
            NodeKind::K32 => self.n32.live,
            NodeKind::K128 => self.n128.live,
            NodeKind::K256 => self.n256.live,
        }
    }

    /// Bytes held by live nodes.
    pub(crate) fn live_bytes(&self) -> usize {
        NodeKind::ALL
            .iter()
            .map(|kind| self.live_nodes(*kind) * Self::node_size(*kind))
            .sum()
    }

    /// Bytes the pools have obtained from the system allocator, free slots included.
    pub(crate) fn capacity_bytes(&self) -> usize {
        self.n1.capacity_bytes()
            + self.n4.capacity_bytes()
            + self.n16.capacity_bytes()
            + self.n32.capacity_bytes()
            + self.n128.capacity_bytes()
            + self.n256.capacity_bytes()
    }

    fn try_reserve(&mut self, demand: &[usize; 6]) -> Result<(), std::collections::TryReserveError> {
        self.n1.try_reserve(demand[NodeKind::K1.index()])?;
        self.n4.try_reserve(demand[NodeKind::K4.index()])?;
        self.n16.try_reserve(demand[NodeKind::K16.index()])?;
        self.n32.try_reserve(demand[NodeKind::K32.index()])?;
        self.n128.try_reserve(demand[NodeKind::K128.index()])?;
        self.n256.try_reserve(demand[NodeKind::K256.index()])?;
        Ok(())
    }

    /// Hands out an empty node of `kind`, reusing a freed one if possible.
    pub(crate) fn allocate(&mut self, kind: NodeKind, header: Header) -> NodeRef {
        let idx = match kind {
            NodeKind::K1 => self.n1.insert(Node::new(header)),
            NodeKind::K4 => self.n4.insert(Node::new(header)),
            NodeKind::K16 => self.n16.insert(Node::new(header)),
            NodeKind::K32 => self.n32.insert(Node::new(header)),
            NodeKind::K128 => self.n128.insert(Node::new(header)),
            NodeKind::K256 => self.n256.insert(Node::new(header)),
        };
        NodeRef::new(self.family, kind, idx)
    }

    /// Returns the node to the pool of its class.
    pub(crate) fn free(&mut self, node: NodeRef) -> Header {
        debug_assert_eq!(node.family(), self.family);
        let idx = node.idx();
        match node.kind() {
            NodeKind::K1 => self.n1.remove(idx).header,
            NodeKind::K4 => self.n4.remove(idx).header,
            NodeKind::K16 => self.n16.remove(idx).header,
            NodeKind::K32 => self.n32.remove(idx).header,
            NodeKind::K128 => self.n128.remove(idx).header,
            NodeKind::K256 => self.n256.remove(idx).header,
        }
    }

    /// Moves a node into the next size class and frees the old one.
    ///
    /// Only the node itself changes; its parent slot and its children's back-edges
    /// still name the old handle, which the caller must redirect.
    pub(crate) fn grow(&mut self, node: NodeRef) -> NodeRef {
        fn move_node<A: Body, B: Body<Slot = A::Slot>>(
            from: &mut Slab<Node<A>>,
            to: &mut Slab<Node<B>>,
            idx: usize,
        ) -> u32 {
            let old = from.remove(idx);
            to.insert(old.grow_into::<B>())
        }

        let idx = node.idx();
        let (kind, new_idx) = match node.kind() {
            NodeKind::K1 => (NodeKind::K4, move_node(&mut self.n1, &mut self.n4, idx)),
            NodeKind::K4 => (NodeKind::K16, move_node(&mut self.n4, &mut self.n16, idx)),
            NodeKind::K16 => (NodeKind::K32, move_node(&mut self.n16, &mut self.n32, idx)),
            NodeKind::K32 => (NodeKind::K128, move_node(&mut self.n32, &mut self.n128, idx)),
            NodeKind::K128 => (NodeKind::K256, move_node(&mut self.n128, &mut self.n256, idx)),
            NodeKind::K256 => unreachable!("a 256 node always has room"),
        };
        NodeRef::new(self.family, kind, new_idx)
    }

    pub(crate) fn header(&self, node: NodeRef) -> &Header {
        with_node!(self, node, |n| &n.header)
    }

    pub(crate) fn header_mut(&mut self, node: NodeRef) -> &mut Header {
        with_node_mut!(self, node, |n| &mut n.header)
    }

    pub(crate) fn is_full(&self, node: NodeRef) -> bool {
        with_node!(self, node, |n| n.is_full())
    }

    pub(crate) fn get(&self, node: NodeRef, chunk: u8) -> Option<S> {
        with_node!(self, node, |n| n.get(chunk).copied())
    }

    pub(crate) fn get_mut(&mut self, node: NodeRef, chunk: u8) -> Option<&mut S> {
        with_node_mut!(self, node, |n| n.get_mut(chunk))
    }

    pub(crate) fn insert(&mut self, node: NodeRef, chunk: u8, slot: S) {
        with_node_mut!(self, node, |n| n.insert(chunk, slot))
    }

    pub(crate) fn remove(&mut self, node: NodeRef, chunk: u8) -> Option<S> {
        with_node_mut!(self, node, |n| n.remove(chunk))
    }

    /// Visits `(slot index, chunk, slot)` of `node` in ascending chunk order.
    pub(crate) fn for_each<F: FnMut(usize, u8, S)>(&self, node: NodeRef, mut f: F) {
        with_node!(self, node, |n| n.for_each(|i, chunk, slot| f(i, chunk, *slot)))
    }
}

/// Node counts an operation is about to allocate, per family and class.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct Demand {
    inner: [usize; 6],
    leaf: [usize; 6],
}

impl Demand {
    pub(crate) fn add(&mut self, family: Family, kind: NodeKind, n: usize) {
        match family {
            Family::Inner => self.inner[kind.index()] += n,
            Family::Leaf => self.leaf[kind.index()] += n,
        }
    }

    /// A fresh path: one class-1 inner node per level from `top_shift` down, plus the leaf.
    pub(crate) fn chain(top_shift: u8) -> Self {
        let mut demand = Self::default();
        demand.add(Family::Inner, NodeKind::K1, (top_shift / crate::nodes::FANOUT) as usize);
        demand.add(Family::Leaf, NodeKind::K1, 1);
        demand
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.iter().chain(self.leaf.iter()).all(|n| *n == 0)
    }

    fn bytes(&self) -> usize {
        let inner: usize = NodeKind::ALL
            .iter()
            .map(|kind| self.inner[kind.index()] * Pools::<NodeRef>::node_size(*kind))
            .sum();
        let leaf: usize = NodeKind::ALL
            .iter()
            .map(|kind| self.leaf[kind.index()] * Pools::<u64>::node_size(*kind))
            .sum();
        inner + leaf
    }
}

/// Both node families plus the optional memory budget.
pub(crate) struct NodeAllocator {
    pub(crate) inner: Pools<NodeRef>,
    pub(crate) leaf: Pools<u64>,
    memory_limit: Option<usize>,
}

impl NodeAllocator {
    pub(crate) fn new(memory_limit: Option<usize>) -> Self {
        Self {
            inner: Pools::new(Family::Inner),
            leaf: Pools::new(Family::Leaf),
            memory_limit,
        }
    }

    pub(crate) fn memory_limit(&self) -> Option<usize> {
        self.memory_limit
    }

    /// Bytes held by live nodes of both families.
    pub(crate) fn live_bytes(&self) -> usize {
        self.inner.live_bytes() + self.leaf.live_bytes()
    }

    /// Guarantees the next allocations described by `demand` succeed.
    ///
    /// The budget check counts the new nodes on top of the live ones and ignores
    /// the nodes a growth step frees afterwards.
    pub(crate) fn reserve(&mut self, demand: &Demand) -> Result<(), OOMError> {
        if demand.is_empty() {
            return Ok(());
        }

        let requested = demand.bytes();
        if let Some(limit) = self.memory_limit {
            let available = limit.saturating_sub(self.live_bytes());
            if requested > available {
                tracing::debug!(requested, available, limit, "node reservation exceeds memory limit");
                return Err(OOMError::new(requested, available));
            }
        }

        let reserved = self
            .inner
            .try_reserve(&demand.inner)
            .and_then(|_| self.leaf.try_reserve(&demand.leaf));
        if let Err(e) = reserved {
            tracing::debug!(requested, error = %e, "system allocator refused node reservation");
            let available = self
                .memory_limit
                .map(|limit| limit.saturating_sub(self.live_bytes()))
                .unwrap_or(0);
            return Err(OOMError::new(requested, available));
        }
        Ok(())
    }
}
