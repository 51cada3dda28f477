use crate::{
    alloc::{Demand, NodeAllocator},
    error::OOMError,
    nodes::{
        chunk_of, max_val_for_shift, shift_for_key, Family, Header, NodeKind, NodeRef, FANOUT,
        MAX_SHIFT,
    },
};

/// Depth-first traversal hooks. Children are visited in ascending chunk order,
/// so values arrive in ascending key order.
pub(crate) trait TreeVisitor {
    /// Called before the entries of `node` are visited. `partial_key` holds the
    /// key bits fixed by the path to this node.
    fn pre_visit_node(&mut self, _node: NodeRef, _header: &Header, _partial_key: u64, _depth: usize) {
    }

    fn visit_child(&mut self, _slot: usize, _chunk: u8, _child: NodeRef, _depth: usize) {}

    fn visit_value(&mut self, _slot: usize, _chunk: u8, _key: u64, _value: u64, _depth: usize) {}

    fn post_visit_node(&mut self, _node: NodeRef, _header: &Header, _depth: usize) {}
}

struct ValueVisitor<F: FnMut(u64, u64)> {
    f: F,
}

impl<F: FnMut(u64, u64)> TreeVisitor for ValueVisitor<F> {
    fn visit_value(&mut self, _slot: usize, _chunk: u8, key: u64, value: u64, _depth: usize) {
        (self.f)(key, value);
    }
}

/// Result of the read-only descent an insert starts with.
enum Descent {
    Empty,
    /// The key is above what the current height can hold.
    TooShallow { root: NodeRef },
    /// `parent` sits at `shift` and has no child for the key's chunk there.
    MissingChild { parent: NodeRef, shift: u8 },
    Leaf(NodeRef),
}

/// The map itself. [`crate::BfmTree`] is the documented wrapper around it.
pub(crate) struct RawTree {
    pub(crate) root: Option<NodeRef>,
    /// Largest key the current height can hold, 0 when empty.
    pub(crate) max_val: u64,
    pub(crate) alloc: NodeAllocator,
    entries: usize,
}

impl Default for RawTree {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RawTree {
    pub(crate) fn new(memory_limit: Option<usize>) -> Self {
        Self {
            root: None,
            max_val: 0,
            alloc: NodeAllocator::new(memory_limit),
            entries: 0,
        }
    }

    #[inline]
    pub(crate) fn entries(&self) -> usize {
        self.entries
    }

    pub(crate) fn root_shift(&self) -> Option<u8> {
        self.root.map(|root| self.header(root).shift)
    }

    #[inline]
    pub(crate) fn header(&self, node: NodeRef) -> &Header {
        match node.family() {
            Family::Inner => self.alloc.inner.header(node),
            Family::Leaf => self.alloc.leaf.header(node),
        }
    }

    #[inline]
    fn header_mut(&mut self, node: NodeRef) -> &mut Header {
        match node.family() {
            Family::Inner => self.alloc.inner.header_mut(node),
            Family::Leaf => self.alloc.leaf.header_mut(node),
        }
    }

    fn descend(&self, key: u64) -> Descent {
        let Some(root) = self.root else {
            return Descent::Empty;
        };
        if key > self.max_val {
            return Descent::TooShallow { root };
        }

        let mut node = root;
        let mut shift = self.header(root).shift;
        while shift > 0 {
            match self.alloc.inner.get(node, chunk_of(key, shift)) {
                Some(child) => {
                    node = child;
                    shift -= FANOUT;
                }
                None => return Descent::MissingChild { parent: node, shift },
            }
        }
        debug_assert_eq!(node.family(), Family::Leaf);
        Descent::Leaf(node)
    }

    #[inline]
    pub(crate) fn lookup(&self, key: u64) -> Option<u64> {
        match self.descend(key) {
            Descent::Leaf(leaf) => self.alloc.leaf.get(leaf, chunk_of(key, 0)),
            _ => None,
        }
    }

    /// Overwrites the value of a key that is already present. Never allocates.
    pub(crate) fn update(&mut self, key: u64, value: u64) -> Option<u64> {
        let Descent::Leaf(leaf) = self.descend(key) else {
            return None;
        };
        let slot = self.alloc.leaf.get_mut(leaf, chunk_of(key, 0))?;
        Some(std::mem::replace(slot, value))
    }

    /// Returns true if the key was present and its value got overwritten.
    pub(crate) fn set(&mut self, key: u64, value: u64) -> Result<bool, OOMError> {
        match self.descend(key) {
            Descent::Leaf(leaf) => {
                let chunk = chunk_of(key, 0);
                if let Some(slot) = self.alloc.leaf.get_mut(leaf, chunk) {
                    *slot = value;
                    return Ok(true);
                }

                let mut demand = Demand::default();
                self.add_growth_demand(&mut demand, leaf);
                self.alloc.reserve(&demand)?;

                let leaf = self.ensure_room(leaf);
                self.alloc.leaf.insert(leaf, chunk, value);
            }
            Descent::MissingChild { parent, shift } => {
                let mut demand = Demand::chain(shift - FANOUT);
                self.add_growth_demand(&mut demand, parent);
                self.alloc.reserve(&demand)?;

                let child = self.build_chain(key, value, shift - FANOUT);
                self.attach(parent, chunk_of(key, shift), child);
            }
            Descent::TooShallow { root } => {
                let old_shift = self.header(root).shift;
                let new_shift = shift_for_key(key);
                debug_assert!(new_shift > old_shift);

                // The wrappers start out as class-1 nodes; the topmost one then
                // takes a second child, which grows it to class 4.
                let mut demand = Demand::chain(new_shift - FANOUT);
                demand.add(
                    Family::Inner,
                    NodeKind::K1,
                    ((new_shift - old_shift) / FANOUT) as usize,
                );
                demand.add(Family::Inner, NodeKind::K4, 1);
                self.alloc.reserve(&demand)?;

                let new_root = self.extend(root, new_shift);
                let child = self.build_chain(key, value, new_shift - FANOUT);
                self.attach(new_root, chunk_of(key, new_shift), child);
            }
            Descent::Empty => {
                let shift = shift_for_key(key);
                self.alloc.reserve(&Demand::chain(shift))?;

                let root = self.build_chain(key, value, shift);
                self.root = Some(root);
                self.max_val = max_val_for_shift(shift);
                tracing::trace!(key, root_shift = shift, "created tree from empty");
            }
        }

        self.entries += 1;
        Ok(false)
    }

    fn add_growth_demand(&self, demand: &mut Demand, node: NodeRef) {
        let full = match node.family() {
            Family::Inner => self.alloc.inner.is_full(node),
            Family::Leaf => self.alloc.leaf.is_full(node),
        };
        if full {
            if let Some(grown) = node.kind().grown() {
                demand.add(node.family(), grown, 1);
            }
        }
    }

    /// Builds a path of class-1 nodes from `top_shift` down to a leaf holding
    /// `value`. The top node has no parent yet.
    fn build_chain(&mut self, key: u64, value: u64, top_shift: u8) -> NodeRef {
        let mut child = self.alloc.leaf.allocate(NodeKind::K1, Header::new(0));
        self.alloc.leaf.insert(child, chunk_of(key, 0), value);

        let mut shift = 0;
        while shift < top_shift {
            shift += FANOUT;
            let node = self.alloc.inner.allocate(NodeKind::K1, Header::new(shift));
            self.link(node, chunk_of(key, shift), child);
            child = node;
        }
        child
    }

    /// Wraps `root` in class-1 inner nodes until the root sits at `new_shift`.
    fn extend(&mut self, mut root: NodeRef, new_shift: u8) -> NodeRef {
        debug_assert!(new_shift <= MAX_SHIFT);
        let old_shift = self.header(root).shift;

        while self.header(root).shift < new_shift {
            let shift = self.header(root).shift + FANOUT;
            let wrapper = self.alloc.inner.allocate(NodeKind::K1, Header::new(shift));
            self.link(wrapper, 0, root);
            root = wrapper;
        }
        self.root = Some(root);
        self.max_val = max_val_for_shift(new_shift);

        tracing::trace!(old_shift, new_shift, "extended tree height");
        root
    }

    /// Stores `child` under `chunk` in `parent`, which must have room.
    fn link(&mut self, parent: NodeRef, chunk: u8, child: NodeRef) {
        self.alloc.inner.insert(parent, chunk, child);
        let header = self.header_mut(child);
        header.chunk = chunk;
        header.parent = Some(parent);
    }

    /// Stores `child` under `chunk` in `parent`, growing `parent` first if needed.
    fn attach(&mut self, parent: NodeRef, chunk: u8, child: NodeRef) {
        let parent = self.ensure_room(parent);
        self.link(parent, chunk, child);
    }

    fn ensure_room(&mut self, node: NodeRef) -> NodeRef {
        let full = match node.family() {
            Family::Inner => self.alloc.inner.is_full(node),
            Family::Leaf => self.alloc.leaf.is_full(node),
        };
        if full {
            self.grow(node)
        } else {
            node
        }
    }

    /// Replaces a full node by a copy in the next size class and redirects the
    /// edges that named the old one.
    fn grow(&mut self, node: NodeRef) -> NodeRef {
        let grown = match node.family() {
            Family::Inner => self.alloc.inner.grow(node),
            Family::Leaf => self.alloc.leaf.grow(node),
        };
        let header = *self.header(grown);

        if grown.family() == Family::Inner {
            let mut children = [NodeRef::default(); 256];
            let mut n = 0;
            self.alloc.inner.for_each(grown, |_, _, child| {
                children[n] = child;
                n += 1;
            });
            for child in &children[..n] {
                self.header_mut(*child).parent = Some(grown);
            }
        }

        match header.parent {
            Some(parent) => {
                let slot = self.alloc.inner.get_mut(parent, header.chunk);
                debug_assert_eq!(slot.as_deref(), Some(&node));
                if let Some(slot) = slot {
                    *slot = grown;
                }
            }
            None => self.root = Some(grown),
        }

        tracing::trace!(
            family = %node.family(),
            from = %node.kind(),
            to = %grown.kind(),
            shift = header.shift,
            "grew node"
        );
        grown
    }

    /// Returns true if the key was present.
    pub(crate) fn delete(&mut self, key: u64) -> bool {
        let Descent::Leaf(leaf) = self.descend(key) else {
            return false;
        };
        if self.alloc.leaf.remove(leaf, chunk_of(key, 0)).is_none() {
            return false;
        }
        self.entries -= 1;

        let mut node = leaf;
        while self.header(node).count == 0 {
            let header = match node.family() {
                Family::Inner => self.alloc.inner.free(node),
                Family::Leaf => self.alloc.leaf.free(node),
            };
            match header.parent {
                Some(parent) => {
                    let removed = self.alloc.inner.remove(parent, header.chunk);
                    debug_assert_eq!(removed, Some(node));
                    node = parent;
                }
                None => {
                    debug_assert_eq!(self.entries, 0);
                    self.root = None;
                    self.max_val = 0;
                    tracing::trace!(key, "tree became empty");
                    break;
                }
            }
        }
        true
    }

    /// Depth-first search visitor implemented recursively; the depth is bounded by 8.
    pub(crate) fn dfs_visitor<V: TreeVisitor>(&self, visitor: &mut V) {
        if let Some(root) = self.root {
            self.recursive_dfs(root, 0, 0, visitor);
        }
    }

    fn recursive_dfs<V: TreeVisitor>(
        &self,
        node: NodeRef,
        partial_key: u64,
        depth: usize,
        visitor: &mut V,
    ) {
        let header = *self.header(node);
        visitor.pre_visit_node(node, &header, partial_key, depth);
        match node.family() {
            Family::Inner => self.alloc.inner.for_each(node, |slot, chunk, child| {
                visitor.visit_child(slot, chunk, child, depth);
                let child_key = partial_key | (chunk as u64) << header.shift;
                self.recursive_dfs(child, child_key, depth + 1, visitor);
            }),
            Family::Leaf => self.alloc.leaf.for_each(node, |slot, chunk, value| {
                visitor.visit_value(slot, chunk, partial_key | chunk as u64, value, depth);
            }),
        }
        visitor.post_visit_node(node, &header, depth);
    }

    /// Calls `f` with every `(key, value)` pair in ascending key order.
    pub(crate) fn for_each<F: FnMut(u64, u64)>(&self, f: F) {
        let mut visitor = ValueVisitor { f };
        self.dfs_visitor(&mut visitor);
    }

    /// Panics if any structural invariant is broken.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.entries, 0);
            assert_eq!(self.max_val, 0);
            for kind in NodeKind::ALL {
                assert_eq!(self.alloc.inner.live_nodes(kind), 0);
                assert_eq!(self.alloc.leaf.live_nodes(kind), 0);
            }
            return;
        };

        let root_header = *self.header(root);
        assert!(root_header.parent.is_none(), "root has a parent");
        assert!(root_header.shift <= MAX_SHIFT);
        assert_eq!(self.max_val, max_val_for_shift(root_header.shift));

        let mut checker = InvariantChecker::default();
        self.dfs_visitor(&mut checker);

        assert_eq!(checker.values, self.entries, "entry counter out of sync");
        assert!(checker.max_key <= self.max_val);
        for kind in NodeKind::ALL {
            assert_eq!(
                checker.inner[kind.index()],
                self.alloc.inner.live_nodes(kind),
                "leaked inner {kind} nodes"
            );
            assert_eq!(
                checker.leaf[kind.index()],
                self.alloc.leaf.live_nodes(kind),
                "leaked leaf {kind} nodes"
            );
        }
    }
}

#[cfg(test)]
#[derive(Default)]
struct InvariantChecker {
    /// Nodes on the current path with the number of entries seen so far.
    path: Vec<(NodeRef, Header, usize)>,
    /// Edge taken into the next node: parent, chunk.
    pending_edge: Option<(NodeRef, u8)>,
    values: usize,
    max_key: u64,
    last_key: Option<u64>,
    inner: [usize; 6],
    leaf: [usize; 6],
}

#[cfg(test)]
impl TreeVisitor for InvariantChecker {
    fn pre_visit_node(&mut self, node: NodeRef, header: &Header, _partial_key: u64, _depth: usize) {
        assert!(header.count > 0, "empty node {node} left in the tree");
        assert!(header.count as usize <= node.kind().capacity());
        assert_eq!(node.family() == Family::Leaf, header.shift == 0);

        if let Some((parent, chunk)) = self.pending_edge.take() {
            assert_eq!(header.parent, Some(parent), "stale back-edge on {node}");
            assert_eq!(header.chunk, chunk, "wrong chunk recorded on {node}");
            let (_, parent_header, _) = self.path.last().expect("parent on path");
            assert_eq!(header.shift + FANOUT, parent_header.shift);
        }

        match node.family() {
            Family::Inner => self.inner[node.kind().index()] += 1,
            Family::Leaf => self.leaf[node.kind().index()] += 1,
        }
        self.path.push((node, *header, 0));
    }

    fn visit_child(&mut self, _slot: usize, chunk: u8, _child: NodeRef, _depth: usize) {
        let (node, _, seen) = self.path.last_mut().expect("node on path");
        *seen += 1;
        self.pending_edge = Some((*node, chunk));
    }

    fn visit_value(&mut self, _slot: usize, _chunk: u8, key: u64, _value: u64, _depth: usize) {
        let (_, _, seen) = self.path.last_mut().expect("node on path");
        *seen += 1;
        if let Some(last) = self.last_key {
            assert!(last < key, "keys out of order: {last} then {key}");
        }
        self.last_key = Some(key);
        self.max_key = self.max_key.max(key);
        self.values += 1;
    }

    fn post_visit_node(&mut self, node: NodeRef, header: &Header, _depth: usize) {
        let (popped, _, seen) = self.path.pop().expect("node on path");
        assert_eq!(popped, node);
        assert_eq!(seen, header.count as usize, "count mismatch on {node}");
    }
}
