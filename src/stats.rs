use std::fmt::Display;

use crate::{
    alloc::Pools,
    nodes::{Family, Header, NodeKind, NodeRef},
    tree::{RawTree, TreeVisitor},
};

const MIB: f64 = (1024 * 1024) as f64;

/// Memory and shape statistics of a tree.
#[derive(Default, Debug, Clone)]
#[cfg_attr(feature = "stats", derive(serde::Serialize))]
pub struct TreeStats {
    entries: usize,
    depth: usize,
    inner_nodes: [usize; 6],
    leaf_nodes: [usize; 6],
    inner_bytes: usize,
    leaf_bytes: usize,
    allocated_bytes: usize,
    levels: Vec<LevelStats>,
}

/// Node counts of one tree level, the root being level 0.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "stats", derive(serde::Serialize))]
pub struct LevelStats {
    level: usize,
    family: Family,
    nodes: [(usize, usize); 6], // (node count, entry count) per class
}

impl LevelStats {
    fn new_level(level: usize, family: Family) -> Self {
        Self {
            level,
            family,
            nodes: [(0, 0); 6],
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Number of nodes of `kind` on this level.
    pub fn node_count(&self, kind: NodeKind) -> usize {
        self.nodes[kind.index()].0
    }

    /// Occupied slots over available slots, across every class on this level.
    pub fn load_factor(&self) -> f64 {
        let (used, capacity) = NodeKind::ALL.iter().fold((0, 0), |(used, cap), kind| {
            let (n, entries) = self.nodes[kind.index()];
            (used + entries, cap + n * kind.capacity())
        });
        if capacity == 0 {
            return 0.0;
        }
        used as f64 / capacity as f64
    }
}

impl TreeStats {
    /// Number of key/value pairs.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Root shift divided by 8; a tree whose root is a leaf has depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn inner_nodes(&self, kind: NodeKind) -> usize {
        self.inner_nodes[kind.index()]
    }

    pub fn leaf_nodes(&self, kind: NodeKind) -> usize {
        self.leaf_nodes[kind.index()]
    }

    pub fn total_nodes(&self) -> usize {
        self.inner_nodes.iter().chain(self.leaf_nodes.iter()).sum()
    }

    /// Bytes held by live nodes.
    pub fn bytes_excluding_overhead(&self) -> usize {
        self.inner_bytes + self.leaf_bytes
    }

    /// Bytes the node pools hold, free slots included.
    pub fn bytes_including_overhead(&self) -> usize {
        self.allocated_bytes
    }

    pub fn bytes_per_entry(&self) -> f64 {
        if self.entries == 0 {
            return 0.0;
        }
        self.bytes_excluding_overhead() as f64 / self.entries as f64
    }

    pub fn allocated_bytes_per_entry(&self) -> f64 {
        if self.entries == 0 {
            return 0.0;
        }
        self.allocated_bytes as f64 / self.entries as f64
    }

    pub fn levels(&self) -> &[LevelStats] {
        &self.levels
    }
}

impl Display for TreeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} entries and depth {}", self.entries, self.depth)?;

        for (name, nodes, bytes) in [
            ("inner", &self.inner_nodes, self.inner_bytes),
            ("leaf", &self.leaf_nodes, self.leaf_bytes),
        ] {
            write!(f, "\t{name} nodes:")?;
            for kind in NodeKind::ALL {
                write!(f, " {}: {},", kind, nodes[kind.index()])?;
            }
            writeln!(f, " total: {}, total_bytes: {}", nodes.iter().sum::<usize>(), bytes)?;
        }

        writeln!(
            f,
            "\t{:.2} MiB excluding allocator overhead, {:.2} MiB including",
            self.bytes_excluding_overhead() as f64 / MIB,
            self.allocated_bytes as f64 / MIB,
        )?;
        writeln!(
            f,
            "\t{:.2} bytes/entry excluding allocator overhead",
            self.bytes_per_entry()
        )?;
        writeln!(
            f,
            "\t{:.2} bytes/entry including allocator overhead",
            self.allocated_bytes_per_entry()
        )?;

        for l in self.levels.iter() {
            write!(f, "Level: {} ({}) ---", l.level, l.family)?;
            for kind in NodeKind::ALL {
                write!(f, " || N{}: {:8}", kind, l.node_count(kind))?;
            }
            writeln!(f, " || load factor: {:.2}", l.load_factor())?;
        }

        Ok(())
    }
}

#[derive(Default)]
struct LevelVisitor {
    levels: Vec<LevelStats>,
}

impl TreeVisitor for LevelVisitor {
    fn pre_visit_node(&mut self, node: NodeRef, header: &Header, _partial_key: u64, depth: usize) {
        if self.levels.len() <= depth {
            self.levels.push(LevelStats::new_level(depth, node.family()));
        }
        let slot = &mut self.levels[depth].nodes[node.kind().index()];
        slot.0 += 1;
        slot.1 += header.count as usize;
    }
}

impl RawTree {
    pub(crate) fn stats(&self) -> TreeStats {
        let mut visitor = LevelVisitor::default();
        self.dfs_visitor(&mut visitor);

        let mut stats = TreeStats {
            entries: self.entries(),
            depth: self.root_shift().map(|shift| shift as usize / 8).unwrap_or(0),
            levels: visitor.levels,
            allocated_bytes: self.alloc.inner.capacity_bytes() + self.alloc.leaf.capacity_bytes(),
            ..Default::default()
        };

        for kind in NodeKind::ALL {
            let inner = self.alloc.inner.live_nodes(kind);
            let leaf = self.alloc.leaf.live_nodes(kind);
            stats.inner_nodes[kind.index()] = inner;
            stats.leaf_nodes[kind.index()] = leaf;
            stats.inner_bytes += inner * Pools::<NodeRef>::node_size(kind);
            stats.leaf_bytes += leaf * Pools::<u64>::node_size(kind);
        }
        stats
    }
}
