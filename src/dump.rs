use std::fmt::Write;

use crate::{
    nodes::{Header, NodeRef},
    tree::{RawTree, TreeVisitor},
};

/// Renders every node, with entry lines two spaces deeper than their node and
/// child nodes four spaces deeper.
#[derive(Default)]
struct DumpVisitor {
    out: String,
}

impl DumpVisitor {
    fn indent(&mut self, width: usize) {
        self.out.extend(std::iter::repeat(' ').take(width));
    }
}

impl TreeVisitor for DumpVisitor {
    fn pre_visit_node(&mut self, node: NodeRef, header: &Header, partial_key: u64, depth: usize) {
        self.indent(depth * 4);
        let _ = writeln!(
            self.out,
            "{}: kind {}, children: {}, shift: {}, node chunk: 0x{:02X}, partial key: 0x{:X}",
            node.family(),
            node.kind().index(),
            header.count,
            header.shift,
            header.chunk,
            partial_key,
        );
    }

    fn visit_child(&mut self, slot: usize, chunk: u8, child: NodeRef, depth: usize) {
        self.indent(depth * 4 + 2);
        let _ = writeln!(self.out, "{slot}: child chunk: 0x{chunk:02X}, child: {child}");
    }

    fn visit_value(&mut self, slot: usize, chunk: u8, key: u64, value: u64, depth: usize) {
        self.indent(depth * 4 + 2);
        let _ = writeln!(
            self.out,
            "{slot}: chunk: 0x{chunk:02X}, key: 0x{key:X}/{key}, value: 0x{value:X}/{value}"
        );
    }
}

impl RawTree {
    pub(crate) fn dump(&self) -> String {
        let mut visitor = DumpVisitor::default();
        let _ = writeln!(
            visitor.out,
            "radix tree with {} entries, max_val: 0x{:X}",
            self.entries(),
            self.max_val
        );
        self.dfs_visitor(&mut visitor);
        visitor.out
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::RawTree;

    #[test]
    fn dump_format() {
        let mut tree = RawTree::default();
        tree.set(1, 5).unwrap();
        tree.set(0x102, 0x10).unwrap();

        let expected = "\
radix tree with 2 entries, max_val: 0xFFFF
inner: kind 1, children: 2, shift: 8, node chunk: 0x00, partial key: 0x0
  0: child chunk: 0x00, child: leaf/1#0
    leaf: kind 0, children: 1, shift: 0, node chunk: 0x00, partial key: 0x0
      0: chunk: 0x01, key: 0x1/1, value: 0x5/5
  1: child chunk: 0x01, child: leaf/1#1
    leaf: kind 0, children: 1, shift: 0, node chunk: 0x01, partial key: 0x100
      0: chunk: 0x02, key: 0x102/258, value: 0x10/16
";
        assert_eq!(tree.dump(), expected);
    }

    #[test]
    fn dump_empty() {
        let tree = RawTree::default();
        assert_eq!(tree.dump(), "radix tree with 0 entries, max_val: 0x0\n");
    }
}
