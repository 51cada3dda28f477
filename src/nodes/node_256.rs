use super::{Body, NodeKind};

/// Direct node: one slot per possible chunk and a presence bitmap.
pub(crate) struct Node256<S> {
    present: [u64; 4],
    slots: [S; 256],
}

impl<S> Node256<S> {
    #[inline]
    fn is_set(&self, chunk: u8) -> bool {
        self.present[chunk as usize / 64] & (1 << (chunk % 64)) != 0
    }
}

impl<S: Copy + Default> Body for Node256<S> {
    type Slot = S;

    const KIND: NodeKind = NodeKind::K256;

    fn empty() -> Self {
        Self {
            present: [0; 4],
            slots: [S::default(); 256],
        }
    }

    fn get(&self, _count: usize, chunk: u8) -> Option<&S> {
        if self.is_set(chunk) {
            Some(&self.slots[chunk as usize])
        } else {
            None
        }
    }

    fn get_mut(&mut self, _count: usize, chunk: u8) -> Option<&mut S> {
        if self.is_set(chunk) {
            Some(&mut self.slots[chunk as usize])
        } else {
            None
        }
    }

    fn insert(&mut self, _count: usize, chunk: u8, slot: S) {
        self.present[chunk as usize / 64] |= 1 << (chunk % 64);
        self.slots[chunk as usize] = slot;
    }

    fn remove(&mut self, _count: usize, chunk: u8) -> Option<S> {
        if !self.is_set(chunk) {
            return None;
        }
        self.present[chunk as usize / 64] &= !(1 << (chunk % 64));
        Some(self.slots[chunk as usize])
    }

    fn for_each<F: FnMut(usize, u8, &S)>(&self, _count: usize, mut f: F) {
        for (word_idx, word) in self.present.iter().enumerate() {
            let mut bits = *word;
            while bits != 0 {
                let chunk = word_idx * 64 + bits.trailing_zeros() as usize;
                f(chunk, chunk as u8, &self.slots[chunk]);
                bits &= bits - 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Header, Node};

    #[test]
    fn test_node_operations() {
        let mut node = Node::<Node256<u64>>::new(Header::new(0));
        for chunk in (0..=255u8).rev() {
            node.insert(chunk, chunk as u64 + 3);
        }
        assert!(node.is_full());
        assert_eq!(node.get(0), Some(&3));
        assert_eq!(node.get(255), Some(&258));

        let mut seen = vec![];
        node.for_each(|_, chunk, _| seen.push(chunk));
        assert_eq!(seen, (0..=255u8).collect::<Vec<_>>());

        assert_eq!(node.remove(64), Some(67));
        assert_eq!(node.remove(64), None);
        assert_eq!(node.get(64), None);
        assert_eq!(node.count(), 255);
    }
}
