use super::{Body, NodeKind};
use crate::search::{find_equal, find_insertion_point};

/// Sorted chunk array with parallel slots, used by classes 1, 4, 16 and 32.
///
/// `chunks[..count]` is strictly ascending and `slots[i]` belongs to `chunks[i]`.
pub(crate) struct ChunkArray<S, const N: usize> {
    chunks: [u8; N],
    slots: [S; N],
}

impl<S: Copy + Default, const N: usize> Body for ChunkArray<S, N> {
    type Slot = S;

    const KIND: NodeKind = match N {
        1 => NodeKind::K1,
        4 => NodeKind::K4,
        16 => NodeKind::K16,
        32 => NodeKind::K32,
        _ => panic!("no size class for this chunk array width"),
    };

    fn empty() -> Self {
        Self {
            chunks: [0; N],
            slots: [S::default(); N],
        }
    }

    fn get(&self, count: usize, chunk: u8) -> Option<&S> {
        let pos = find_equal(&self.chunks, count, chunk)?;
        Some(&self.slots[pos])
    }

    fn get_mut(&mut self, count: usize, chunk: u8) -> Option<&mut S> {
        let pos = find_equal(&self.chunks, count, chunk)?;
        Some(&mut self.slots[pos])
    }

    fn insert(&mut self, count: usize, chunk: u8, slot: S) {
        debug_assert!(count < N);

        let pos = find_insertion_point(&self.chunks, count, chunk);
        if pos < count {
            self.chunks.copy_within(pos..count, pos + 1);
            self.slots.copy_within(pos..count, pos + 1);
        }
        self.chunks[pos] = chunk;
        self.slots[pos] = slot;
    }

    fn remove(&mut self, count: usize, chunk: u8) -> Option<S> {
        let pos = find_equal(&self.chunks, count, chunk)?;
        let old = self.slots[pos];
        self.chunks.copy_within(pos + 1..count, pos);
        self.slots.copy_within(pos + 1..count, pos);
        Some(old)
    }

    fn for_each<F: FnMut(usize, u8, &S)>(&self, count: usize, mut f: F) {
        for i in 0..count {
            f(i, self.chunks[i], &self.slots[i]);
        }
    }
}
