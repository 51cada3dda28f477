use super::{Body, NodeKind};

const EMPTY_MARKER: u8 = 0xFF;

/// Indirect node: a 256-entry chunk to slot map in front of 128 slots.
///
/// Free slots are tracked by the `used` bitmap rather than by `count`, since
/// deletes leave holes anywhere in the slot array.
pub(crate) struct Node128<S> {
    offsets: [u8; 256],
    used: u128,
    slots: [S; 128],
}

impl<S> Node128<S> {
    fn free_slot(&self) -> usize {
        (!self.used).trailing_zeros() as usize
    }
}

impl<S: Copy + Default> Body for Node128<S> {
    type Slot = S;

    const KIND: NodeKind = NodeKind::K128;

    fn empty() -> Self {
        Self {
            offsets: [EMPTY_MARKER; 256],
            used: 0,
            slots: [S::default(); 128],
        }
    }

    fn get(&self, _count: usize, chunk: u8) -> Option<&S> {
        match self.offsets[chunk as usize] {
            EMPTY_MARKER => None,
            off => Some(&self.slots[off as usize]),
        }
    }

    fn get_mut(&mut self, _count: usize, chunk: u8) -> Option<&mut S> {
        match self.offsets[chunk as usize] {
            EMPTY_MARKER => None,
            off => Some(&mut self.slots[off as usize]),
        }
    }

    fn insert(&mut self, count: usize, chunk: u8, slot: S) {
        debug_assert!(count < 128);
        debug_assert_eq!(self.used.count_ones() as usize, count);

        let pos = self.free_slot();
        assert!(pos < 128);
        self.used |= 1 << pos;
        self.offsets[chunk as usize] = pos as u8;
        self.slots[pos] = slot;
    }

    fn remove(&mut self, _count: usize, chunk: u8) -> Option<S> {
        let off = self.offsets[chunk as usize];
        if off == EMPTY_MARKER {
            return None;
        }
        self.offsets[chunk as usize] = EMPTY_MARKER;
        self.used &= !(1 << off);
        Some(self.slots[off as usize])
    }

    fn for_each<F: FnMut(usize, u8, &S)>(&self, _count: usize, mut f: F) {
        for (chunk, off) in self.offsets.iter().enumerate() {
            if *off != EMPTY_MARKER {
                f(*off as usize, chunk as u8, &self.slots[*off as usize]);
            }
        }
    }
}
