use crate::renderer::memory::{align_up, MemoryError};

/// Identifies one resource's placement inside an [`ArenaLayout`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Placement {
    pub slot: SlotId,
    pub offset: u64,
    /// Size rounded up to the resource's alignment
    pub size: u64,
}

/// Placement bookkeeping for one device allocation.
///
/// Every live resource owns a slot; slots are kept sorted by offset. Releasing any slot
/// reclaims its range, and later placements go first-fit into the lowest gap that fits.
/// Without releases this degenerates to a bump allocator.
#[derive(Debug, Clone)]
pub struct ArenaLayout {
    size: u64,
    free: u64,
    slots: Vec<Placement>,
    next_slot: u32,
}

impl ArenaLayout {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            free: size,
            slots: Vec::new(),
            next_slot: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes not covered by any slot
    pub fn free(&self) -> u64 {
        self.free
    }

    pub fn used(&self) -> u64 {
        self.size - self.free
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// End of the highest live slot
    pub fn high_water_mark(&self) -> u64 {
        self.slots.last().map_or(0, |s| s.offset + s.size)
    }

    pub fn placement(&self, slot: SlotId) -> Option<Placement> {
        self.slots.iter().find(|p| p.slot == slot).copied()
    }

    /// Places a batch of `(size, alignment)` requests, in order.
    ///
    /// Either every request is placed or the layout is left untouched.
    pub fn reserve(&mut self, requests: &[(u64, u64)]) -> Result<Vec<Placement>, MemoryError> {
        let requested = requests
            .iter()
            .map(|&(size, alignment)| align_up(size, alignment))
            .sum::<u64>();
        if requested > self.free {
            return Err(MemoryError::Exhausted {
                requested,
                free: self.free,
            });
        }

        let mut slots = self.slots.clone();
        let mut next_slot = self.next_slot;
        let mut placed = Vec::with_capacity(requests.len());

        for &(size, alignment) in requests {
            let aligned_size = align_up(size, alignment);
            let (position, offset) = Self::first_fit(&slots, self.size, aligned_size, alignment)
                .ok_or(MemoryError::Fragmented { size: aligned_size, alignment })?;
            let placement = Placement {
                slot: SlotId(next_slot),
                offset,
                size: aligned_size,
            };
            next_slot += 1;
            slots.insert(position, placement);
            placed.push(placement);
        }

        self.slots = slots;
        self.next_slot = next_slot;
        self.free -= requested;

        Ok(placed)
    }

    /// Returns the slot's range to the free pool. Unknown slots are ignored.
    pub fn release(&mut self, slot: SlotId) -> Option<Placement> {
        let position = self.slots.iter().position(|p| p.slot == slot)?;
        let placement = self.slots.remove(position);
        self.free += placement.size;
        Some(placement)
    }

    /// Lowest aligned offset where `size` bytes fit, with the index the new slot sorts at.
    fn first_fit(slots: &[Placement], capacity: u64, size: u64, alignment: u64) -> Option<(usize, u64)> {
        let mut cursor = 0;
        for (i, slot) in slots.iter().enumerate() {
            let candidate = align_up(cursor, alignment);
            if candidate + size <= slot.offset {
                return Some((i, candidate));
            }
            cursor = slot.offset + slot.size;
        }
        let candidate = align_up(cursor, alignment);
        (candidate + size <= capacity).then_some((slots.len(), candidate))
    }
}
