//! Bucketed priority queue keyed by cycle (§4.2, grounded on the original
//! `PrioQueue`): `num_blocks` rolling 64-slot buckets covering the near
//! future, with a sorted overflow map for cycles too far ahead to bucket
//! yet. Near-term insertion and the common-case dequeue are O(1); only
//! far-future inserts and the periodic overflow drain touch the map.

use std::collections::BTreeMap;
use std::collections::VecDeque;

struct Block<T> {
    slots: Vec<VecDeque<T>>,
    occ: u64,
}

impl<T> Block<T> {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(64);
        slots.resize_with(64, VecDeque::new);
        Self { slots, occ: 0 }
    }
}

/// A priority queue over `T` ordered by an associated `u64` cycle.
/// `num_blocks` rolling buckets of 64 cycles each are kept hot; anything
/// further out than `num_blocks * 64` cycles from the current block lands
/// in an overflow map until the window slides close enough to re-home it.
pub struct PrioQueue<T> {
    num_blocks: u64,
    blocks: Vec<Block<T>>,
    far: BTreeMap<u64, VecDeque<T>>,
    cur_block: u64,
    elems: u64,
}

impl<T> PrioQueue<T> {
    pub fn new(num_blocks: u64) -> Self {
        assert!(num_blocks >= 2 && num_blocks % 2 == 0, "num_blocks must be an even number >= 2");
        let mut blocks = Vec::with_capacity(num_blocks as usize);
        blocks.resize_with(num_blocks as usize, Block::new);
        Self {
            num_blocks,
            blocks,
            far: BTreeMap::new(),
            cur_block: 0,
            elems: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.elems
    }

    pub fn is_empty(&self) -> bool {
        self.elems == 0
    }

    pub fn enqueue(&mut self, obj: T, cycle: u64) {
        let abs_block = cycle / 64;
        assert!(abs_block >= self.cur_block, "cannot enqueue into a past block");
        if abs_block < self.cur_block + self.num_blocks {
            let i = (abs_block % self.num_blocks) as usize;
            let offset = (cycle % 64) as usize;
            self.blocks[i].occ |= 1u64 << offset;
            self.blocks[i].slots[offset].push_back(obj);
        } else {
            self.far.entry(cycle).or_default().push_back(obj);
        }
        self.elems += 1;
    }

    /// Pops the earliest-cycle element. Panics if the queue is empty.
    pub fn dequeue(&mut self) -> (T, u64) {
        assert!(self.elems > 0, "dequeue on an empty priority queue");
        while self.blocks[(self.cur_block % self.num_blocks) as usize].occ == 0 {
            self.cur_block += 1;
            if self.cur_block % (self.num_blocks / 2) == 0 && !self.far.is_empty() {
                self.drain_far();
            }
        }
        let i = (self.cur_block % self.num_blocks) as usize;
        let offset = self.blocks[i].occ.trailing_zeros() as usize;
        let obj = self.blocks[i].slots[offset].pop_front().expect("occ bit set implies a slot");
        if self.blocks[i].slots[offset].is_empty() {
            self.blocks[i].occ &= !(1u64 << offset);
        }
        self.elems -= 1;
        let deq_cycle = self.cur_block * 64 + offset as u64;
        (obj, deq_cycle)
    }

    /// Moves every far-map entry that now falls inside the rolling window
    /// into its home block.
    fn drain_far(&mut self) {
        let top_cycle = (self.cur_block + self.num_blocks) * 64;
        let tail = self.far.split_off(&top_cycle);
        let ready = std::mem::replace(&mut self.far, tail);
        for (cycle, mut objs) in ready {
            let abs_block = cycle / 64;
            debug_assert!(abs_block >= self.cur_block && abs_block < self.cur_block + self.num_blocks);
            let i = (abs_block % self.num_blocks) as usize;
            let offset = (cycle % 64) as usize;
            self.blocks[i].occ |= 1u64 << offset;
            self.blocks[i].slots[offset].append(&mut objs);
        }
    }

    /// Cycle of the earliest queued element, without removing it.
    pub fn first_cycle(&self) -> Option<u64> {
        if self.elems == 0 {
            return None;
        }
        for i in 0..self.num_blocks / 2 {
            let occ = self.blocks[((self.cur_block + i) % self.num_blocks) as usize].occ;
            if occ != 0 {
                let pos = occ.trailing_zeros() as u64;
                return Some((self.cur_block + i) * 64 + pos);
            }
        }
        for i in self.num_blocks / 2..self.num_blocks {
            let occ = self.blocks[((self.cur_block + i) % self.num_blocks) as usize].occ;
            if occ != 0 {
                let pos = occ.trailing_zeros() as u64;
                let cycle = (self.cur_block + i) * 64 + pos;
                return Some(match self.far.keys().next() {
                    Some(&fc) => cycle.min(fc),
                    None => cycle,
                });
            }
        }
        self.far.keys().next().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeues_in_cycle_order() {
        let mut q = PrioQueue::new(4);
        q.enqueue("c", 130);
        q.enqueue("a", 10);
        q.enqueue("b", 65);
        assert_eq!(q.first_cycle(), Some(10));
        assert_eq!(q.dequeue(), ("a", 10));
        assert_eq!(q.dequeue(), ("b", 65));
        assert_eq!(q.dequeue(), ("c", 130));
        assert!(q.is_empty());
    }

    #[test]
    fn far_elements_are_drained_into_their_home_block() {
        let mut q: PrioQueue<u32> = PrioQueue::new(4);
        // num_blocks=4 covers cur_block..cur_block+4, i.e. cycles 0..256.
        q.enqueue(1, 5);
        q.enqueue(2, 10_000); // far outside the window
        assert_eq!(q.dequeue(), (1, 5));
        // draining the near block forces the window forward; eventually
        // the far element must surface.
        let mut last = 0u64;
        loop {
            if q.is_empty() {
                break;
            }
            let (v, c) = q.dequeue();
            assert_eq!(v, 2);
            assert!(c >= last);
            last = c;
        }
    }

    #[test]
    fn same_cycle_elements_preserve_fifo_order() {
        let mut q = PrioQueue::new(2);
        q.enqueue("first", 8);
        q.enqueue("second", 8);
        assert_eq!(q.dequeue(), ("first", 8));
        assert_eq!(q.dequeue(), ("second", 8));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Whatever order cycles are enqueued in, dequeue must come back
        /// non-decreasing — the bucketed/far-map split is an implementation
        /// detail, not something that should leak out as misordering.
        #[test]
        fn dequeue_is_always_nondecreasing(cycles in prop::collection::vec(0u64..5_000, 0..200)) {
            let mut q = PrioQueue::new(4);
            for (i, c) in cycles.iter().enumerate() {
                q.enqueue(i, *c);
            }
            let mut last = 0u64;
            let mut count = 0;
            while !q.is_empty() {
                let (_, c) = q.dequeue();
                prop_assert!(c >= last);
                last = c;
                count += 1;
            }
            prop_assert_eq!(count, cycles.len());
        }
    }
}
