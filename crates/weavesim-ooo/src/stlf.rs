//! Store-to-load forwarding table (§4.1): a 32-entry direct-mapped table
//! keyed by `(addr>>2) mod 32`, consulted by loads before they fall
//! through to the cache. Direct-mapped means a new store always
//! overwrites whatever address previously lived in its slot, rather than
//! searching associatively — a load whose address maps to a slot last
//! written by a *different* address is an STLF miss, not a probe of the
//! wrong entry.

use weavesim_core::LineAddress;

const DEFAULT_ENTRIES: u32 = 32;
const INDEX_SHIFT: u32 = 2;

#[derive(Clone, Copy)]
struct Entry {
    addr: LineAddress,
    ready_cycle: u64,
    valid: bool,
}

pub struct StlfTable {
    entries: Vec<Entry>,
}

impl StlfTable {
    pub fn new(num_entries: u32) -> Self {
        Self { entries: vec![Entry { addr: 0, ready_cycle: 0, valid: false }; num_entries as usize] }
    }

    fn index(&self, addr: LineAddress) -> usize {
        ((addr >> INDEX_SHIFT) % self.entries.len() as u64) as usize
    }

    /// Records that a store to `addr` will have its data ready at
    /// `ready_cycle`, unconditionally claiming its direct-mapped slot.
    pub fn record_store(&mut self, addr: LineAddress, ready_cycle: u64) {
        let idx = self.index(addr);
        self.entries[idx] = Entry { addr, ready_cycle, valid: true };
    }

    /// Returns the cycle a load to `addr` could forward from, if its
    /// slot is still holding a store to that exact address.
    pub fn probe(&self, addr: LineAddress) -> Option<u64> {
        let idx = self.index(addr);
        let entry = &self.entries[idx];
        (entry.valid && entry.addr == addr).then_some(entry.ready_cycle)
    }
}

impl Default for StlfTable {
    fn default() -> Self {
        Self::new(DEFAULT_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_from_the_most_recent_store_to_the_same_address() {
        let mut stlf = StlfTable::default();
        stlf.record_store(0x40, 10);
        stlf.record_store(0x40, 20);
        assert_eq!(stlf.probe(0x40), Some(20));
    }

    #[test]
    fn a_later_store_to_a_different_address_evicts_the_shared_slot() {
        let mut stlf = StlfTable::new(32);
        // 0x10 and 0x10 + 32*4 alias to the same direct-mapped index.
        let a = 0x10u64;
        let b = a + 32 * (1 << INDEX_SHIFT);
        stlf.record_store(a, 1);
        stlf.record_store(b, 2);
        assert_eq!(stlf.probe(a), None, "a's slot was overwritten by b, not associatively searched");
        assert_eq!(stlf.probe(b), Some(2));
    }

    #[test]
    fn an_empty_slot_is_a_miss() {
        let stlf = StlfTable::default();
        assert_eq!(stlf.probe(0x100), None);
    }
}
