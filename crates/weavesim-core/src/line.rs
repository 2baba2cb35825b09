//! Cache line state (§3: "Cache line state").

use serde::{Deserialize, Serialize};

use crate::memreq::{LineAddress, MesiState};

/// Compile-time bound on the number of children (sharers) a non-terminal
/// cache level can track. Kept small and fixed so the sharer set is a
/// plain bitmask instead of a heap-allocated set — this is the hottest
/// piece of state in the coherence hot path.
pub const MAX_CHILDREN: usize = 64;

/// Fixed-size sharer bit-vector, one bit per child id in `0..MAX_CHILDREN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SharerSet(u64);

impl SharerSet {
    pub const EMPTY: SharerSet = SharerSet(0);

    pub fn add(&mut self, child: u32) {
        debug_assert!((child as usize) < MAX_CHILDREN);
        self.0 |= 1u64 << child;
    }

    pub fn remove(&mut self, child: u32) {
        debug_assert!((child as usize) < MAX_CHILDREN);
        self.0 &= !(1u64 << child);
    }

    pub fn contains(&self, child: u32) -> bool {
        (self.0 >> child) & 1 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn only(&self, child: u32) -> bool {
        self.0 == 1u64 << child
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let bits = self.0;
        (0..MAX_CHILDREN as u32).filter(move |&i| (bits >> i) & 1 != 0)
    }
}

/// A single cache line slot: tag, MESI state, and (for non-terminal cache
/// levels) the sharer set tracking which children may hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLine {
    pub tag: LineAddress,
    pub state: MesiState,
    pub sharers: SharerSet,
}

impl CacheLine {
    pub fn invalid() -> Self {
        Self {
            tag: 0,
            state: MesiState::Invalid,
            sharers: SharerSet::EMPTY,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }
}

impl Default for CacheLine {
    fn default() -> Self {
        Self::invalid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharer_set_add_remove() {
        let mut s = SharerSet::EMPTY;
        assert!(s.is_empty());
        s.add(3);
        s.add(5);
        assert!(s.contains(3));
        assert!(s.contains(5));
        assert_eq!(s.count(), 2);
        s.remove(3);
        assert!(!s.contains(3));
        assert!(s.only(5));
    }

    #[test]
    fn invalid_line_is_not_valid() {
        assert!(!CacheLine::invalid().is_valid());
    }
}
