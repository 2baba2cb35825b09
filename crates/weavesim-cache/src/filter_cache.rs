//! Lock-free L1 filter (§4.3, grounded on `filter_cache.h`): a tiny
//! direct-mapped shadow array consulted before a request ever reaches the
//! timing cache's MSHRs, so repeat hits to the same line from the same
//! core never pay for a full coherence lookup.
//!
//! Each slot tracks a read tag and a write tag separately (a line can be
//! resident with read permission but not write permission, e.g. `Shared`
//! state) plus the cycle the line became available. The hot-path probe
//! reads three plain atomics with no lock: a mismatched tag just means
//! the slow path runs, so a torn read here is never a correctness problem
//! — only, at worst, an unnecessary slow-path access.

use std::sync::atomic::{AtomicU64, Ordering};

use weavesim_core::LineAddress;

const INVALID_TAG: u64 = u64::MAX;

struct FilterLine {
    read_tag: AtomicU64,
    write_tag: AtomicU64,
    avail_cycle: AtomicU64,
}

impl FilterLine {
    fn new() -> Self {
        Self {
            read_tag: AtomicU64::new(INVALID_TAG),
            write_tag: AtomicU64::new(INVALID_TAG),
            avail_cycle: AtomicU64::new(0),
        }
    }
}

/// A direct-mapped array of `(readAddr, writeAddr, availCycle)` shadow
/// entries, one per line, read and written without any lock.
pub struct FilterCache {
    num_lines: u32,
    lines: Vec<FilterLine>,
}

impl FilterCache {
    pub fn new(num_lines: u32) -> Self {
        let num_lines = num_lines.max(1);
        let mut lines = Vec::with_capacity(num_lines as usize);
        lines.resize_with(num_lines as usize, FilterLine::new);
        Self { num_lines, lines }
    }

    fn index(&self, addr: LineAddress) -> usize {
        (addr % self.num_lines as u64) as usize
    }

    /// Lock-free check for a load: `Some(respCycle)` on a tag match,
    /// where `respCycle = max(curCycle, availCycle)`; `None` sends the
    /// caller down the slow, locked path.
    pub fn probe_load(&self, addr: LineAddress, cur_cycle: u64) -> Option<u64> {
        let line = &self.lines[self.index(addr)];
        if line.read_tag.load(Ordering::Acquire) != addr {
            return None;
        }
        Some(cur_cycle.max(line.avail_cycle.load(Ordering::Acquire)))
    }

    /// Lock-free check for a store, same convention as [`Self::probe_load`]
    /// but against the separate write tag (only set while the line is held
    /// with write permission).
    pub fn probe_store(&self, addr: LineAddress, cur_cycle: u64) -> Option<u64> {
        let line = &self.lines[self.index(addr)];
        if line.write_tag.load(Ordering::Acquire) != addr {
            return None;
        }
        Some(cur_cycle.max(line.avail_cycle.load(Ordering::Acquire)))
    }

    /// Installs a freshly resolved line under the slow path's lock.
    /// `writable` reflects whether the resulting state grants write
    /// permission (`Modified`/`Exclusive`); a `Shared` line gets a read
    /// tag only.
    pub fn fill(&self, addr: LineAddress, avail_cycle: u64, writable: bool) {
        let line = &self.lines[self.index(addr)];
        line.avail_cycle.store(avail_cycle, Ordering::Release);
        line.read_tag.store(addr, Ordering::Release);
        line.write_tag.store(if writable { addr } else { INVALID_TAG }, Ordering::Release);
    }

    /// Clears both tags for `addr` if the slot still holds it — a racing
    /// fill for a different line (or a different line that merely aliases
    /// to the same slot) is left alone.
    pub fn invalidate(&self, addr: LineAddress) {
        let line = &self.lines[self.index(addr)];
        if line.read_tag.load(Ordering::Acquire) == addr {
            line.read_tag.store(INVALID_TAG, Ordering::Release);
        }
        if line.write_tag.load(Ordering::Acquire) == addr {
            line.write_tag.store(INVALID_TAG, Ordering::Release);
        }
    }

    /// Clears only write permission (e.g. a downgrade from `Modified`/
    /// `Exclusive` to `Shared` triggered by another core's `GETS`),
    /// leaving the read tag intact.
    pub fn downgrade(&self, addr: LineAddress) {
        let line = &self.lines[self.index(addr)];
        if line.write_tag.load(Ordering::Acquire) == addr {
            line.write_tag.store(INVALID_TAG, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_misses_until_filled() {
        let fc = FilterCache::new(16);
        assert_eq!(fc.probe_load(0x40, 0), None);
        fc.fill(0x40, 100, true);
        assert_eq!(fc.probe_load(0x40, 0), Some(100));
        assert_eq!(fc.probe_load(0x40, 150), Some(150));
    }

    #[test]
    fn shared_fill_permits_loads_but_not_stores() {
        let fc = FilterCache::new(16);
        fc.fill(0x40, 50, false);
        assert_eq!(fc.probe_load(0x40, 0), Some(50));
        assert_eq!(fc.probe_store(0x40, 0), None);
    }

    #[test]
    fn invalidate_only_clears_the_matching_tag() {
        let fc = FilterCache::new(1);
        fc.fill(0x40, 10, true);
        fc.invalidate(0x80); // aliases to the same slot but a different tag
        assert_eq!(fc.probe_load(0x40, 0), Some(10), "wrong tag must not evict");
        fc.invalidate(0x40);
        assert_eq!(fc.probe_load(0x40, 0), None);
        assert_eq!(fc.probe_store(0x40, 0), None);
    }

    #[test]
    fn downgrade_clears_write_permission_only() {
        let fc = FilterCache::new(16);
        fc.fill(0x100, 20, true);
        fc.downgrade(0x100);
        assert_eq!(fc.probe_load(0x100, 0), Some(20));
        assert_eq!(fc.probe_store(0x100, 0), None);
    }
}
