//! Cache arrays (§4.3, grounded on `cache_arrays.h`'s tag/array split,
//! inferred from `cache.h`'s composition of `CacheArray` + `ReplPolicy`
//! since the array header itself was not in the retrieval pack).

use weavesim_core::{CacheLine, LineAddress};

use crate::error::CacheError;
use crate::repl::ReplPolicy;

/// The placement policy a `TimingCache` is built on: where a line with a
/// given tag is allowed to live, and how a victim among those candidate
/// locations is chosen. `SetAssocArray`, `ZcacheArray`, and
/// `IdealLruArray` below are the three variants §4.3 names; `TimingCache`
/// holds one behind a `Box<dyn CacheArray>` and never downcasts.
pub trait CacheArray: Send {
    fn num_sets(&self) -> u32;
    fn ways(&self) -> u32;
    fn lookup(&self, tag: LineAddress) -> Option<(u32, u32, CacheLine)>;
    fn line(&self, set_id: u32, way: u32) -> Result<CacheLine, CacheError>;
    fn set_line(&mut self, set_id: u32, way: u32, line: CacheLine) -> Result<(), CacheError>;
    fn find_victim(&mut self, tag: LineAddress) -> (u32, u32, Option<CacheLine>);
}

/// A set-associative tag array. Knows nothing about coherence: callers
/// look a line up, decide what MESI transition applies, and write the
/// result back.
pub struct SetAssocArray {
    num_sets: u32,
    ways: u32,
    lines: Vec<CacheLine>,
    repl: Box<dyn ReplPolicy>,
}

impl SetAssocArray {
    pub fn new(num_sets: u32, ways: u32, repl: Box<dyn ReplPolicy>) -> Self {
        Self {
            num_sets,
            ways,
            lines: vec![CacheLine::invalid(); (num_sets * ways) as usize],
            repl,
        }
    }

    pub fn num_sets(&self) -> u32 {
        self.num_sets
    }

    pub fn ways(&self) -> u32 {
        self.ways
    }

    fn set_of(&self, tag: LineAddress) -> u32 {
        (tag % self.num_sets as u64) as u32
    }

    fn index(&self, set_id: u32, way: u32) -> usize {
        (set_id * self.ways + way) as usize
    }

    /// Looks a line up by tag; returns the way it lives in if present.
    pub fn lookup(&self, tag: LineAddress) -> Option<(u32, u32, CacheLine)> {
        let set_id = self.set_of(tag);
        for way in 0..self.ways {
            let line = self.lines[self.index(set_id, way)];
            if line.is_valid() && line.tag == tag {
                return Some((set_id, way, line));
            }
        }
        None
    }

    pub fn line(&self, set_id: u32, way: u32) -> Result<CacheLine, CacheError> {
        self.bounds_check(set_id, way)?;
        Ok(self.lines[self.index(set_id, way)])
    }

    pub fn set_line(&mut self, set_id: u32, way: u32, line: CacheLine) -> Result<(), CacheError> {
        self.bounds_check(set_id, way)?;
        let idx = self.index(set_id, way);
        self.lines[idx] = line;
        if line.is_valid() {
            self.repl.update(set_id, way);
        }
        Ok(())
    }

    /// Picks a way to hold an incoming line for `tag`: an invalid way if
    /// one exists, otherwise whatever the replacement policy evicts.
    pub fn find_victim(&mut self, tag: LineAddress) -> (u32, u32, Option<CacheLine>) {
        let set_id = self.set_of(tag);
        let base = (set_id * self.ways) as usize;
        if let Some(way) = (0..self.ways).find(|&w| !self.lines[base + w as usize].is_valid()) {
            return (set_id, way, None);
        }
        let candidates: Vec<u32> = (0..self.ways).collect();
        let way = self.repl.victim(set_id, &candidates);
        let evicted = self.lines[self.index(set_id, way)];
        (set_id, way, Some(evicted))
    }

    fn bounds_check(&self, set_id: u32, way: u32) -> Result<(), CacheError> {
        if set_id >= self.num_sets {
            return Err(CacheError::SetOutOfRange(set_id, self.num_sets));
        }
        if way >= self.ways {
            return Err(CacheError::WayOutOfRange(way, self.ways));
        }
        Ok(())
    }
}

impl CacheArray for SetAssocArray {
    fn num_sets(&self) -> u32 {
        self.num_sets()
    }

    fn ways(&self) -> u32 {
        self.ways()
    }

    fn lookup(&self, tag: LineAddress) -> Option<(u32, u32, CacheLine)> {
        self.lookup(tag)
    }

    fn line(&self, set_id: u32, way: u32) -> Result<CacheLine, CacheError> {
        self.line(set_id, way)
    }

    fn set_line(&mut self, set_id: u32, way: u32, line: CacheLine) -> Result<(), CacheError> {
        self.set_line(set_id, way, line)
    }

    fn find_victim(&mut self, tag: LineAddress) -> (u32, u32, Option<CacheLine>) {
        self.find_victim(tag)
    }
}

/// Skewed-associative array ("zcache"): each of the `ways` candidate
/// slots for a tag is chosen by a *different* hash function over a
/// shared backing store of `num_sets` physical sets, so two tags that
/// collide under hash 0 need not collide under hash 1. This is what lets
/// a zcache approximate fully-associative replacement quality at
/// set-associative lookup cost: `find_victim` gathers one candidate line
/// per way (each possibly from a different physical set) and lets the
/// replacement policy pick among them directly, without a notion of "the
/// set" at all.
pub struct ZcacheArray {
    num_sets: u32,
    ways: u32,
    lines: Vec<CacheLine>,
    repl: Box<dyn ReplPolicy>,
    /// Per-way hash multiplier (odd, so multiplication is invertible mod
    /// a power of two); this is the "K candidate hash functions" §3 asks
    /// for, kept deliberately simple rather than a full H3 family.
    hash_mult: Vec<u64>,
}

impl ZcacheArray {
    pub fn new(num_sets: u32, ways: u32, repl: Box<dyn ReplPolicy>) -> Self {
        let hash_mult = (0..ways).map(|w| 2 * (w as u64) + 1).collect();
        Self {
            num_sets,
            ways,
            lines: vec![CacheLine::invalid(); (num_sets * ways) as usize],
            repl,
            hash_mult,
        }
    }

    /// The physical set a tag maps to under candidate hash `way`.
    fn set_for_way(&self, tag: LineAddress, way: u32) -> u32 {
        let mixed = tag.wrapping_mul(self.hash_mult[way as usize]);
        ((mixed >> 7) % self.num_sets as u64) as u32
    }

    fn index(&self, physical_set: u32, way: u32) -> usize {
        (physical_set * self.ways + way) as usize
    }
}

impl CacheArray for ZcacheArray {
    fn num_sets(&self) -> u32 {
        self.num_sets
    }

    fn ways(&self) -> u32 {
        self.ways
    }

    fn lookup(&self, tag: LineAddress) -> Option<(u32, u32, CacheLine)> {
        for way in 0..self.ways {
            let physical_set = self.set_for_way(tag, way);
            let line = self.lines[self.index(physical_set, way)];
            if line.is_valid() && line.tag == tag {
                return Some((physical_set, way, line));
            }
        }
        None
    }

    fn line(&self, set_id: u32, way: u32) -> Result<CacheLine, CacheError> {
        if set_id >= self.num_sets {
            return Err(CacheError::SetOutOfRange(set_id, self.num_sets));
        }
        if way >= self.ways {
            return Err(CacheError::WayOutOfRange(way, self.ways));
        }
        Ok(self.lines[self.index(set_id, way)])
    }

    fn set_line(&mut self, set_id: u32, way: u32, line: CacheLine) -> Result<(), CacheError> {
        if set_id >= self.num_sets {
            return Err(CacheError::SetOutOfRange(set_id, self.num_sets));
        }
        if way >= self.ways {
            return Err(CacheError::WayOutOfRange(way, self.ways));
        }
        let idx = self.index(set_id, way);
        self.lines[idx] = line;
        if line.is_valid() {
            // `ReplPolicy` is keyed by `(set_id, way)`; a zcache has no
            // single physical set shared by all candidates, so recency is
            // tracked per candidate/hash-function index instead, with a
            // fixed synthetic `set_id` of 0. `find_victim` below reads
            // back with the exact same keys, so the two stay consistent
            // even though neither corresponds to a real physical set.
            self.repl.update(0, way);
        }
        Ok(())
    }

    /// Gathers one candidate line per way (each from its own hashed
    /// physical set), using an invalid one if present, else asking the
    /// replacement policy to pick among all `ways` candidates at once.
    fn find_victim(&mut self, tag: LineAddress) -> (u32, u32, Option<CacheLine>) {
        let candidates: Vec<(u32, u32)> = (0..self.ways).map(|w| (self.set_for_way(tag, w), w)).collect();
        if let Some(&(set_id, way)) = candidates.iter().find(|&&(s, w)| !self.lines[self.index(s, w)].is_valid()) {
            return (set_id, way, None);
        }
        let way_indices: Vec<u32> = (0..self.ways).collect();
        let chosen_way = self.repl.victim(0, &way_indices);
        let (set_id, way) = candidates[chosen_way as usize];
        let evicted = self.lines[self.index(set_id, way)];
        (set_id, way, Some(evicted))
    }
}

/// An "ideal" array: a single pool of `capacity` lines with no set
/// restriction at all — any tag may occupy any frame. Paired with
/// `repl::Lru`/`repl::IdealLru` this gives the miss-curve oracle §4.3's
/// replacement-policy list calls out ("IdealLRU"): true global-LRU
/// replacement unconstrained by associativity, used to measure how much
/// of a real policy's miss rate is conflict-driven versus capacity-
/// driven. Always reports `num_sets() == 1`.
pub struct IdealLruArray {
    capacity: u32,
    lines: Vec<CacheLine>,
    repl: Box<dyn ReplPolicy>,
}

impl IdealLruArray {
    pub fn new(capacity: u32, repl: Box<dyn ReplPolicy>) -> Self {
        Self { capacity, lines: vec![CacheLine::invalid(); capacity as usize], repl }
    }
}

impl CacheArray for IdealLruArray {
    fn num_sets(&self) -> u32 {
        1
    }

    fn ways(&self) -> u32 {
        self.capacity
    }

    fn lookup(&self, tag: LineAddress) -> Option<(u32, u32, CacheLine)> {
        for (way, line) in self.lines.iter().enumerate() {
            if line.is_valid() && line.tag == tag {
                return Some((0, way as u32, *line));
            }
        }
        None
    }

    fn line(&self, set_id: u32, way: u32) -> Result<CacheLine, CacheError> {
        if set_id != 0 {
            return Err(CacheError::SetOutOfRange(set_id, 1));
        }
        if way >= self.capacity {
            return Err(CacheError::WayOutOfRange(way, self.capacity));
        }
        Ok(self.lines[way as usize])
    }

    fn set_line(&mut self, set_id: u32, way: u32, line: CacheLine) -> Result<(), CacheError> {
        if set_id != 0 {
            return Err(CacheError::SetOutOfRange(set_id, 1));
        }
        if way >= self.capacity {
            return Err(CacheError::WayOutOfRange(way, self.capacity));
        }
        self.lines[way as usize] = line;
        if line.is_valid() {
            self.repl.update(0, way);
        }
        Ok(())
    }

    fn find_victim(&mut self, _tag: LineAddress) -> (u32, u32, Option<CacheLine>) {
        if let Some(way) = (0..self.capacity).find(|&w| !self.lines[w as usize].is_valid()) {
            return (0, way, None);
        }
        let candidates: Vec<u32> = (0..self.capacity).collect();
        let way = self.repl.victim(0, &candidates);
        let evicted = self.lines[way as usize];
        (0, way, Some(evicted))
    }
}
