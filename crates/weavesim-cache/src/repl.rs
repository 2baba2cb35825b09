//! Replacement policies (§4.3, grounded on `repl_policies.h`'s mix-and-
//! match design: the cache array is policy-agnostic, so any of these can
//! back any `CacheArray`).

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Chooses a victim way among a set's candidates and learns from accesses.
/// Implementations are per-set-independent: all state is indexed by
/// `(set_id, way)`, never assuming a fixed number of sets up front.
pub trait ReplPolicy: Send {
    fn victim(&mut self, set_id: u32, candidates: &[u32]) -> u32;
    fn update(&mut self, set_id: u32, way: u32);
}

/// True least-recently-used: a monotonic access counter per `(set, way)`.
#[derive(Default)]
pub struct Lru {
    clock: u64,
    stamps: std::collections::HashMap<(u32, u32), u64>,
}

impl ReplPolicy for Lru {
    fn victim(&mut self, set_id: u32, candidates: &[u32]) -> u32 {
        *candidates
            .iter()
            .min_by_key(|&&way| self.stamps.get(&(set_id, way)).copied().unwrap_or(0))
            .expect("candidates must be non-empty")
    }

    fn update(&mut self, set_id: u32, way: u32) {
        self.clock += 1;
        self.stamps.insert((set_id, way), self.clock);
    }
}

/// Not-recently-used: one bit per `(set, way)`. Victims come from the
/// unset-bit pool; once every candidate is set, the pool is cleared and
/// sampled again, matching the classic NRU refresh trick.
#[derive(Default)]
pub struct Nru {
    recent: std::collections::HashSet<(u32, u32)>,
}

impl ReplPolicy for Nru {
    fn victim(&mut self, set_id: u32, candidates: &[u32]) -> u32 {
        if let Some(&way) = candidates.iter().find(|&&w| !self.recent.contains(&(set_id, w))) {
            return way;
        }
        for &way in candidates {
            self.recent.remove(&(set_id, way));
        }
        candidates[0]
    }

    fn update(&mut self, set_id: u32, way: u32) {
        self.recent.insert((set_id, way));
    }
}

pub struct Random {
    rng: Xoshiro256PlusPlus,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self { rng: Xoshiro256PlusPlus::seed_from_u64(seed) }
    }
}

impl ReplPolicy for Random {
    fn victim(&mut self, _set_id: u32, candidates: &[u32]) -> u32 {
        candidates[self.rng.gen_range(0..candidates.len())]
    }

    fn update(&mut self, _set_id: u32, _way: u32) {}
}

/// Least-frequently-used: a saturating hit counter per `(set, way)`,
/// decayed whenever it is consulted for a replacement so cold-but-old
/// lines do not linger forever.
#[derive(Default)]
pub struct Lfu {
    freq: std::collections::HashMap<(u32, u32), u32>,
}

impl ReplPolicy for Lfu {
    fn victim(&mut self, set_id: u32, candidates: &[u32]) -> u32 {
        let victim = *candidates
            .iter()
            .min_by_key(|&&way| self.freq.get(&(set_id, way)).copied().unwrap_or(0))
            .expect("candidates must be non-empty");
        for &way in candidates {
            if let Some(f) = self.freq.get_mut(&(set_id, way)) {
                *f /= 2;
            }
        }
        victim
    }

    fn update(&mut self, set_id: u32, way: u32) {
        let f = self.freq.entry((set_id, way)).or_insert(0);
        *f = f.saturating_add(1);
    }
}

/// Binary-tree pseudo-LRU: one bit per internal node of a balanced binary
/// tree over the set's ways, each bit pointing at the subtree considered
/// *more* recently used. An access flips every bit on the path down to
/// its way to point away from it; a victim search always walks away from
/// the pointed-at subtree. `ways` is fixed at construction (must be a
/// power of two) since, unlike the counter-based policies above, the
/// tree shape has to be known before the first `update`.
pub struct TreeLru {
    ways: usize,
    /// `bits[set_id]` holds one bit per internal tree node, packed in
    /// visit order (root first).
    bits: std::collections::HashMap<u32, Vec<bool>>,
}

impl TreeLru {
    pub fn new(ways: u32) -> Self {
        assert!(ways.is_power_of_two(), "tree-PLRU requires a power-of-two way count");
        Self { ways: ways as usize, bits: std::collections::HashMap::new() }
    }

    fn node_count(&self) -> usize {
        self.ways.saturating_sub(1)
    }
}

impl ReplPolicy for TreeLru {
    fn victim(&mut self, set_id: u32, candidates: &[u32]) -> u32 {
        let node_count = self.node_count();
        let bits = self.bits.entry(set_id).or_insert_with(|| vec![false; node_count]);
        // Walk the tree from the root, following each bit towards the
        // subtree that is *not* the pointed-at (more recently used) one.
        let mut node = 0usize;
        let mut lo = 0usize;
        let mut hi = self.ways;
        while hi - lo > 1 {
            let go_right = bits[node];
            let mid = lo + (hi - lo) / 2;
            if go_right {
                node = 2 * node + 2;
                lo = mid;
            } else {
                node = 2 * node + 1;
                hi = mid;
            }
        }
        candidates[lo]
    }

    fn update(&mut self, set_id: u32, way: u32) {
        let node_count = self.node_count();
        let bits = self.bits.entry(set_id).or_insert_with(|| vec![false; node_count]);
        let mut node = 0usize;
        let mut lo = 0usize;
        let mut hi = self.ways;
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            let way_in_right = (way as usize) >= mid;
            // The bit marks which side the *next* eviction should prefer,
            // which is the side opposite the one just accessed.
            bits[node] = !way_in_right;
            if way_in_right {
                node = 2 * node + 2;
                lo = mid;
            } else {
                node = 2 * node + 1;
                hi = mid;
            }
        }
    }
}

/// True global LRU with no associativity restriction, paired with
/// `array::IdealLruArray` to form §4.3's miss-curve oracle. The
/// algorithm is identical to [`Lru`]; it is a distinct type only because
/// configuration (`sys.caches.*.repl = "IdealLRU"`) and topology
/// construction must be able to name it independently of a real,
/// set-restricted `LRU`.
#[derive(Default)]
pub struct IdealLru {
    inner: Lru,
}

impl ReplPolicy for IdealLru {
    fn victim(&mut self, set_id: u32, candidates: &[u32]) -> u32 {
        self.inner.victim(set_id, candidates)
    }

    fn update(&mut self, set_id: u32, way: u32) {
        self.inner.update(set_id, way)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_evicts_the_coldest_way() {
        let mut lru = Lru::default();
        lru.update(0, 0);
        lru.update(0, 1);
        lru.update(0, 2);
        lru.update(0, 1); // touch way 1 again, way 0 is now coldest
        assert_eq!(lru.victim(0, &[0, 1, 2]), 0);
    }

    #[test]
    fn nru_prefers_unset_bits_then_resets() {
        let mut nru = Nru::default();
        nru.update(0, 0);
        nru.update(0, 1);
        // way 2 has never been touched: it's the victim.
        assert_eq!(nru.victim(0, &[0, 1, 2]), 2);
        nru.update(0, 2);
        // every candidate is now "recent"; the pool resets and returns one.
        let v = nru.victim(0, &[0, 1, 2]);
        assert!([0, 1, 2].contains(&v));
    }

    #[test]
    fn tree_lru_never_immediately_re_picks_the_way_it_just_touched() {
        let mut plru = TreeLru::new(4);
        let candidates = [0u32, 1, 2, 3];
        let mut last = None;
        for _ in 0..8 {
            let v = plru.victim(0, &candidates);
            if let Some(prev) = last {
                assert_ne!(v, prev, "PLRU must not evict the way it just marked as touched");
            }
            plru.update(0, v);
            last = Some(v);
        }
    }

    #[test]
    fn tree_lru_tracks_sets_independently() {
        let mut plru = TreeLru::new(2);
        plru.update(0, 0);
        plru.update(1, 1);
        // set 0 just touched way 0, so its victim is way 1; set 1 is the
        // opposite.
        assert_eq!(plru.victim(0, &[0, 1]), 1);
        assert_eq!(plru.victim(1, &[0, 1]), 0);
    }

    #[test]
    fn ideal_lru_behaves_like_plain_lru() {
        let mut ideal = IdealLru::default();
        ideal.update(0, 0);
        ideal.update(0, 1);
        ideal.update(0, 2);
        ideal.update(0, 1);
        assert_eq!(ideal.victim(0, &[0, 1, 2]), 0);
    }
}
