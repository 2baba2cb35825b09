//! Memory hierarchy glue: walks a core's access up through its private L1,
//! a shared L2, and the DRAM backend, following the `access(MemReq) ->
//! respCycle` contract each level exposes on its own (`cache.h`'s
//! `processAccess` recursing into the next level up on a miss).
//!
//! `weavesim-cache` stops at a single level's `access`/`complete_fill`
//! pair; stitching levels into a tree and driving the miss->fill->retry
//! sequence is the CLI's job, same as it would be the instrumentation
//! front end's job in the original.

use parking_lot::Mutex;

use weavesim_cache::{AccessOutcome, CacheError, DramBackend, FilterCache, StreamPrefetcher, TimingCache};
use weavesim_core::{AccessType, LineAddress, MemFlags, MemReq, MesiState, ReleasableLock};

/// Direct-mapped shadow entries per core's [`FilterCache`]. Independent of
/// the backing L1's own set/way geometry — it only needs to be large
/// enough that the working set it is meant to catch doesn't thrash it.
const FILTER_CACHE_LINES: u32 = 256;

pub struct MemHierarchy {
    l1: Vec<Mutex<TimingCache>>,
    l2: Mutex<TimingCache>,
    dram: Mutex<Box<dyn DramBackend>>,
    /// Lock-free overlay in front of each core's L1 (§4.3 "filter cache"):
    /// a repeat load/store to a line this core already holds with the
    /// right permission resolves here without ever taking the L1 lock.
    filters: Vec<FilterCache>,
    /// One stream prefetcher per core, watching that core's L1 demand
    /// stream. `None` when `sys.caches.l1d.prefetch.degree` is `0`.
    prefetchers: Vec<Mutex<Option<StreamPrefetcher>>>,
}

/// One core's access resolved all the way down the hierarchy: the final
/// response cycle and whether it needed the L2 and/or DRAM.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyAccess {
    pub response_cycle: u64,
    pub l1_hit: bool,
    pub l2_hit: bool,
}

impl MemHierarchy {
    pub fn new(l1_per_core: Vec<TimingCache>, l2: TimingCache, dram: Box<dyn DramBackend>) -> Self {
        Self::with_prefetch(l1_per_core, l2, dram, 0)
    }

    /// `prefetch_degree` of `0` disables stream prefetching entirely
    /// (each core's slot holds `None`); otherwise every core gets its own
    /// [`StreamPrefetcher`] issuing up to that many lines ahead per
    /// demand access.
    pub fn with_prefetch(
        l1_per_core: Vec<TimingCache>,
        l2: TimingCache,
        dram: Box<dyn DramBackend>,
        prefetch_degree: u32,
    ) -> Self {
        let num_cores = l1_per_core.len();
        Self {
            l1: l1_per_core.into_iter().map(Mutex::new).collect(),
            l2: Mutex::new(l2),
            dram: Mutex::new(dram),
            filters: (0..num_cores).map(|_| FilterCache::new(FILTER_CACHE_LINES)).collect(),
            prefetchers: (0..num_cores)
                .map(|_| Mutex::new((prefetch_degree > 0).then(|| StreamPrefetcher::new(prefetch_degree))))
                .collect(),
        }
    }

    pub fn num_cores(&self) -> usize {
        self.l1.len()
    }

    /// Resolves one core's load/store from the line address down to
    /// whichever level serves it. Always succeeds (an `MshrFull` bounces
    /// the access back one level as if it missed further down, mirroring
    /// the original's stall-and-retry under MSHR pressure) except where
    /// the core index itself is out of range.
    pub fn access(
        &self,
        core: u32,
        addr: LineAddress,
        is_write: bool,
        issue_cycle: u64,
    ) -> Result<HierarchyAccess, CacheError> {
        let l1 = self.l1.get(core as usize).ok_or(CacheError::UnknownSharer(core, self.l1.len()))?;
        let access_type = if is_write { AccessType::Getx } else { AccessType::Gets };

        if let Some(filter) = self.filters.get(core as usize) {
            let shadow_hit = if is_write {
                filter.probe_store(addr, issue_cycle)
            } else {
                filter.probe_load(addr, issue_cycle)
            };
            if let Some(cycle) = shadow_hit {
                return Ok(HierarchyAccess { response_cycle: cycle, l1_hit: true, l2_hit: true });
            }
        }

        let mut l1_state = MesiState::Invalid;
        let mut l1 = l1.lock();
        let mut req = MemReq {
            line_addr: addr,
            access_type,
            child_id: 0,
            child_state: &mut l1_state,
            arrival_cycle: issue_cycle,
            lock: ReleasableLock::none(),
            initial_state: MesiState::Invalid,
            src_core: core,
            flags: MemFlags::empty(),
        };

        let mut final_state = MesiState::Invalid;
        let outcome = match l1.access(&mut req, issue_cycle) {
            Ok(AccessOutcome::Done { cycle }) | Ok(AccessOutcome::HitWithInvalidate { cycle, .. }) => {
                final_state = l1_state;
                Ok(HierarchyAccess { response_cycle: cycle, l1_hit: true, l2_hit: true })
            }
            Ok(AccessOutcome::NeedsFill { cycle, .. }) => {
                let l2_result = self.access_l2(core, addr, access_type, cycle)?;
                drop(req);
                let mut refill_state = MesiState::Invalid;
                let mut refill_req = MemReq {
                    line_addr: addr,
                    access_type,
                    child_id: 0,
                    child_state: &mut refill_state,
                    arrival_cycle: l2_result.response_cycle,
                    lock: ReleasableLock::none(),
                    initial_state: MesiState::Invalid,
                    src_core: core,
                    flags: MemFlags::empty(),
                };
                l1.complete_fill(&mut refill_req, l2_result.response_cycle)?;
                final_state = refill_state;
                Ok(HierarchyAccess {
                    response_cycle: l2_result.response_cycle,
                    l1_hit: false,
                    l2_hit: l2_result.l2_hit,
                })
            }
            Err(CacheError::MshrFull(_)) => {
                // Every in-flight MSHR already covers this line; treat the
                // access as resolving once the existing fill lands. A
                // faithful model would track waiter lists per MSHR inside
                // `TimingCache` itself; folding it to "try again one cycle
                // later" keeps the CLI's glue code simple without
                // fabricating state `weavesim-cache` doesn't expose.
                drop(l1);
                return self.access(core, addr, is_write, issue_cycle + 1);
            }
            Err(err) => Err(err),
        };
        drop(l1);

        if let Ok(result) = &outcome {
            if let Some(filter) = self.filters.get(core as usize) {
                let writable = matches!(final_state, MesiState::Modified | MesiState::Exclusive);
                filter.fill(addr, result.response_cycle, writable);
            }
            self.drive_prefetcher(core, addr, result.response_cycle);
        }
        outcome
    }

    /// Feeds the core's demand stream into its prefetcher and issues any
    /// predicted lines as L1 fills. Prefetch issues never block or retry
    /// the triggering demand access: an `MshrFull`/other error just drops
    /// that prefetch on the floor, same as an over-eager hardware stream
    /// prefetcher that loses a slot to demand traffic.
    fn drive_prefetcher(&self, core: u32, addr: LineAddress, cycle: u64) {
        let Some(slot) = self.prefetchers.get(core as usize) else { return };
        let mut guard = slot.lock();
        let Some(pf) = guard.as_mut() else { return };
        let (_, targets) = pf.on_access(addr);
        drop(guard);
        for target in targets {
            let _ = self.fill_l1_for_prefetch(core, target, cycle);
        }
    }

    fn fill_l1_for_prefetch(&self, core: u32, addr: LineAddress, issue_cycle: u64) -> Result<(), CacheError> {
        let l1 = self.l1.get(core as usize).ok_or(CacheError::UnknownSharer(core, self.l1.len()))?;
        let mut l1_state = MesiState::Invalid;
        let mut l1 = l1.lock();
        let mut req = MemReq {
            line_addr: addr,
            access_type: AccessType::Gets,
            child_id: 0,
            child_state: &mut l1_state,
            arrival_cycle: issue_cycle,
            lock: ReleasableLock::none(),
            initial_state: MesiState::Invalid,
            src_core: core,
            flags: MemFlags::PREFETCH,
        };

        match l1.access(&mut req, issue_cycle) {
            Ok(AccessOutcome::Done { .. }) | Ok(AccessOutcome::HitWithInvalidate { .. }) => Ok(()),
            Ok(AccessOutcome::NeedsFill { cycle, .. }) => {
                drop(req);
                let l2_result = self.access_l2(core, addr, AccessType::Gets, cycle)?;
                let mut refill_state = MesiState::Invalid;
                let mut refill_req = MemReq {
                    line_addr: addr,
                    access_type: AccessType::Gets,
                    child_id: 0,
                    child_state: &mut refill_state,
                    arrival_cycle: l2_result.response_cycle,
                    lock: ReleasableLock::none(),
                    initial_state: MesiState::Invalid,
                    src_core: core,
                    flags: MemFlags::PREFETCH,
                };
                l1.complete_fill(&mut refill_req, l2_result.response_cycle).map(|_| ())
            }
            Err(_) => Ok(()),
        }
    }

    fn access_l2(
        &self,
        core: u32,
        addr: LineAddress,
        access_type: AccessType,
        issue_cycle: u64,
    ) -> Result<L2Result, CacheError> {
        let mut l2_state = MesiState::Invalid;
        let mut l2 = self.l2.lock();
        let mut req = MemReq {
            line_addr: addr,
            access_type,
            child_id: core,
            child_state: &mut l2_state,
            arrival_cycle: issue_cycle,
            lock: ReleasableLock::none(),
            initial_state: MesiState::Invalid,
            src_core: core,
            flags: MemFlags::empty(),
        };

        match l2.access(&mut req, issue_cycle)? {
            AccessOutcome::Done { cycle } | AccessOutcome::HitWithInvalidate { cycle, .. } => {
                Ok(L2Result { response_cycle: cycle, l2_hit: true })
            }
            AccessOutcome::NeedsFill { cycle, .. } => {
                drop(req);
                let dram_cycle = self.dram.lock().access(addr, access_type == AccessType::Getx, cycle);
                let mut fill_state = MesiState::Invalid;
                let mut fill_req = MemReq {
                    line_addr: addr,
                    access_type,
                    child_id: core,
                    child_state: &mut fill_state,
                    arrival_cycle: dram_cycle,
                    lock: ReleasableLock::none(),
                    initial_state: MesiState::Invalid,
                    src_core: core,
                    flags: MemFlags::empty(),
                };
                l2.complete_fill(&mut fill_req, dram_cycle)?;
                Ok(L2Result { response_cycle: dram_cycle, l2_hit: false })
            }
        }
    }
}

struct L2Result {
    response_cycle: u64,
    l2_hit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use weavesim_cache::{FixedLatency, SetAssocArray};
    use weavesim_cache::repl::Lru;

    fn hierarchy(num_cores: usize) -> MemHierarchy {
        let l1s = (0..num_cores)
            .map(|_| TimingCache::new(SetAssocArray::new(64, 4, Box::new(Lru::default())), 8, 4, 20, 4))
            .collect();
        let l2 = TimingCache::new(SetAssocArray::new(256, 8, Box::new(Lru::default())), 16, 12, 60, 8);
        MemHierarchy::new(l1s, l2, Box::new(FixedLatency::new(100)))
    }

    #[test]
    fn cold_access_walks_all_the_way_to_dram() {
        let h = hierarchy(1);
        let result = h.access(0, 0x1000, false, 0).unwrap();
        assert!(!result.l1_hit);
        assert!(result.response_cycle > 100);
    }

    #[test]
    fn warm_access_hits_in_l1() {
        let h = hierarchy(1);
        h.access(0, 0x1000, false, 0).unwrap();
        let second = h.access(0, 0x1000, false, 200).unwrap();
        assert!(second.l1_hit);
        // A warm hit (short-circuited by the filter cache, or otherwise an
        // L1 array hit) must add only L1-scale latency, nowhere near
        // another DRAM round trip.
        assert!(second.response_cycle - 200 < 100);
    }

    #[test]
    fn repeated_same_core_access_short_circuits_through_the_filter_cache() {
        let h = hierarchy(1);
        let first = h.access(0, 0x4000, false, 0).unwrap();
        // Once resident with write permission, a same-core store hits the
        // filter's write tag directly.
        let second = h.access(0, 0x4000, true, first.response_cycle + 10).unwrap();
        assert!(second.l1_hit);
        assert_eq!(second.response_cycle, first.response_cycle + 10);
    }

    #[test]
    fn two_cores_share_the_l2() {
        let h = hierarchy(2);
        h.access(0, 0x2000, false, 0).unwrap();
        // Core 1 now shares the line via L2 rather than re-walking to DRAM.
        let result = h.access(1, 0x2000, false, 50).unwrap();
        assert!(result.l2_hit);
    }

    fn hierarchy_with_prefetch(num_cores: usize, degree: u32) -> MemHierarchy {
        let l1s = (0..num_cores)
            .map(|_| TimingCache::new(SetAssocArray::new(64, 4, Box::new(Lru::default())), 8, 4, 20, 4))
            .collect();
        let l2 = TimingCache::new(SetAssocArray::new(256, 8, Box::new(Lru::default())), 16, 12, 60, 8);
        MemHierarchy::with_prefetch(l1s, l2, Box::new(FixedLatency::new(100)), degree)
    }

    #[test]
    fn a_confirmed_stride_prefetches_ahead_of_the_demand_stream() {
        let h = hierarchy_with_prefetch(1, 2);
        for (i, addr) in [0x1000u64, 0x1001, 0x1002, 0x1003].into_iter().enumerate() {
            h.access(0, addr, false, i as u64 * 1000).unwrap();
        }
        // The fourth access confirms a stride-1 stream and should have
        // pulled 0x1004 into L1 ahead of the demand stream reaching it.
        let result = h.access(0, 0x1004, false, 5000).unwrap();
        assert!(result.l1_hit, "0x1004 should already be resident from the stream prefetcher");
    }

    #[test]
    fn prefetching_stays_off_when_no_degree_is_configured() {
        let h = hierarchy_with_prefetch(1, 0);
        for (i, addr) in [0x1000u64, 0x1001, 0x1002, 0x1003].into_iter().enumerate() {
            h.access(0, addr, false, i as u64 * 1000).unwrap();
        }
        let result = h.access(0, 0x1004, false, 5000).unwrap();
        assert!(!result.l1_hit, "no prefetcher installed, so 0x1004 was never requested");
    }
}
