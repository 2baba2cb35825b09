//! Stream prefetcher (§4.3, grounded on `prefetcher.h`'s stream-table
//! design): a 16-entry table indexed by page (64-line granularity), each
//! entry confirming a constant stride within that page before it starts
//! issuing prefetches ahead of the demand stream.

use weavesim_core::LineAddress;

const NUM_STREAMS: usize = 16;
/// Lines per page a single stream-table entry tracks; §4.3's "64-line
/// granularity".
const PAGE_LINES: u64 = 64;
/// 2-bit saturating counter, so confidence never exceeds 3.
const MAX_CONFIDENCE: u8 = 3;
const CONFIRM_THRESHOLD: u8 = 2;
/// "Issues up to 2 prefetch accesses at the predicted next position."
const MAX_PREFETCH_DEGREE: usize = 2;

#[derive(Clone, Copy)]
struct StreamEntry {
    page: u64,
    /// Line offset within the page of the two most recent demand
    /// accesses; `last_pos` is the most recent, `last_last_pos` the one
    /// before it. A page entry's stride is derived from their
    /// difference rather than stored directly, so a single touch
    /// (`last_last_pos` still unset) never predicts a stride.
    last_pos: i32,
    last_last_pos: i32,
    confidence: u8,
    valid: bool,
    lru_stamp: u64,
    /// Lines within the page this entry has prefetched but the demand
    /// stream has not yet reached — cleared as the demand stream passes
    /// over them, so a later demand access to an already-prefetched line
    /// can be recognized as a prefetch hit instead of issued again.
    prefetched_not_consumed: u64,
}

impl StreamEntry {
    fn empty() -> Self {
        Self {
            page: 0,
            last_pos: -1,
            last_last_pos: -1,
            confidence: 0,
            valid: false,
            lru_stamp: 0,
            prefetched_not_consumed: 0,
        }
    }

    fn stride(&self) -> Option<i32> {
        if self.last_last_pos < 0 {
            return None;
        }
        Some(self.last_pos - self.last_last_pos)
    }
}

fn split(addr: LineAddress) -> (u64, i32) {
    (addr / PAGE_LINES, (addr % PAGE_LINES) as i32)
}

/// What a demand access through the prefetcher resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchOutcome {
    /// `true` if this address had already been prefetched into the
    /// entry's not-yet-consumed bitmap (a "prefetch hit" in §4.3's
    /// terms) — callers can use this to skip re-issuing the access to
    /// the next level, since the line is already on its way.
    pub was_prefetched: bool,
}

pub struct StreamPrefetcher {
    entries: [StreamEntry; NUM_STREAMS],
    degree: usize,
    clock: u64,
}

impl StreamPrefetcher {
    pub fn new(degree: u32) -> Self {
        Self {
            entries: [StreamEntry::empty(); NUM_STREAMS],
            degree: (degree as usize).clamp(1, MAX_PREFETCH_DEGREE),
            clock: 0,
        }
    }

    /// Feeds a demand access and returns the line addresses (if any) the
    /// caller should issue as prefetches this cycle, plus whether `addr`
    /// itself was already sitting in the entry's prefetched-but-not-
    /// consumed set.
    pub fn on_access(&mut self, addr: LineAddress) -> (PrefetchOutcome, Vec<LineAddress>) {
        self.clock += 1;
        let (page, pos) = split(addr);

        let idx = match self.matching_entry(page) {
            Some(idx) => idx,
            None => {
                let idx = self.victim_stream();
                self.entries[idx] = StreamEntry {
                    page,
                    last_pos: pos,
                    last_last_pos: -1,
                    confidence: 0,
                    valid: true,
                    lru_stamp: self.clock,
                    prefetched_not_consumed: 0,
                };
                return (PrefetchOutcome { was_prefetched: false }, Vec::new());
            }
        };

        let bit = 1u64 << pos;
        let was_prefetched = self.entries[idx].prefetched_not_consumed & bit != 0;
        self.entries[idx].prefetched_not_consumed &= !bit;

        let prior_stride = self.entries[idx].stride();
        let new_stride = pos - self.entries[idx].last_pos;
        {
            let entry = &mut self.entries[idx];
            entry.last_last_pos = entry.last_pos;
            entry.last_pos = pos;
            entry.lru_stamp = self.clock;
            if prior_stride == Some(new_stride) && new_stride != 0 {
                entry.confidence = (entry.confidence + 1).min(MAX_CONFIDENCE);
            } else {
                entry.confidence = 0;
            }
        }

        let entry = &self.entries[idx];
        if entry.confidence < CONFIRM_THRESHOLD || new_stride == 0 {
            return (PrefetchOutcome { was_prefetched }, Vec::new());
        }

        let mut issued = Vec::with_capacity(self.degree);
        for i in 1..=self.degree as i32 {
            let target_pos = pos + new_stride * i;
            if !(0..PAGE_LINES as i32).contains(&target_pos) {
                break; // stream prefetching never crosses a page boundary
            }
            self.entries[idx].prefetched_not_consumed |= 1u64 << target_pos;
            issued.push(page * PAGE_LINES + target_pos as u64);
        }
        (PrefetchOutcome { was_prefetched }, issued)
    }

    fn matching_entry(&self, page: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.valid && e.page == page)
    }

    fn victim_stream(&self) -> usize {
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| if e.valid { e.lru_stamp } else { 0 })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirms_a_constant_stride_before_prefetching() {
        let mut pf = StreamPrefetcher::new(2);
        assert!(pf.on_access(0x40).1.is_empty()); // entry allocated for this page
        assert!(pf.on_access(0x41).1.is_empty()); // stride learned, not confirmed yet
        assert!(pf.on_access(0x42).1.is_empty()); // first confirmation
        let (_, out) = pf.on_access(0x43); // second confirmation: now prefetch
        assert_eq!(out, vec![0x44, 0x45]);
    }

    #[test]
    fn irregular_access_never_confirms() {
        let mut pf = StreamPrefetcher::new(2);
        assert!(pf.on_access(0x40).1.is_empty());
        assert!(pf.on_access(0x48).1.is_empty());
        assert!(pf.on_access(0x41).1.is_empty());
    }

    #[test]
    fn a_demand_access_to_an_already_prefetched_line_reports_a_hit() {
        let mut pf = StreamPrefetcher::new(2);
        pf.on_access(0x40);
        pf.on_access(0x41);
        pf.on_access(0x42);
        let (_, out) = pf.on_access(0x43);
        assert_eq!(out, vec![0x44, 0x45]);
        let (outcome, _) = pf.on_access(0x44);
        assert!(outcome.was_prefetched, "0x44 was prefetched by the previous access");
    }

    #[test]
    fn stream_prefetching_never_crosses_a_page_boundary() {
        let mut pf = StreamPrefetcher::new(2);
        let base = 0x40; // page 1, offset 0
        pf.on_access(base + 60);
        pf.on_access(base + 61);
        pf.on_access(base + 62);
        let (_, out) = pf.on_access(base + 63); // confirms stride 1, next two would be 64/65: off-page
        assert_eq!(out, vec![], "predicted next lines fall outside this entry's page");
    }

    #[test]
    fn sixteen_distinct_pages_evict_the_coldest_entry() {
        let mut pf = StreamPrefetcher::new(1);
        for page in 0..NUM_STREAMS as u64 {
            pf.on_access(page * PAGE_LINES);
        }
        // A 17th distinct page must evict the least-recently-touched entry (page 0).
        pf.on_access(NUM_STREAMS as u64 * PAGE_LINES);
        assert!(pf.matching_entry(0).is_none());
    }
}
