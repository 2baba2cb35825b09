//! A clock domain: one independent cycle count and priority queue (§3,
//! §4.2). Cache levels, cores, and DRAM controllers each own a domain;
//! crossing events are how work moves between them.

use parking_lot::Mutex;

use weavesim_events::EventId;

use crate::prio_queue::PrioQueue;

/// Number of 64-cycle buckets kept hot in each domain's queue before an
/// insert falls back to the overflow map. Matches the spirit of the
/// original's default window (generous enough that most in-flight
/// requests never touch the far map).
pub const DEFAULT_QUEUE_BLOCKS: u64 = 1 << 10;

/// An event queued in a domain, tagged with the recorder (i.e. core) that
/// owns its slab slot. Recorders outlive the events a domain touches for
/// them during the bound phase, so this is just a registry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedEvent {
    pub recorder: u32,
    pub event: EventId,
}

struct DomainState {
    queue: PrioQueue<QueuedEvent>,
    cur_cycle: u64,
    /// Cycles this domain has spent actively simulating (not stalled
    /// waiting for cross-domain input); the crude busy-cycle profiling
    /// counter the original keeps per domain.
    prof_time: u64,
}

pub struct Domain {
    pub id: u32,
    state: Mutex<DomainState>,
}

impl Domain {
    pub fn new(id: u32, queue_blocks: u64) -> Self {
        Self {
            id,
            state: Mutex::new(DomainState {
                queue: PrioQueue::new(queue_blocks),
                cur_cycle: 0,
                prof_time: 0,
            }),
        }
    }

    pub fn cur_cycle(&self) -> u64 {
        self.state.lock().cur_cycle
    }

    pub fn prof_time(&self) -> u64 {
        self.state.lock().prof_time
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    pub fn first_cycle(&self) -> Option<u64> {
        self.state.lock().queue.first_cycle()
    }

    /// Insert from the bound phase, where many core threads race to push
    /// into shared domains (the only place the original's per-domain
    /// lock is load-bearing in its single-threaded-bound-phase design).
    pub fn enqueue_synced(&self, item: QueuedEvent, cycle: u64) {
        self.state.lock().queue.enqueue(item, cycle);
    }

    /// Insert from inside the weave phase. Still synchronized: a crossing
    /// produced on one worker's domain can land here from another.
    pub fn enqueue(&self, item: QueuedEvent, cycle: u64) {
        self.enqueue_synced(item, cycle);
    }

    /// Re-insert a held event (e.g. a crossing destination still waiting
    /// on its proxy).
    pub fn requeue(&self, item: QueuedEvent, cycle: u64) {
        self.enqueue_synced(item, cycle);
    }

    /// Pops the earliest event whose cycle is `<= up_to_cycle`, advancing
    /// this domain's clock to that cycle. Returns `None` if the earliest
    /// entry is still in the future (or the queue is empty).
    pub fn dequeue_ready(&self, up_to_cycle: u64) -> Option<(QueuedEvent, u64)> {
        let mut state = self.state.lock();
        match state.queue.first_cycle() {
            Some(cycle) if cycle <= up_to_cycle => {
                let (item, cycle) = state.queue.dequeue();
                state.cur_cycle = cycle;
                state.prof_time += 1;
                Some((item, cycle))
            }
            _ => None,
        }
    }
}
