//! The event node itself: state, DAG edges, and the per-kind behavior that
//! replaces virtual dispatch (§9 design note: tagged-variant dispatch over
//! virtual calls on the hot path).

use smallvec::SmallVec;

/// Opaque index into an `EventRecorder`'s slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub(crate) usize);

impl EventId {
    /// Builds an `EventId` from a raw slab index. Only meaningful when
    /// paired with the `EventRecorder` that produced the index; exposed
    /// for tests and for code that threads ids through its own storage.
    pub fn from_raw(index: usize) -> Self {
        Self(index)
    }

    pub fn raw(self) -> usize {
        self.0
    }
}

/// Lifecycle state of a single event (mirrors `EV_NONE`/`EV_QUEUED`/
/// `EV_RUNNING`/`EV_HELD`/`EV_DONE` from the original timing event).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Allocated, waiting on parents.
    None,
    /// All parents reported, sitting in a domain's priority queue.
    Queued,
    /// Dequeued and handed to `simulate`.
    Running,
    /// `simulate` asked to be called again later without completing
    /// (e.g. a crossing destination still waiting on its proxy).
    Held,
    /// Completed; children have been notified.
    Done,
}

/// Per-kind behavior. Kept as a flat enum instead of a trait object so the
/// weave loop can match on it directly without a vtable indirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A pure synchronization point: accumulates the max cycle across all
    /// parents and completes inline from `parent_done`, without ever
    /// entering a domain's priority queue. Mirrors `DelayEvent`.
    Delay,
    /// Anchors a `TimingRecord`'s request into the DAG; completes as soon
    /// as it is simulated.
    Dispatch,
    /// Anchors a `TimingRecord`'s response; completes as soon as it is
    /// simulated (its minimum start cycle already encodes the access
    /// latency worked out by the cache/core model).
    Response,
    /// Source-domain half of a crossing. Never queued: resolves inline
    /// from `parent_done`, stashing its completion cycle for the paired
    /// destination event to observe.
    CrossingProxy { dest: EventId },
    /// Destination-domain half of a crossing. Queued in the destination
    /// domain; re-queues itself while the proxy has not yet completed.
    CrossingDest { proxy: EventId },
    /// Event with no inherent behavior beyond completing — used for
    /// phase-end drain barriers and tests.
    Generic,
}

/// One slot in an `EventRecorder`'s arena.
#[derive(Debug, Clone)]
pub struct EventNode {
    pub state: EventState,
    pub kind: EventKind,
    /// Domain this event is scheduled in. `None` until assigned — events
    /// created with no explicit domain inherit their first parent's.
    pub domain: Option<u32>,
    /// Cycle this event may not be simulated before.
    pub min_start_cycle: u64,
    /// Extra latency folded into the completion cycle passed to children
    /// (`post_delay`) or added before queuing (`pre_delay`).
    pub pre_delay: u32,
    pub post_delay: u32,
    pub num_parents: u32,
    pub children: SmallVec<[EventId; 2]>,
    /// Running maximum over reporting parents; also doubles as the
    /// "committed" cycle once the event is `Done`.
    pub cycle: u64,
}

impl EventNode {
    pub fn new(kind: EventKind, min_start_cycle: u64, pre_delay: u32, post_delay: u32) -> Self {
        Self {
            state: EventState::None,
            kind,
            domain: None,
            min_start_cycle,
            pre_delay,
            post_delay,
            num_parents: 0,
            children: SmallVec::new(),
            cycle: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, EventState::Done)
    }
}
