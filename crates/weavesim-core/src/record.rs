//! Timing records bridging a cache access to the bound-phase event DAG
//! (§3: "Event recorder").

use serde::{Deserialize, Serialize};

use crate::memreq::{AccessType, LineAddress};

/// A pending or resolved cache access, queued by a lower cache level for
/// the recorder to stitch into the event DAG.
///
/// `start_event`/`end_event` are opaque handles into the owning
/// `EventRecorder`'s slab (defined in `weavesim-events`, which depends on
/// this crate, not the other way around — this crate stays free of any
/// event-graph machinery so the data model can be reused by code that
/// never touches the weave phase, e.g. offline trace analysis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub line_addr: LineAddress,
    pub request_cycle: u64,
    pub response_cycle: u64,
    pub request_type: AccessType,
    pub start_event: EventHandle,
    pub end_event: EventHandle,
}

/// Opaque index into an `EventRecorder`'s arena. `NONE` marks "no event" —
/// e.g. a record produced by a PUT that has an up-link but no return wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventHandle(pub u32);

impl EventHandle {
    pub const NONE: EventHandle = EventHandle(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_handle_is_recognized() {
        assert!(EventHandle::NONE.is_none());
        assert!(!EventHandle(0).is_none());
    }
}
