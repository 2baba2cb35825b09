//! DRAM backends (§4.3, grounded on `mem_ctrls.h`/`detailed_mem.h` naming
//! a `MemObject`-style `access()` contract; `dramsim_mem_ctrl.h`'s role as
//! an alternate, trace-driven backend behind the same interface is the
//! supplemented `ExternalTrace` variant below).

use weavesim_core::LineAddress;

/// A memory-controller backend: given an access arriving at `issue_cycle`,
/// returns the cycle its data becomes available.
pub trait DramBackend: Send {
    fn access(&mut self, addr: LineAddress, is_write: bool, issue_cycle: u64) -> u64;
}

/// Constant round-trip latency regardless of bank/row state or queueing —
/// the simplest backend, useful as a baseline and in tests.
pub struct FixedLatency {
    latency: u64,
}

impl FixedLatency {
    pub fn new(latency: u64) -> Self {
        Self { latency }
    }
}

impl DramBackend for FixedLatency {
    fn access(&mut self, _addr: LineAddress, _is_write: bool, issue_cycle: u64) -> u64 {
        issue_cycle + self.latency
    }
}

/// An M/D/1 queueing approximation: a single server with deterministic
/// service time `service_cycles`, accounting for requests queueing behind
/// whichever access is already in flight. Captures bandwidth-induced
/// queueing delay without modeling individual banks/ranks.
pub struct Md1Queue {
    service_cycles: u64,
    last_departure: u64,
}

impl Md1Queue {
    pub fn new(service_cycles: u64) -> Self {
        Self { service_cycles, last_departure: 0 }
    }
}

impl DramBackend for Md1Queue {
    fn access(&mut self, _addr: LineAddress, _is_write: bool, issue_cycle: u64) -> u64 {
        let start = issue_cycle.max(self.last_departure);
        let done = start + self.service_cycles;
        self.last_departure = done;
        done
    }
}

/// Placeholder for replaying latencies from an externally captured DRAM
/// trace (the role `dramsim_mem_ctrl.h` plays in the original, delegating
/// to a standalone DRAM timing model). Behind the same trait so a future
/// trace reader is a drop-in backend; for now it degenerates to
/// `FixedLatency` at a conservative default.
pub struct ExternalTraceBackend {
    fallback: FixedLatency,
}

impl ExternalTraceBackend {
    pub fn new(fallback_latency: u64) -> Self {
        Self { fallback: FixedLatency::new(fallback_latency) }
    }
}

impl DramBackend for ExternalTraceBackend {
    fn access(&mut self, addr: LineAddress, is_write: bool, issue_cycle: u64) -> u64 {
        // TODO: replay per-request latency from a captured DRAM trace
        // instead of falling back to a fixed round trip.
        self.fallback.access(addr, is_write, issue_cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_latency_is_constant() {
        let mut dram = FixedLatency::new(100);
        assert_eq!(dram.access(0, false, 10), 110);
        assert_eq!(dram.access(0, false, 500), 600);
    }

    #[test]
    fn md1_queue_serializes_back_to_back_requests() {
        let mut dram = Md1Queue::new(50);
        assert_eq!(dram.access(0, false, 0), 50);
        // arrives before the first departed: must queue behind it.
        assert_eq!(dram.access(0, false, 10), 100);
    }
}
