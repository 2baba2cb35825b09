//! Per-core timing model (§4.1): decodes a basic block's uops against an
//! instruction window, a register scoreboard, and (for loads/stores) the
//! store-to-load forwarding table, producing each uop's completion cycle.

use weavesim_core::{BblInfo, LineAddress, RegisterFile, RegisterIndex, Uop};

use crate::branch::BranchPredictorPAg;
use crate::stlf::StlfTable;
use crate::window::WindowStructure;

/// Default out-of-order window sizes (§4.1): a 128-entry reorder window,
/// 32-entry load and store queues, and a 32-entry STLF table.
pub const DEFAULT_ROB_SIZE: u32 = 128;
pub const DEFAULT_LSQ_SIZE: u32 = 32;
pub const DEFAULT_STLF_ENTRIES: u32 = 32;
/// Decode/retire width: at most this many uops advance the decode clock
/// together in one cycle.
pub const DEFAULT_DECODE_WIDTH: u32 = 4;

/// Outcome of resolving a load or store against the real cache hierarchy,
/// fed back into the issuing uop's completion cycle before any dependent
/// uop can read it (§4.1 step 7).
#[derive(Debug, Clone, Copy)]
pub struct MemAccessOutcome {
    pub response_cycle: u64,
    pub l1_hit: bool,
    pub l2_hit: bool,
}

/// How `OooCore` resolves a load or store while it is still scheduling the
/// block, so a cache miss's latency is visible to every uop that depends
/// on the register it writes. `OooCore` stays hierarchy-agnostic — the
/// caller supplies the accessor, same division of labor as
/// `weavesim-cache`'s `DramBackend` sitting behind `TimingCache`.
pub trait MemAccessor {
    fn access(&mut self, addr: LineAddress, is_write: bool, dispatch_cycle: u64) -> MemAccessOutcome;
}

/// A `MemAccessor` that assumes a fixed round-trip latency and always
/// hits — useful for tests and for running the window model standalone.
pub struct FixedLatencyAccessor {
    pub latency: u64,
}

impl MemAccessor for FixedLatencyAccessor {
    fn access(&mut self, _addr: LineAddress, _is_write: bool, dispatch_cycle: u64) -> MemAccessOutcome {
        MemAccessOutcome { response_cycle: dispatch_cycle + self.latency, l1_hit: true, l2_hit: false }
    }
}

/// Per-uop outcome, reported back to the caller so it can drive a
/// `TimingRecord`/event chain for any load or store that needs one.
#[derive(Debug, Clone, Copy)]
pub struct UopResult {
    pub dispatch_cycle: u64,
    pub completion_cycle: u64,
    pub forwarded: bool,
    pub mem_access: Option<MemAccessOutcome>,
}

pub struct OooCore {
    cur_cycle: u64,
    decode_cycle: u64,
    decode_width: u32,
    window: WindowStructure,
    load_queue: WindowStructure,
    store_queue: WindowStructure,
    registers: Vec<u64>,
    stlf: StlfTable,
    branch_predictor: BranchPredictorPAg,
}

impl OooCore {
    pub fn new() -> Self {
        Self {
            cur_cycle: 0,
            decode_cycle: 0,
            decode_width: DEFAULT_DECODE_WIDTH,
            window: WindowStructure::new(DEFAULT_ROB_SIZE),
            load_queue: WindowStructure::new(DEFAULT_LSQ_SIZE),
            store_queue: WindowStructure::new(DEFAULT_LSQ_SIZE),
            registers: vec![0u64; RegisterFile::MAX_REGISTERS as usize],
            stlf: StlfTable::new(DEFAULT_STLF_ENTRIES),
            branch_predictor: BranchPredictorPAg::default(),
        }
    }

    pub fn cur_cycle(&self) -> u64 {
        self.cur_cycle
    }

    /// Nudges the core's clocks by `gap` cycles (§4.5: "bound-phase
    /// `curCycle` = zero-load clock + `gapCycles`"), folding in the
    /// contention the previous weave phase actually observed before the
    /// next bound phase starts issuing from it.
    pub fn apply_gap(&mut self, gap: i64) {
        self.cur_cycle = (self.cur_cycle as i64 + gap).max(0) as u64;
        self.decode_cycle = (self.decode_cycle as i64 + gap).max(0) as u64;
    }

    fn register_ready(&self, reg: Option<RegisterIndex>) -> u64 {
        reg.map(|r| self.registers[r as usize]).unwrap_or(0)
    }

    fn mark_written(&mut self, reg: Option<RegisterIndex>, cycle: u64) {
        if let Some(r) = reg {
            self.registers[r as usize] = cycle;
        }
    }

    /// Runs every uop of `bbl` through the window, returning each one's
    /// dispatch/completion cycle. `mem_addrs[i]` supplies the address for
    /// any load/store uop at position `i` (address generation itself is
    /// out of scope here); other entries are ignored. Loads and stores are
    /// resolved against `mem` inline, so a miss's `response_cycle` is
    /// already in `self.registers` by the time a dependent uop reads it.
    pub fn execute_bbl(
        &mut self,
        bbl: &BblInfo,
        mem_addrs: &[Option<LineAddress>],
        mem: &mut dyn MemAccessor,
    ) -> Vec<UopResult> {
        let mut results = Vec::with_capacity(bbl.uops.len());
        let mut in_cycle_count = 0u32;

        for (i, uop) in bbl.uops.iter().enumerate() {
            let result = self.execute_uop(uop, mem_addrs.get(i).copied().flatten(), mem);
            results.push(result);

            in_cycle_count += 1;
            if in_cycle_count >= self.decode_width {
                self.decode_cycle += 1;
                in_cycle_count = 0;
            }
        }
        if in_cycle_count > 0 {
            self.decode_cycle += 1;
        }

        tracing::trace!(uops = bbl.uops.len(), decode_cycle = self.decode_cycle, "bbl dispatched");

        self.cur_cycle = self
            .cur_cycle
            .max(self.decode_cycle)
            .max(results.iter().map(|r| r.completion_cycle).max().unwrap_or(0));
        results
    }

    fn execute_uop(&mut self, uop: &Uop, addr: Option<LineAddress>, mem: &mut dyn MemAccessor) -> UopResult {
        let src_ready = uop
            .operands
            .srcs
            .iter()
            .map(|s| self.register_ready(*s))
            .max()
            .unwrap_or(0);
        let ready_cycle = src_ready.max(self.decode_cycle);

        let is_load = uop.kind.is_load();
        let is_store = uop.kind.is_store();
        let window = if is_load {
            &mut self.load_queue
        } else if is_store {
            &mut self.store_queue
        } else {
            &mut self.window
        };
        let dispatch_cycle = window.schedule(ready_cycle, uop.port_mask, uop.extra_slots);
        let mut completion_cycle = dispatch_cycle + uop.latency as u64;

        let mut forwarded = false;
        let mut mem_access = None;
        if is_load {
            if let Some(addr) = addr {
                let outcome = mem.access(addr, false, dispatch_cycle);
                completion_cycle = completion_cycle.max(outcome.response_cycle);
                if let Some(fwd_cycle) = self.stlf.probe(addr) {
                    completion_cycle = completion_cycle.max(fwd_cycle);
                    forwarded = true;
                }
                mem_access = Some(outcome);
            }
        } else if is_store {
            if let Some(addr) = addr {
                let outcome = mem.access(addr, true, dispatch_cycle);
                completion_cycle = completion_cycle.max(outcome.response_cycle);
                self.stlf.record_store(addr, completion_cycle);
                mem_access = Some(outcome);
            }
        }

        for dst in uop.operands.dsts {
            self.mark_written(dst, completion_cycle);
        }

        UopResult { dispatch_cycle, completion_cycle, forwarded, mem_access }
    }

    /// Resolves a conditional branch, returning `true` on misprediction.
    /// The caller is expected to flush to `resolution_cycle` when this
    /// returns `true` — wrong-path uops decoded between the branch and
    /// its resolution are deliberately not un-done here, mirroring the
    /// original's choice to let a bounded amount of wrong-path work
    /// happen rather than stall fetch until every branch resolves.
    pub fn resolve_branch(&mut self, pc: u64, taken: bool, resolution_cycle: u64) -> bool {
        let mispredicted = !self.branch_predictor.predict(pc, taken);
        if mispredicted {
            self.flush_after(resolution_cycle);
        }
        mispredicted
    }

    /// Drops everything scheduled at or after `cycle` across all three
    /// windows and rewinds the decode clock to it.
    pub fn flush_after(&mut self, cycle: u64) {
        self.window.advance_to(cycle);
        self.load_queue.advance_to(cycle);
        self.store_queue.advance_to(cycle);
        self.decode_cycle = self.decode_cycle.min(cycle);
    }
}

impl Default for OooCore {
    fn default() -> Self {
        Self::new()
    }
}
