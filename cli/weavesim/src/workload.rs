//! Synthetic basic-block workload generator.
//!
//! The real instrumentation front end (the tool that decodes a running
//! program into `BblInfo`/address streams) is explicitly out of scope;
//! this stands in for it so the timing core has something to execute.
//! Addresses are drawn from a small shared working set per core so
//! runs exercise cache sharing and coherence instead of only cold misses.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use weavesim_core::{BblInfo, LineAddress, Operands, RegisterIndex, Uop, UopKind};

/// One basic block plus the resolved address (if any) for each of its
/// load/store uops, matching the `mem_addrs` slice `OooCore::execute_bbl`
/// expects.
pub struct WorkloadBbl {
    pub bbl: BblInfo,
    pub mem_addrs: Vec<Option<LineAddress>>,
}

pub struct WorkloadGenerator {
    rng: Xoshiro256PlusPlus,
    working_set_lines: u64,
    shared_lines: u64,
    max_uops_per_bbl: u32,
}

impl WorkloadGenerator {
    pub fn new(seed: u64, working_set_lines: u64, shared_lines: u64, max_uops_per_bbl: u32) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            working_set_lines: working_set_lines.max(1),
            shared_lines: shared_lines.max(1),
            max_uops_per_bbl: max_uops_per_bbl.max(1),
        }
    }

    /// Produces one basic block for `core`: a handful of ALU uops plus a
    /// load or store roughly every other uop, biased toward a small
    /// shared region so cores actually contend over lines.
    pub fn next_bbl(&mut self, core: u32) -> WorkloadBbl {
        let num_uops = self.rng.gen_range(1..=self.max_uops_per_bbl);
        let mut uops = Vec::with_capacity(num_uops as usize);
        let mut mem_addrs = Vec::with_capacity(num_uops as usize);

        for i in 0..num_uops {
            let dst: RegisterIndex = self.rng.gen_range(1..16);
            if self.rng.gen_bool(0.4) {
                let is_store = self.rng.gen_bool(0.35);
                let addr = self.pick_address(core);
                let kind = if is_store { UopKind::Store } else { UopKind::Load };
                let operands = if is_store {
                    Operands::new([Some(dst), None], [None, None])
                } else {
                    Operands::new([None, None], [Some(dst), None])
                };
                uops.push(Uop::new(operands, if is_store { 1 } else { 4 }, i, kind, 0b0010, 0).unwrap());
                mem_addrs.push(Some(addr));
            } else {
                let src: RegisterIndex = self.rng.gen_range(0..16);
                let operands = Operands::new([Some(src), None], [Some(dst), None]);
                uops.push(Uop::new(operands, 1, i, UopKind::General, 0b0001, 0).unwrap());
                mem_addrs.push(None);
            }
        }

        let byte_length = (num_uops * 4).max(4);
        let bbl = BblInfo::new(num_uops, byte_length, uops).expect("generator only emits well-formed blocks");
        WorkloadBbl { bbl, mem_addrs }
    }

    fn pick_address(&mut self, core: u32) -> LineAddress {
        if self.rng.gen_bool(0.3) {
            self.rng.gen_range(0..self.shared_lines)
        } else {
            let base = core as u64 * self.working_set_lines;
            base + self.rng.gen_range(0..self.working_set_lines)
        }
    }
}
