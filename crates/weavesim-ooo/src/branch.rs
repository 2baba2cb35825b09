//! Two-level branch predictor (§4.1, grounded on `ooo_core.h`'s
//! `BranchPredictorPAg`): a per-PC branch history shift register feeding a
//! shared, XOR-indexed pattern history table of 2-bit saturating
//! counters.

/// `NB` bits of PC select a BHSR bucket, which stores `HB` bits of
/// history; `LB` bits of (XOR-folded) history index the PHT.
pub struct BranchPredictorPAg {
    nb: u32,
    hb: u32,
    lb: u32,
    bhsr: Vec<u32>,
    pht: Vec<u8>,
}

impl BranchPredictorPAg {
    /// `nb`=11, `hb`=18, `lb`=14 matches the default configuration the
    /// distilled spec calls out (§4.1).
    pub fn new(nb: u32, hb: u32, lb: u32) -> Self {
        assert!(lb <= hb, "too many PHT entries");
        assert!(lb >= nb, "too few PHT entries for the fold to reach every BHSR bit");
        Self {
            nb,
            hb,
            lb,
            bhsr: vec![0u32; 1 << nb],
            pht: vec![1u8; 1 << lb], // weak not-taken
        }
    }

    /// Predicts `branch_pc`'s direction, updates both tables with the
    /// resolved outcome `taken`, and reports whether the prediction was
    /// correct.
    pub fn predict(&mut self, branch_pc: u64, taken: bool) -> bool {
        let bhsr_mask = (1u32 << self.nb) - 1;
        let hist_mask = (1u32 << self.hb) - 1;
        let pht_mask = (1u32 << self.lb) - 1;

        let bhsr_idx = ((branch_pc >> 1) as u32) & bhsr_mask;
        let mut pht_idx = self.bhsr[bhsr_idx as usize];
        pht_idx ^= (pht_idx & !pht_mask) >> (self.hb - self.lb);
        pht_idx &= pht_mask;

        let counter = self.pht[pht_idx as usize];
        let pred = counter > 1;

        self.pht[pht_idx as usize] = if taken {
            if pred { 3 } else { counter + 1 }
        } else if pred {
            counter - 1
        } else {
            0
        };
        self.bhsr[bhsr_idx as usize] =
            ((self.bhsr[bhsr_idx as usize] << 1) & hist_mask) | (taken as u32);

        taken == pred
    }
}

impl Default for BranchPredictorPAg {
    fn default() -> Self {
        Self::new(11, 18, 14)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learns_an_always_taken_branch() {
        let mut bp = BranchPredictorPAg::default();
        let mut correct_runs = 0;
        for _ in 0..64 {
            if bp.predict(0x4000, true) {
                correct_runs += 1;
            }
        }
        // early mispredicts while the counter warms up, but it should
        // converge to correctly predicting taken.
        assert!(correct_runs > 32, "expected the predictor to learn a steady pattern, got {correct_runs}/64");
    }

    #[test]
    fn a_fresh_pc_starts_from_the_cold_weak_not_taken_state() {
        let mut bp = BranchPredictorPAg::new(11, 18, 14);
        for _ in 0..20 {
            bp.predict(0x1000, true);
        }
        // a different BHSR bucket (distinct low bits of pc >> 1) that has
        // never been touched is still all zeros, so its first prediction
        // is the cold weak-not-taken counter: correct only if the actual
        // outcome is not-taken.
        assert!(bp.predict(0x1002, false));
    }
}
