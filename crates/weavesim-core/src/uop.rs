//! Per-basic-block micro-op decoding (§3: "Basic block descriptor").

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::registers::RegisterIndex;

/// What a uop does, beyond its latency and port mask.
///
/// `StoreAddress` is split out from `Store` because address-generation and
/// the store's data commit retire independently in the LSU (§4.1 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UopKind {
    General,
    Load,
    Store,
    StoreAddress,
    Fence,
}

impl UopKind {
    /// Whether this uop kind touches the load queue.
    pub fn is_load(self) -> bool {
        matches!(self, UopKind::Load)
    }

    /// Whether this uop kind touches the store queue.
    pub fn is_store(self) -> bool {
        matches!(self, UopKind::Store | UopKind::StoreAddress)
    }
}

/// Up to two source and two destination register slots; `None` marks an
/// unused operand slot (not to be confused with register 0, which is a
/// real, always-ready register).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operands {
    pub srcs: [Option<RegisterIndex>; 2],
    pub dsts: [Option<RegisterIndex>; 2],
}

impl Operands {
    pub const NONE: Operands = Operands {
        srcs: [None, None],
        dsts: [None, None],
    };

    pub fn new(srcs: [Option<RegisterIndex>; 2], dsts: [Option<RegisterIndex>; 2]) -> Self {
        Self { srcs, dsts }
    }
}

/// A single decoded micro-op within a basic block.
///
/// `port_mask` is a bitmask over the target's execution ports; `extra_slots`
/// counts additional non-pipelined cycles the uop occupies on its chosen
/// port beyond the cycle it issues on (§4.1 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uop {
    pub operands: Operands,
    pub latency: u32,
    pub decode_offset: u32,
    pub kind: UopKind,
    pub port_mask: u8,
    pub extra_slots: u8,
}

impl Uop {
    pub fn new(
        operands: Operands,
        latency: u32,
        decode_offset: u32,
        kind: UopKind,
        port_mask: u8,
        extra_slots: u8,
    ) -> Result<Self, CoreError> {
        if port_mask == 0 {
            return Err(CoreError::NoEligiblePort {
                index: 0,
                ports: port_mask,
            });
        }
        Ok(Self {
            operands,
            latency,
            decode_offset,
            kind,
            port_mask,
            extra_slots,
        })
    }
}

/// Immutable per-basic-block record handed to the core model by the
/// (out-of-scope) instrumentation front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BblInfo {
    pub instr_count: u32,
    pub byte_length: u32,
    pub uops: Vec<Uop>,
}

impl BblInfo {
    pub fn new(instr_count: u32, byte_length: u32, uops: Vec<Uop>) -> Result<Self, CoreError> {
        for (index, uop) in uops.iter().enumerate() {
            if uop.port_mask == 0 {
                return Err(CoreError::NoEligiblePort {
                    index,
                    ports: uop.port_mask,
                });
            }
        }
        if byte_length == 0 && !uops.is_empty() {
            return Err(CoreError::EmptyBblWithUops {
                uops: uops.len(),
                bytes: byte_length,
            });
        }
        Ok(Self {
            instr_count,
            byte_length,
            uops,
        })
    }

    /// A zero-length basic block: no uops, advances nothing (§8 boundary
    /// behavior: "Zero-length basic block: records no event, advances
    /// curCycle by 0").
    pub fn empty() -> Self {
        Self {
            instr_count: 0,
            byte_length: 0,
            uops: Vec::new(),
        }
    }

    /// Number of 64-byte cache lines this block spans, used by the
    /// fetch-throttling model (§4.1).
    pub fn cache_lines(&self) -> u32 {
        const LINE_BYTES: u32 = 64;
        self.byte_length.div_ceil(LINE_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uop(kind: UopKind) -> Uop {
        Uop::new(Operands::NONE, 1, 0, kind, 0b1, 0).unwrap()
    }

    #[test]
    fn empty_bbl_has_no_uops_and_no_lines() {
        let bbl = BblInfo::empty();
        assert_eq!(bbl.uops.len(), 0);
        assert_eq!(bbl.cache_lines(), 0);
    }

    #[test]
    fn rejects_zero_port_mask() {
        let res = Uop::new(Operands::NONE, 1, 0, UopKind::General, 0, 0);
        assert!(res.is_err());
    }

    #[test]
    fn rejects_zero_byte_length_with_uops() {
        let res = BblInfo::new(1, 0, vec![uop(UopKind::General)]);
        assert!(matches!(res, Err(CoreError::EmptyBblWithUops { .. })));
    }

    #[test]
    fn cache_lines_rounds_up() {
        let bbl = BblInfo::new(1, 65, vec![uop(UopKind::General)]).unwrap();
        assert_eq!(bbl.cache_lines(), 2);
    }

    #[test]
    fn uop_kind_classification() {
        assert!(UopKind::Load.is_load());
        assert!(!UopKind::Load.is_store());
        assert!(UopKind::Store.is_store());
        assert!(UopKind::StoreAddress.is_store());
        assert!(!UopKind::Fence.is_load());
    }
}
