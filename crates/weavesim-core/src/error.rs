use thiserror::Error;

/// Errors surfaced by the shared data model.
///
/// Most of these are configuration-time problems (bad register index, a
/// basic block descriptor that doesn't type-check against the uop
/// encoding); anything that would instead indicate a timing-model bug at
/// simulation time is an `assert!`/`panic!`, not a `CoreError` variant,
/// per the fatal/benign split in the error handling design.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("register index {0} out of range (max {max})", max = RegisterFile::MAX_REGISTERS - 1)]
    RegisterOutOfRange(u32),

    #[error("basic block has {uops} uops but byte length {bytes} is zero")]
    EmptyBblWithUops { uops: usize, bytes: u32 },

    #[error("uop {index} has {ports:#x} port mask with no eligible port")]
    NoEligiblePort { index: usize, ports: u8 },

    #[error("memory request flags {0:#x} set reserved bits")]
    InvalidMemFlags(u32),
}

use crate::registers::RegisterFile;
