//! Out-of-order core timing model: the per-cycle bound-phase engine that
//! turns a stream of basic blocks into per-uop dispatch/completion cycles,
//! using an instruction window, a two-level branch predictor, and a
//! store-to-load forwarding table.

pub mod branch;
pub mod core;
pub mod error;
pub mod stlf;
pub mod window;

pub use branch::BranchPredictorPAg;
pub use core::{
    FixedLatencyAccessor, MemAccessOutcome, MemAccessor, OooCore, UopResult, DEFAULT_DECODE_WIDTH, DEFAULT_LSQ_SIZE,
    DEFAULT_ROB_SIZE, DEFAULT_STLF_ENTRIES,
};
pub use error::OooError;
pub use stlf::StlfTable;
pub use window::WindowStructure;
