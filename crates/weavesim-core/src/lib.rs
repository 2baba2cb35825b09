//! Shared data model for the WeaveSim timing core.
//!
//! This crate defines the types every other WeaveSim crate builds on: the
//! basic-block/uop encoding the (out-of-scope) instrumentation front end
//! hands to the OOO core, the coherence request exchanged across cache
//! levels, MESI line state, and the timing record that bridges a cache
//! access into the bound-phase event DAG. It intentionally knows nothing
//! about events, domains, or scheduling — those live in `weavesim-events`,
//! `weavesim-contention`, and `weavesim-sched` respectively, all of which
//! depend on this crate rather than the reverse.

pub mod error;
pub mod line;
pub mod memreq;
pub mod record;
pub mod registers;
pub mod uop;

pub use error::CoreError;
pub use line::{CacheLine, SharerSet, MAX_CHILDREN};
pub use memreq::{AccessType, LineAddress, MemFlags, MemReq, MesiState, ReleasableLock};
pub use record::{EventHandle, TimingRecord};
pub use registers::{RegisterFile, RegisterIndex};
pub use uop::{BblInfo, Operands, Uop, UopKind};
