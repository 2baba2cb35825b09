//! Thread scheduler (§4.4): binds application threads to a fixed pool of
//! simulated contexts, enforces the per-phase barrier over only the
//! threads currently `RUNNING`, and virtualizes the syscalls that would
//! otherwise deschedule a thread needlessly (sleeps, fake leaves, futex
//! wake/wait matching).
//!
//! [`Scheduler`] owns everything; [`PhaseBarrier`] is the low-level
//! primitive it synchronizes the bound phase on. `ThreadInfo`/`ThreadState`
//! model the per-thread lifecycle the scheduler transitions threads
//! through on `join`/`leave`/sleep.

pub mod barrier;
pub mod context;
pub mod error;
pub mod scheduler;
pub mod state;
pub mod syscall;

pub use barrier::PhaseBarrier;
pub use context::{FutexCounters, FutexJoinDescriptor, FutexJoinKind, ThreadInfo};
pub use error::SchedError;
pub use scheduler::{Context, ContextState, FakeLeaveInfo, Scheduler};
pub use state::ThreadState;
pub use syscall::{NoopObserver, SyscallObserver};
