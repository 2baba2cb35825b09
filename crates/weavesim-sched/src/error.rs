#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    #[error("context {0} is not known to the scheduler")]
    UnknownContext(u32),
    #[error("thread {0} is not known to the scheduler")]
    UnknownThread(u32),
    #[error("thread {0} already registered")]
    DuplicateThread(u32),
    #[error("thread {0} has an empty affinity mask")]
    EmptyAffinityMask(u32),
    #[error("thread {0} queued, waiting for a free context")]
    Queued(u32),
    #[error("thread {0} is not RUNNING")]
    NotRunning(u32),
    #[error("invalid thread state transition for context {gid}: {from:?} -> {to:?}")]
    InvalidTransition { gid: u32, from: crate::state::ThreadState, to: crate::state::ThreadState },
    #[error("thread {gid} raced its own futex wake: {unmatched} unmatched wakeups, needed {woken_up}")]
    FutexWakeRace { gid: u32, unmatched: u32, woken_up: u32 },
}
