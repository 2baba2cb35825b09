//! Syscall-virtualization collaborator (§4.4, §6: "process-tree/syscall
//! virtualization (treated as a passive collaborator)"). The scheduler
//! decides fake-leave vs. real-leave on its own PC-blacklist heuristic;
//! this trait is the seam a host-process layer would use to tell it
//! about syscalls it cannot see on its own (e.g. one that always blocks
//! regardless of PC history). Scheduling logic never depends on an
//! observer being present — [`NoopObserver`] is a legitimate, permanent
//! default, not a placeholder.

/// Consulted (never owned) by the scheduler around syscall boundaries.
pub trait SyscallObserver: Send + Sync {
    /// Called before `should_really_leave`'s own PC-blacklist check. A
    /// `Some(true)`/`Some(false)` overrides the heuristic; `None` defers
    /// to it.
    fn classify_syscall(&self, gid: u32, pc: u64) -> Option<bool> {
        let _ = (gid, pc);
        None
    }
}

/// The default: never overrides, always defers to the scheduler's own
/// adaptive blacklist.
#[derive(Default)]
pub struct NoopObserver;

impl SyscallObserver for NoopObserver {}
