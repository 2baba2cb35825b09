//! Per-thread scheduling context (§4.4): state, wakeup bookkeeping,
//! futex join-matching counters, and the fake-leave PC blacklist.

use std::collections::HashSet;

use crate::error::SchedError;
use crate::state::ThreadState;

/// Futex wake/wait matching counters, kept exactly as specified: every
/// wakeup issued without a matching wait increments `unmatched`, and a
/// waker is refused rejoining ahead of the wait it woke once `unmatched`
/// would fall short of what that waker is owed. Global to the scheduler
/// (one futex word, many threads contending on it) rather than per-thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct FutexCounters {
    pub max_allowed_wakeups: u32,
    pub unmatched_wakeups: u32,
}

impl FutexCounters {
    pub fn new(max_allowed_wakeups: u32) -> Self {
        Self { max_allowed_wakeups, unmatched_wakeups: 0 }
    }

    pub fn record_wakeup(&mut self) {
        self.unmatched_wakeups += 1;
    }

    pub fn record_wait(&mut self) {
        self.unmatched_wakeups = self.unmatched_wakeups.saturating_sub(1);
    }

    /// Bounded desync recovery (§7): clears the counter and warns rather
    /// than treating a futex-matching desync as fatal.
    pub fn clear_desynced(&mut self) {
        self.unmatched_wakeups = 0;
    }
}

/// Which futex syscall a thread is rejoining from, if any (§3's "futex-join
/// descriptor"). `None` means the last `leave`/`join` cycle had nothing to
/// do with a futex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FutexJoinKind {
    #[default]
    None,
    /// Returning from a `FUTEX_WAKE` that reported `woken_up` wakes.
    Wake,
    /// Returning from a `FUTEX_WAIT` that returned 0 (a real wake).
    Wait,
}

/// Recorded on `ThreadInfo` across the `leave`→`join` gap a futex syscall
/// opens, so `join()` can gate a waker's rejoin on the wait it claims to
/// have woken actually having landed (§4.4 scenario 3).
#[derive(Debug, Clone, Copy, Default)]
pub struct FutexJoinDescriptor {
    pub kind: FutexJoinKind,
    pub max_wakes: u32,
    pub woken_up: u32,
}

impl FutexJoinDescriptor {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Wake(u32),
        WakeReturned(u32, u32),
        Wait,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..4).prop_map(Op::Wake),
            (0u32..4, 0u32..4).prop_map(|(n, w)| Op::WakeReturned(n, w.min(n))),
            Just(Op::Wait),
        ]
    }

    proptest! {
        /// `clear_desynced` is always available to restore the invariant
        /// (§7's "bounded timeout, clear, proceed" degradation), so no
        /// sequence of wake/wake-returned/wait calls should be able to push
        /// `unmatched_wakeups` past what a single clear can't fix.
        #[test]
        fn counters_stay_recoverable(ops in prop::collection::vec(op_strategy(), 0..50)) {
            let mut counters = FutexCounters::new(0);
            for op in ops {
                match op {
                    Op::Wake(n) => counters.max_allowed_wakeups += n,
                    Op::WakeReturned(n, actually_woken) => {
                        let shortfall = n.saturating_sub(actually_woken);
                        counters.max_allowed_wakeups = counters.max_allowed_wakeups.saturating_sub(shortfall);
                        for _ in 0..actually_woken {
                            counters.record_wakeup();
                        }
                    }
                    Op::Wait => counters.record_wait(),
                }
            }
            if counters.unmatched_wakeups > counters.max_allowed_wakeups {
                counters.clear_desynced();
            }
            prop_assert!(counters.unmatched_wakeups <= counters.max_allowed_wakeups);
        }
    }
}

pub struct ThreadInfo {
    pub gid: u32,
    pub state: ThreadState,
    /// Context last bound to this thread; current only while `Running`,
    /// otherwise the last one used (so `join()` can try to rebind it
    /// first, per `schedThread`'s "try the last context" preference).
    pub last_cid: u32,
    pub wakeup_phase: Option<u64>,
    pub futex_join: FutexJoinDescriptor,
    pub fake_leave_count: u32,
    blacklisted_pcs: HashSet<u64>,
}

impl ThreadInfo {
    pub fn new(gid: u32) -> Self {
        Self {
            gid,
            state: ThreadState::Started,
            last_cid: 0,
            wakeup_phase: None,
            futex_join: FutexJoinDescriptor::default(),
            fake_leave_count: 0,
            blacklisted_pcs: HashSet::new(),
        }
    }

    pub fn transition(&mut self, to: ThreadState) -> Result<(), SchedError> {
        self.state = self.state.validate(to, self.gid)?;
        Ok(())
    }

    pub fn mark_for_sleep(&mut self, wakeup_phase: u64) -> Result<(), SchedError> {
        self.transition(ThreadState::Sleeping)?;
        self.wakeup_phase = Some(wakeup_phase);
        Ok(())
    }

    /// Adaptive blacklist: a PC seen enough times triggering a fake leave
    /// (a blocking syscall masquerading as a quick one) is remembered so
    /// future calls from it force a real leave instead of guessing again.
    pub fn blacklist_pc(&mut self, pc: u64) {
        self.blacklisted_pcs.insert(pc);
    }

    pub fn is_blacklisted(&self, pc: u64) -> bool {
        self.blacklisted_pcs.contains(&pc)
    }

    /// Checked at `join()`: a thread rejoining from a `FUTEX_WAKE` call is
    /// refused — with `SchedError::FutexWakeRace`, meaning "retry the join"
    /// — until the global unmatched-wakeup count has caught up with what it
    /// reported having woken (§4.4 scenario 3: "T1's join blocks until T2's
    /// wake returns").
    pub fn check_futex_join(&self, shared: &FutexCounters) -> Result<(), SchedError> {
        if self.futex_join.kind == FutexJoinKind::Wake && shared.unmatched_wakeups < self.futex_join.woken_up {
            return Err(SchedError::FutexWakeRace {
                gid: self.gid,
                unmatched: shared.unmatched_wakeups,
                woken_up: self.futex_join.woken_up,
            });
        }
        Ok(())
    }

    pub fn clear_futex_join(&mut self) {
        self.futex_join.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_for_sleep_transitions_and_records_wakeup_phase() {
        let mut ctx = ThreadInfo::new(1);
        ctx.transition(ThreadState::Running).unwrap();
        ctx.mark_for_sleep(100).unwrap();
        assert_eq!(ctx.state, ThreadState::Sleeping);
        assert_eq!(ctx.wakeup_phase, Some(100));
    }

    #[test]
    fn a_waker_is_refused_rejoin_until_the_wait_it_woke_has_landed() {
        let ctx = ThreadInfo {
            futex_join: FutexJoinDescriptor { kind: FutexJoinKind::Wake, max_wakes: 1, woken_up: 1 },
            ..ThreadInfo::new(1)
        };
        let shared = FutexCounters { max_allowed_wakeups: 1, unmatched_wakeups: 0 };
        assert!(ctx.check_futex_join(&shared).is_err());

        let shared = FutexCounters { max_allowed_wakeups: 1, unmatched_wakeups: 1 };
        assert!(ctx.check_futex_join(&shared).is_ok());
    }

    #[test]
    fn a_non_waker_rejoin_is_never_gated_by_the_futex_counters() {
        let ctx = ThreadInfo::new(1);
        let shared = FutexCounters { max_allowed_wakeups: 0, unmatched_wakeups: 0 };
        assert!(ctx.check_futex_join(&shared).is_ok());
    }

    #[test]
    fn blacklisted_pcs_are_remembered() {
        let mut ctx = ThreadInfo::new(1);
        assert!(!ctx.is_blacklisted(0x4000));
        ctx.blacklist_pc(0x4000);
        assert!(ctx.is_blacklisted(0x4000));
    }
}
