//! Thread↔context scheduling policy (§4.4): binds application threads to a
//! fixed pool of simulated [`Context`]s, round-robins contexts away from
//! long-running threads every quantum, and pops/pushes the sleep and run
//! queues at each phase boundary. Mirrors `Scheduler::{join,leave,sync,
//! schedThread,schedContext,schedTick}` from the original, minus the
//! intrusive lists (`Vec`/`VecDeque` of gids do the same job here).

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::trace;

use crate::barrier::PhaseBarrier;
use crate::context::{FutexCounters, FutexJoinDescriptor, FutexJoinKind, ThreadInfo};
use crate::error::SchedError;
use crate::state::ThreadState;
use crate::syscall::{NoopObserver, SyscallObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Idle,
    Used,
}

/// A simulated hardware thread (§3: "Context"): id, occupancy, and the
/// gid of whoever currently owns it.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub id: u32,
    pub state: ContextState,
    pub cur_thread: Option<u32>,
}

impl Context {
    fn new(id: u32) -> Self {
        Self { id, state: ContextState::Idle, cur_thread: None }
    }
}

/// A syscall the scheduler chose not to deschedule for (§4.4: "fake
/// leave"). Recorded so the watchdog can promote it to a real leave if it
/// overstays its welcome, and so `finish` can retroactively run the leave
/// it skipped.
#[derive(Debug, Clone, Copy)]
pub struct FakeLeaveInfo {
    pub pc: u64,
    pub since_phase: u64,
}

/// Scheduler state, guarded by a single lock — mirrors `schedLock`
/// serializing every join/leave/sync/callback in the original.
struct Inner {
    threads: HashMap<u32, ThreadInfo>,
    contexts: Vec<Context>,
    /// Idle context ids not currently bound to any thread.
    free_list: Vec<u32>,
    run_queue: VecDeque<u32>,
    out_queue: VecDeque<u32>,
    /// (wakeup_phase, gid), kept sorted by wakeup_phase ascending.
    sleep_queue: VecDeque<(u64, u32)>,
    masks: HashMap<u32, Vec<bool>>,
    fake_leaves: HashMap<u32, FakeLeaveInfo>,
    pc_blacklist: HashMap<u64, u32>,
    cur_phase: u64,
    next_victim: usize,
    /// One futex word shared by every thread contending on it — matches
    /// the original's single `(maxAllowedWakeups, unmatchedWakeups)` pair
    /// rather than per-thread bookkeeping (§4.4).
    futex: FutexCounters,
}

/// Round-robin thread scheduler over a fixed pool of contexts (§4.4).
///
/// All mutation happens under one lock; the only thing that blocks
/// outside it is [`PhaseBarrier::wait`], kept separate so a blocked
/// `join()` doesn't hold the scheduler lock while it waits.
pub struct Scheduler {
    inner: Mutex<Inner>,
    barrier: PhaseBarrier,
    pub sched_quantum: u64,
    /// Number of consecutive phases a fake leave may persist before the
    /// watchdog declares it blocking and blacklists the PC (§4.4, §9 open
    /// question: "document the interval as part of the reproducibility
    /// contract").
    pub fake_leave_stall_threshold: u64,
    observer: Box<dyn SyscallObserver>,
}

impl Scheduler {
    pub fn new(num_contexts: u32, sched_quantum: u64) -> Self {
        let contexts: Vec<Context> = (0..num_contexts).map(Context::new).collect();
        let free_list = contexts.iter().map(|c| c.id).collect();
        Self {
            inner: Mutex::new(Inner {
                threads: HashMap::new(),
                contexts,
                free_list,
                run_queue: VecDeque::new(),
                out_queue: VecDeque::new(),
                sleep_queue: VecDeque::new(),
                masks: HashMap::new(),
                fake_leaves: HashMap::new(),
                pc_blacklist: HashMap::new(),
                cur_phase: 0,
                next_victim: 0,
                futex: FutexCounters::default(),
            }),
            barrier: PhaseBarrier::new(0),
            sched_quantum,
            fake_leave_stall_threshold: 4,
            observer: Box::new(NoopObserver),
        }
    }

    /// Swaps in a syscall-virtualization collaborator to consult before
    /// falling back to the PC-blacklist heuristic in
    /// [`Scheduler::should_really_leave`].
    pub fn with_observer(mut self, observer: Box<dyn SyscallObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn num_contexts(&self) -> usize {
        self.inner.lock().contexts.len()
    }

    pub fn cur_phase(&self) -> u64 {
        self.inner.lock().cur_phase
    }

    /// `Scheduler::start`: registers a newly created thread with an
    /// affinity mask over the context pool. An all-false mask is rejected
    /// the way the original panics on an "empty mask".
    pub fn start(&self, gid: u32, mask: Vec<bool>) -> Result<(), SchedError> {
        if !mask.iter().any(|&b| b) {
            return Err(SchedError::EmptyAffinityMask(gid));
        }
        let mut inner = self.inner.lock();
        if inner.threads.contains_key(&gid) {
            return Err(SchedError::DuplicateThread(gid));
        }
        inner.threads.insert(gid, ThreadInfo::new(gid));
        inner.masks.insert(gid, mask);
        Ok(())
    }

    /// `Scheduler::join`: finds a context for `gid` (by last-used slot,
    /// free list, or stealing from the out-queue) or queues it to wait.
    /// Returns the bound context id once the thread is actually running,
    /// or `SchedError::Queued` if none was available (the caller should
    /// retry the join once told it has been scheduled).
    pub fn join(&self, gid: u32) -> Result<u32, SchedError> {
        let mut inner = self.inner.lock();

        if inner.futex.unmatched_wakeups > inner.futex.max_allowed_wakeups {
            // Global desync (§7): warn and clear rather than let a drifted
            // futex word wedge every future join.
            trace!(gid, "futex counters desynced, clearing and proceeding");
            inner.futex.clear_desynced();
        }

        {
            let futex = inner.futex;
            let th = inner.thread_mut(gid)?;
            th.check_futex_join(&futex)?;
            let was_wait = th.futex_join.kind == FutexJoinKind::Wait;
            th.clear_futex_join();
            if was_wait {
                inner.futex.record_wait();
            }
        }

        if inner.thread(gid)?.state == ThreadState::Out {
            let cid = inner.thread(gid)?.last_cid;
            inner.out_queue.retain(|&g| g != gid);
            inner.schedule(gid, cid)?;
            self.sync_barrier(&inner);
            return Ok(cid);
        }

        if let Some(ctx_id) = inner.sched_thread(gid) {
            inner.schedule(gid, ctx_id)?;
            self.sync_barrier(&inner);
            Ok(ctx_id)
        } else {
            inner.thread_mut(gid)?.transition(ThreadState::Queued)?;
            inner.run_queue.push_back(gid);
            Err(SchedError::Queued(gid))
        }
    }

    /// `Scheduler::leave`: called on a syscall boundary or sleep. Hands the
    /// freed context to the next runnable thread if one wants it,
    /// otherwise parks `gid` in the out-queue (still holding its context,
    /// cheap to rejoin) or the sleep queue.
    pub fn leave(&self, gid: u32, sleep_until_phase: Option<u64>) -> Result<(), SchedError> {
        let mut inner = self.inner.lock();
        if inner.thread(gid)?.state != ThreadState::Running {
            return Err(SchedError::NotRunning(gid));
        }
        let cid = inner.thread(gid)?.last_cid;

        if let Some(wakeup_phase) = sleep_until_phase {
            inner.thread_mut(gid)?.mark_for_sleep(wakeup_phase)?;
            inner.deschedule(cid);
            inner.sleep_queue.push_back((wakeup_phase, gid));
            let mut entries: Vec<_> = inner.sleep_queue.drain(..).collect();
            entries.sort_by_key(|&(p, _)| p);
            inner.sleep_queue = entries.into();

            if let Some(next_gid) = inner.sched_context(cid) {
                inner.schedule(next_gid, cid)?;
            }
        } else if let Some(next_gid) = inner.sched_context(cid) {
            inner.deschedule(cid);
            inner.thread_mut(gid)?.transition(ThreadState::Blocked)?;
            inner.schedule(next_gid, cid)?;
        } else {
            inner.deschedule(cid);
            inner.thread_mut(gid)?.state = ThreadState::Out;
            inner.out_queue.push_back(gid);
        }
        self.sync_barrier(&inner);
        Ok(())
    }

    /// Blocks the calling bound-phase thread at the per-phase barrier.
    /// Must be called without the scheduler lock held; use from the core's
    /// `onBbl` handler once `curCycle` has crossed the phase boundary.
    pub fn take_barrier(&self) -> u64 {
        self.barrier.wait()
    }

    /// `Scheduler::callback` / end-of-phase accounting: wakes sleepers
    /// whose deadline has arrived and, every `sched_quantum` phases, hands
    /// off one context per thread in the run queue (§4.4: "per-quantum
    /// round robin"). Returns the gids that were woken this phase.
    pub fn end_phase(&self) -> Vec<u32> {
        let mut inner = self.inner.lock();
        inner.cur_phase += 1;
        let cur_phase = inner.cur_phase;

        let mut woken = Vec::new();
        while let Some(&(phase, gid)) = inner.sleep_queue.front() {
            if phase > cur_phase {
                break;
            }
            inner.sleep_queue.pop_front();
            if let Ok(th) = inner.thread_mut(gid) {
                if th.state == ThreadState::Sleeping {
                    th.transition(ThreadState::Blocked).ok();
                    th.wakeup_phase = None;
                    woken.push(gid);
                }
            }
        }
        for &gid in &woken {
            inner.run_queue.push_back(gid);
        }

        if !inner.run_queue.is_empty() && self.sched_quantum != 0 && cur_phase % self.sched_quantum == 0 {
            inner.sched_tick();
        }
        self.sync_barrier(&inner);
        woken
    }

    /// §4.4 "fake-leave and blocking-syscall detection": decide whether a
    /// syscall at `pc` should really deschedule `gid`. A blacklisted PC
    /// always forces a real leave.
    pub fn should_really_leave(&self, gid: u32, pc: u64) -> bool {
        if let Some(verdict) = self.observer.classify_syscall(gid, pc) {
            return verdict;
        }
        let mut inner = self.inner.lock();
        if inner.pc_blacklist.contains_key(&pc) {
            return true;
        }
        inner.fake_leaves.insert(gid, FakeLeaveInfo { pc, since_phase: inner.cur_phase });
        false
    }

    pub fn finish_fake_leave(&self, gid: u32) {
        self.inner.lock().fake_leaves.remove(&gid);
    }

    /// Watchdog sweep (§4.4, §7): any fake leave that has outlived the
    /// stall threshold is declared blocking, promoted to a real leave, and
    /// its PC is blacklisted so future calls skip the guess entirely.
    pub fn watchdog_tick(&self) -> Vec<u32> {
        let mut inner = self.inner.lock();
        let cur_phase = inner.cur_phase;
        let threshold = self.fake_leave_stall_threshold;
        let stalled: Vec<(u32, u64)> = inner
            .fake_leaves
            .iter()
            .filter(|(_, info)| cur_phase.saturating_sub(info.since_phase) > threshold)
            .map(|(&gid, info)| (gid, info.pc))
            .collect();
        for &(gid, pc) in &stalled {
            inner.fake_leaves.remove(&gid);
            *inner.pc_blacklist.entry(pc).or_insert(0) += 1;
        }
        stalled.into_iter().map(|(gid, _)| gid).collect()
    }

    /// §4.4 futex wake/wait matching: a `FUTEX_WAKE(word, n)` grows the
    /// global allowance before the call returns.
    pub fn futex_wake(&self, gid: u32, n: u32) -> Result<(), SchedError> {
        let mut inner = self.inner.lock();
        inner.thread(gid)?;
        inner.futex.max_allowed_wakeups += n;
        Ok(())
    }

    /// A `FUTEX_WAKE` call returns having actually woken `actually_woken`
    /// threads; the allowance is corrected down by the shortfall, and the
    /// waker is tagged with a futex-join descriptor so its next `join()`
    /// is gated on that many wakes having actually landed (§4.4 scenario 3).
    pub fn futex_wake_returned(&self, gid: u32, n: u32, actually_woken: u32) -> Result<(), SchedError> {
        let shortfall = n.saturating_sub(actually_woken);
        let mut inner = self.inner.lock();
        inner.futex.max_allowed_wakeups = inner.futex.max_allowed_wakeups.saturating_sub(shortfall);
        let th = inner.thread_mut(gid)?;
        th.futex_join = FutexJoinDescriptor { kind: FutexJoinKind::Wake, max_wakes: n, woken_up: actually_woken };
        Ok(())
    }

    /// A `FUTEX_WAIT` that returned 0 (woke due to a real wake, not a
    /// timeout/spurious return) increments the global unmatched counter and
    /// tags the waiter so its `join()` folds the match back in.
    pub fn futex_wait_returned(&self, gid: u32) -> Result<(), SchedError> {
        let mut inner = self.inner.lock();
        inner.thread(gid)?;
        inner.futex.record_wakeup();
        let th = inner.thread_mut(gid)?;
        th.futex_join = FutexJoinDescriptor { kind: FutexJoinKind::Wait, max_wakes: 0, woken_up: 0 };
        Ok(())
    }

    pub fn futex_counters(&self, gid: u32) -> Result<FutexCounters, SchedError> {
        let inner = self.inner.lock();
        inner.thread(gid)?;
        Ok(inner.futex)
    }

    pub fn thread_state(&self, gid: u32) -> Result<ThreadState, SchedError> {
        Ok(self.inner.lock().thread(gid)?.state)
    }

    pub fn scheduled_threads(&self) -> usize {
        let inner = self.inner.lock();
        inner.contexts.iter().filter(|c| c.state == ContextState::Used).count()
    }

    /// `Scheduler::finish`: removes `gid` from whichever queue holds it
    /// and frees its context.
    pub fn finish(&self, gid: u32) -> Result<(), SchedError> {
        let mut inner = self.inner.lock();
        let state = inner.thread(gid)?.state;
        match state {
            ThreadState::Queued => inner.run_queue.retain(|&g| g != gid),
            ThreadState::Out => {
                inner.out_queue.retain(|&g| g != gid);
                let cid = inner.thread(gid)?.last_cid;
                inner.deschedule(cid);
            }
            ThreadState::Running => {
                let cid = inner.thread(gid)?.last_cid;
                inner.deschedule(cid);
            }
            _ => {}
        }
        inner.threads.remove(&gid);
        inner.masks.remove(&gid);
        inner.fake_leaves.remove(&gid);
        self.sync_barrier(&inner);
        Ok(())
    }

    /// Reconciles the barrier's expected-participant count with the
    /// number of contexts currently `Used` (§4.4: "running threads
    /// participate in the per-phase barrier").
    fn sync_barrier(&self, inner: &Inner) {
        let running = inner.contexts.iter().filter(|c| c.state == ContextState::Used).count();
        self.barrier.set_expected(running);
    }
}

impl Inner {
    fn thread(&self, gid: u32) -> Result<&ThreadInfo, SchedError> {
        self.threads.get(&gid).ok_or(SchedError::UnknownThread(gid))
    }

    fn thread_mut(&mut self, gid: u32) -> Result<&mut ThreadInfo, SchedError> {
        self.threads.get_mut(&gid).ok_or(SchedError::UnknownThread(gid))
    }

    fn mask_allows(&self, gid: u32, cid: u32) -> bool {
        self.masks.get(&gid).and_then(|m| m.get(cid as usize)).copied().unwrap_or(false)
    }

    /// `schedThread`: last-used context first, then the free list, then
    /// stealing from a thread parked in the out-queue (§4.4 state table:
    /// "out, context stolen -> blocked"). Only finds a candidate; does not
    /// mutate thread/context state — the caller follows up with
    /// `schedule`.
    fn sched_thread(&mut self, gid: u32) -> Option<u32> {
        let last_cid = self.thread(gid).ok()?.last_cid;
        if self.free_list.contains(&last_cid) && self.mask_allows(gid, last_cid) {
            return Some(last_cid);
        }
        if let Some(&cid) = self.free_list.iter().find(|&&c| self.mask_allows(gid, c)) {
            return Some(cid);
        }
        let victim_pos = self.out_queue.iter().position(|&g| {
            let cid = self.thread(g).map(|t| t.last_cid).unwrap_or(u32::MAX);
            self.mask_allows(gid, cid)
        })?;
        let victim = self.out_queue.remove(victim_pos)?;
        let cid = self.thread(victim).ok()?.last_cid;
        self.deschedule(cid);
        if let Ok(t) = self.thread_mut(victim) {
            t.transition(ThreadState::Blocked).ok();
        }
        Some(cid)
    }

    /// `schedContext`: a context just freed up — is there a queued thread
    /// that can use it?
    fn sched_context(&mut self, cid: u32) -> Option<u32> {
        let pos = self.run_queue.iter().position(|&g| self.mask_allows(g, cid))?;
        self.run_queue.remove(pos)
    }

    /// Binds `gid` to `cid`: sets both sides `Running`/`Used` and removes
    /// `cid` from the free list (a no-op if it was never there, e.g. when
    /// stolen straight from the out-queue by `sched_thread`).
    fn schedule(&mut self, gid: u32, cid: u32) -> Result<(), SchedError> {
        {
            let th = self.thread_mut(gid)?;
            th.transition(ThreadState::Running)?;
            th.last_cid = cid;
        }
        self.free_list.retain(|&c| c != cid);
        if let Some(ctx) = self.contexts.get_mut(cid as usize) {
            ctx.state = ContextState::Used;
            ctx.cur_thread = Some(gid);
        }
        Ok(())
    }

    /// Frees `cid`: marks it `Idle` and returns it to the free list. The
    /// caller is responsible for transitioning whichever thread owned it.
    fn deschedule(&mut self, cid: u32) {
        if let Some(ctx) = self.contexts.get_mut(cid as usize) {
            ctx.state = ContextState::Idle;
            ctx.cur_thread = None;
        }
        if !self.free_list.contains(&cid) {
            self.free_list.push(cid);
        }
    }

    /// `schedTick` (§4.4 "per-quantum round-robin"): for each thread still
    /// waiting in the run queue whose mask permits at least one currently
    /// used context, swap it in for the context's current occupant, who
    /// goes to the back of the run queue.
    fn sched_tick(&mut self) {
        let used_cids: Vec<u32> =
            self.contexts.iter().filter(|c| c.state == ContextState::Used).map(|c| c.id).collect();
        if used_cids.is_empty() {
            return;
        }
        let waiting: Vec<u32> = self.run_queue.iter().copied().collect();
        for gid in waiting {
            if !self.run_queue.contains(&gid) || used_cids.is_empty() {
                continue;
            }
            self.next_victim %= used_cids.len();
            let Some(&cid) = used_cids.iter().skip(self.next_victim).chain(used_cids.iter()).find(|&&c| self.mask_allows(gid, c))
            else {
                continue;
            };
            let Some(ctx_idx) = self.contexts.iter().position(|c| c.id == cid) else { continue };
            let Some(victim_gid) = self.contexts[ctx_idx].cur_thread else { continue };
            if victim_gid == gid {
                continue;
            }
            self.run_queue.retain(|&g| g != gid);
            self.deschedule(cid);
            if let Ok(vt) = self.thread_mut(victim_gid) {
                vt.transition(ThreadState::Queued).ok();
            }
            self.run_queue.push_back(victim_gid);
            let _ = self.schedule(gid, cid);
            self.next_victim += 1;
        }
    }
}
