//! Bound+weave phase loop (§2, §4.5): wires a fixed core count through the
//! scheduler, the per-core OOO timing model, the shared memory hierarchy,
//! and the contention simulator's event DAG, one phase of `phase_length`
//! cycles at a time.
//!
//! The bound phase runs every core's uops in parallel (one host thread
//! per core, matching the original's "per-thread core models run
//! contention-free"); cache access latency is resolved inline against the
//! shared hierarchy rather than deferred, since `weavesim-cache` already
//! encapsulates the one piece of shared mutable state (the MSHRs) behind
//! its own lock. The weave phase then replays the resulting event DAG
//! through `ContentionSim`, which is where cross-domain queuing order
//! (not raw access latency) actually gets contended.

use weavesim_contention::{ContentionSim, CrossingKey};
use weavesim_core::{AccessType, EventHandle, TimingRecord};
use weavesim_events::{EventId, EventKind, EventNode, EventRecorder};
use weavesim_ooo::{MemAccessOutcome, MemAccessor, OooCore};
use weavesim_stats::{AggregateStat, Counter, Stat};

use crate::hierarchy::MemHierarchy;
use crate::workload::WorkloadGenerator;

pub struct EngineConfig {
    pub num_cores: u32,
    pub phase_length: u64,
    pub num_phases: u64,
    pub bbls_per_phase: u32,
    pub weave_workers: usize,
    pub start_slack: u32,
    pub seed: u64,
    pub working_set_lines: u64,
    pub shared_lines: u64,
    pub max_uops_per_bbl: u32,
}

/// Per-core counters rolled into the stats tree at the end of a run.
struct CoreCounters {
    instructions: Counter,
    loads: Counter,
    stores: Counter,
    l1_misses: Counter,
    l2_misses: Counter,
    /// `TimingRecord`s drained from the recorder's pending queue.
    records_emitted: Counter,
    /// Tracked future responses whose cycle had already arrived when
    /// drained at phase end.
    responses_retired: Counter,
}

pub struct Engine {
    cfg: EngineConfig,
    hierarchy: MemHierarchy,
    contention: ContentionSim,
    cores: Vec<OooCore>,
    recorders: Vec<u32>,
    counters: Vec<CoreCounters>,
}

pub struct EngineReport {
    pub phases_run: u64,
    pub final_cycle: u64,
    pub stats: Stat,
}

impl Engine {
    pub fn new(cfg: EngineConfig, hierarchy: MemHierarchy, contention: ContentionSim) -> Self {
        let cores: Vec<OooCore> = (0..cfg.num_cores).map(|_| OooCore::new()).collect();
        let mut recorders = Vec::with_capacity(cfg.num_cores as usize);
        let mut counters = Vec::with_capacity(cfg.num_cores as usize);
        for core in 0..cfg.num_cores {
            let recorder = EventRecorder::new(cfg.start_slack);
            recorders.push(contention.register_recorder(recorder));
            counters.push(CoreCounters {
                instructions: Counter::new(format!("core{core}.instructions"), "retired uop count"),
                loads: Counter::new(format!("core{core}.loads"), "load uop count"),
                stores: Counter::new(format!("core{core}.stores"), "store uop count"),
                l1_misses: Counter::new(format!("core{core}.l1_misses"), "L1 misses observed"),
                l2_misses: Counter::new(format!("core{core}.l2_misses"), "L2 misses observed"),
                records_emitted: Counter::new(format!("core{core}.records_emitted"), "timing records drained into the event DAG"),
                responses_retired: Counter::new(format!("core{core}.responses_retired"), "future responses retired at phase end"),
            });
        }
        Self { cfg, hierarchy, contention, cores, recorders, counters }
    }

    /// The shared domain every memory response is eventually crossed
    /// into; core `c`'s own requests live in domain `c`.
    fn mem_domain(&self) -> u32 {
        self.cfg.num_cores
    }

    pub fn run(mut self) -> EngineReport {
        let mut generators: Vec<WorkloadGenerator> = (0..self.cfg.num_cores)
            .map(|c| {
                WorkloadGenerator::new(
                    self.cfg.seed.wrapping_add(c as u64),
                    self.cfg.working_set_lines,
                    self.cfg.shared_lines,
                    self.cfg.max_uops_per_bbl,
                )
            })
            .collect();

        // Running total of each core's recorder's `gap_cycles()` as of the
        // last phase, so only the cycle skew the *current* weave phase
        // contributed gets folded into that core's clock (§4.5).
        let mut applied_gap = vec![0i64; self.cfg.num_cores as usize];

        let mut phase = 0u64;
        while phase < self.cfg.num_phases {
            let deadline = (phase + 1) * self.cfg.phase_length;
            self.run_bound_phase(&mut generators, deadline);
            self.contention.simulate_phase(deadline, self.cfg.weave_workers);

            for core_id in 0..self.cfg.num_cores as usize {
                if let Ok(recorder) = self.contention.recorder(self.recorders[core_id]) {
                    let gap = recorder.lock().gap_cycles();
                    let delta = gap - applied_gap[core_id];
                    self.cores[core_id].apply_gap(delta);
                    applied_gap[core_id] = gap;
                }
            }

            tracing::debug!(phase, deadline, "phase complete");
            phase += 1;
        }

        let stats = self.build_stats();
        EngineReport { phases_run: phase, final_cycle: phase * self.cfg.phase_length, stats }
    }

    /// Runs every core's bound phase for this window, feeding it basic
    /// blocks until its local cycle count reaches `deadline`. Cores share
    /// nothing but the memory hierarchy and the contention simulator,
    /// both internally synchronized, so this is safe to parallelize
    /// straightforwardly across host threads.
    fn run_bound_phase(&mut self, generators: &mut [WorkloadGenerator], deadline: u64) {
        let hierarchy = &self.hierarchy;
        let contention = &self.contention;
        let mem_domain = self.mem_domain();
        let bbls_per_phase = self.cfg.bbls_per_phase;

        let mut per_core_work: Vec<_> =
            self.cores.iter_mut().zip(self.recorders.iter().copied()).zip(self.counters.iter_mut()).zip(generators.iter_mut()).collect();

        std::thread::scope(|scope| {
            for (core_id, (((core, recorder_id), counters), generator)) in per_core_work.iter_mut().enumerate() {
                let core_id = core_id as u32;
                scope.spawn(move || {
                    run_core_bound_phase(
                        core_id,
                        core,
                        *recorder_id,
                        counters,
                        generator,
                        hierarchy,
                        contention,
                        mem_domain,
                        deadline,
                        bbls_per_phase,
                    );
                });
            }
        });
    }

    fn build_stats(self) -> Stat {
        let mut root = AggregateStat::new("weavesim", "weavesim run stats");
        for (id, counters) in self.counters.into_iter().enumerate() {
            let mut core_group = AggregateStat::regular(format!("core{id}"), "per-core timing counters");
            core_group.append_scalar(counters.instructions, "instructions", "retired uop count");
            core_group.append_scalar(counters.loads, "loads", "load uop count");
            core_group.append_scalar(counters.stores, "stores", "store uop count");
            core_group.append_scalar(counters.l1_misses, "l1_misses", "L1 misses observed");
            core_group.append_scalar(counters.l2_misses, "l2_misses", "L2 misses observed");
            core_group.append_scalar(counters.records_emitted, "records_emitted", "timing records drained into the event DAG");
            core_group.append_scalar(counters.responses_retired, "responses_retired", "future responses retired at phase end");
            root.append_aggregate(core_group);
        }
        for domain in 0..self.contention.num_domains() {
            if let Ok((cur_cycle, prof_time)) = self.contention.domain_stats(domain) {
                let mut group = AggregateStat::regular(format!("domain{domain}"), "weave-phase domain counters");
                let cycle_counter = Counter::new("cur_cycle", "domain clock");
                cycle_counter.set(cur_cycle);
                let time_counter = Counter::new("prof_time", "cycles spent actively simulating");
                time_counter.set(prof_time);
                group.append_scalar(cycle_counter, "cur_cycle", "domain clock");
                group.append_scalar(time_counter, "prof_time", "cycles spent actively simulating");
                root.append_aggregate(group);
            }
        }
        root.prune_empty();
        root.root()
    }
}

/// Adapts the shared [`MemHierarchy`] to `weavesim-ooo`'s [`MemAccessor`]
/// so `OooCore::execute_bbl` can resolve a load/store's real cache
/// response cycle synchronously, in place, before the result can be read
/// by a dependent uop (§4.1 step 7). Bumps the per-core access counters
/// as a side effect, since every access it sees is a genuine load/store.
struct HierarchyAccessor<'a> {
    hierarchy: &'a MemHierarchy,
    core_id: u32,
    counters: &'a mut CoreCounters,
}

impl MemAccessor for HierarchyAccessor<'_> {
    fn access(&mut self, addr: weavesim_core::LineAddress, is_write: bool, dispatch_cycle: u64) -> MemAccessOutcome {
        if is_write {
            self.counters.stores.inc();
        } else {
            self.counters.loads.inc();
        }
        match self.hierarchy.access(self.core_id, addr, is_write, dispatch_cycle) {
            Ok(access) => {
                if !access.l1_hit {
                    self.counters.l1_misses.inc();
                }
                if !access.l2_hit {
                    self.counters.l2_misses.inc();
                }
                MemAccessOutcome { response_cycle: access.response_cycle, l1_hit: access.l1_hit, l2_hit: access.l2_hit }
            }
            Err(err) => {
                tracing::warn!(core = self.core_id, ?err, "memory hierarchy access failed");
                MemAccessOutcome { response_cycle: dispatch_cycle, l1_hit: true, l2_hit: true }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_core_bound_phase(
    core_id: u32,
    core: &mut OooCore,
    recorder_id: u32,
    counters: &mut CoreCounters,
    generator: &mut WorkloadGenerator,
    hierarchy: &MemHierarchy,
    contention: &ContentionSim,
    mem_domain: u32,
    deadline: u64,
    bbls_per_phase: u32,
) {
    // Anchors the issue-order chain (§4.1: "issue events chained via
    // DelayEvent"): every dispatch after the first becomes ready only
    // once this one has been simulated, so the weave phase can't reorder
    // a core's own memory-op issue sequence.
    let mut last_dispatch: Option<EventId> = None;
    let mut issued = 0u32;

    while core.cur_cycle() < deadline && issued < bbls_per_phase {
        let block = generator.next_bbl(core_id);
        let mut accessor = HierarchyAccessor { hierarchy, core_id, counters: &mut *counters };
        let results = core.execute_bbl(&block.bbl, &block.mem_addrs, &mut accessor);
        issued += 1;
        counters.instructions.inc_by(block.bbl.uops.len() as u64);

        for ((uop, addr), result) in block.bbl.uops.iter().zip(&block.mem_addrs).zip(&results) {
            let Some(addr) = addr else { continue };
            let Some(mem) = result.mem_access else { continue };
            if !uop.kind.is_load() && !uop.kind.is_store() {
                continue;
            }

            let Ok(recorder_handle) = contention.recorder(recorder_id) else { continue };
            let is_root = last_dispatch.is_none();
            let (dispatch, dest) = {
                let mut recorder = recorder_handle.lock();

                let dispatch = recorder.alloc(EventNode::new(EventKind::Dispatch, result.dispatch_cycle, 0, 0));
                recorder.set_domain(dispatch, core_id).ok();

                if let Some(prev) = last_dispatch {
                    let delay = recorder.alloc(EventNode::new(EventKind::Delay, 0, 0, 0));
                    recorder.set_domain(delay, core_id).ok();
                    if recorder.add_child(prev, delay).is_ok() {
                        recorder.add_child(delay, dispatch).ok();
                    }
                }

                let response = recorder.alloc(EventNode::new(EventKind::Response, mem.response_cycle, 0, 0));
                recorder.set_domain(response, core_id).ok();
                recorder.add_child(dispatch, response).ok();
                recorder.track_future_response(mem.response_cycle, response);

                let request_type = if uop.kind.is_store() { AccessType::Getx } else { AccessType::Gets };
                recorder.push_record(TimingRecord {
                    line_addr: *addr,
                    request_cycle: result.dispatch_cycle,
                    response_cycle: mem.response_cycle,
                    request_type,
                    start_event: EventHandle(dispatch.raw() as u32),
                    end_event: EventHandle(response.raw() as u32),
                });

                let (_, dest) = recorder
                    .produce_crossing(dispatch, mem_domain, mem.response_cycle, 1)
                    .expect("dispatch event was just allocated with a domain");

                recorder.set_last_issue(dispatch, result.dispatch_cycle);
                (dispatch, dest)
            };
            last_dispatch = Some(dispatch);

            if is_root {
                if let Err(err) = contention.enqueue_root(recorder_id, dispatch) {
                    tracing::warn!(core = core_id, ?err, "failed to enqueue dispatch event");
                }
            }
            let key = CrossingKey { src_id: core_id, src_domain: core_id, dst_domain: mem_domain };
            if let Err(err) = contention.enqueue_crossing(recorder_id, key, dest, mem.response_cycle) {
                tracing::warn!(core = core_id, ?err, "failed to enqueue crossing destination");
            }
        }
    }

    // Phase-end drain (§4.5): every `TimingRecord` emitted this phase is
    // consumed here (same-phase, per the invariant), and any tracked
    // future response whose cycle has already arrived is retired.
    if let Ok(recorder_handle) = contention.recorder(recorder_id) {
        let mut recorder = recorder_handle.lock();
        while recorder.has_pending_records() {
            if recorder.pop_record().is_some() {
                counters.records_emitted.inc();
            }
        }
        let ready = recorder.drain_ready_responses(deadline);
        counters.responses_retired.inc_by(ready.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weavesim_cache::repl::Lru;
    use weavesim_cache::{FixedLatency, SetAssocArray, TimingCache};

    fn small_hierarchy(num_cores: u32) -> MemHierarchy {
        let l1s = (0..num_cores)
            .map(|_| TimingCache::new(SetAssocArray::new(16, 4, Box::new(Lru::default())), 8, 4, 20, 4))
            .collect();
        let l2 = TimingCache::new(SetAssocArray::new(64, 8, Box::new(Lru::default())), 16, 12, 60, 8);
        MemHierarchy::new(l1s, l2, Box::new(FixedLatency::new(100)))
    }

    #[test]
    fn a_short_run_advances_every_domain_and_quiesces() {
        let cfg = EngineConfig {
            num_cores: 2,
            phase_length: 2000,
            num_phases: 3,
            bbls_per_phase: 40,
            weave_workers: 2,
            start_slack: 1,
            seed: 7,
            working_set_lines: 32,
            shared_lines: 4,
            max_uops_per_bbl: 8,
        };
        let hierarchy = small_hierarchy(cfg.num_cores);
        let contention = ContentionSim::new(cfg.num_cores + 1);
        let engine = Engine::new(cfg, hierarchy, contention);
        let report = engine.run();

        assert_eq!(report.phases_run, 3);
        assert!(report.final_cycle > 0);
    }
}
