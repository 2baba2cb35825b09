//! `ContentionSim`: owns every domain plus the registry of per-core event
//! recorders, and drives the weave phase across a bounded worker pool
//! (§4.2, §5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use weavesim_events::{DomainSink, EventId, EventRecorder};

use crate::domain::{Domain, QueuedEvent, DEFAULT_QUEUE_BLOCKS};
use crate::error::ContentionError;

/// Identifies a crossing chain: the core that issued it, the domain it
/// left, and the domain it is headed to. Consecutive crossings sharing a
/// key are chained onto one another so they resolve in issue order
/// without each one needing its own synchronized domain insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrossingKey {
    pub src_id: u32,
    pub src_domain: u32,
    pub dst_domain: u32,
}

pub struct ContentionSim {
    domains: Vec<Arc<Domain>>,
    recorders: Mutex<Vec<Arc<Mutex<EventRecorder>>>>,
    last_crossing: Mutex<HashMap<CrossingKey, EventId>>,
    #[cfg(feature = "profile-crossings")]
    crossing_counts: Mutex<HashMap<CrossingKey, u64>>,
    #[cfg(feature = "post-mortem")]
    post_mortem: Mutex<PostMortemLog>,
}

/// Optional per-simulator-thread debugging ring (`POST_MORTEM` in the
/// original `contention_sim.cpp`): the last `CAPACITY` `(cycle, recorder,
/// event)` triples simulated, for diagnosing divergence between runs
/// without keeping a full trace.
#[cfg(feature = "post-mortem")]
struct PostMortemLog {
    entries: std::collections::VecDeque<(u64, u32, usize)>,
}

#[cfg(feature = "post-mortem")]
impl PostMortemLog {
    const CAPACITY: usize = 4096;

    fn new() -> Self {
        Self { entries: std::collections::VecDeque::with_capacity(Self::CAPACITY) }
    }

    fn push(&mut self, cycle: u64, recorder: u32, event: usize) {
        if self.entries.len() == Self::CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((cycle, recorder, event));
    }
}

impl ContentionSim {
    pub fn new(num_domains: u32) -> Self {
        let domains = (0..num_domains)
            .map(|id| Arc::new(Domain::new(id, DEFAULT_QUEUE_BLOCKS)))
            .collect();
        Self {
            domains,
            recorders: Mutex::new(Vec::new()),
            last_crossing: Mutex::new(HashMap::new()),
            #[cfg(feature = "profile-crossings")]
            crossing_counts: Mutex::new(HashMap::new()),
            #[cfg(feature = "post-mortem")]
            post_mortem: Mutex::new(PostMortemLog::new()),
        }
    }

    /// Crossings routed through `key` since construction. Only meaningful
    /// with the `profile-crossings` feature; returns 0 otherwise.
    #[cfg(feature = "profile-crossings")]
    pub fn crossing_count(&self, key: CrossingKey) -> u64 {
        self.crossing_counts.lock().get(&key).copied().unwrap_or(0)
    }

    /// The most recent `(cycle, recorder, event)` triples simulated, oldest
    /// first. Only populated with the `post-mortem` feature.
    #[cfg(feature = "post-mortem")]
    pub fn post_mortem_log(&self) -> Vec<(u64, u32, usize)> {
        self.post_mortem.lock().entries.iter().copied().collect()
    }

    pub fn num_domains(&self) -> u32 {
        self.domains.len() as u32
    }

    fn domain(&self, id: u32) -> Result<&Arc<Domain>, ContentionError> {
        self.domains
            .get(id as usize)
            .ok_or(ContentionError::UnknownDomain(id))
    }

    pub fn domain_stats(&self, id: u32) -> Result<(u64, u64), ContentionError> {
        let domain = self.domain(id)?;
        Ok((domain.cur_cycle(), domain.prof_time()))
    }

    /// Registers a core's bound-phase recorder and returns the handle
    /// later calls use to address its events.
    pub fn register_recorder(&self, recorder: EventRecorder) -> u32 {
        let mut recorders = self.recorders.lock();
        recorders.push(Arc::new(Mutex::new(recorder)));
        (recorders.len() - 1) as u32
    }

    pub fn recorder(&self, id: u32) -> Result<Arc<Mutex<EventRecorder>>, ContentionError> {
        self.recorders
            .lock()
            .get(id as usize)
            .cloned()
            .ok_or(ContentionError::UnknownRecorder(id))
    }

    /// Enters a freshly allocated root event into its domain's queue,
    /// taking the recorder's own lock only for the instant needed to read
    /// its assigned domain and minimum start cycle.
    pub fn enqueue_root(
        &self,
        recorder_id: u32,
        event: EventId,
    ) -> Result<(), ContentionError> {
        let recorder_arc = self.recorder(recorder_id)?;
        let (domain_id, cycle) = {
            let mut recorder = recorder_arc.lock();
            recorder.mark_root_ready(event)?
        };
        self.domain(domain_id)?
            .enqueue_synced(QueuedEvent { recorder: recorder_id, event }, cycle);
        Ok(())
    }

    /// Routes a crossing's destination event: if a prior crossing under
    /// the same `key` is still pending, chains behind it so the two
    /// resolve in issue order; otherwise queues it directly in the
    /// destination domain.
    pub fn enqueue_crossing(
        &self,
        recorder_id: u32,
        key: CrossingKey,
        dest: EventId,
        cycle: u64,
    ) -> Result<(), ContentionError> {
        let recorder_arc = self.recorder(recorder_id)?;
        let mut chain = self.last_crossing.lock();
        let chained = match chain.get(&key) {
            Some(&prev_dest) => {
                let mut recorder = recorder_arc.lock();
                if recorder.is_done(prev_dest) {
                    false
                } else {
                    recorder.add_child(prev_dest, dest)?;
                    true
                }
            }
            None => false,
        };
        if !chained {
            self.domain(key.dst_domain)?
                .enqueue_synced(QueuedEvent { recorder: recorder_id, event: dest }, cycle);
        }
        chain.insert(key, dest);
        #[cfg(feature = "profile-crossings")]
        {
            *self.crossing_counts.lock().entry(key).or_insert(0) += 1;
        }
        Ok(())
    }

    /// Drains every domain's queue up to `deadline_cycle`, spreading
    /// domains round-robin across `worker_count` threads. Each worker
    /// loops over its assigned domains, and the pool only stops once a
    /// full pass makes no progress across every domain — the same
    /// stalled-queue retry the original falls back to when a domain's
    /// front event depends on a crossing that another domain hasn't
    /// produced yet.
    pub fn simulate_phase(&self, deadline_cycle: u64, worker_count: usize) {
        let worker_count = worker_count.max(1).min(self.domains.len().max(1));

        loop {
            let made_progress = AtomicBool::new(false);
            std::thread::scope(|scope| {
                for worker in 0..worker_count {
                    let made_progress = &made_progress;
                    scope.spawn(move || {
                        let mut idx = worker;
                        while idx < self.domains.len() {
                            let domain = &self.domains[idx];
                            while let Some((queued, cycle)) = domain.dequeue_ready(deadline_cycle) {
                                made_progress.store(true, Ordering::SeqCst);
                                self.run_one(queued, cycle);
                            }
                            idx += worker_count;
                        }
                    });
                }
            });
            if !made_progress.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    fn run_one(&self, queued: QueuedEvent, cycle: u64) {
        #[cfg(feature = "post-mortem")]
        self.post_mortem.lock().push(cycle, queued.recorder, queued.event.raw());
        let Ok(recorder_arc) = self.recorder(queued.recorder) else {
            trace!(recorder = queued.recorder, "dropped event for unknown recorder");
            return;
        };
        let mut recorder = recorder_arc.lock();
        let mut sink = RecorderSink { sim: self, recorder_id: queued.recorder };
        if let Err(err) = recorder.simulate(queued.event, cycle, &mut sink) {
            trace!(?err, recorder = queued.recorder, "event simulation failed");
        }
    }

    /// True once every domain's queue is empty — the weave phase for this
    /// window is fully drained.
    pub fn is_quiescent(&self) -> bool {
        self.domains.iter().all(|d| d.is_empty())
    }
}

struct RecorderSink<'a> {
    sim: &'a ContentionSim,
    recorder_id: u32,
}

impl DomainSink for RecorderSink<'_> {
    fn enqueue(&mut self, domain: u32, event: EventId, cycle: u64) {
        if let Ok(d) = self.sim.domain(domain) {
            d.enqueue(QueuedEvent { recorder: self.recorder_id, event }, cycle);
        }
    }

    fn requeue(&mut self, domain: u32, event: EventId, cycle: u64) {
        if let Ok(d) = self.sim.domain(domain) {
            d.requeue(QueuedEvent { recorder: self.recorder_id, event }, cycle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weavesim_events::{EventKind, EventNode};

    #[test]
    fn root_event_resolves_through_the_weave_loop() {
        let sim = ContentionSim::new(2);
        let mut recorder = EventRecorder::new(1);
        let ev = recorder.alloc(EventNode::new(EventKind::Generic, 10, 0, 0));
        recorder.set_domain(ev, 0).unwrap();
        let recorder_id = sim.register_recorder(recorder);

        sim.enqueue_root(recorder_id, ev).unwrap();
        sim.simulate_phase(100, 2);

        assert!(sim.is_quiescent());
    }

    #[test]
    fn crossing_chain_preserves_order_between_two_events() {
        let sim = ContentionSim::new(2);
        let mut recorder = EventRecorder::new(1);

        let parent_a = recorder.alloc(EventNode::new(EventKind::Generic, 0, 0, 0));
        let parent_b = recorder.alloc(EventNode::new(EventKind::Generic, 0, 0, 0));
        recorder.set_domain(parent_a, 0).unwrap();
        recorder.set_domain(parent_b, 0).unwrap();
        let (_, dest_a) = recorder.produce_crossing(parent_a, 1, 5, 0).unwrap();
        let (_, dest_b) = recorder.produce_crossing(parent_b, 1, 5, 0).unwrap();
        let recorder_id = sim.register_recorder(recorder);

        let key = CrossingKey { src_id: 0, src_domain: 0, dst_domain: 1 };
        sim.enqueue_crossing(recorder_id, key, dest_a, 6).unwrap();
        // dest_b chains behind dest_a since dest_a has not resolved yet.
        sim.enqueue_crossing(recorder_id, key, dest_b, 6).unwrap();

        sim.enqueue_root(recorder_id, parent_a).unwrap();
        sim.enqueue_root(recorder_id, parent_b).unwrap();
        sim.simulate_phase(200, 2);

        assert!(sim.is_quiescent());
    }

    #[cfg(feature = "profile-crossings")]
    #[test]
    fn crossing_count_tracks_chained_crossings() {
        let sim = ContentionSim::new(2);
        let mut recorder = EventRecorder::new(1);
        let parent_a = recorder.alloc(EventNode::new(EventKind::Generic, 0, 0, 0));
        let parent_b = recorder.alloc(EventNode::new(EventKind::Generic, 0, 0, 0));
        recorder.set_domain(parent_a, 0).unwrap();
        recorder.set_domain(parent_b, 0).unwrap();
        let (_, dest_a) = recorder.produce_crossing(parent_a, 1, 5, 0).unwrap();
        let (_, dest_b) = recorder.produce_crossing(parent_b, 1, 5, 0).unwrap();
        let recorder_id = sim.register_recorder(recorder);

        let key = CrossingKey { src_id: 0, src_domain: 0, dst_domain: 1 };
        sim.enqueue_crossing(recorder_id, key, dest_a, 6).unwrap();
        sim.enqueue_crossing(recorder_id, key, dest_b, 6).unwrap();

        assert_eq!(sim.crossing_count(key), 2);
    }

    #[cfg(feature = "post-mortem")]
    #[test]
    fn post_mortem_log_records_recent_events() {
        let sim = ContentionSim::new(1);
        let mut recorder = EventRecorder::new(1);
        let ev = recorder.alloc(EventNode::new(EventKind::Generic, 10, 0, 0));
        recorder.set_domain(ev, 0).unwrap();
        let recorder_id = sim.register_recorder(recorder);

        sim.enqueue_root(recorder_id, ev).unwrap();
        sim.simulate_phase(100, 1);

        let log = sim.post_mortem_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, recorder_id);
    }
}
