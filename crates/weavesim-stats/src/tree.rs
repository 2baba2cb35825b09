//! Hierarchical stats tree (§6: "persisted state" / zsim `stats.h`):
//! counters, vectors, proxies, and lambdas collected under nested
//! [`AggregateStat`]s. Simulator code only ever touches the concrete
//! counter types; a [`crate::backend`] walks the tree read-only at dump
//! time and never mutates it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Anything that can report a single `u64` on demand: a [`Counter`], a
/// [`ProxyStat`] reading someone else's atomic, or a [`LambdaStat`]
/// wrapping an arbitrary closure.
pub trait ScalarSource: Send + Sync {
    fn get(&self) -> u64;
}

/// Anything that can report a fixed-size vector of `u64`s.
pub trait VectorSource: Send + Sync {
    fn len(&self) -> usize;
    fn value(&self, idx: usize) -> u64;
    fn counter_name(&self, _idx: usize) -> Option<&str> {
        None
    }
}

/// A plain monotonic counter (§3: "profiling counters"). Atomic so hot
/// paths in the cache/OOO/contention code can bump it without a lock.
#[derive(Debug)]
pub struct Counter {
    name: String,
    desc: String,
    count: AtomicU64,
}

impl Counter {
    pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self { name: name.into(), desc: desc.into(), count: AtomicU64::new(0) }
    }

    pub fn inc(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, delta: u64) {
        self.count.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set(&self, value: u64) {
        self.count.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl ScalarSource for Counter {
    fn get(&self) -> u64 {
        Counter::get(self)
    }
}

/// A fixed-size vector of atomic counters (§3: "occupancy histogram"
/// style stats), optionally with per-slot names.
#[derive(Debug)]
pub struct VectorCounter {
    name: String,
    desc: String,
    counters: Vec<AtomicU64>,
    counter_names: Option<Vec<String>>,
}

impl VectorCounter {
    pub fn new(name: impl Into<String>, desc: impl Into<String>, size: usize) -> Self {
        assert!(size > 0, "vector counter must have at least one slot");
        Self {
            name: name.into(),
            desc: desc.into(),
            counters: (0..size).map(|_| AtomicU64::new(0)).collect(),
            counter_names: None,
        }
    }

    pub fn with_names(mut self, names: Vec<String>) -> Self {
        assert_eq!(names.len(), self.counters.len());
        self.counter_names = Some(names);
        self
    }

    pub fn inc(&self, idx: usize) {
        self.counters[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, idx: usize, delta: u64) {
        self.counters[idx].fetch_add(delta, Ordering::Relaxed);
    }
}

impl VectorSource for VectorCounter {
    fn len(&self) -> usize {
        self.counters.len()
    }

    fn value(&self, idx: usize) -> u64 {
        self.counters[idx].load(Ordering::Relaxed)
    }

    fn counter_name(&self, idx: usize) -> Option<&str> {
        self.counter_names.as_ref().map(|names| names[idx].as_str())
    }
}

/// Reads someone else's `Arc<AtomicU64>` as a stat without owning the
/// counter — the original's `ProxyStat` wrapping a raw `uint64_t*`.
pub struct ProxyStat {
    name: String,
    desc: String,
    source: Arc<AtomicU64>,
}

impl ProxyStat {
    pub fn new(name: impl Into<String>, desc: impl Into<String>, source: Arc<AtomicU64>) -> Self {
        Self { name: name.into(), desc: desc.into(), source }
    }
}

impl ScalarSource for ProxyStat {
    fn get(&self) -> u64 {
        self.source.load(Ordering::Relaxed)
    }
}

/// A stat computed from an arbitrary closure at dump time (the original's
/// `LambdaStat<F>`) — e.g. `curCycle - haltedCycles`.
pub struct LambdaStat {
    name: String,
    desc: String,
    f: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl LambdaStat {
    pub fn new(name: impl Into<String>, desc: impl Into<String>, f: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self { name: name.into(), desc: desc.into(), f: Box::new(f) }
    }
}

impl ScalarSource for LambdaStat {
    fn get(&self) -> u64 {
        (self.f)()
    }
}

enum StatKind {
    Aggregate { children: Vec<Stat>, regular: bool },
    Scalar(Box<dyn ScalarSource>),
    Vector(Box<dyn VectorSource>),
}

/// One node of the stats tree: a name, a description, and either a
/// concrete counter or a group of further stats.
pub struct Stat {
    name: String,
    desc: String,
    kind: StatKind,
}

impl Stat {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }
}

/// A named group of stats (§3: "stats form a tree of {aggregate, scalar,
/// vector, proxy-to-counter, lambda}"). `regular` marks a group whose
/// children are all aggregates of the same shape (e.g. per-core stats) —
/// informational only here, but kept because a time-series backend can
/// use it to emit a compound record instead of a flat one.
pub struct AggregateStat {
    name: String,
    desc: String,
    regular: bool,
    children: Vec<Stat>,
}

impl AggregateStat {
    pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self { name: name.into(), desc: desc.into(), regular: false, children: Vec::new() }
    }

    pub fn regular(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self { name: name.into(), desc: desc.into(), regular: true, children: Vec::new() }
    }

    pub fn append_scalar(&mut self, source: impl ScalarSource + 'static, name: impl Into<String>, desc: impl Into<String>) {
        self.children.push(Stat { name: name.into(), desc: desc.into(), kind: StatKind::Scalar(Box::new(source)) });
    }

    pub fn append_vector(&mut self, source: impl VectorSource + 'static, name: impl Into<String>, desc: impl Into<String>) {
        self.children.push(Stat { name: name.into(), desc: desc.into(), kind: StatKind::Vector(Box::new(source)) });
    }

    pub fn append_aggregate(&mut self, child: AggregateStat) {
        self.children.push(child.into_stat());
    }

    /// `AggregateStat::makeImmutable`: recursively drops aggregates with
    /// no surviving children. Call once, right before the first dump.
    pub fn prune_empty(&mut self) {
        for child in &mut self.children {
            prune_one(child);
        }
        self.children.retain(|c| !matches!(&c.kind, StatKind::Aggregate { children, .. } if children.is_empty()));
    }

    fn into_stat(self) -> Stat {
        Stat { name: self.name, desc: self.desc, kind: StatKind::Aggregate { children: self.children, regular: self.regular } }
    }

    pub fn root(self) -> Stat {
        self.into_stat()
    }
}

fn prune_one(stat: &mut Stat) {
    if let StatKind::Aggregate { children, .. } = &mut stat.kind {
        for c in children.iter_mut() {
            prune_one(c);
        }
        children.retain(|c| !matches!(&c.kind, StatKind::Aggregate { children, .. } if children.is_empty()));
    }
}

/// A frozen, owned copy of a stat's current values — what actually gets
/// serialized to a dump. Evaluating the tree into this shape (rather than
/// serializing trait objects directly) is what makes each dump a
/// point-in-time snapshot rather than a live view.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SnapshotValue {
    Scalar(u64),
    Vector(Vec<u64>),
    Aggregate(Vec<(String, SnapshotValue)>),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub phase: u64,
    pub root_name: String,
    pub value: SnapshotValue,
}

pub fn snapshot(root: &Stat, phase: u64) -> Snapshot {
    Snapshot { phase, root_name: root.name.clone(), value: snapshot_value(root) }
}

fn snapshot_value(stat: &Stat) -> SnapshotValue {
    match &stat.kind {
        StatKind::Scalar(s) => SnapshotValue::Scalar(s.get()),
        StatKind::Vector(v) => SnapshotValue::Vector((0..v.len()).map(|i| v.value(i)).collect()),
        StatKind::Aggregate { children, .. } => {
            SnapshotValue::Aggregate(children.iter().map(|c| (c.name.clone(), snapshot_value(c))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_and_vector_round_trip_into_a_snapshot() {
        let mut root = AggregateStat::new("root", "top level");
        let mut cores = AggregateStat::regular("cores", "per-core stats");

        let mut core0 = AggregateStat::new("core0", "core 0 stats");
        let instrs = Counter::new("instrs", "instructions retired");
        instrs.inc_by(42);
        core0.append_scalar(instrs, "instrs", "instructions retired");
        cores.append_aggregate(core0);
        root.append_aggregate(cores);

        let hist = VectorCounter::new("occHist", "occupancy histogram", 4);
        hist.inc(2);
        hist.inc(2);
        root.append_scalar(Counter::new("phases", "phases simulated"), "phases", "phases simulated");
        root.append_vector(hist, "occHist", "occupancy histogram");

        let tree = root.root();
        let snap = snapshot(&tree, 7);
        assert_eq!(snap.phase, 7);
        let SnapshotValue::Aggregate(top) = &snap.value else { panic!("root must be an aggregate") };
        assert_eq!(top.len(), 3);
        let (_, hist_val) = top.iter().find(|(n, _)| n == "occHist").unwrap();
        assert_eq!(*hist_val, SnapshotValue::Vector(vec![0, 0, 2, 0]));
    }

    #[test]
    fn prune_empty_drops_childless_aggregates() {
        let mut root = AggregateStat::new("root", "top");
        root.append_aggregate(AggregateStat::new("empty", "nothing here"));
        root.append_scalar(Counter::new("c", "c"), "c", "c");
        let mut tree = root;
        tree.prune_empty();
        let tree = tree.root();
        let SnapshotValue::Aggregate(children) = snapshot(&tree, 0).value else { panic!() };
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, "c");
    }

    #[test]
    fn proxy_and_lambda_stats_reflect_the_source_at_dump_time() {
        let shared = Arc::new(AtomicU64::new(5));
        let mut root = AggregateStat::new("root", "top");
        root.append_scalar(ProxyStat::new("proxy", "proxy", Arc::clone(&shared)), "proxy", "proxy");
        let base = 100u64;
        root.append_scalar(LambdaStat::new("derived", "derived", move || base + shared.load(Ordering::Relaxed)), "derived", "derived");
        let tree = root.root();

        let SnapshotValue::Aggregate(children) = snapshot(&tree, 0).value else { panic!() };
        assert_eq!(children[0].1, SnapshotValue::Scalar(5));
        assert_eq!(children[1].1, SnapshotValue::Scalar(105));
    }
}
