//! weavesim CLI — drives a bound+weave many-core timing simulation from a
//! TOML configuration file, the way the original is launched from a
//! `.cfg` file that names cache sizes, core counts, and run length.

mod engine;
mod hierarchy;
mod workload;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use weavesim_cache::repl::{IdealLru, Lfu, Lru, Nru, Random as RandomRepl, ReplPolicy, TreeLru};
use weavesim_cache::{CacheArray, FixedLatency, IdealLruArray, SetAssocArray, TimingCache, ZcacheArray};
use weavesim_config::Config;
use weavesim_contention::ContentionSim;
use weavesim_stats::{BinaryBackend, TextBackend};

use engine::{Engine, EngineConfig};
use hierarchy::MemHierarchy;

#[derive(Parser)]
#[command(name = "weavesim", version, about = "Bound+weave many-core timing simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a config file, dumping stats to an output directory.
    Run {
        /// Path to a TOML config file (see `sys.*` keys).
        #[arg(long)]
        config: PathBuf,
        /// Directory to write `stats.bin`/`stats.txt` into.
        #[arg(long, default_value = "./weavesim-out")]
        out_dir: PathBuf,
        /// Fail at startup if the config has unused keys.
        #[arg(long)]
        strict: bool,
    },
    /// Validate a config file without running a simulation.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run { config, out_dir, strict } => run_simulation(&config, &out_dir, strict),
        Commands::Check { config } => check_config(&config),
    }
}

fn check_config(path: &PathBuf) -> anyhow::Result<()> {
    let cfg = Config::from_file(path, true)?;
    let built = build_engine_config(&cfg)?;
    cfg.check_unused()?;
    println!("ok: {} cores, {} phases of {} cycles", built.num_cores, built.num_phases, built.phase_length);
    Ok(())
}

fn run_simulation(config_path: &PathBuf, out_dir: &PathBuf, strict: bool) -> anyhow::Result<()> {
    let cfg = Config::from_file(config_path, strict)?;
    let engine_cfg = build_engine_config(&cfg)?;
    let hierarchy = build_hierarchy(&cfg, engine_cfg.num_cores)?;
    cfg.check_unused()?;

    std::fs::create_dir_all(out_dir)?;
    let contention = ContentionSim::new(engine_cfg.num_cores + 1);
    let num_phases = engine_cfg.num_phases;
    let engine = Engine::new(engine_cfg, hierarchy, contention);
    let report = engine.run();

    let mut binary = BinaryBackend::create(out_dir.join("stats.bin"))?;
    binary.dump(&report.stats, report.phases_run)?;
    TextBackend::new(out_dir.join("stats.txt")).dump(&report.stats)?;

    tracing::info!(
        phases_run = report.phases_run,
        configured_phases = num_phases,
        final_cycle = report.final_cycle,
        "simulation complete"
    );
    Ok(())
}

/// Pulls the handful of top-level run parameters out of `sys.*`, the way
/// every other module in the system reads its own slice of the same tree.
fn build_engine_config(cfg: &Config) -> anyhow::Result<EngineConfig> {
    Ok(EngineConfig {
        num_cores: cfg.get("sys.cores.count", 4u32),
        phase_length: cfg.get("sys.phaseLength", 10_000u64),
        num_phases: cfg.get("sys.numPhases", 100u64),
        bbls_per_phase: cfg.get("sys.core.bblsPerPhase", 64u32),
        weave_workers: cfg.get("sim.weaveWorkers", 4u32) as usize,
        start_slack: cfg.get("sim.startSlack", 2u32),
        seed: cfg.get("sim.seed", 1u64),
        working_set_lines: cfg.get("sim.workload.workingSetLines", 256u64),
        shared_lines: cfg.get("sim.workload.sharedLines", 16u64),
        max_uops_per_bbl: cfg.get("sim.workload.maxUopsPerBbl", 8u32),
    })
}

/// Builds the replacement policy named by `sys.caches.<level>.repl`
/// (default `"lru"`), one of the array-agnostic policies §4.3 lists.
fn build_repl(cfg: &Config, key: &str, seed: u64) -> Box<dyn ReplPolicy> {
    let ways: u32 = cfg.get(&format!("{key}.ways"), 8u32);
    match cfg.get(&format!("{key}.repl"), "lru".to_string()).to_lowercase().as_str() {
        "nru" => Box::new(Nru::default()),
        "random" => Box::new(RandomRepl::new(seed)),
        "lfu" => Box::new(Lfu::default()),
        "treelru" => Box::new(TreeLru::new(ways.next_power_of_two())),
        "ideallru" => Box::new(IdealLru::default()),
        _ => Box::new(Lru::default()),
    }
}

/// Builds the cache array named by `sys.caches.<level>.type` (default
/// `"setassoc"`), one of the three placement policies §3/§4.3 name:
/// plain set-associative, skewed-associative ("zcache"), or the
/// fully-associative ideal-LRU oracle.
fn build_array(cfg: &Config, key: &str, seed: u64) -> Box<dyn CacheArray> {
    let sets: u32 = cfg.get(&format!("{key}.sets"), 64u32);
    let ways: u32 = cfg.get(&format!("{key}.ways"), 8u32);
    match cfg.get(&format!("{key}.type"), "setassoc".to_string()).to_lowercase().as_str() {
        "zcache" => Box::new(ZcacheArray::new(sets, ways, build_repl(cfg, key, seed))),
        "ideallru" => Box::new(IdealLruArray::new(sets * ways, build_repl(cfg, key, seed))),
        _ => Box::new(SetAssocArray::new(sets, ways, build_repl(cfg, key, seed))),
    }
}

fn build_hierarchy(cfg: &Config, num_cores: u32) -> anyhow::Result<MemHierarchy> {
    let l1_mshrs: u32 = cfg.get("sys.caches.l1d.mshrs", 10u32);
    let l1_acc_lat: u32 = cfg.get("sys.caches.l1d.latency", 4u32);
    let l1_miss_lat: u32 = cfg.get("sys.caches.l1d.missLatency", 20u32);
    let l1_inv_lat: u32 = cfg.get("sys.caches.l1d.invLatency", 2u32);

    let l1s = (0..num_cores)
        .map(|core| {
            let array = build_array(cfg, "sys.caches.l1d", 1000 + core as u64);
            TimingCache::new(ArrayBox(array), l1_mshrs, l1_acc_lat, l1_miss_lat, l1_inv_lat)
        })
        .collect();

    let l2_mshrs: u32 = cfg.get("sys.caches.l2.mshrs", 32u32);
    let l2_acc_lat: u32 = cfg.get("sys.caches.l2.latency", 12u32);
    let l2_miss_lat: u32 = cfg.get("sys.caches.l2.missLatency", 60u32);
    let l2_inv_lat: u32 = cfg.get("sys.caches.l2.invLatency", 8u32);
    let l2_array = build_array(cfg, "sys.caches.l2", 2000);
    let l2 = TimingCache::new(ArrayBox(l2_array), l2_mshrs, l2_acc_lat, l2_miss_lat, l2_inv_lat);

    let dram_lat: u64 = cfg.get("sys.mem.latency", 100u64);
    let prefetch_degree: u32 = cfg.get("sys.caches.l1d.prefetch.degree", 0u32);
    Ok(MemHierarchy::with_prefetch(l1s, l2, Box::new(FixedLatency::new(dram_lat)), prefetch_degree))
}

/// `TimingCache::new` takes `impl CacheArray + 'static` so it can store
/// any concrete array inline without boxing twice; `build_array` already
/// has to return a trait object (its three branches are different
/// concrete types), so this thin wrapper lets an already-boxed array
/// satisfy that bound without an extra level of indirection beyond the
/// one `Box<dyn CacheArray>` already is.
struct ArrayBox(Box<dyn CacheArray>);

impl CacheArray for ArrayBox {
    fn num_sets(&self) -> u32 {
        self.0.num_sets()
    }

    fn ways(&self) -> u32 {
        self.0.ways()
    }

    fn lookup(&self, tag: weavesim_core::LineAddress) -> Option<(u32, u32, weavesim_core::CacheLine)> {
        self.0.lookup(tag)
    }

    fn line(&self, set_id: u32, way: u32) -> Result<weavesim_core::CacheLine, weavesim_cache::CacheError> {
        self.0.line(set_id, way)
    }

    fn set_line(&mut self, set_id: u32, way: u32, line: weavesim_core::CacheLine) -> Result<(), weavesim_cache::CacheError> {
        self.0.set_line(set_id, way, line)
    }

    fn find_victim(&mut self, tag: weavesim_core::LineAddress) -> (u32, u32, Option<weavesim_core::CacheLine>) {
        self.0.find_victim(tag)
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
        [sys]
        numPhases = 2
        phaseLength = 1000

        [sys.cores]
        count = 2

        [sys.core]
        bblsPerPhase = 16

        [sys.caches.l1d]
        sets = 16
        ways = 4
        mshrs = 8
        latency = 4
        missLatency = 20
        invLatency = 2

        [sys.caches.l2]
        sets = 64
        ways = 8
        mshrs = 16
        latency = 12
        missLatency = 60
        invLatency = 8

        [sys.mem]
        latency = 100

        [sim]
        weaveWorkers = 2
        startSlack = 1
        seed = 11

        [sim.workload]
        workingSetLines = 32
        sharedLines = 4
        maxUopsPerBbl = 6
    "#;

    #[test]
    fn run_command_produces_stats_files() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("run.toml");
        std::fs::write(&config_path, SAMPLE_CONFIG).unwrap();
        let out_dir = dir.path().join("out");

        run_simulation(&config_path, &out_dir, true).unwrap();

        assert!(out_dir.join("stats.bin").is_file());
        assert!(out_dir.join("stats.txt").is_file());
        let text = std::fs::read_to_string(out_dir.join("stats.txt")).unwrap();
        assert!(text.contains("core0"));
        assert!(text.contains("domain0"));
    }

    #[test]
    fn check_command_accepts_a_fully_consumed_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("check.toml");
        std::fs::write(&config_path, SAMPLE_CONFIG).unwrap();
        check_config(&config_path).unwrap();
    }

    #[test]
    fn strict_check_rejects_an_unused_key() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bad.toml");
        let mut text = SAMPLE_CONFIG.to_string();
        text.push_str("\n[sys.unused]\nfoo = 1\n");
        std::fs::write(&config_path, text).unwrap();
        assert!(check_config(&config_path).is_err());
    }
}
