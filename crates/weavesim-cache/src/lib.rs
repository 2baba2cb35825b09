//! Coherent cache hierarchy (§4.3).
//!
//! Each level is a [`TimingCache`] (array + MESI [`Cc`] + MSHRs); an L1
//! can sit behind a [`filter_cache::FilterCache`] so repeat hits from the
//! same core skip the MSHR path entirely. [`dram::DramBackend`] plays the
//! same role one level further down for whichever level terminates the
//! hierarchy.

pub mod array;
pub mod coherence;
pub mod dram;
pub mod error;
pub mod filter_cache;
pub mod partition;
pub mod prefetcher;
pub mod repl;
pub mod timing_cache;

pub use array::{CacheArray, IdealLruArray, SetAssocArray, ZcacheArray};
pub use coherence::{Cc, CcOutcome};
pub use dram::{DramBackend, ExternalTraceBackend, FixedLatency, Md1Queue};
pub use error::CacheError;
pub use filter_cache::FilterCache;
pub use partition::{IdealLruPart, UtilityMonitor, Vantage, WayPartitioned};
pub use prefetcher::{PrefetchOutcome, StreamPrefetcher};
pub use repl::{IdealLru, Lfu, Lru, Nru, Random, ReplPolicy, TreeLru};
pub use timing_cache::{AccessOutcome, TimingCache};
