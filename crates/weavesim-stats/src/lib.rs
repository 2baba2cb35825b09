//! Stats tree and dump backends (§6: "persisted state"). Every other
//! crate's `initStats`-equivalent builds an [`AggregateStat`] tree out of
//! [`Counter`]/[`VectorCounter`]/[`ProxyStat`]/[`LambdaStat`] leaves; the
//! weavesim process owns the root and periodically hands it to a
//! [`backend::BinaryBackend`] and [`backend::TextBackend`] for dumping.

pub mod backend;
pub mod error;
pub mod tree;

pub use backend::{read_binary_dumps, BinaryBackend, TextBackend};
pub use error::StatsError;
pub use tree::{AggregateStat, Counter, LambdaStat, ProxyStat, ScalarSource, Snapshot, SnapshotValue, Stat, VectorCounter, VectorSource};
