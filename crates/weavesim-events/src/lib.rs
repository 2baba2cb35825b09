//! Timing event DAG (§4.5: "Bound to weave recording").
//!
//! A core's bound phase builds a DAG of [`EventNode`]s inside an
//! [`EventRecorder`] while it runs contention-free; the weave phase later
//! replays that DAG through a domain's priority queue, resolving each
//! event's completion cycle against the contention it actually observes.
//! Everything here is single-threaded per recorder — cross-core/cross-
//! domain stitching is a `CrossingDest`/`CrossingProxy` pair, not a lock.

pub mod error;
pub mod node;
pub mod recorder;

pub use error::EventError;
pub use node::{EventId, EventKind, EventNode, EventState};
pub use recorder::{DomainSink, EventRecorder};
