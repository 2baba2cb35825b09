//! Event-driven contention simulator (§4.2).
//!
//! The bound phase hands each core an [`weavesim_events::EventRecorder`]
//! to build its timing DAG against; the weave phase then replays every
//! recorder's events through the domains they were assigned to, charging
//! each one the contention it actually observes. A [`ContentionSim`] owns
//! the domains and the recorder registry; [`Domain`] wraps one bucketed
//! [`PrioQueue`] plus its own cycle counter.

pub mod domain;
pub mod error;
pub mod prio_queue;
pub mod sim;

pub use domain::{Domain, QueuedEvent, DEFAULT_QUEUE_BLOCKS};
pub use error::ContentionError;
pub use prio_queue::PrioQueue;
pub use sim::{ContentionSim, CrossingKey};
