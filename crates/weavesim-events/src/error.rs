//! Errors raised while building or driving a timing event DAG.

use thiserror::Error;

use crate::EventId;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event {0:?} was simulated before its minimum start cycle")]
    SimulatedBeforeMinStart(EventId),

    #[error("event {0:?} has no parents left to report completion")]
    SpuriousParentDone(EventId),

    #[error("crossing proxy {0:?} has no paired destination event")]
    UnpairedCrossing(EventId),

    #[error("event {0:?} was held with no matching release")]
    HeldWithoutRelease(EventId),

    #[error("event {0:?} does not belong to this recorder")]
    UnknownEvent(EventId),
}
