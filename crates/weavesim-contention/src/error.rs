use thiserror::Error;

use weavesim_events::EventError;

#[derive(Debug, Error)]
pub enum ContentionError {
    #[error("unknown domain {0}")]
    UnknownDomain(u32),
    #[error("unknown recorder {0}")]
    UnknownRecorder(u32),
    #[error(transparent)]
    Event(#[from] EventError),
}
