#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("stat path {0:?} not found")]
    NotFound(Vec<String>),
    #[error("stat {0:?} already has a child named {1:?}")]
    DuplicateChild(Vec<String>, String),
    #[error("i/o error writing stats dump: {0}")]
    Io(#[from] std::io::Error),
    #[error("binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),
}
