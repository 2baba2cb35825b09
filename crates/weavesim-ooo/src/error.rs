use weavesim_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum OooError {
    #[error(transparent)]
    Core(#[from] CoreError),
}
