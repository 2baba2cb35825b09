use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("set index {0} out of range for {1} sets")]
    SetOutOfRange(u32, u32),
    #[error("way index {0} out of range for {1}-way associativity")]
    WayOutOfRange(u32, u32),
    #[error("sharer {0} is not tracked by this line (max {1} children)")]
    UnknownSharer(u32, usize),
    #[error("no free MSHR entry for line {0:#x}")]
    MshrFull(u64),
    #[error("DRAM backend rejected request: {0}")]
    Backend(String),
}
