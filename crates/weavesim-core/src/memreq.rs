//! Coherence message exchanged across cache levels (§3: "Memory request").

use serde::{Deserialize, Serialize};

/// Physical line address (already shifted right by the line-size log2; the
/// cache levels never see byte offsets).
pub type LineAddress = u64;

/// MESI coherence states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MesiState {
    Modified,
    Exclusive,
    Shared,
    Invalid,
}

impl MesiState {
    /// Whether the holder may serve a request without consulting anyone else.
    pub fn is_writable(self) -> bool {
        matches!(self, MesiState::Modified | MesiState::Exclusive)
    }

    pub fn is_valid(self) -> bool {
        !matches!(self, MesiState::Invalid)
    }
}

/// Coherence access type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessType {
    /// Get shared: a load miss.
    Gets,
    /// Get exclusive: a store miss, or an upgrade request.
    Getx,
    /// Put shared: a clean eviction notification.
    Puts,
    /// Put exclusive (dirty writeback).
    Putx,
}

impl AccessType {
    pub fn is_request(self) -> bool {
        matches!(self, AccessType::Gets | AccessType::Getx)
    }

    pub fn is_put(self) -> bool {
        matches!(self, AccessType::Puts | AccessType::Putx)
    }
}

bitflags::bitflags! {
    /// Request flags recognized by the coherence controller (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MemFlags: u32 {
        const INSTRUCTION_FETCH = 1 << 0;
        const NO_EXCLUSIVE      = 1 << 1;
        const PREFETCH          = 1 << 2;
    }
}

/// Releasable lock handed to the coherence controller so it can drop the
/// requester's lock during a downward traversal, matching the
/// `req.childLock` release-and-reacquire pattern in the original engine
/// without threading raw lock guards through recursive `access` calls.
pub struct ReleasableLock<'a> {
    release: Option<Box<dyn FnOnce() + 'a>>,
}

impl<'a> ReleasableLock<'a> {
    pub fn new(release: impl FnOnce() + 'a) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn none() -> Self {
        Self { release: None }
    }

    /// Release the underlying lock, if any. A no-op the second time.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// The coherence message passed from a child cache (or core) up to its
/// parent, and recursively up the tree until satisfied.
pub struct MemReq<'a> {
    pub line_addr: LineAddress,
    pub access_type: AccessType,
    pub child_id: u32,
    /// The requester's own view of this line's state; the controller
    /// updates it in place as coherence transitions happen.
    pub child_state: &'a mut MesiState,
    pub arrival_cycle: u64,
    pub lock: ReleasableLock<'a>,
    pub initial_state: MesiState,
    pub src_core: u32,
    pub flags: MemFlags,
}

impl<'a> MemReq<'a> {
    pub fn is_prefetch(&self) -> bool {
        self.flags.contains(MemFlags::PREFETCH)
    }

    pub fn is_instruction_fetch(&self) -> bool {
        self.flags.contains(MemFlags::INSTRUCTION_FETCH)
    }
}
