//! MESI coherence controller (§4.3, grounded on `coherence_ctrls.h`'s role
//! as described by `cache.h`: a `CC` plugged into a `Cache` alongside its
//! array and replacement policy, driving `startAccess`/`processAccess`).

use weavesim_core::{AccessType, CacheLine, MemReq, MesiState, SharerSet, MAX_CHILDREN};

use crate::error::CacheError;

/// What a cache level must do in response to a child's request, beyond
/// updating its own line state. `InvalidateSharers` means the cache must
/// signal the listed children (typically via a crossing event back down
/// to them) before the requester's access can be considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcOutcome {
    Hit { resulting_state: MesiState },
    FillFromParent,
    InvalidateSharers { sharers: SharerSet, downgrade_to: MesiState },
}

/// A MESI directory for one cache level. Holds no per-line state itself —
/// that lives in the `CacheArray`'s `CacheLine`s — just the transition
/// logic, matching the original's separation of array and controller.
#[derive(Default)]
pub struct Cc;

impl Cc {
    pub fn new() -> Self {
        Self
    }

    pub fn process_access(&self, line: &mut CacheLine, req: &mut MemReq) -> Result<CcOutcome, CacheError> {
        if req.child_id as usize >= MAX_CHILDREN {
            return Err(CacheError::UnknownSharer(req.child_id, MAX_CHILDREN));
        }
        match req.access_type {
            AccessType::Gets => Ok(self.handle_gets(line, req)),
            AccessType::Getx => Ok(self.handle_getx(line, req)),
            AccessType::Puts => Ok(self.handle_puts(line, req)),
            AccessType::Putx => Ok(self.handle_putx(line, req)),
        }
    }

    fn handle_gets(&self, line: &mut CacheLine, req: &mut MemReq) -> CcOutcome {
        if !line.is_valid() {
            return CcOutcome::FillFromParent;
        }
        let exclusive_elsewhere = matches!(line.state, MesiState::Modified | MesiState::Exclusive)
            && !line.sharers.is_empty()
            && !line.sharers.only(req.child_id);
        if exclusive_elsewhere {
            let others = line.sharers;
            line.state = MesiState::Shared;
            line.sharers = SharerSet::EMPTY;
            line.sharers.add(req.child_id);
            *req.child_state = MesiState::Shared;
            return CcOutcome::InvalidateSharers { sharers: others, downgrade_to: MesiState::Shared };
        }
        line.sharers.add(req.child_id);
        if line.sharers.count() > 1 || req.flags.contains(weavesim_core::MemFlags::NO_EXCLUSIVE) {
            line.state = MesiState::Shared;
        } else {
            line.state = MesiState::Exclusive;
        }
        *req.child_state = line.state;
        CcOutcome::Hit { resulting_state: line.state }
    }

    fn handle_getx(&self, line: &mut CacheLine, req: &mut MemReq) -> CcOutcome {
        if !line.is_valid() {
            return CcOutcome::FillFromParent;
        }
        let mut others = line.sharers;
        others.remove(req.child_id);
        line.sharers = SharerSet::EMPTY;
        line.sharers.add(req.child_id);
        line.state = MesiState::Modified;
        *req.child_state = MesiState::Modified;
        if others.is_empty() {
            CcOutcome::Hit { resulting_state: MesiState::Modified }
        } else {
            CcOutcome::InvalidateSharers { sharers: others, downgrade_to: MesiState::Invalid }
        }
    }

    fn handle_puts(&self, line: &mut CacheLine, req: &mut MemReq) -> CcOutcome {
        line.sharers.remove(req.child_id);
        *req.child_state = MesiState::Invalid;
        CcOutcome::Hit { resulting_state: line.state }
    }

    fn handle_putx(&self, line: &mut CacheLine, req: &mut MemReq) -> CcOutcome {
        line.sharers.remove(req.child_id);
        line.state = MesiState::Modified;
        *req.child_state = MesiState::Invalid;
        CcOutcome::Hit { resulting_state: line.state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weavesim_core::{MemFlags, ReleasableLock};

    fn req(child_id: u32, access_type: AccessType, state: &mut MesiState) -> MemReq<'_> {
        MemReq {
            line_addr: 0x1000,
            access_type,
            child_id,
            child_state: state,
            arrival_cycle: 0,
            lock: ReleasableLock::none(),
            initial_state: MesiState::Invalid,
            src_core: child_id,
            flags: MemFlags::empty(),
        }
    }

    #[test]
    fn gets_on_an_invalid_line_requires_a_fill() {
        let cc = Cc::new();
        let mut line = CacheLine::invalid();
        let mut state = MesiState::Invalid;
        let mut r = req(0, AccessType::Gets, &mut state);
        assert_eq!(cc.process_access(&mut line, &mut r).unwrap(), CcOutcome::FillFromParent);
    }

    #[test]
    fn sole_sharer_gets_exclusive() {
        let cc = Cc::new();
        let mut line = CacheLine { tag: 0x1000, state: MesiState::Exclusive, sharers: SharerSet::EMPTY };
        let mut state = MesiState::Invalid;
        let mut r = req(3, AccessType::Gets, &mut state);
        let outcome = cc.process_access(&mut line, &mut r).unwrap();
        assert_eq!(outcome, CcOutcome::Hit { resulting_state: MesiState::Exclusive });
        assert_eq!(state, MesiState::Exclusive);
    }

    #[test]
    fn getx_invalidates_existing_sharers() {
        let cc = Cc::new();
        let mut sharers = SharerSet::EMPTY;
        sharers.add(1);
        sharers.add(2);
        let mut line = CacheLine { tag: 0x1000, state: MesiState::Shared, sharers };
        let mut state = MesiState::Invalid;
        let mut r = req(5, AccessType::Getx, &mut state);
        let outcome = cc.process_access(&mut line, &mut r).unwrap();
        match outcome {
            CcOutcome::InvalidateSharers { sharers, downgrade_to } => {
                assert!(sharers.contains(1) && sharers.contains(2));
                assert_eq!(downgrade_to, MesiState::Invalid);
            }
            _ => panic!("expected invalidation"),
        }
        assert_eq!(line.state, MesiState::Modified);
        assert!(line.sharers.only(5));
    }
}
