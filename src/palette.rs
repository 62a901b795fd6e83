//! Visual identity allocation over a finite palette
//!
//! Identities are plain indices into a palette of configurable size. The
//! allocator never references tag state: the registry asks for a slot when
//! a tag is created and hands it back once the tag is destroyed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Index into the render palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisualIdentity(u16);

impl VisualIdentity {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Free-list allocator handing out the lowest free slot first
#[derive(Debug, Clone)]
pub struct IdentityAllocator {
    size: u16,
    free: BTreeSet<u16>,
    exhausted_count: u64,
}

impl IdentityAllocator {
    pub fn new(size: u16) -> Self {
        Self {
            size,
            free: (0..size).collect(),
            exhausted_count: 0,
        }
    }

    /// Take the lowest free slot, or `None` when every slot is held
    pub fn allocate(&mut self) -> Option<VisualIdentity> {
        match self.free.pop_first() {
            Some(slot) => Some(VisualIdentity(slot)),
            None => {
                self.exhausted_count += 1;
                None
            }
        }
    }

    /// Return a slot to the free list
    ///
    /// Releasing a slot that is already free or outside the palette is
    /// ignored; returns whether the slot was actually freed.
    pub fn release(&mut self, identity: VisualIdentity) -> bool {
        if identity.0 >= self.size {
            log::warn!("Ignoring release of out-of-palette identity {}", identity.0);
            return false;
        }
        if !self.free.insert(identity.0) {
            log::warn!("Identity {} released twice", identity.0);
            return false;
        }
        true
    }

    /// Free slots in ascending order
    pub fn free_slots(&self) -> Vec<VisualIdentity> {
        self.free.iter().copied().map(VisualIdentity).collect()
    }

    pub fn is_free(&self, identity: VisualIdentity) -> bool {
        self.free.contains(&identity.0)
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Number of allocation requests that found the palette full
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted_count
    }

    /// Put every slot back on the free list (session clear/stop)
    pub fn reset(&mut self) {
        self.free = (0..self.size).collect();
    }
}
