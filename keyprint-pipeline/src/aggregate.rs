//! Thread-safe collection that restores frame order
//!
//! Workers finish frames in any order; the aggregate keys fingerprints by
//! frame number so an in-order traversal is always ascending.

use crate::{Error, Result};
use keyprint_core::FrameFingerprint;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ordered, deduplicated fingerprint store shared by all workers
#[derive(Debug, Default)]
pub struct ResultAggregate {
    fingerprints: Mutex<BTreeMap<u64, FrameFingerprint>>,
}

impl ResultAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fingerprint. A second fingerprint for the same frame is
    /// rejected and the first one is kept.
    pub fn insert(&self, fingerprint: FrameFingerprint) -> Result<()> {
        let mut fingerprints = self.lock();
        match fingerprints.entry(fingerprint.frame_number) {
            Entry::Occupied(_) => Err(Error::DuplicateFrame(fingerprint.frame_number)),
            Entry::Vacant(slot) => {
                slot.insert(fingerprint);
                Ok(())
            }
        }
    }

    /// Copies out every fingerprint in ascending frame order
    pub fn snapshot_in_order(&self) -> Vec<FrameFingerprint> {
        self.lock().values().cloned().collect()
    }

    /// Consumes the aggregate, returning fingerprints in ascending frame order
    pub fn into_ordered(self) -> Vec<FrameFingerprint> {
        self.fingerprints
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_values()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The map is only touched by `insert` and reads, none of which can leave
    // it half-updated, so a poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, FrameFingerprint>> {
        self.fingerprints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
