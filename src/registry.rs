/// Registry of recently sighted device addresses.
///
/// Each address string is an independent identity: EN devices rotate their
/// address on purpose and nothing here tries to link rotations.
///
/// Lifecycle: one instance is created at boot and owned by the scan-cycle
/// controller. It is never cleared; entries leave only through `sweep`, and
/// a restart is the only way back to empty.
///
/// Timestamps are milliseconds since boot in a wrapping `u32`, so ages are
/// computed with `wrapping_sub`.
use alloc::collections::BTreeMap;

use crate::filter::MacString;

/// Whether an address was already tracked when classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    New,
    Repeat,
}

/// Address → last-seen time.
#[derive(Debug, Default)]
pub struct SightingRegistry {
    entries: BTreeMap<MacString, u32>,
}

impl SightingRegistry {
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Classify `addr` and record it as seen at `now_ms`.
    ///
    /// Returns `New` iff the address was not tracked. The entry is inserted or
    /// refreshed either way.
    pub fn classify(&mut self, addr: &MacString, now_ms: u32) -> Seen {
        match self.entries.get_mut(addr) {
            Some(last_seen) => {
                // Never move an entry backwards in time.
                if now_ms.wrapping_sub(*last_seen) < u32::MAX / 2 {
                    *last_seen = now_ms;
                }
                Seen::Repeat
            }
            None => {
                self.entries.insert(addr.clone(), now_ms);
                Seen::New
            }
        }
    }

    /// Remove every entry silent for longer than `max_age_ms`.
    ///
    /// Visits each entry exactly once; `retain` keeps removal safe while
    /// traversing. Returns the number of entries removed.
    pub fn sweep(&mut self, now_ms: u32, max_age_ms: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|addr, last_seen| {
            let keep = now_ms.wrapping_sub(*last_seen) <= max_age_ms;
            if !keep {
                log::debug!("-   {}", addr);
            }
            keep
        });
        before - self.entries.len()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last-seen time of `addr`, if tracked.
    pub fn last_seen(&self, addr: &MacString) -> Option<u32> {
        self.entries.get(addr).copied()
    }
}
