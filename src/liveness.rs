/// Scan-engine stall detection.
///
/// The pipeline stamps `record_success` after every classified sighting; the
/// control loop calls `check` a few times per second. When the gap exceeds
/// the timeout the monitor trips once and the caller restarts the whole
/// process. A wedged scan engine stops delivering callbacks and has no
/// in-process recovery, so restarting is the response.
///
/// The stamp is written from the scan context and read from the control
/// loop, hence the atomics. `u32` milliseconds because the ESP32 has no
/// 64-bit atomics; differences use wrapping arithmetic.
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Outcome of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    /// No success for `silent_ms`. Reported once; later checks return `Tripped`.
    Stalled { silent_ms: u32 },
    /// Already reported stalled; restart is in progress.
    Tripped,
}

pub struct LivenessMonitor {
    last_success_ms: AtomicU32,
    tripped: AtomicBool,
    timeout_ms: u32,
}

impl LivenessMonitor {
    /// `boot_ms` seeds the last-success stamp, so a scanner that never sees a
    /// beacon restarts one timeout after boot.
    pub const fn new(timeout_ms: u32, boot_ms: u32) -> Self {
        Self {
            last_success_ms: AtomicU32::new(boot_ms),
            tripped: AtomicBool::new(false),
            timeout_ms,
        }
    }

    pub fn record_success(&self, now_ms: u32) {
        self.last_success_ms.store(now_ms, Ordering::Release);
    }

    pub fn last_success_ms(&self) -> u32 {
        self.last_success_ms.load(Ordering::Acquire)
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn check(&self, now_ms: u32) -> Liveness {
        if self.tripped.load(Ordering::Acquire) {
            return Liveness::Tripped;
        }
        let silent_ms = now_ms.wrapping_sub(self.last_success_ms());
        // A stamp ahead of `now_ms` was written after the caller read its clock
        if silent_ms <= self.timeout_ms || silent_ms > u32::MAX / 2 {
            return Liveness::Alive;
        }
        if self.tripped.swap(true, Ordering::AcqRel) {
            Liveness::Tripped
        } else {
            Liveness::Stalled { silent_ms }
        }
    }
}
