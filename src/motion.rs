//! Thread-safe motion-region counters (spec §4.7; grounded on
//! `original_source/include/meteor/ivs_monitor.h`). The external IVS-region
//! poller is out of scope for this pipeline — only the shared counters and
//! their snapshot/reset contract are implemented here.

use std::sync::Mutex;

/// A point-in-time read of the four counters, taken and reset atomically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionSnapshot {
    pub polls: u32,
    pub active_polls: u32,
    pub total_rois: u32,
    pub last_rois: u32,
}

#[derive(Default)]
struct Counters {
    polls: u32,
    active_polls: u32,
    total_rois: u32,
    last_rois: u32,
}

/// Four monotonic counters behind a mutex. An external collaborator
/// (the IVS-region poller) calls `record_poll`; `StackAverager` calls
/// `snapshot_and_reset` once per stack completion.
pub struct MotionCounters {
    inner: Mutex<Counters>,
}

impl MotionCounters {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters::default()),
        }
    }

    /// Record one poll of the motion-detection regions. `active` is whether
    /// any region reported motion this poll; `rois` is how many regions
    /// reported motion.
    pub fn record_poll(&self, active: bool, rois: u32) {
        let mut c = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        c.polls += 1;
        if active {
            c.active_polls += 1;
        }
        c.total_rois += rois;
        c.last_rois = rois;
    }

    /// Snapshot the current counters and reset them to zero, atomically.
    /// If the collaborator was never started, this returns the zero
    /// snapshot rather than erroring.
    pub fn snapshot_and_reset(&self) -> MotionSnapshot {
        let mut c = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let snap = MotionSnapshot {
            polls: c.polls,
            active_polls: c.active_polls,
            total_rois: c.total_rois,
            last_rois: c.last_rois,
        };
        *c = Counters::default();
        snap
    }
}

impl Default for MotionCounters {
    fn default() -> Self {
        Self::new()
    }
}
