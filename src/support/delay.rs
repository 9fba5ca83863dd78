//! Active Delay List and the Delay Daemon policy it backs (spec.md §4.8
//! SYS18, §6).
//!
//! The ADL mutex and the daemon's own `SYS7` wait are Nucleus-level
//! semaphore/syscall operations owned by `nucleus/kernel.rs`; this module
//! is just the sorted-by-wakeup-time bookkeeping the daemon consults each
//! tick, plus parameter validation for SYS18 itself.

use crate::error::SupportFault;
use crate::types::Asid;

/// One pending delay: wake this ASID's private semaphore once `wake_at_us`
/// has passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entry {
    wake_at_us: u64,
    asid: Asid,
}

/// Kept sorted ascending by `wake_at_us` so the daemon only has to look at
/// a prefix each tick, matching spec.md §6's description of the ADL as an
/// ordered list the daemon scans from the front.
#[derive(Default)]
pub struct ActiveDelayList {
    entries: Vec<Entry>,
}

impl ActiveDelayList {
    pub fn new() -> Self {
        ActiveDelayList { entries: Vec::new() }
    }

    /// Validate and record a SYS18 request. A negative (already rejected by
    /// the caller's `u32`-vs-`i32` boundary) or unreasonable delay is
    /// rejected here per spec.md §4.8's parameter-validation requirement.
    pub fn schedule(&mut self, now_us: u64, seconds: i32, asid: Asid) -> Result<(), SupportFault> {
        if seconds < 0 {
            return Err(SupportFault::BadDelay);
        }
        let wake_at_us = now_us + (seconds as u64) * 1_000_000;
        let idx = self
            .entries
            .partition_point(|e| e.wake_at_us <= wake_at_us);
        self.entries.insert(idx, Entry { wake_at_us, asid });
        Ok(())
    }

    /// Pop every entry whose wakeup time has passed, in wakeup order. The
    /// daemon `V`s each returned ASID's private semaphore.
    pub fn pop_due(&mut self, now_us: u64) -> Vec<Asid> {
        let split = self.entries.partition_point(|e| e.wake_at_us <= now_us);
        self.entries.drain(..split).map(|e| e.asid).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The Delay Daemon's per-tick policy: wait for the next pseudo-clock tick
/// (SYS7, handled by the Nucleus), then release every U-proc whose delay
/// has expired. Exposed as a free function rather than a stateful type —
/// the daemon owns no state of its own beyond the shared `ActiveDelayList`.
pub struct DelayDaemon;

impl DelayDaemon {
    /// Returns the ASIDs to `Verhogen` on their private delay semaphore
    /// after this tick.
    pub fn tick(adl: &mut ActiveDelayList, now_us: u64) -> Vec<Asid> {
        adl.pop_due(now_us)
    }
}
