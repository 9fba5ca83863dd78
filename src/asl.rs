//! Active Semaphore List: maps arbitrary semaphore keys to queues of
//! blocked PCBs (spec.md §4.2).
//!
//! Grounded on the teacher's fixed-capacity, index-addressed `Queue<T>`
//! (`queue.rs`) generalized per Design Notes §9: an arena of descriptors,
//! sentinel handles 0 (head) and 1 (tail) that are never freed, and a
//! free list threaded through the same arena.

use crate::error::KernelPanic;
use crate::machine::{DeviceId, TerminalChannel};
use crate::param::ASL_POOL_SIZE;
use crate::pcb::{PcbHandle, PcbPool, PcbQueue};
use crate::types::Asid;
use arrayvec::ArrayVec;

/// Identity of a semaphore. Real Pandos keys the ASL by an arbitrary
/// word address; the machine address space is out of this crate's scope
/// (spec.md §1), so every distinct semaphore this core allocates gets its
/// own variant/slot instead. `Ord` gives the ASL the strict total order
/// spec.md §4.2 requires without needing real addresses — see DESIGN.md
/// for why this is a faithful substitution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SemKey {
    /// Bounds the active list from below; never allocated to a real wait.
    SentinelMin,
    /// Nucleus-level per-subchannel interrupt semaphore: P'd by SYS5
    /// WaitIO, V'd by the matching device interrupt (spec.md §4.4/§4.5).
    /// `None` for the channel on non-terminal lines; terminals carry
    /// independent transmit/receive semaphores.
    Device(DeviceId, Option<TerminalChannel>),
    /// Support-level binary mutex serializing SYS11-13 callers on the
    /// same sub-channel (spec.md §3 Device mutex table).
    DeviceMutex(DeviceId, Option<TerminalChannel>),
    PseudoClock,
    MasterSemaphore,
    SwapPoolMutex,
    AdlMutex,
    /// SYS18's private per-U-proc wakeup semaphore.
    Delay(Asid),
    /// General-purpose semaphores living in a U-proc's own Support
    /// Structure space (spec.md §3).
    User(Asid, u8),
    /// Bounds the active list from above; never allocated to a real wait.
    SentinelMax,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct AslHandle(u32);

const HEAD: AslHandle = AslHandle(0);
const TAIL: AslHandle = AslHandle(1);

struct Descriptor {
    key: SemKey,
    queue: PcbQueue,
    next: Option<AslHandle>,
    prev: Option<AslHandle>,
}

impl Descriptor {
    fn sentinel(key: SemKey) -> Self {
        Descriptor {
            key,
            queue: PcbQueue::new(),
            next: None,
            prev: None,
        }
    }
}

pub struct Asl {
    descriptors: ArrayVec<Descriptor, ASL_POOL_SIZE>,
    free_head: Option<AslHandle>,
}

impl Asl {
    pub fn new() -> Self {
        let mut descriptors = ArrayVec::new();
        descriptors.push(Descriptor::sentinel(SemKey::SentinelMin)); // handle 0
        descriptors.push(Descriptor::sentinel(SemKey::SentinelMax)); // handle 1
        descriptors[0].next = Some(TAIL);
        descriptors[1].prev = Some(HEAD);

        let mut free_head = None;
        for i in (2..ASL_POOL_SIZE).rev() {
            descriptors.push(Descriptor {
                key: SemKey::SentinelMin, // overwritten on allocation
                queue: PcbQueue::new(),
                next: free_head,
                prev: None,
            });
            free_head = Some(AslHandle(i as u32));
        }

        Asl {
            descriptors,
            free_head,
        }
    }

    fn alloc_descriptor(&mut self) -> Option<AslHandle> {
        let h = self.free_head?;
        self.free_head = self.descriptors[h.0 as usize].next;
        Some(h)
    }

    fn retire_descriptor(&mut self, h: AslHandle) {
        self.descriptors[h.0 as usize].next = self.free_head;
        self.descriptors[h.0 as usize].prev = None;
        self.free_head = Some(h);
    }

    /// Locate the descriptor with exactly `key`, along with its
    /// predecessor on the active list (needed to splice in a new node).
    fn find(&self, key: SemKey) -> (AslHandle, Option<AslHandle>) {
        let mut prev = HEAD;
        let mut cur = self.descriptors[HEAD.0 as usize]
            .next
            .expect("head always has a next");
        while self.descriptors[cur.0 as usize].key < key {
            prev = cur;
            cur = self.descriptors[cur.0 as usize]
                .next
                .expect("tail bounds every scan");
        }
        if self.descriptors[cur.0 as usize].key == key {
            (cur, None)
        } else {
            (cur, Some(prev))
        }
    }

    /// Append `p` to the queue of the descriptor keyed `key`, allocating
    /// one from the free pool if none exists yet.
    pub fn insert_blocked(
        &mut self,
        pool: &mut PcbPool,
        key: SemKey,
        p: PcbHandle,
    ) -> Result<(), KernelPanic> {
        let (found_or_next, insert_before_prev) = self.find(key);
        let target = match insert_before_prev {
            None => found_or_next,
            Some(prev) => {
                let h = self
                    .alloc_descriptor()
                    .ok_or(KernelPanic::AslPoolExhausted)?;
                let next = found_or_next;
                self.descriptors[h.0 as usize].key = key;
                self.descriptors[h.0 as usize].next = Some(next);
                self.descriptors[h.0 as usize].prev = Some(prev);
                self.descriptors[prev.0 as usize].next = Some(h);
                self.descriptors[next.0 as usize].prev = Some(h);
                h
            }
        };
        self.descriptors[target.0 as usize]
            .queue
            .insert(pool.raw_slots_mut(), p);
        pool.get_mut(p).sem_key = Some(key);
        Ok(())
    }

    /// Detach and return the head PCB blocked on `key`, retiring the
    /// descriptor if that empties its queue.
    pub fn remove_blocked(&mut self, pool: &mut PcbPool, key: SemKey) -> Option<PcbHandle> {
        let (h, not_found) = self.find(key);
        if not_found.is_some() {
            return None;
        }
        let p = self.descriptors[h.0 as usize]
            .queue
            .remove_head(pool.raw_slots_mut())?;
        pool.get_mut(p).sem_key = None;
        if self.descriptors[h.0 as usize].queue.is_empty() {
            self.unlink_and_retire(h);
        }
        Some(p)
    }

    /// Locate the descriptor by `p`'s stored key and detach `p`; retires
    /// the descriptor on empty (spec.md §4.2 `outBlocked`).
    pub fn out_blocked(&mut self, pool: &mut PcbPool, p: PcbHandle) -> Option<PcbHandle> {
        let key = pool.get(p).sem_key?;
        let (h, not_found) = self.find(key);
        if not_found.is_some() {
            return None;
        }
        let out = self.descriptors[h.0 as usize]
            .queue
            .out(pool.raw_slots_mut(), p)?;
        pool.get_mut(out).sem_key = None;
        if self.descriptors[h.0 as usize].queue.is_empty() {
            self.unlink_and_retire(h);
        }
        Some(out)
    }

    /// Non-destructive peek at the head of `key`'s queue.
    pub fn head_blocked(&self, pool: &PcbPool, key: SemKey) -> Option<PcbHandle> {
        let (h, not_found) = self.find(key);
        if not_found.is_some() {
            return None;
        }
        self.descriptors[h.0 as usize].queue.head(pool.raw_slots())
    }

    fn unlink_and_retire(&mut self, h: AslHandle) {
        let prev = self.descriptors[h.0 as usize].prev.expect("not a sentinel");
        let next = self.descriptors[h.0 as usize].next.expect("not a sentinel");
        self.descriptors[prev.0 as usize].next = Some(next);
        self.descriptors[next.0 as usize].prev = Some(prev);
        self.retire_descriptor(h);
    }

    /// The active list's keys in ascending order, excluding sentinels —
    /// used by tests to check spec.md §8's sortedness invariant and by
    /// nothing else.
    pub fn active_keys(&self) -> Vec<SemKey> {
        let mut out = Vec::new();
        let mut cur = self.descriptors[HEAD.0 as usize].next.unwrap();
        while cur != TAIL {
            out.push(self.descriptors[cur.0 as usize].key);
            cur = self.descriptors[cur.0 as usize].next.unwrap();
        }
        out
    }

    /// True iff every entry on the active list has a non-empty queue
    /// (spec.md §3 ASL invariant).
    pub fn every_active_entry_nonempty(&self) -> bool {
        let mut cur = self.descriptors[HEAD.0 as usize].next.unwrap();
        while cur != TAIL {
            if self.descriptors[cur.0 as usize].queue.is_empty() {
                return false;
            }
            cur = self.descriptors[cur.0 as usize].next.unwrap();
        }
        true
    }
}

impl Default for Asl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_round_trips() {
        let mut pool = PcbPool::new();
        let mut asl = Asl::new();
        let p = pool.alloc().unwrap();

        asl.insert_blocked(&mut pool, SemKey::MasterSemaphore, p)
            .unwrap();
        assert_eq!(asl.active_keys(), vec![SemKey::MasterSemaphore]);
        assert_eq!(pool.get(p).sem_key, Some(SemKey::MasterSemaphore));

        let out = asl.remove_blocked(&mut pool, SemKey::MasterSemaphore);
        assert_eq!(out, Some(p));
        assert!(asl.active_keys().is_empty(), "empty descriptor retires");
        assert_eq!(pool.get(p).sem_key, None);
    }

    #[test]
    fn sortedness_is_maintained_under_interleaved_inserts() {
        let mut pool = PcbPool::new();
        let mut asl = Asl::new();
        let keys = [
            SemKey::Device(DeviceId::new(0, 5), None),
            SemKey::Device(DeviceId::new(0, 1), None),
            SemKey::MasterSemaphore,
            SemKey::PseudoClock,
            SemKey::Device(DeviceId::new(0, 3), None),
        ];
        for &k in &keys {
            let p = pool.alloc().unwrap();
            asl.insert_blocked(&mut pool, k, p).unwrap();
        }
        let active = asl.active_keys();
        let mut sorted = active.clone();
        sorted.sort();
        assert_eq!(active, sorted);
        assert!(asl.every_active_entry_nonempty());
    }

    #[test]
    fn out_blocked_locates_by_stored_key() {
        let mut pool = PcbPool::new();
        let mut asl = Asl::new();
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        let key = SemKey::Device(DeviceId::new(1, 2), None);
        asl.insert_blocked(&mut pool, key, a).unwrap();
        asl.insert_blocked(&mut pool, key, b).unwrap();

        assert_eq!(asl.out_blocked(&mut pool, b), Some(b));
        assert_eq!(asl.head_blocked(&pool, key), Some(a));
        assert_eq!(asl.out_blocked(&mut pool, a), Some(a));
        assert!(asl.active_keys().is_empty());
    }

    #[test]
    fn terminal_channels_are_distinct_keys() {
        let mut pool = PcbPool::new();
        let mut asl = Asl::new();
        let id = DeviceId::new(crate::param::LINE_TERMINAL, 0);
        let tx = pool.alloc().unwrap();
        let rx = pool.alloc().unwrap();
        asl.insert_blocked(&mut pool, SemKey::Device(id, Some(TerminalChannel::Transmit)), tx)
            .unwrap();
        asl.insert_blocked(&mut pool, SemKey::Device(id, Some(TerminalChannel::Receive)), rx)
            .unwrap();

        assert_eq!(
            asl.head_blocked(&pool, SemKey::Device(id, Some(TerminalChannel::Transmit))),
            Some(tx)
        );
        assert_eq!(
            asl.head_blocked(&pool, SemKey::Device(id, Some(TerminalChannel::Receive))),
            Some(rx)
        );
    }

    #[test]
    fn pool_exhaustion_is_reported_not_panicked() {
        let mut pool = PcbPool::new();
        let mut asl = Asl::new();
        // ASL_POOL_SIZE - 2 usable descriptors, each needs a distinct key.
        // That count equals MAXPROC exactly, so the PCB pool is tapped out
        // too; reuse the first queued PCB (already spoken for) to trigger
        // the one-past-capacity insert rather than allocating a 21st.
        let mut first = None;
        for i in 0..(crate::param::ASL_POOL_SIZE - 2) {
            let line = i % crate::param::DEVINTNUM;
            let unit = (i / crate::param::DEVINTNUM) % crate::param::DEVPERLINE;
            let p = pool.alloc().unwrap();
            first.get_or_insert(p);
            asl.insert_blocked(&mut pool, SemKey::Device(DeviceId::new(line, unit), None), p)
                .unwrap();
        }
        let err = asl.insert_blocked(&mut pool, SemKey::PseudoClock, first.unwrap());
        assert_eq!(err, Err(KernelPanic::AslPoolExhausted));
    }
}
