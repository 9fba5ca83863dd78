use crate::machine::ProcessorState;
use crate::param::MAXPROC;
use crate::support::SupportHandle;
use arrayvec::ArrayVec;
use std::num::NonZeroU32;

/// A handle into the PCB arena. 1-based so `None` (no PCB) has a niche
/// and the type is the same size as a raw index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PcbHandle(NonZeroU32);

impl PcbHandle {
    fn from_index(i: usize) -> Self {
        PcbHandle(NonZeroU32::new(i as u32 + 1).expect("index + 1 is never zero"))
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Slice index for a handle; `queue.rs` uses this so it can work directly
/// over `&mut [Pcb]` instead of routing every access through `PcbPool`.
pub(super) fn handle_index(h: PcbHandle) -> usize {
    h.index()
}

/// Informational state, derived from and kept consistent with queue
/// membership; nothing in `pcb`/`asl` trusts this field for correctness,
/// but the Nucleus uses it for logging and `procdump`-style debugging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProcState {
    #[default]
    Free,
    Ready,
    Running,
    Blocked,
}

/// One process. Fields are grouped the way spec.md §3 groups them.
pub struct Pcb {
    // -- process tree (parent/child/sibling ring) --
    pub(super) parent: Option<PcbHandle>,
    pub(super) child: Option<PcbHandle>,
    pub(super) sib_next: Option<PcbHandle>,
    pub(super) sib_prev: Option<PcbHandle>,

    // -- queue links (ready queue, ASL wait queue, or free list; at most
    // one at a time) --
    pub(super) q_next: Option<PcbHandle>,
    pub(super) q_prev: Option<PcbHandle>,

    pub state: ProcState,
    pub saved_state: ProcessorState,
    pub cpu_time_us: u64,
    /// Present iff this PCB is on an ASL wait queue; the key of that
    /// descriptor (spec.md §3 PCB invariants).
    pub sem_key: Option<crate::asl::SemKey>,
    /// Absent for kernel-only processes (the delay daemon has none).
    pub support: Option<SupportHandle>,
}

impl Pcb {
    fn new() -> Self {
        Pcb {
            parent: None,
            child: None,
            sib_next: None,
            sib_prev: None,
            q_next: None,
            q_prev: None,
            state: ProcState::Free,
            saved_state: ProcessorState::default(),
            cpu_time_us: 0,
            sem_key: None,
            support: None,
        }
    }

    /// Membership proof: a PCB is on no queue iff both queue links are
    /// absent (spec.md §9, Open Questions: "Specify membership proof =
    /// link-nullness").
    pub fn in_queue(&self) -> bool {
        self.q_next.is_some() || self.q_prev.is_some()
    }

    fn reset(&mut self) {
        *self = Pcb::new();
    }
}

/// Fixed-capacity arena of `MAXPROC` PCBs plus the free list threaded
/// through it. Grounded on the teacher's `queue.rs` (fixed array,
/// embedded free/used bookkeeping) generalized from `Queue<T>` to a
/// pool of linked nodes, per Design Notes §9.
pub struct PcbPool {
    slots: ArrayVec<Pcb, MAXPROC>,
    pub(super) free: super::queue::PcbQueue,
}

impl PcbPool {
    pub fn new() -> Self {
        let slots = (0..MAXPROC).map(|_| Pcb::new()).collect::<ArrayVec<Pcb, MAXPROC>>();
        let mut pool = PcbPool {
            slots,
            free: super::queue::PcbQueue::new(),
        };
        for i in 0..MAXPROC {
            let h = PcbHandle::from_index(i);
            pool.free.insert(&mut pool.slots, h);
        }
        pool
    }

    pub fn get(&self, h: PcbHandle) -> &Pcb {
        &self.slots[h.index()]
    }

    pub fn get_mut(&mut self, h: PcbHandle) -> &mut Pcb {
        &mut self.slots[h.index()]
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Direct slice access for the queue/tree primitives, which operate
    /// on `&mut [Pcb]` rather than going back through `PcbPool` so a
    /// `PcbQueue`/tree-walk can be called while `self.free` or another
    /// field is already borrowed.
    pub(crate) fn raw_slots_mut(&mut self) -> &mut [Pcb] {
        &mut self.slots
    }

    pub(crate) fn raw_slots(&self) -> &[Pcb] {
        &self.slots
    }

    /// Iterate over every live (non-free) PCB, for tree-walk operations
    /// like SYS2's recursive descendant kill.
    pub fn handles(&self) -> impl Iterator<Item = PcbHandle> + '_ {
        (0..self.slots.len()).map(PcbHandle::from_index)
    }

    pub fn live_count(&self) -> usize {
        self.handles()
            .filter(|&h| !matches!(self.get(h).state, ProcState::Free))
            .count()
    }

    /// Returns a zeroed PCB handle, or `None` when the pool is exhausted
    /// (spec.md §4.1 `alloc`).
    pub fn alloc(&mut self) -> Option<PcbHandle> {
        let h = self.free.remove_head(&mut self.slots)?;
        self.get_mut(h).reset();
        self.get_mut(h).state = ProcState::Ready;
        Some(h)
    }

    /// Returns `p` to the free list. Callers must not double-free and
    /// must have already detached `p` from every queue and from the
    /// process tree (spec.md §4.1).
    pub fn free(&mut self, p: PcbHandle) {
        debug_assert!(!self.get(p).in_queue(), "freeing a still-queued PCB");
        debug_assert!(self.get(p).parent.is_none(), "freeing a PCB with a parent");
        debug_assert!(self.get(p).child.is_none(), "freeing a PCB with children");
        self.get_mut(p).reset();
        self.free.insert(&mut self.slots, p);
    }
}

impl Default for PcbPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_conservation() {
        let mut pool = PcbPool::new();
        let mut live = Vec::new();
        for _ in 0..MAXPROC {
            live.push(pool.alloc().unwrap());
        }
        assert!(pool.alloc().is_none(), "pool should be exhausted");
        assert_eq!(live.len() + 0, MAXPROC);

        for h in live.drain(..) {
            pool.free(h);
        }
        // Full round trip: every slot must be allocable again.
        for _ in 0..MAXPROC {
            assert!(pool.alloc().is_some());
        }
    }

    #[test]
    fn fresh_pcb_is_not_in_any_queue() {
        let mut pool = PcbPool::new();
        let h = pool.alloc().unwrap();
        assert!(!pool.get(h).in_queue());
    }
}
