use super::pool::{Pcb, PcbHandle};

/// A circular doubly linked queue of PCBs, addressed by a tail pointer so
/// that head-read, tail-insert and mid-delete are all O(1) (spec.md
/// §4.1). The same `Pcb::q_next`/`q_prev` fields back the ready queue,
/// every ASL wait queue and the PCB free list — a PCB is in at most one
/// of those at a time, which is exactly the invariant spec.md §3
/// requires.
#[derive(Default)]
pub struct PcbQueue {
    tail: Option<PcbHandle>,
}

impl PcbQueue {
    pub const fn new() -> Self {
        PcbQueue { tail: None }
    }

    pub fn is_empty(&self) -> bool {
        self.tail.is_none()
    }

    pub fn tail(&self) -> Option<PcbHandle> {
        self.tail
    }

    /// Non-destructive peek at the head.
    pub fn head(&self, slots: &[Pcb]) -> Option<PcbHandle> {
        let t = self.tail?;
        slots[index(t)].q_next
    }

    /// Append `p` after the current tail and advance it.
    pub fn insert(&mut self, slots: &mut [Pcb], p: PcbHandle) {
        debug_assert!(!slots[index(p)].in_queue(), "p already in a queue");
        match self.tail {
            None => {
                slots[index(p)].q_next = Some(p);
                slots[index(p)].q_prev = Some(p);
            }
            Some(t) => {
                let head = slots[index(t)].q_next.expect("non-empty queue has a head");
                slots[index(t)].q_next = Some(p);
                slots[index(p)].q_prev = Some(t);
                slots[index(p)].q_next = Some(head);
                slots[index(head)].q_prev = Some(p);
            }
        }
        self.tail = Some(p);
    }

    /// Detach and return the node after the tail (the head), or `None`
    /// if the queue is empty.
    pub fn remove_head(&mut self, slots: &mut [Pcb]) -> Option<PcbHandle> {
        let head = self.head(slots)?;
        self.detach(slots, head);
        Some(head)
    }

    /// Detach an arbitrary member of *this* queue. Returns `None` without
    /// touching anything if `p` is not currently in any queue, per
    /// spec.md §4.1's `out` contract and §9's link-nullness membership
    /// proof.
    pub fn out(&mut self, slots: &mut [Pcb], p: PcbHandle) -> Option<PcbHandle> {
        if !slots[index(p)].in_queue() {
            return None;
        }
        self.detach(slots, p);
        Some(p)
    }

    fn detach(&mut self, slots: &mut [Pcb], p: PcbHandle) {
        let prev = slots[index(p)].q_prev.expect("queued node has q_prev");
        let next = slots[index(p)].q_next.expect("queued node has q_next");

        if prev == p {
            // p was the only element.
            self.tail = None;
        } else {
            slots[index(prev)].q_next = Some(next);
            slots[index(next)].q_prev = Some(prev);
            if self.tail == Some(p) {
                self.tail = Some(prev);
            }
        }
        slots[index(p)].q_next = None;
        slots[index(p)].q_prev = None;
    }
}

fn index(h: PcbHandle) -> usize {
    // PcbHandle::index is private to pool.rs; PCBs are always addressed
    // by handle everywhere else, this helper exists only so the queue
    // can use slices directly instead of going through PcbPool.
    super::pool::handle_index(h)
}
