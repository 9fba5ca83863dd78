use super::pool::{PcbHandle, PcbPool};

/// N-ary process tree primitives (spec.md §4.1). Children of a PCB form
/// their own circular doubly linked ring, keyed by the parent's `child`
/// pointer — the same trick spec.md applies to the ready/ASL queues, kept
/// as a separate ring here because a PCB's tree membership and its
/// queue membership are independent (a blocked child is still a child).
pub trait TreeOps {
    fn insert_child(&mut self, parent: PcbHandle, p: PcbHandle);
    fn remove_child(&mut self, parent: PcbHandle) -> Option<PcbHandle>;
    fn out_of_tree(&mut self, p: PcbHandle);
}

impl TreeOps for PcbPool {
    /// Append `p` to `parent`'s sibling ring and set `p.parent`.
    fn insert_child(&mut self, parent: PcbHandle, p: PcbHandle) {
        debug_assert!(self.get(p).parent.is_none());
        self.get_mut(p).parent = Some(parent);

        match self.get(parent).child {
            None => {
                self.get_mut(p).sib_next = Some(p);
                self.get_mut(p).sib_prev = Some(p);
                self.get_mut(parent).child = Some(p);
            }
            Some(anchor) => {
                let last = self.get(anchor).sib_prev.expect("ring has a prev");
                self.get_mut(last).sib_next = Some(p);
                self.get_mut(p).sib_prev = Some(last);
                self.get_mut(p).sib_next = Some(anchor);
                self.get_mut(anchor).sib_prev = Some(p);
            }
        }
    }

    /// Detach and return `parent`'s first child, if any.
    fn remove_child(&mut self, parent: PcbHandle) -> Option<PcbHandle> {
        let child = self.get(parent).child?;
        self.out_of_tree(child);
        Some(child)
    }

    /// Detach `p` from its parent's sibling ring; O(1) because the ring
    /// is doubly linked. A no-op on a root (no parent).
    fn out_of_tree(&mut self, p: PcbHandle) {
        let Some(parent) = self.get(p).parent else {
            return;
        };
        let next = self.get(p).sib_next.expect("child has sib_next");
        let prev = self.get(p).sib_prev.expect("child has sib_prev");

        if next == p {
            self.get_mut(parent).child = None;
        } else {
            self.get_mut(prev).sib_next = Some(next);
            self.get_mut(next).sib_prev = Some(prev);
            if self.get(parent).child == Some(p) {
                self.get_mut(parent).child = Some(next);
            }
        }

        self.get_mut(p).sib_next = None;
        self.get_mut(p).sib_prev = None;
        self.get_mut(p).parent = None;
    }
}

/// Every direct child of `parent`, for tree walks (SYS2's recursive
/// descendant kill). Collected eagerly since the walk mutates the tree
/// as it goes.
pub fn children(pool: &PcbPool, parent: PcbHandle) -> Vec<PcbHandle> {
    let Some(anchor) = pool.get(parent).child else {
        return Vec::new();
    };
    let mut out = vec![anchor];
    let mut cur = pool.get(anchor).sib_next.expect("ring has sib_next");
    while cur != anchor {
        out.push(cur);
        cur = pool.get(cur).sib_next.expect("ring has sib_next");
    }
    out
}
