//! Swap pool: the fixed set of physical frames backing every U-proc's
//! paged memory, and the page-fault slow path that services a TLB-refill
//! miss (spec.md §4.7, §6).
//!
//! The swap pool mutex itself is a Nucleus-level semaphore (`SemKey::
//! SwapPoolMutex`) acquired and released by the caller in `nucleus/kernel.rs`
//! around `service_page_fault`; everything in this module assumes the mutex
//! is already held, matching spec.md §4.7's requirement that frame
//! replacement run with interrupts disabled only for the brief
//! invalidate-owner's-TLB-entry step, not for the whole fault.

use crate::machine::{unpack_entry_hi, Machine, ProcessorState, StorageKind};
use crate::param::{PAGESIZE, SWAPPOOLSIZE};
use crate::support::tlb::resident_pte;
use crate::support::SupportTable;
use crate::types::Asid;

#[derive(Clone, Copy)]
struct Frame {
    owner: Option<(Asid, u8)>, // (asid, vpn) currently resident
    dirty: bool,
}

impl Default for Frame {
    fn default() -> Self {
        Frame {
            owner: None,
            dirty: false,
        }
    }
}

/// Fixed-capacity set of physical frames plus the round-robin ("clock")
/// hand used to pick a replacement victim when every frame is occupied.
/// Grounded on spec.md §6's swap pool table: frame -> (ASID, VPN, dirty).
pub struct SwapPool {
    frames: [Frame; SWAPPOOLSIZE],
    contents: Vec<[u8; PAGESIZE as usize]>,
    clock_hand: usize,
}

impl SwapPool {
    pub fn new() -> Self {
        SwapPool {
            frames: [Frame::default(); SWAPPOOLSIZE],
            contents: vec![[0u8; PAGESIZE as usize]; SWAPPOOLSIZE],
            clock_hand: 0,
        }
    }

    /// Pick the next victim frame and advance the hand past it. A free
    /// frame is always preferred over evicting a resident one.
    fn select_victim(&mut self) -> usize {
        if let Some(free) = self.frames.iter().position(|f| f.owner.is_none()) {
            return free;
        }
        let victim = self.clock_hand;
        self.clock_hand = (self.clock_hand + 1) % SWAPPOOLSIZE;
        victim
    }

    /// Service a TLB-refill miss for `(asid, vpn)`: evict a victim if
    /// necessary (writing it back to its own flash block if dirty and
    /// invalidating the owner's PTE/TLB entry), read the demanded page off
    /// `asid`'s flash backing store, and install the new mapping in both
    /// the page table and the TLB. Returns the frame index now resident.
    ///
    /// Caller holds the swap pool mutex and has already confirmed the
    /// faulting PTE is invalid.
    pub fn service_fault(
        &mut self,
        support_table: &mut SupportTable,
        machine: &mut impl Machine,
        asid: Asid,
        vpn: u8,
    ) -> usize {
        let frame_idx = self.select_victim();

        if let Some((victim_asid, victim_vpn)) = self.frames[frame_idx].owner {
            machine.set_interrupts(false);
            if let Some(victim_support) = support_table.get_mut(victim_asid) {
                let pte = &mut victim_support.page_table[victim_vpn as usize];
                pte.set_valid(false);
                if let Some(index) = machine.tlb_probe(victim_asid.get(), victim_vpn) {
                    machine.tlb_write_index(index, *pte);
                }
            }
            machine.set_interrupts(true);

            if self.frames[frame_idx].dirty {
                machine.storage_write(
                    StorageKind::Flash,
                    victim_asid.get() as usize,
                    victim_vpn as u32,
                    &self.contents[frame_idx],
                );
            }
        }

        machine.storage_read(
            StorageKind::Flash,
            asid.get() as usize,
            vpn as u32,
            &mut self.contents[frame_idx],
        );

        self.frames[frame_idx] = Frame {
            owner: Some((asid, vpn)),
            dirty: false,
        };

        if let Some(support) = support_table.get_mut(asid) {
            support.page_table[vpn as usize] = resident_pte(vpn, asid.get(), frame_idx as u32, false);
        }
        machine.tlb_write_random(resident_pte(vpn, asid.get(), frame_idx as u32, false));

        frame_idx
    }

    /// Mark the frame backing `(asid, vpn)` dirty, if resident. Called by
    /// the Nucleus's TLB-Modification handler (spec.md §4.6) when a write
    /// faults against a read-only-but-present mapping.
    pub fn mark_dirty(&mut self, asid: Asid, vpn: u8) {
        if let Some(f) = self
            .frames
            .iter_mut()
            .find(|f| f.owner == Some((asid, vpn)))
        {
            f.dirty = true;
        }
    }

    /// Free every frame owned by `asid` without writing it back. Called by
    /// SYS9 termination (spec.md §4.8): the process is gone, so its pages
    /// need never be flushed, and the frames become free for the next
    /// fault to reuse ahead of evicting a resident one.
    pub fn release_owned_by(&mut self, asid: Asid) {
        for frame in self.frames.iter_mut() {
            if matches!(frame.owner, Some((owner, _)) if owner == asid) {
                *frame = Frame::default();
            }
        }
    }
}

impl Default for SwapPool {
    fn default() -> Self {
        Self::new()
    }
}

/// VPN a faulting processor state names, for callers that only have the
/// saved state and not a pre-extracted VPN.
pub fn faulting_vpn(state: &ProcessorState) -> u8 {
    unpack_entry_hi(state.entry_hi).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::sim::SimMachine;
    use crate::support::SupportStructure;

    #[test]
    fn fault_reads_demanded_page_and_installs_mapping() {
        let mut pool = SwapPool::new();
        let mut table = SupportTable::new();
        let asid = Asid::new(1).unwrap();
        table.install(SupportStructure::new(asid));
        let mut machine = SimMachine::new();
        let mut seeded = [0u8; PAGESIZE as usize];
        seeded[0] = 42;
        machine.seed_storage(crate::machine::StorageKind::Flash, asid.get() as usize, 5, seeded);

        let frame = pool.service_fault(&mut table, &mut machine, asid, 5);
        assert_eq!(pool.contents[frame][0], 42);
        assert!(table.get(asid).unwrap().page_table[5].valid());
        assert_eq!(table.get(asid).unwrap().page_table[5].frame, Some(frame as u32));
    }

    #[test]
    fn eviction_writes_back_a_dirty_victim_to_its_owners_flash() {
        let mut pool = SwapPool::new();
        let mut table = SupportTable::new();
        let a = Asid::new(1).unwrap();
        let b = Asid::new(2).unwrap();
        table.install(SupportStructure::new(a));
        table.install(SupportStructure::new(b));
        let mut machine = SimMachine::new();

        // Fill every frame with process a's pages, then dirty the last one.
        for vpn in 0..SWAPPOOLSIZE as u8 {
            pool.service_fault(&mut table, &mut machine, a, vpn);
        }
        pool.mark_dirty(a, (SWAPPOOLSIZE - 1) as u8);
        pool.contents[pool.frames.len() - 1][0] = 0x55;

        // One more fault for a different process evicts the clock hand's
        // victim (frame 0, since the hand starts there once all frames are
        // occupied).
        pool.service_fault(&mut table, &mut machine, b, 0);

        assert!(!table.get(a).unwrap().page_table[0].valid());
    }

    #[test]
    fn release_owned_by_frees_only_the_matching_asid() {
        let mut pool = SwapPool::new();
        let mut table = SupportTable::new();
        let a = Asid::new(1).unwrap();
        let b = Asid::new(2).unwrap();
        table.install(SupportStructure::new(a));
        table.install(SupportStructure::new(b));
        let mut machine = SimMachine::new();

        let frame_a = pool.service_fault(&mut table, &mut machine, a, 0);
        let frame_b = pool.service_fault(&mut table, &mut machine, b, 0);

        pool.release_owned_by(a);
        assert!(pool.frames[frame_a].owner.is_none());
        assert_eq!(pool.frames[frame_b].owner, Some((b, 0)));
    }
}
