//! TLB-refill exception fast path (spec.md §4.7).
//!
//! This is the one exception the Nucleus never passes up through the
//! Support Structure: every process, U-proc or not, takes a TLB-refill
//! trap straight to this handler, which either fills the TLB from the
//! faulting process's own page table or (for a U-proc with an invalid
//! entry) defers to the page-fault slow path in `pager.rs`.

use crate::machine::{pack_entry_hi, unpack_entry_hi, Machine, Pte, PteFlags, ProcessorState};
use crate::support::SupportStructure;

/// Outcome of a refill attempt: either the TLB was loaded and the faulting
/// instruction can simply be retried, or the entry was invalid and the
/// caller (the Nucleus's trap dispatcher) must route this to the
/// page-fault slow path instead.
pub enum RefillOutcome {
    Resumed,
    PageFault { vpn: u8 },
}

/// Handle a TLB-refill exception for `support`'s process.
///
/// Looks up the faulting VPN in the process's own page table. A valid
/// entry is written straight into the TLB and the faulting instruction is
/// retried via `resume`; an invalid entry is reported to the caller as a
/// page fault rather than handled here, since servicing it needs the swap
/// pool and (spec.md §4.7) must run with the swap pool mutex held.
pub fn handle_tlb_refill(
    support: &SupportStructure,
    machine: &mut impl Machine,
    state: &ProcessorState,
) -> RefillOutcome {
    let (vpn, _asid) = unpack_entry_hi(state.entry_hi);
    let pte = support.page_table[vpn as usize];
    if !pte.valid() {
        return RefillOutcome::PageFault { vpn };
    }
    machine.tlb_write_random(pte);
    machine.resume(*state);
    RefillOutcome::Resumed
}

/// Build the PTE that should be installed in the TLB once a page fault has
/// been serviced and the requested frame is resident.
pub fn resident_pte(vpn: u8, asid: u8, frame: u32, dirty: bool) -> Pte {
    let mut flags = PteFlags::VALID;
    flags.set(PteFlags::DIRTY, dirty);
    Pte {
        vpn,
        asid,
        frame: Some(frame),
        flags,
    }
}

/// EntryHi a faulting access would have carried, for tests that drive the
/// handler directly instead of through a real exception.
pub fn entry_hi_for(vpn: u8, asid: u8) -> u32 {
    pack_entry_hi(vpn, asid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::sim::SimMachine;
    use crate::types::Asid;

    #[test]
    fn valid_entry_loads_tlb_and_resumes() {
        let asid = Asid::new(1).unwrap();
        let mut support = SupportStructure::new(asid);
        support.page_table[4] = resident_pte(4, asid.get(), 7, false);
        let mut machine = SimMachine::new();
        let state = ProcessorState {
            entry_hi: entry_hi_for(4, asid.get()),
            ..Default::default()
        };

        let outcome = handle_tlb_refill(&support, &mut machine, &state);
        assert!(matches!(outcome, RefillOutcome::Resumed));
        assert_eq!(machine.resume_count, 1);
        assert_eq!(machine.tlb_probe(asid.get(), 4), Some(0));
    }

    #[test]
    fn invalid_entry_reports_page_fault_without_resuming() {
        let asid = Asid::new(1).unwrap();
        let support = SupportStructure::new(asid);
        let mut machine = SimMachine::new();
        let state = ProcessorState {
            entry_hi: entry_hi_for(9, asid.get()),
            ..Default::default()
        };

        let outcome = handle_tlb_refill(&support, &mut machine, &state);
        assert!(matches!(outcome, RefillOutcome::PageFault { vpn: 9 }));
        assert_eq!(machine.resume_count, 0);
    }
}
