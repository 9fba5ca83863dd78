//! Support level: per-U-proc Support Structures, the TLB-refill and
//! page-fault exception handlers, the swap pool, the Active Delay List and
//! SYS9-18 (spec.md §4.7, §4.8, §5, §6).
//!
//! Grounded on the teacher's `trap.rs` (trap cause dispatch) and
//! `proc/process.rs` (per-process saved state), generalized to the two-level
//! Support Structure spec.md §3 describes: a U-proc's Nucleus PCB carries
//! only a handle into this table, never the structure itself.

mod delay;
mod dma;
mod pager;
mod syscall;
mod tlb;

pub use delay::{ActiveDelayList, DelayDaemon};
pub use pager::SwapPool;
pub use syscall::{dispatch_support_syscall, SupportResult, SupportSyscall};
pub use tlb::handle_tlb_refill;

use crate::machine::{Pte, ProcessorState};
use crate::param::{MAXUPROC, USERPGTBLSIZE};
use crate::types::Asid;

/// Handle into the `SupportTable`; a U-proc's Support Structure is identified
/// by its own ASID, so no separate arena/free-list is needed (spec.md §3: at
/// most one Support Structure per ASID, allocated at `CreateProcess` time).
pub type SupportHandle = Asid;

/// Which of the two exception contexts (TLB-refill fast path vs. every other
/// Program/TLB/SYS trap) a Support Structure's passup context belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassupContext {
    Tlb,
    General,
}

/// Saved exception state plus passup entry point for one context
/// (spec.md §3 Support Structure: two saved states, two contexts).
#[derive(Clone, Copy, Debug, Default)]
pub struct ExceptionContext {
    pub saved_state: ProcessorState,
    /// Stack pointer and PC the Support-level handler runs on, loaded by
    /// `LDST` when the Nucleus passes an exception up instead of killing
    /// the U-proc (spec.md §4.6).
    pub handler_sp: u32,
    pub handler_pc: u32,
}

/// One U-proc's Support Structure (spec.md §3): its ASID, its two exception
/// contexts, its private page table, and the device-mutex-adjacent state
/// (SYS18's delay, SYS11-13's current terminal line, ...) that the Support
/// syscall handlers need to thread through.
pub struct SupportStructure {
    pub asid: Asid,
    pub tlb_context: ExceptionContext,
    pub general_context: ExceptionContext,
    pub page_table: [Pte; USERPGTBLSIZE],
}

impl SupportStructure {
    pub fn new(asid: Asid) -> Self {
        let mut page_table = [Pte::default(); USERPGTBLSIZE];
        for (vpn, pte) in page_table.iter_mut().enumerate() {
            pte.vpn = vpn as u8;
            pte.asid = asid.get();
        }
        SupportStructure {
            asid,
            tlb_context: ExceptionContext::default(),
            general_context: ExceptionContext::default(),
            page_table,
        }
    }

    pub fn context(&self, which: PassupContext) -> &ExceptionContext {
        match which {
            PassupContext::Tlb => &self.tlb_context,
            PassupContext::General => &self.general_context,
        }
    }

    pub fn context_mut(&mut self, which: PassupContext) -> &mut ExceptionContext {
        match which {
            PassupContext::Tlb => &mut self.tlb_context,
            PassupContext::General => &mut self.general_context,
        }
    }
}

/// Fixed-size table of Support Structures, one slot per ASID
/// (spec.md §3: `MAXUPROC` possible U-procs, each with at most one).
#[derive(Default)]
pub struct SupportTable {
    slots: [Option<SupportStructure>; MAXUPROC],
}

impl SupportTable {
    pub fn new() -> Self {
        SupportTable {
            slots: Default::default(),
        }
    }

    pub fn install(&mut self, s: SupportStructure) {
        let slot = s.asid.slot();
        debug_assert!(self.slots[slot].is_none(), "ASID already has a Support Structure");
        self.slots[slot] = Some(s);
    }

    pub fn remove(&mut self, asid: Asid) -> Option<SupportStructure> {
        self.slots[asid.slot()].take()
    }

    pub fn get(&self, asid: Asid) -> Option<&SupportStructure> {
        self.slots[asid.slot()].as_ref()
    }

    pub fn get_mut(&mut self, asid: Asid) -> Option<&mut SupportStructure> {
        self.slots[asid.slot()].as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_table_entries_are_preidentified_by_vpn_and_asid() {
        let asid = Asid::new(1).unwrap();
        let s = SupportStructure::new(asid);
        for (vpn, pte) in s.page_table.iter().enumerate() {
            assert_eq!(pte.vpn, vpn as u8);
            assert_eq!(pte.asid, 1);
            assert!(!pte.valid());
        }
    }

    #[test]
    fn install_then_remove_round_trips() {
        let asid = Asid::new(2).unwrap();
        let mut table = SupportTable::new();
        table.install(SupportStructure::new(asid));
        assert!(table.get(asid).is_some());
        let removed = table.remove(asid);
        assert!(removed.is_some());
        assert!(table.get(asid).is_none());
    }
}
