//! Page-fault slow path: what the Nucleus does with a TLB-refill miss once
//! `support::handle_tlb_refill` has reported the entry invalid (spec.md
//! §4.7).
//!
//! Servicing a fault touches the swap pool, which is shared by every
//! U-proc, so the whole thing runs under `SemKey::SwapPoolMutex` exactly
//! like any other mutual-exclusion semaphore: `p()` first, and if that
//! blocks the caller, the fault simply gets serviced later when the mutex
//! is free and the faulting instruction is retried from its saved PC.

use super::kernel::Kernel;
use crate::asl::SemKey;
use crate::error::KernelPanic;
use crate::machine::{unpack_entry_hi, Machine, ProcessorState};

impl<M: Machine> Kernel<M> {
    /// Service a page fault for the current process against `state`, the
    /// processor state at the moment of the TLB-refill miss. Blocks on the
    /// swap pool mutex if another process is mid-fault; otherwise installs
    /// the demanded page and resumes `state` unchanged (the retried
    /// TLB-refill now hits).
    pub fn handle_page_fault(&mut self, state: ProcessorState) -> Result<(), KernelPanic> {
        self.charge_current();
        if self.p(SemKey::SwapPoolMutex)? {
            return self.schedule();
        }

        let cur = self.current.expect("page fault with no current process");
        let asid = self
            .pcbs
            .get(cur)
            .support
            .expect("page fault on a process with no Support Structure");
        let (vpn, _) = unpack_entry_hi(state.entry_hi);

        self.swap_pool
            .service_fault(&mut self.support, &mut self.machine, asid, vpn);
        self.v(SemKey::SwapPoolMutex);

        self.current_started_us = self.machine.now_us();
        self.machine.resume(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::sim::SimMachine;
    use crate::support::SupportStructure;
    use crate::types::Asid;

    fn state_for(vpn: u8, asid: u8) -> ProcessorState {
        ProcessorState {
            entry_hi: crate::machine::pack_entry_hi(vpn, asid),
            ..Default::default()
        }
    }

    #[test]
    fn uncontended_fault_installs_the_mapping_and_resumes() {
        let mut kernel = Kernel::new(SimMachine::new());
        let asid = Asid::new(1).unwrap();
        kernel.support.install(SupportStructure::new(asid));
        let p = kernel.pcbs_mut().alloc().unwrap();
        kernel.pcbs_mut().get_mut(p).support = Some(asid);
        kernel.process_count = 1;
        kernel.current = Some(p);

        kernel.handle_page_fault(state_for(3, asid.get())).unwrap();

        assert!(kernel.support.get(asid).unwrap().page_table[3].valid());
        assert_eq!(kernel.machine.resume_count, 1);
        assert_eq!(kernel.current(), Some(p));
    }

    #[test]
    fn a_second_fault_blocks_on_the_swap_pool_mutex() {
        let mut kernel = Kernel::new(SimMachine::new());
        let asid = Asid::new(1).unwrap();
        kernel.support.install(SupportStructure::new(asid));
        let holder = kernel.pcbs_mut().alloc().unwrap();
        kernel.process_count = 1;
        kernel.current = Some(holder);
        assert!(!kernel.p(SemKey::SwapPoolMutex).unwrap());

        let p = kernel.pcbs_mut().alloc().unwrap();
        kernel.pcbs_mut().get_mut(p).support = Some(asid);
        kernel.process_count = 2;
        kernel.current = Some(p);

        kernel.handle_page_fault(state_for(3, asid.get())).unwrap();

        assert!(kernel.current().is_none(), "faulting process blocked");
        assert!(!kernel.support.get(asid).unwrap().page_table[3].valid());
    }
}
