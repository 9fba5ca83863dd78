//! Ready-queue admission helpers shared by process creation, `V`, and
//! interrupt return-to-ready paths (spec.md §4.3).

use super::kernel::Kernel;
use crate::machine::Machine;
use crate::pcb::{PcbHandle, ProcState};

impl<M: Machine> Kernel<M> {
    /// Mark `p` ready and append it to the ready queue. Used wherever a
    /// PCB becomes runnable outside of `V` waking an ASL wait (process
    /// creation, a device interrupt with no Support passup, ...).
    pub fn make_ready(&mut self, p: PcbHandle) {
        self.pcbs.get_mut(p).state = ProcState::Ready;
        self.ready.insert(self.pcbs.raw_slots_mut(), p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::sim::SimMachine;

    #[test]
    fn scheduling_with_nothing_ready_and_no_processes_is_a_clean_halt() {
        let mut kernel = Kernel::new(SimMachine::new());
        assert!(kernel.schedule().is_ok());
        assert!(kernel.current().is_none());
    }

    #[test]
    fn scheduling_ready_process_dispatches_it() {
        let mut kernel = Kernel::new(SimMachine::new());
        let p = kernel.pcbs_mut().alloc().unwrap();
        kernel.process_count = 1;
        kernel.make_ready(p);
        assert!(kernel.schedule().is_ok());
        assert_eq!(kernel.current(), Some(p));
        assert_eq!(kernel.machine.resume_count, 1);
    }

    #[test]
    fn live_processes_with_none_soft_blocked_and_empty_ready_is_deadlock() {
        let mut kernel = Kernel::new(SimMachine::new());
        kernel.process_count = 1;
        let err = kernel.schedule();
        assert!(err.is_err());
    }
}
