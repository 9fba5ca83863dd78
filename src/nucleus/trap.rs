//! Passup-or-die: the Nucleus's policy for every exception that isn't a
//! TLB-refill miss or a SYS1-8 call (spec.md §4.6).
//!
//! A process with a Support Structure gets the exception passed up to the
//! matching Support-level context (`PassupContext::Tlb` for TLB-Modification
//! and TLB-Invalid, `PassupContext::General` for everything else, including
//! SYS9 and above); a process with none is simply terminated via SYS2,
//! matching the teacher's `trap.rs` "no handler installed -> kill" fallback
//! generalized from a single kernel panic to a per-process policy.

use super::kernel::Kernel;
use crate::machine::{Machine, ProcessorState};
use crate::support::PassupContext;

/// Every exception cause the Nucleus's trap dispatcher routes through
/// passup-or-die. TLB-refill is deliberately absent: it never reaches this
/// policy (spec.md §4.7 handles it directly).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapCause {
    TlbModification,
    TlbInvalid,
    ProgramTrap,
    Syscall9OrAbove,
}

impl TrapCause {
    fn context(self) -> PassupContext {
        match self {
            TrapCause::TlbModification | TrapCause::TlbInvalid => PassupContext::Tlb,
            TrapCause::ProgramTrap | TrapCause::Syscall9OrAbove => PassupContext::General,
        }
    }
}

impl<M: Machine> Kernel<M> {
    /// Route `cause`, which occurred in `state`, for the current process:
    /// pass it up to its Support Structure's matching context if it has
    /// one, or kill it via SYS2 if it doesn't.
    pub fn passup_or_die(&mut self, cause: TrapCause, state: ProcessorState) {
        let cur = self.current.expect("trap with no current process");
        let asid = self.pcbs.get(cur).support;

        let handler = asid.and_then(|asid| {
            self.support.get_mut(asid).map(|s| {
                let ctx = s.context_mut(cause.context());
                ctx.saved_state = state;
                (ctx.handler_sp, ctx.handler_pc)
            })
        });

        match handler {
            Some((sp, pc)) => {
                let mut resumed = state;
                resumed.gpr[28] = sp; // stack pointer, teacher's register convention
                resumed.pc = pc;
                self.machine.resume(resumed);
            }
            None => self.terminate_process(cur),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::sim::SimMachine;
    use crate::support::SupportStructure;
    use crate::types::Asid;

    #[test]
    fn process_without_support_structure_is_killed() {
        let mut kernel = Kernel::new(SimMachine::new());
        let p = kernel.pcbs_mut().alloc().unwrap();
        kernel.process_count = 1;
        kernel.current = Some(p);

        kernel.passup_or_die(TrapCause::ProgramTrap, ProcessorState::default());
        assert_eq!(kernel.process_count(), 0);
        assert!(kernel.current().is_none());
    }

    #[test]
    fn process_with_support_structure_resumes_at_the_handler() {
        let mut kernel = Kernel::new(SimMachine::new());
        let asid = Asid::new(1).unwrap();
        let mut support = SupportStructure::new(asid);
        support.general_context.handler_sp = 0xDEAD;
        support.general_context.handler_pc = 0xBEEF;
        kernel.support.install(support);

        let p = kernel.pcbs_mut().alloc().unwrap();
        kernel.pcbs_mut().get_mut(p).support = Some(asid);
        kernel.process_count = 1;
        kernel.current = Some(p);

        kernel.passup_or_die(TrapCause::ProgramTrap, ProcessorState::default());
        assert_eq!(kernel.process_count(), 1, "process is not killed");
        let resumed = kernel.machine.last_resume.unwrap();
        assert_eq!(resumed.pc, 0xBEEF);
        assert_eq!(resumed.gpr[28], 0xDEAD);
    }
}
