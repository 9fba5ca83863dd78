//! SYS1-8, the Nucleus-level syscalls (spec.md §4.4).

use super::kernel::Kernel;
use crate::asl::SemKey;
use crate::error::KernelPanic;
use crate::machine::{Machine, ProcessorState};
use crate::pcb::{children, PcbHandle, TreeOps};
use crate::support::SupportHandle;
use log::info;

/// A decoded SYS1-8 request. SYS9-18 are never seen here: the Nucleus's
/// trap dispatch routes any syscall number 9 or above straight to the
/// calling process's Support Structure (spec.md §4.6), this module never
/// sees them.
pub enum NucleusSyscall {
    CreateProcess {
        initial_state: ProcessorState,
        support: Option<SupportHandle>,
    },
    TerminateProcess,
    Passeren {
        key: SemKey,
    },
    Verhogen {
        key: SemKey,
    },
    WaitIo {
        key: SemKey,
    },
    GetCpuTime,
    WaitClock,
    GetSupportPtr,
}

/// Outcome handed back to the calling U-proc's `v0`, where applicable.
/// `CreateProcess` and the blocking calls don't all produce one the same
/// way, so this stays a loose enum rather than a single integer.
pub enum SyscallResult {
    NewPcb(Option<PcbHandle>),
    CpuTimeUs(u64),
    SupportHandle(Option<SupportHandle>),
    Blocked,
    None,
}

impl<M: Machine> Kernel<M> {
    /// Dispatch one SYS1-8 request on behalf of the current process.
    pub fn handle_syscall(&mut self, req: NucleusSyscall) -> Result<SyscallResult, KernelPanic> {
        match req {
            NucleusSyscall::CreateProcess {
                initial_state,
                support,
            } => Ok(SyscallResult::NewPcb(
                self.create_process(initial_state, support),
            )),
            NucleusSyscall::TerminateProcess => {
                let cur = self.current.expect("SYS2 with no current process");
                self.terminate_process(cur);
                Ok(SyscallResult::None)
            }
            NucleusSyscall::Passeren { key } => {
                self.charge_current();
                if self.p(key)? {
                    self.schedule()?;
                    Ok(SyscallResult::Blocked)
                } else {
                    Ok(SyscallResult::None)
                }
            }
            NucleusSyscall::Verhogen { key } => {
                self.v(key);
                Ok(SyscallResult::None)
            }
            NucleusSyscall::WaitIo { key } => {
                self.charge_current();
                self.soft_block_count += 1;
                let blocked = self.p(key)?;
                debug_assert!(blocked, "WaitIO always blocks: interrupt semaphores start at 0");
                self.schedule()?;
                Ok(SyscallResult::Blocked)
            }
            NucleusSyscall::GetCpuTime => {
                let cur = self.current.expect("SYS6 with no current process");
                let elapsed = self.machine.now_us().saturating_sub(self.current_started_us);
                Ok(SyscallResult::CpuTimeUs(
                    self.pcbs.get(cur).cpu_time_us + elapsed,
                ))
            }
            NucleusSyscall::WaitClock => {
                self.charge_current();
                self.soft_block_count += 1;
                let blocked = self.p(SemKey::PseudoClock)?;
                debug_assert!(blocked);
                self.schedule()?;
                Ok(SyscallResult::Blocked)
            }
            NucleusSyscall::GetSupportPtr => {
                let cur = self.current.expect("SYS8 with no current process");
                Ok(SyscallResult::SupportHandle(self.pcbs.get(cur).support))
            }
        }
    }

    /// SYS1: allocate a child PCB under the current process, seed its
    /// saved state, and make it ready. Returns `None` if the PCB pool is
    /// exhausted (the caller sees this as a normal failure return, not a
    /// `KernelPanic` — only exhaustion *outside* SYS1 is fatal, per
    /// spec.md §4.4).
    fn create_process(
        &mut self,
        initial_state: ProcessorState,
        support: Option<SupportHandle>,
    ) -> Option<PcbHandle> {
        let child = self.pcbs.alloc()?;
        self.pcbs.get_mut(child).saved_state = initial_state;
        self.pcbs.get_mut(child).support = support;
        if let Some(parent) = self.current {
            self.pcbs.insert_child(parent, child);
        }
        self.process_count += 1;
        info!("SYS1 created pcb, {} live", self.process_count);
        self.make_ready(child);
        Some(child)
    }

    /// SYS2: recursively terminate `root` and every descendant
    /// (spec.md §4.4). Each victim is pulled out of whatever it's doing —
    /// the ready queue, an ASL wait (adjusting `soft_block_count` if it
    /// was waiting on a device or the pseudo-clock), or running — before
    /// being detached from the tree and freed.
    pub fn terminate_process(&mut self, root: PcbHandle) {
        for child in children(&self.pcbs, root) {
            self.terminate_process(child);
        }

        // Read before `out_blocked` clears `root`'s stored key, or this
        // always sees `None` and never credits a soft-blocked wait back.
        let was_soft_blocked = self.is_soft_block_key(root);
        if self.asl.out_blocked(&mut self.pcbs, root).is_some() {
            if was_soft_blocked {
                self.soft_block_count -= 1;
            }
        } else {
            self.ready.out(self.pcbs.raw_slots_mut(), root);
        }

        if self.current == Some(root) {
            self.current = None;
        }

        self.pcbs.out_of_tree(root);
        self.pcbs.free(root);
        self.process_count -= 1;
        info!("SYS2 terminated pcb, {} live", self.process_count);
    }

    /// Whether `p`'s (now-cleared) ASL wait counted toward
    /// `soft_block_count`: device interrupts and the pseudo-clock do,
    /// general semaphores, the swap pool mutex and delay waits don't
    /// (spec.md §4.3's soft-block accounting covers exactly the waits a
    /// pending interrupt can resolve).
    fn is_soft_block_key(&self, p: PcbHandle) -> bool {
        matches!(
            self.pcbs.get(p).sem_key,
            Some(SemKey::Device(..)) | Some(SemKey::PseudoClock)
        )
    }
}
