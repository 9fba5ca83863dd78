//! Wiring SYS9-18 into the Nucleus's semaphore and scheduling machinery
//! (spec.md §4.8).
//!
//! `support::syscall` only knows how to validate arguments and talk to
//! `Machine`; every device request (SYS11-17) still needs its mutex P'd
//! first and its completion routed through the matching interrupt
//! semaphore, and SYS18 needs the Active Delay List mutex and the U-proc's
//! own delay semaphore. This module is where those two pieces meet, the
//! same relationship `nucleus::page_fault` has to `support::tlb`.
//!
//! `SimMachine`'s device operations complete synchronously — `device_command`
//! and friends return the final status from the same call that issued it,
//! there is no separate completion interrupt a test can fire later. So the
//! SYS5 WaitIO a real device syscall blocks on is modeled here by crediting
//! the interrupt semaphore immediately after the synchronous operation
//! finishes and then `p()`-ing it: the wait is genuine P/V machinery, it
//! just never actually blocks because the credit is already there waiting
//! for it (see DESIGN.md).

use super::kernel::Kernel;
use crate::asl::SemKey;
use crate::error::KernelPanic;
use crate::machine::{DeviceId, Machine, TerminalChannel};
use crate::param::{LINE_DISK, LINE_FLASH, LINE_PRINTER, LINE_TERMINAL};
use crate::support::{dispatch_support_syscall, SupportResult, SupportSyscall};

/// What came of dispatching one SYS9-18 request.
pub enum SupportSyscallOutcome {
    /// The caller blocked and has already been rescheduled away; nothing
    /// more to do until it's woken.
    Blocked,
    /// The request ran to completion; carries the value due back to the
    /// U-proc.
    Completed(SupportResult),
    /// The U-proc was terminated, either by its own SYS9 or because its
    /// request faulted (spec.md §4.8: invalid parameters kill the caller
    /// rather than returning an error to it).
    Terminated,
}

impl<M: Machine> Kernel<M> {
    /// Dispatch one SYS9-18 request on behalf of the current process.
    pub fn handle_support_syscall(
        &mut self,
        req: SupportSyscall,
    ) -> Result<SupportSyscallOutcome, KernelPanic> {
        match req {
            SupportSyscall::Terminate => {
                self.terminate_support_process();
                Ok(SupportSyscallOutcome::Terminated)
            }
            SupportSyscall::GetTod => {
                let now = self.machine.now_us();
                Ok(SupportSyscallOutcome::Completed(SupportResult::Value(now as i32)))
            }
            SupportSyscall::Delay { seconds } => self.handle_delay_syscall(seconds),
            other => self.handle_device_syscall(other),
        }
    }

    /// SYS11-17: acquire the device's mutex, carry out the I/O, route its
    /// completion through the matching interrupt semaphore, release the
    /// mutex.
    fn handle_device_syscall(
        &mut self,
        req: SupportSyscall,
    ) -> Result<SupportSyscallOutcome, KernelPanic> {
        let (id, channel) = device_key(&req);
        let mutex_key = SemKey::DeviceMutex(id, channel);

        if self.p(mutex_key)? {
            self.schedule()?;
            return Ok(SupportSyscallOutcome::Blocked);
        }
        self.charge_current();

        let now = self.machine.now_us();
        let dispatched = dispatch_support_syscall(&mut self.machine, now, req);

        let result = match dispatched {
            Ok(r) => r,
            Err(_fault) => {
                self.v(mutex_key);
                self.terminate_support_process();
                return Ok(SupportSyscallOutcome::Terminated);
            }
        };

        // The operation already completed synchronously; credit the
        // interrupt semaphore ourselves and take the SYS5 wait we'd
        // otherwise owe a real asynchronous device.
        self.v(SemKey::Device(id, channel));
        let blocked = self.p(SemKey::Device(id, channel))?;
        debug_assert!(!blocked, "a just-credited interrupt semaphore never blocks");

        self.v(mutex_key);
        Ok(SupportSyscallOutcome::Completed(result))
    }

    /// SYS18: validate and record the delay, then block the caller on its
    /// own private delay semaphore until the Delay Daemon's next tick
    /// releases it (spec.md §4.8, §6).
    fn handle_delay_syscall(&mut self, seconds: i32) -> Result<SupportSyscallOutcome, KernelPanic> {
        let cur = self.current.expect("SYS18 with no current process");
        let asid = self
            .pcbs
            .get(cur)
            .support
            .expect("SYS18 from a process with no Support Structure");

        if self.p(SemKey::AdlMutex)? {
            self.schedule()?;
            return Ok(SupportSyscallOutcome::Blocked);
        }
        let now = self.machine.now_us();
        if self.adl.schedule(now, seconds, asid).is_err() {
            self.v(SemKey::AdlMutex);
            self.terminate_support_process();
            return Ok(SupportSyscallOutcome::Terminated);
        }
        self.v(SemKey::AdlMutex);

        self.charge_current();
        let blocked = self.p(SemKey::Delay(asid))?;
        debug_assert!(blocked, "a fresh delay semaphore always blocks the caller");
        self.schedule()?;
        Ok(SupportSyscallOutcome::Blocked)
    }

    /// SYS9: tear down the calling U-proc's Support-level state and kill
    /// it via SYS2. Device and swap-pool mutexes never outlive a single
    /// `handle_support_syscall`/`handle_page_fault` call, so there is
    /// nothing for this process to be mid-hold of; the only Support-level
    /// state that survives across calls is its swap pool frames, which
    /// have to be freed so the next fault doesn't evict pages nobody owns
    /// anymore.
    fn terminate_support_process(&mut self) {
        let cur = self.current.expect("SYS9 with no current process");
        if let Some(asid) = self.pcbs.get(cur).support {
            self.swap_pool.release_owned_by(asid);
        }
        self.v(SemKey::MasterSemaphore);
        self.terminate_process(cur);
    }
}

fn device_key(req: &SupportSyscall) -> (DeviceId, Option<TerminalChannel>) {
    match *req {
        SupportSyscall::WriteToPrinter { unit, .. } => (DeviceId::new(LINE_PRINTER, unit), None),
        SupportSyscall::WriteToTerminal { unit, .. } => {
            (DeviceId::new(LINE_TERMINAL, unit), Some(TerminalChannel::Transmit))
        }
        SupportSyscall::ReadFromTerminal { unit } => {
            (DeviceId::new(LINE_TERMINAL, unit), Some(TerminalChannel::Receive))
        }
        SupportSyscall::DiskPut { unit, .. } | SupportSyscall::DiskGet { unit, .. } => {
            (DeviceId::new(LINE_DISK, unit), None)
        }
        SupportSyscall::FlashPut { unit, .. } | SupportSyscall::FlashGet { unit, .. } => {
            (DeviceId::new(LINE_FLASH, unit), None)
        }
        SupportSyscall::Terminate | SupportSyscall::GetTod | SupportSyscall::Delay { .. } => {
            unreachable!("handled by their own match arms in handle_support_syscall")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::sim::SimMachine;
    use crate::support::SupportStructure;
    use crate::types::Asid;

    fn kernel_with_uproc() -> (Kernel<SimMachine>, Asid, crate::pcb::PcbHandle) {
        let mut kernel = Kernel::new(SimMachine::new());
        let asid = Asid::new(1).unwrap();
        kernel.support.install(SupportStructure::new(asid));
        let p = kernel.pcbs_mut().alloc().unwrap();
        kernel.pcbs_mut().get_mut(p).support = Some(asid);
        kernel.process_count = 1;
        kernel.current = Some(p);
        (kernel, asid, p)
    }

    #[test]
    fn disk_get_completes_and_releases_the_device_mutex() {
        let (mut kernel, ..) = kernel_with_uproc();

        let outcome = kernel
            .handle_support_syscall(SupportSyscall::DiskGet { unit: 0, block: 1 })
            .unwrap();
        assert!(matches!(
            outcome,
            SupportSyscallOutcome::Completed(SupportResult::Block { .. })
        ));
        let id = DeviceId::new(LINE_DISK, 0);
        assert!(!kernel.p(SemKey::DeviceMutex(id, None)).unwrap(), "mutex was released");
    }

    #[test]
    fn a_second_caller_blocks_on_a_held_device_mutex() {
        let (mut kernel, _, p) = kernel_with_uproc();
        let id = DeviceId::new(LINE_DISK, 0);
        let holder = kernel.pcbs_mut().alloc().unwrap();
        kernel.process_count = 2;
        kernel.current = Some(holder);
        assert!(!kernel.p(SemKey::DeviceMutex(id, None)).unwrap());

        kernel.current = Some(p);
        let outcome = kernel
            .handle_support_syscall(SupportSyscall::DiskGet { unit: 0, block: 1 })
            .unwrap();
        assert!(matches!(outcome, SupportSyscallOutcome::Blocked));
        assert!(kernel.current().is_none());
    }

    #[test]
    fn terminate_frees_swap_pool_frames_and_credits_master_semaphore() {
        let (mut kernel, asid, p) = kernel_with_uproc();
        kernel
            .swap_pool
            .service_fault(&mut kernel.support, &mut kernel.machine, asid, 0);
        assert!(kernel.support.get(asid).unwrap().page_table[0].valid());

        let waiter = kernel.pcbs_mut().alloc().unwrap();
        kernel.process_count = 2;
        kernel.current = Some(waiter);
        assert!(kernel.p(SemKey::MasterSemaphore).unwrap(), "waiter blocks on the master semaphore");

        kernel.current = Some(p);
        let outcome = kernel.handle_support_syscall(SupportSyscall::Terminate).unwrap();
        assert!(matches!(outcome, SupportSyscallOutcome::Terminated));
        assert!(kernel.current().is_none(), "terminated process is no longer current");

        kernel.schedule().unwrap();
        assert_eq!(kernel.current(), Some(waiter), "master semaphore credit readied the waiter");
    }

    #[test]
    fn delay_blocks_the_caller_until_the_daemon_releases_it() {
        let (mut kernel, asid, _) = kernel_with_uproc();

        let outcome = kernel.handle_support_syscall(SupportSyscall::Delay { seconds: 1 }).unwrap();
        assert!(matches!(outcome, SupportSyscallOutcome::Blocked));
        assert_eq!(kernel.adl.len(), 1);

        let woken = kernel.v(SemKey::Delay(asid));
        assert!(woken.is_some());
    }
}
