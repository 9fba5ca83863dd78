//! Interrupt dispatch, in the ascending priority order spec.md §4.5
//! requires: PLT first, then the interval timer, then devices by line and
//! unit. Each handler acks/reloads the device before touching any
//! semaphore so a second interrupt on the same line can't be lost.

use super::kernel::Kernel;
use crate::asl::SemKey;
use crate::machine::{DeviceId, Machine, TerminalChannel, REG_V0};
use crate::param::{CLOCKINTERVAL_US, DEVICE_ACK};
use crate::pcb::ProcState;
use crate::support::DelayDaemon;

impl<M: Machine> Kernel<M> {
    /// PLT expiry: the running process's quantum is up. Charge it for the
    /// time it ran, put it back on the ready queue, and reschedule
    /// (spec.md §4.3/§4.5 — this is the only interrupt that always
    /// preempts rather than just waking something).
    pub fn handle_plt_interrupt(&mut self) {
        self.charge_current();
        if let Some(cur) = self.current.take() {
            self.pcbs.get_mut(cur).state = ProcState::Ready;
            self.ready.insert(self.pcbs.raw_slots_mut(), cur);
        }
    }

    /// Interval timer expiry: reload it for the next tick, release every
    /// process waiting on the pseudo-clock semaphore at once — the
    /// pseudo-clock is reset to zero rather than incremented by one,
    /// since a tick is meant to wake every SYS7 waiter, not just the
    /// first (spec.md §4.5, §6) — and let the Delay Daemon release every
    /// U-proc whose SYS18 delay has expired (spec.md §4.8, §6).
    pub fn handle_interval_timer_interrupt(&mut self) {
        self.machine.set_interval_timer(CLOCKINTERVAL_US);
        while self.v(SemKey::PseudoClock).is_some() {
            self.soft_block_count = self.soft_block_count.saturating_sub(1);
        }

        let now = self.machine.now_us();
        for asid in DelayDaemon::tick(&mut self.adl, now) {
            self.v(SemKey::Delay(asid));
        }
    }

    /// A device interrupt on `id` (terminal sub-channel `channel`, `None`
    /// elsewhere): ack it, then `V` the matching Nucleus interrupt
    /// semaphore to release whichever process is blocked in SYS5/WaitIO,
    /// carrying the device's status into the woken process's saved `v0`
    /// (spec.md §4.4 row 5, §4.5) so it sees the result of its WaitIO.
    pub fn handle_device_interrupt(
        &mut self,
        id: DeviceId,
        channel: Option<TerminalChannel>,
    ) -> Option<crate::pcb::PcbHandle> {
        let status = self.machine.device_command(id, DEVICE_ACK);
        let woken = self.v(SemKey::Device(id, channel));
        if let Some(p) = woken {
            self.soft_block_count = self.soft_block_count.saturating_sub(1);
            self.pcbs.get_mut(p).saved_state.gpr[REG_V0] = status as u32;
        }
        woken
    }
}
