use crate::asl::{Asl, SemKey};
use crate::error::KernelPanic;
use crate::machine::{DeviceId, Machine, TerminalChannel};
use crate::param::{DEVICE_TABLE_SIZE, DEVPERLINE, MAXUPROC, QUANTUM_US};
use crate::pcb::{PcbHandle, PcbPool, PcbQueue, ProcState};
use crate::support::{ActiveDelayList, SupportTable, SwapPool};
use log::{debug, trace};

/// Flat index into a device semaphore table: every line/unit gets one slot,
/// plus a second row for the terminal line's independent receive
/// sub-channel (spec.md §3, §4.5).
fn sem_index(id: DeviceId, channel: Option<TerminalChannel>) -> usize {
    match channel {
        None | Some(TerminalChannel::Transmit) => id.index(),
        Some(TerminalChannel::Receive) => DEVICE_TABLE_SIZE + id.unit,
    }
}

/// Every semaphore the Nucleus and Support levels P/V: per-subdevice
/// interrupt semaphores, per-subdevice Support mutexes, and the handful of
/// named semaphores spec.md §3/§6 calls out individually.
pub struct Semaphores {
    device_interrupt: [i32; DEVICE_TABLE_SIZE + DEVPERLINE],
    device_mutex: [i32; DEVICE_TABLE_SIZE + DEVPERLINE],
    pseudo_clock: i32,
    master: i32,
    swap_pool_mutex: i32,
    adl_mutex: i32,
    delay: [i32; MAXUPROC],
    user: [[i32; 8]; MAXUPROC],
}

impl Semaphores {
    fn new() -> Self {
        Semaphores {
            device_interrupt: [0; DEVICE_TABLE_SIZE + DEVPERLINE],
            device_mutex: [1; DEVICE_TABLE_SIZE + DEVPERLINE],
            pseudo_clock: 0,
            master: 0,
            swap_pool_mutex: 1,
            adl_mutex: 1,
            delay: [0; MAXUPROC],
            user: [[0; 8]; MAXUPROC],
        }
    }

    fn value_mut(&mut self, key: SemKey) -> &mut i32 {
        match key {
            SemKey::Device(id, ch) => &mut self.device_interrupt[sem_index(id, ch)],
            SemKey::DeviceMutex(id, ch) => &mut self.device_mutex[sem_index(id, ch)],
            SemKey::PseudoClock => &mut self.pseudo_clock,
            SemKey::MasterSemaphore => &mut self.master,
            SemKey::SwapPoolMutex => &mut self.swap_pool_mutex,
            SemKey::AdlMutex => &mut self.adl_mutex,
            SemKey::Delay(asid) => &mut self.delay[asid.slot()],
            SemKey::User(asid, idx) => &mut self.user[asid.slot()][idx as usize % 8],
            SemKey::SentinelMin | SemKey::SentinelMax => {
                unreachable!("sentinels are never P'd or V'd")
            }
        }
    }
}

impl Default for Semaphores {
    fn default() -> Self {
        Self::new()
    }
}

/// The whole kernel: one arena of PCBs, one ASL, one ready queue, the
/// semaphore table, the Support Structure table, the swap pool, the
/// Active Delay List, and the `Machine` everything drives through.
pub struct Kernel<M: Machine> {
    pub(super) pcbs: PcbPool,
    pub(super) asl: Asl,
    pub(super) ready: PcbQueue,
    pub(super) current: Option<PcbHandle>,
    pub(super) current_started_us: u64,
    pub(super) process_count: u32,
    pub(super) soft_block_count: u32,
    pub(super) sems: Semaphores,
    pub support: SupportTable,
    pub swap_pool: SwapPool,
    pub adl: ActiveDelayList,
    pub machine: M,
}

impl<M: Machine> Kernel<M> {
    pub fn new(machine: M) -> Self {
        Kernel {
            pcbs: PcbPool::new(),
            asl: Asl::new(),
            ready: PcbQueue::new(),
            current: None,
            current_started_us: 0,
            process_count: 0,
            soft_block_count: 0,
            sems: Semaphores::new(),
            support: SupportTable::new(),
            swap_pool: SwapPool::new(),
            adl: ActiveDelayList::new(),
            machine,
        }
    }

    pub fn current(&self) -> Option<PcbHandle> {
        self.current
    }

    pub fn pcbs(&self) -> &PcbPool {
        &self.pcbs
    }

    pub fn pcbs_mut(&mut self) -> &mut PcbPool {
        &mut self.pcbs
    }

    pub fn asl(&self) -> &Asl {
        &self.asl
    }

    pub fn process_count(&self) -> u32 {
        self.process_count
    }

    pub fn soft_block_count(&self) -> u32 {
        self.soft_block_count
    }

    /// Add `cpu_time_us` elapsed since the current process was dispatched
    /// to its accounting total. Called explicitly by every blocking
    /// syscall handler and the PLT interrupt handler before `schedule()`;
    /// `schedule()` itself never re-charges (spec.md §4.3 CPU-time
    /// accounting).
    pub fn charge_current(&mut self) {
        let Some(cur) = self.current else { return };
        let elapsed = self.machine.now_us().saturating_sub(self.current_started_us);
        self.pcbs.get_mut(cur).cpu_time_us += elapsed;
    }

    /// `Passeren` on `key`: decrement and, if now negative, block the
    /// current process on `key`'s ASL queue. Returns `true` if the caller
    /// blocked (and must not resume until `V`'d).
    pub fn p(&mut self, key: SemKey) -> Result<bool, KernelPanic> {
        let v = self.sems.value_mut(key);
        *v -= 1;
        if *v < 0 {
            let cur = self.current.take().expect("P called with no current process");
            self.pcbs.get_mut(cur).state = ProcState::Blocked;
            self.asl.insert_blocked(&mut self.pcbs, key, cur)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// `Verhogen` on `key`: increment and, if a process was waiting, move
    /// it from `key`'s ASL queue to the ready queue. Returns the woken
    /// process, if any.
    pub fn v(&mut self, key: SemKey) -> Option<PcbHandle> {
        let v = self.sems.value_mut(key);
        *v += 1;
        if *v <= 0 {
            let woken = self.asl.remove_blocked(&mut self.pcbs, key)?;
            self.pcbs.get_mut(woken).state = ProcState::Ready;
            self.ready.insert(self.pcbs.raw_slots_mut(), woken);
            trace!("woke pcb on {key:?}");
            Some(woken)
        } else {
            None
        }
    }

    /// Dispatch the next ready process, reloading the PLT for a fresh
    /// quantum. An empty ready queue with no live processes is a clean
    /// HALT; with live, soft-blocked processes it waits for the next
    /// interrupt; with live processes and none soft-blocked, the system is
    /// deadlocked (spec.md §4.3) and that is reported as a `KernelPanic`
    /// rather than a host-process panic, so callers can assert on it.
    pub fn schedule(&mut self) -> Result<(), KernelPanic> {
        if let Some(next) = self.ready.remove_head(self.pcbs.raw_slots_mut()) {
            self.pcbs.get_mut(next).state = ProcState::Running;
            self.current = Some(next);
            self.current_started_us = self.machine.now_us();
            self.machine.set_plt(QUANTUM_US);
            let state = self.pcbs.get(next).saved_state;
            debug!("dispatching pcb, {} live", self.process_count);
            self.machine.resume(state);
            return Ok(());
        }

        self.current = None;
        if self.process_count == 0 {
            debug!("ready queue empty, no live processes: HALT");
            return Ok(());
        }
        if self.soft_block_count > 0 {
            trace!(
                "ready queue empty, {} soft-blocked: waiting for an interrupt",
                self.soft_block_count
            );
            self.machine.set_interrupts(true);
            return Ok(());
        }
        Err(KernelPanic::Deadlock {
            process_count: self.process_count,
        })
    }
}
