//! An in-memory reference `Machine`, used only by this crate's own tests.
//!
//! Stands in for the uMPS3 simulator named out of scope by spec.md §1:
//! flash/disk backing stores are plain byte vectors, the clock is a
//! software counter, and `resume` records the state it was handed instead
//! of performing a non-local jump.

use super::{DeviceId, DeviceStatus, Machine, Pte, ProcessorState, StorageKind, TerminalChannel};
use crate::param::{DEVICE_TABLE_SIZE, PAGESIZE};
use std::collections::HashMap;

#[derive(Default)]
struct TlbEntry {
    asid: u8,
    vpn: u8,
    pte: Pte,
    present: bool,
}

pub struct SimMachine {
    now_us: u64,
    interrupts_enabled: bool,
    plt_deadline: Option<u64>,
    interval_deadline: Option<u64>,
    status: [DeviceStatus; DEVICE_TABLE_SIZE],
    tlb: Vec<TlbEntry>,
    /// Backing stores keyed by (kind, unit), each a flat array of 4KiB
    /// blocks. Grown on first touch.
    storage: HashMap<(bool, usize), Vec<[u8; PAGESIZE as usize]>>,
    /// Per-(line,unit) pending receive character, for terminals.
    pending_rx: HashMap<usize, u8>,
    pub last_resume: Option<ProcessorState>,
    pub resume_count: u64,
    /// Every disk seek issued, in order, for tests to assert against.
    pub seeks: Vec<(DeviceId, u32)>,
    /// Seek status to return next; reset to READY after each call so a
    /// test only has to arrange the one failure it cares about.
    seek_status: DeviceStatus,
}

impl SimMachine {
    pub fn new() -> Self {
        SimMachine {
            now_us: 0,
            interrupts_enabled: true,
            plt_deadline: None,
            interval_deadline: None,
            status: [super::DEVICE_READY; DEVICE_TABLE_SIZE],
            tlb: (0..64).map(|_| TlbEntry::default()).collect(),
            storage: HashMap::new(),
            pending_rx: HashMap::new(),
            last_resume: None,
            resume_count: 0,
            seeks: Vec::new(),
            seek_status: super::DEVICE_READY,
        }
    }

    /// Make the next `seek` call return `status` instead of READY.
    pub fn fail_next_seek(&mut self, status: DeviceStatus) {
        self.seek_status = status;
    }

    /// Advance the software clock; used by tests to simulate the passage
    /// of time for SYS18/SYS10 and PLT/interval-timer expiry.
    pub fn advance(&mut self, us: u64) {
        self.now_us += us;
    }

    pub fn plt_expired(&self) -> bool {
        matches!(self.plt_deadline, Some(d) if self.now_us >= d)
    }

    pub fn interval_expired(&self) -> bool {
        matches!(self.interval_deadline, Some(d) if self.now_us >= d)
    }

    /// Seed a block of a flash/disk backing store, as if written at
    /// image-build time (spec.md §6 backing store).
    pub fn seed_storage(
        &mut self,
        kind: StorageKind,
        unit: usize,
        block: u32,
        data: [u8; PAGESIZE as usize],
    ) {
        let blocks = self.blocks_mut(kind, unit, block);
        blocks[block as usize] = data;
    }

    /// Queue a character for the next `read_char` on a terminal's receive
    /// sub-channel, as if the user had typed it.
    pub fn queue_rx(&mut self, id: DeviceId, ch: u8) {
        self.pending_rx.insert(id.index(), ch);
    }

    fn blocks_mut(
        &mut self,
        kind: StorageKind,
        unit: usize,
        min_len: u32,
    ) -> &mut Vec<[u8; PAGESIZE as usize]> {
        let key = (matches!(kind, StorageKind::Flash), unit);
        let v = self.storage.entry(key).or_insert_with(Vec::new);
        if v.len() <= min_len as usize {
            v.resize(min_len as usize + 1, [0u8; PAGESIZE as usize]);
        }
        v
    }
}

impl Default for SimMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for SimMachine {
    fn now_us(&self) -> u64 {
        self.now_us
    }

    fn set_plt(&mut self, quantum_us: u64) {
        self.plt_deadline = Some(self.now_us + quantum_us);
    }

    fn set_interval_timer(&mut self, interval_us: u64) {
        self.interval_deadline = Some(self.now_us + interval_us);
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    fn set_interrupts(&mut self, enabled: bool) {
        self.interrupts_enabled = enabled;
    }

    fn device_status(&self, id: DeviceId) -> DeviceStatus {
        self.status[id.index()]
    }

    fn device_command(&mut self, id: DeviceId, _command: u32) -> DeviceStatus {
        self.status[id.index()]
    }

    fn tlb_probe(&self, asid: u8, vpn: u8) -> Option<usize> {
        self.tlb
            .iter()
            .position(|e| e.present && e.asid == asid && e.vpn == vpn)
    }

    fn tlb_write_random(&mut self, pte: Pte) {
        // "Random" in the uMPS3 sense just means "an index we don't have
        // to track"; a free slot (or slot 0) serves tests identically.
        let idx = self.tlb.iter().position(|e| !e.present).unwrap_or(0);
        self.tlb_write_index(idx, pte);
    }

    fn tlb_write_index(&mut self, index: usize, pte: Pte) {
        self.tlb[index] = TlbEntry {
            asid: pte.asid,
            vpn: pte.vpn,
            pte,
            present: pte.valid(),
        };
    }

    fn seek(&mut self, id: DeviceId, block: u32) -> DeviceStatus {
        self.seeks.push((id, block));
        let status = self.seek_status;
        self.seek_status = super::DEVICE_READY;
        status
    }

    fn storage_read(
        &mut self,
        kind: StorageKind,
        unit: usize,
        block: u32,
        buf: &mut [u8; PAGESIZE as usize],
    ) -> DeviceStatus {
        let blocks = self.blocks_mut(kind, unit, block);
        *buf = blocks[block as usize];
        super::DEVICE_READY
    }

    fn storage_write(
        &mut self,
        kind: StorageKind,
        unit: usize,
        block: u32,
        buf: &[u8; PAGESIZE as usize],
    ) -> DeviceStatus {
        let blocks = self.blocks_mut(kind, unit, block);
        blocks[block as usize] = *buf;
        super::DEVICE_READY
    }

    fn write_char(&mut self, _id: DeviceId, _channel: TerminalChannel, _ch: u8) -> DeviceStatus {
        super::DEVICE_READY
    }

    fn read_char(&mut self, id: DeviceId) -> (DeviceStatus, u8) {
        match self.pending_rx.remove(&id.index()) {
            Some(ch) => (super::DEVICE_READY, ch),
            None => (super::DEVICE_READY, 0),
        }
    }

    fn resume(&mut self, state: ProcessorState) {
        self.last_resume = Some(state);
        self.resume_count += 1;
    }
}
