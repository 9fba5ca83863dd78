//! Shared disk/flash DMA helpers, used by the swap pool pager and by
//! SYS14-17 (spec.md §4.8, §6).
//!
//! uMPS3 flash and disk devices transfer exactly one page per operation
//! through a fixed DMA buffer; every caller here already has a page-sized
//! buffer to hand, matching the real device contract.

use crate::machine::{DeviceStatus, Machine, StorageKind, DEVICE_READY};
use crate::param::PAGESIZE;

/// Read one page-sized block from a backing store into `buf`. Returns the
/// device status unmodified so the caller can distinguish "ready" (0) from
/// an error code to propagate (negated) to a Support syscall's caller.
pub fn read_block(
    machine: &mut impl Machine,
    kind: StorageKind,
    unit: usize,
    block: u32,
    buf: &mut [u8; PAGESIZE as usize],
) -> DeviceStatus {
    machine.storage_read(kind, unit, block, buf)
}

/// Write one page-sized block to a backing store.
pub fn write_block(
    machine: &mut impl Machine,
    kind: StorageKind,
    unit: usize,
    block: u32,
    buf: &[u8; PAGESIZE as usize],
) -> DeviceStatus {
    machine.storage_write(kind, unit, block, buf)
}

pub fn is_error(status: DeviceStatus) -> bool {
    status != DEVICE_READY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::sim::SimMachine;

    #[test]
    fn write_then_read_round_trips_through_a_backing_store() {
        let mut machine = SimMachine::new();
        let mut page = [0u8; PAGESIZE as usize];
        page[0] = 0xAB;
        page[PAGESIZE as usize - 1] = 0xCD;

        let status = write_block(&mut machine, StorageKind::Flash, 0, 3, &page);
        assert!(!is_error(status));

        let mut out = [0u8; PAGESIZE as usize];
        let status = read_block(&mut machine, StorageKind::Flash, 0, 3, &mut out);
        assert!(!is_error(status));
        assert_eq!(out, page);
    }
}
