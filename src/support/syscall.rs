//! SYS9-18, the Support-level syscalls (spec.md §4.8).
//!
//! Device I/O (SYS11-17) and SYS18's delay scheduling need the Nucleus's
//! semaphore/scheduling machinery around them (a device mutex P/V, a
//! blocking wait on the matching interrupt semaphore); this module owns
//! parameter validation and the mechanics of talking to `Machine` once
//! those are in place, not the blocking itself. `nucleus/kernel.rs` is the
//! caller that sequences "P the mutex, do the I/O, V the mutex".
//!
//! Every variant's invalid-parameter case returns `Err(SupportFault)`; per
//! spec.md §4.8 the caller terminates the U-proc via SYS9 rather than
//! returning an error value to it.

use crate::error::{DeviceOutcome, SupportFault};
use crate::machine::{DeviceId, Machine, StorageKind, TerminalChannel, DEVICE_READY};
use crate::param::{DEVPERLINE, MAXSTRINGLEN, PAGESIZE, RESERVED_FLASH_BLOCKS};

/// One Support-level syscall request, already decoded from the U-proc's
/// registers by the Nucleus's SYS9-or-passup dispatch.
pub enum SupportSyscall<'a> {
    Terminate,
    GetTod,
    WriteToPrinter { unit: usize, buf: &'a [u8] },
    WriteToTerminal { unit: usize, buf: &'a [u8] },
    ReadFromTerminal { unit: usize },
    DiskPut { unit: usize, block: u32, buf: &'a [u8; PAGESIZE as usize] },
    DiskGet { unit: usize, block: u32 },
    FlashPut { unit: usize, block: u32, buf: &'a [u8; PAGESIZE as usize] },
    FlashGet { unit: usize, block: u32 },
    Delay { seconds: i32 },
}

/// What a successful Support syscall (other than `Terminate`/`Delay`, which
/// the Nucleus handles through its own mechanisms) hands back to the
/// U-proc.
pub enum SupportResult {
    Value(i32),
    Terminal { status: DeviceOutcome, ch: Option<u8> },
    Block { status: DeviceOutcome, buf: [u8; PAGESIZE as usize] },
}

fn validate_unit(unit: usize) -> Result<(), SupportFault> {
    if unit < DEVPERLINE {
        Ok(())
    } else {
        Err(SupportFault::ForbiddenDevice)
    }
}

fn validate_len(buf: &[u8]) -> Result<(), SupportFault> {
    if buf.len() <= MAXSTRINGLEN {
        Ok(())
    } else {
        Err(SupportFault::BadLength)
    }
}

fn validate_block(block: u32) -> Result<(), SupportFault> {
    if block >= RESERVED_FLASH_BLOCKS {
        Ok(())
    } else {
        Err(SupportFault::BadBlock)
    }
}

fn outcome_of(status: i32) -> DeviceOutcome {
    if status == DEVICE_READY {
        DeviceOutcome::Ok(status)
    } else {
        DeviceOutcome::Error(status)
    }
}

/// Carry out a validated device I/O request against `machine`. Caller
/// already holds the relevant device mutex and, for the blocking devices,
/// will P the matching interrupt semaphore after issuing the command —
/// this function performs the single synchronous step the simulated
/// `Machine` models as one call (see `machine::Machine` docs).
pub fn dispatch_support_syscall(
    machine: &mut impl Machine,
    now_us: u64,
    req: SupportSyscall,
) -> Result<SupportResult, SupportFault> {
    match req {
        SupportSyscall::Terminate => Ok(SupportResult::Value(0)),
        SupportSyscall::GetTod => Ok(SupportResult::Value(now_us as i32)),
        SupportSyscall::WriteToPrinter { unit, buf } => {
            validate_unit(unit)?;
            validate_len(buf)?;
            let id = DeviceId::new(crate::param::LINE_PRINTER, unit);
            let mut status = DEVICE_READY;
            for &byte in buf {
                status = machine.write_char(id, TerminalChannel::Transmit, byte);
                if status != DEVICE_READY {
                    break;
                }
            }
            Ok(SupportResult::Terminal {
                status: outcome_of(status),
                ch: None,
            })
        }
        SupportSyscall::WriteToTerminal { unit, buf } => {
            validate_unit(unit)?;
            validate_len(buf)?;
            let id = DeviceId::new(crate::param::LINE_TERMINAL, unit);
            let mut status = DEVICE_READY;
            for &byte in buf {
                status = machine.write_char(id, TerminalChannel::Transmit, byte);
                if status != DEVICE_READY {
                    break;
                }
            }
            Ok(SupportResult::Terminal {
                status: outcome_of(status),
                ch: None,
            })
        }
        SupportSyscall::ReadFromTerminal { unit } => {
            validate_unit(unit)?;
            let id = DeviceId::new(crate::param::LINE_TERMINAL, unit);
            let (status, ch) = machine.read_char(id);
            Ok(SupportResult::Terminal {
                status: outcome_of(status),
                ch: Some(ch),
            })
        }
        SupportSyscall::DiskPut { unit, block, buf } => {
            validate_unit(unit)?;
            let id = DeviceId::new(crate::param::LINE_DISK, unit);
            let status = match machine.seek(id, block) {
                DEVICE_READY => machine.storage_write(StorageKind::Disk, unit, block, buf),
                seek_status => seek_status,
            };
            Ok(SupportResult::Value(status))
        }
        SupportSyscall::DiskGet { unit, block } => {
            validate_unit(unit)?;
            let id = DeviceId::new(crate::param::LINE_DISK, unit);
            let mut buf = [0u8; PAGESIZE as usize];
            let status = match machine.seek(id, block) {
                DEVICE_READY => machine.storage_read(StorageKind::Disk, unit, block, &mut buf),
                seek_status => seek_status,
            };
            Ok(SupportResult::Block {
                status: outcome_of(status),
                buf,
            })
        }
        SupportSyscall::FlashPut { unit, block, buf } => {
            validate_unit(unit)?;
            validate_block(block)?;
            let status = machine.storage_write(StorageKind::Flash, unit, block, buf);
            Ok(SupportResult::Value(status))
        }
        SupportSyscall::FlashGet { unit, block } => {
            validate_unit(unit)?;
            validate_block(block)?;
            let mut buf = [0u8; PAGESIZE as usize];
            let status = machine.storage_read(StorageKind::Flash, unit, block, &mut buf);
            Ok(SupportResult::Block {
                status: outcome_of(status),
                buf,
            })
        }
        SupportSyscall::Delay { seconds } => {
            if seconds < 0 {
                Err(SupportFault::BadDelay)
            } else {
                Ok(SupportResult::Value(0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::sim::SimMachine;

    #[test]
    fn write_to_terminal_rejects_oversized_buffers() {
        let mut machine = SimMachine::new();
        let buf = vec![b'x'; MAXSTRINGLEN + 1];
        let err = dispatch_support_syscall(
            &mut machine,
            0,
            SupportSyscall::WriteToTerminal { unit: 0, buf: &buf },
        );
        assert!(matches!(err, Err(SupportFault::BadLength)));
    }

    #[test]
    fn write_to_terminal_accepts_a_short_buffer() {
        let mut machine = SimMachine::new();
        let buf = b"hello";
        let result = dispatch_support_syscall(
            &mut machine,
            0,
            SupportSyscall::WriteToTerminal { unit: 0, buf },
        )
        .unwrap();
        match result {
            SupportResult::Terminal { status, .. } => {
                assert_eq!(status, DeviceOutcome::Ok(DEVICE_READY))
            }
            _ => panic!("expected a terminal result"),
        }
    }

    #[test]
    fn flash_put_rejects_a_reserved_block() {
        let mut machine = SimMachine::new();
        let buf = [0u8; PAGESIZE as usize];
        let err = dispatch_support_syscall(
            &mut machine,
            0,
            SupportSyscall::FlashPut { unit: 0, block: 3, buf: &buf },
        );
        assert!(matches!(err, Err(SupportFault::BadBlock)));
    }

    #[test]
    fn forbidden_device_unit_is_rejected() {
        let mut machine = SimMachine::new();
        let err = dispatch_support_syscall(
            &mut machine,
            0,
            SupportSyscall::ReadFromTerminal { unit: DEVPERLINE + 1 },
        );
        assert!(matches!(err, Err(SupportFault::ForbiddenDevice)));
    }

    #[test]
    fn disk_put_then_get_seeks_before_each_transfer() {
        let mut machine = SimMachine::new();
        let mut buf = [0u8; PAGESIZE as usize];
        buf[0] = 7;
        dispatch_support_syscall(&mut machine, 0, SupportSyscall::DiskPut { unit: 0, block: 2, buf: &buf })
            .unwrap();
        let result = dispatch_support_syscall(&mut machine, 0, SupportSyscall::DiskGet { unit: 0, block: 2 })
            .unwrap();
        match result {
            SupportResult::Block { status, buf: got } => {
                assert_eq!(status, DeviceOutcome::Ok(DEVICE_READY));
                assert_eq!(got, buf);
            }
            _ => panic!("expected a block result"),
        }
        let id = DeviceId::new(crate::param::LINE_DISK, 0);
        assert_eq!(machine.seeks, vec![(id, 2), (id, 2)]);
    }

    #[test]
    fn a_failed_seek_skips_the_dma_transfer() {
        let mut machine = SimMachine::new();
        machine.fail_next_seek(-1);
        let result = dispatch_support_syscall(&mut machine, 0, SupportSyscall::DiskGet { unit: 0, block: 2 })
            .unwrap();
        match result {
            SupportResult::Block { status, .. } => assert_eq!(status, DeviceOutcome::Error(-1)),
            _ => panic!("expected a block result"),
        }
    }

    #[test]
    fn get_tod_returns_the_current_clock() {
        let mut machine = SimMachine::new();
        let result = dispatch_support_syscall(&mut machine, 12345, SupportSyscall::GetTod).unwrap();
        match result {
            SupportResult::Value(v) => assert_eq!(v, 12345),
            _ => panic!("expected a value result"),
        }
    }
}
