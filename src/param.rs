//! System-wide constants. Single source of truth for pool sizes, timing,
//! and geometry, mirroring the teacher's `param.rs`.

/// Maximum number of processes (PCB pool size): master, the delay daemon,
/// and up to `MAXUPROC` user processes, plus slack for nested test trees.
pub const MAXPROC: usize = 20;
/// Maximum number of user (paged) processes, one ASID each.
pub const MAXUPROC: usize = 8;
/// ASL descriptor pool size: one descriptor per process plus two sentinels.
pub const ASL_POOL_SIZE: usize = MAXPROC + 2;

/// Bytes per page.
pub const PAGESIZE: u32 = 4096;
/// Virtual pages per user address space (page table size).
pub const USERPGTBLSIZE: usize = 32;
/// VPN of the per-process stack page (top of KUSEG).
pub const STACK_VPN: u8 = (USERPGTBLSIZE - 1) as u8;

/// Swap pool frame count.
pub const SWAPPOOLSIZE: usize = 2 * MAXUPROC;

/// Number of interrupt lines carrying device interrupts (disk, flash,
/// network, printer, terminal), uMPS3 numbering.
pub const DEVINTNUM: usize = 5;
/// Devices per interrupt line.
pub const DEVPERLINE: usize = 8;

pub const LINE_DISK: usize = 0;
pub const LINE_FLASH: usize = 1;
pub const LINE_NETWORK: usize = 2;
pub const LINE_PRINTER: usize = 3;
pub const LINE_TERMINAL: usize = 4;

/// Flat size of the `DEVINTNUM x DEVPERLINE` device table.
pub const DEVICE_TABLE_SIZE: usize = DEVINTNUM * DEVPERLINE;

/// Size of a per-subdevice semaphore table that gives the terminal line a
/// second row for its receive sub-channel (every other line has only a
/// transmit-equivalent single channel), per spec.md §3's device semaphore
/// array and §4.5's independent terminal transmit/receive interrupts.
pub const DEVICE_SEM_TABLE_SIZE: usize = DEVICE_TABLE_SIZE + DEVPERLINE;

/// Scheduler time slice, in microseconds (5ms).
pub const QUANTUM_US: u64 = 5_000;
/// Pseudo-clock tick period, in microseconds (100ms).
pub const CLOCKINTERVAL_US: u64 = 100_000;

/// Maximum string length accepted by SYS11-13.
pub const MAXSTRINGLEN: usize = 128;
/// Newline terminator for SYS13 ReadFromTerminal.
pub const NEWLINE: u8 = b'\n';

/// Lowest flash block available for general-purpose use; blocks
/// `0..RESERVED_FLASH_BLOCKS` back a U-proc's own 32 virtual pages.
pub const RESERVED_FLASH_BLOCKS: u32 = USERPGTBLSIZE as u32;

/// Virtual address the U-proc's code segment begins at.
pub const UTEXTSTART: u64 = 0x800000B0;

/// Command written to a device's COMMAND register to acknowledge its
/// interrupt, uMPS3-style.
pub const DEVICE_ACK: u32 = 1;
