//! A Pandos-family educational kernel core: the PCB pool, the Active
//! Semaphore List, the Nucleus (scheduler, SYS1-8, interrupt dispatch,
//! passup-or-die) and the Support level (TLB refill, page-fault handling,
//! the swap pool, SYS9-18, the Active Delay List).
//!
//! The simulated uMPS3 machine itself — device register windows, the TLB,
//! the TOD/interval timers, the `LDST` non-local jump — is out of scope;
//! it is consumed here through the [`machine::Machine`] trait, with
//! [`machine::sim::SimMachine`] as the in-memory test double every test in
//! this crate runs against.

pub mod asl;
pub mod error;
pub mod machine;
pub mod nucleus;
pub mod param;
pub mod pcb;
pub mod support;
pub mod types;

pub use error::{DeviceOutcome, KernelPanic, SupportFault};
pub use machine::Machine;
pub use nucleus::Kernel;
