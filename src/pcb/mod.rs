//! Process Control Block pool plus the circular-doubly-linked-list queue
//! and N-ary tree primitives built over it (spec.md §4.1).
//!
//! Grounded on the teacher's `proc/process.rs` (the `Process` struct and
//! its `lock`-free fields) and `queue.rs` (fixed-capacity array arena with
//! handle-free indices), combined per Design Notes §9: "prefer arena +
//! index over raw pointer cycles."

mod pool;
mod queue;
mod tree;

pub use pool::{Pcb, PcbHandle, PcbPool, ProcState};
pub use queue::PcbQueue;
pub use tree::{children, TreeOps};
