//! Discrete-event operating system simulator.
//!
//! A workload of synthetic processes is executed under one of two CPU
//! scheduling policies, contending for a fixed pool of typed I/O devices and
//! a bounded block allocator, while new process batches keep arriving:
//! - Round-Robin: a quantum timer raises a preempt flag checked at every
//!   operation boundary.
//! - Shortest-Time-Remaining: each batch arrival raises the flag and the
//!   ready queue re-sorts by remaining milliseconds.
//!
//! High-level flow:
//! 1) Parse the configuration file (policy, quantum, cycle times, device
//!    quantities, memory geometry, log routing).
//! 2) Parse the metadata stream into processes and seed the ready queue.
//! 3) Run the engine: pop, step operations, sleep their wall-clock cost,
//!    borrow device handles, allocate memory, honour preemption flags.
//! 4) Alongside, a batch loader re-ingests the workload every 100 ms.
//! 5) Render the time-stamped trace to the monitor, a file, or both.

pub mod config;
pub mod devices;
pub mod engine;
pub mod memory;
pub mod metadata;
pub mod process;
pub mod ready_queue;
pub mod trace;

pub use config::{
    parse_config_file, parse_config_str, ConfigError, CycleKind, CycleTimes, LogMode, SchedPolicy,
    SimConfig,
};
pub use devices::{DeviceKind, DeviceLease, DevicePool, DevicePools};
pub use engine::{Engine, SimError};
pub use memory::{format_address, MemoryTracker};
pub use metadata::{load_batch, MetadataError};
pub use process::{Descriptor, OpCategory, Operation, PcbState, Process};
pub use ready_queue::ReadyQueue;
pub use trace::{write_trace, SimClock, TraceEvent, TraceLog, TRACE_HEADER};
