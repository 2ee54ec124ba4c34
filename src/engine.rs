//! Scheduler engine: the dispatch loop, preemption timers, and batch
//! ingestion.
//!
//! The engine owns the ready queue, clock, trace, memory cursor, and device
//! pools. It runs process operations on one thread; alongside it live two
//! helper threads. The batch loader re-ingests the metadata source every
//! 100 ms for ten ticks, and under STR raises a preemption flag after each
//! batch. The quantum timer exists only under RR: it arms on the start of an
//! operation, sleeps one quantum, and raises the RR flag.
//!
//! Preemption is cooperative at operation boundaries. An operation in
//! progress always runs to completion; a raised flag is honoured at the top
//! of the next step, where the running process goes back to the queue tail
//! (RR) or into sorted position (STR) with its program counter intact.

use std::fmt;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};

use crate::config::{ConfigError, SchedPolicy, SimConfig};
use crate::devices::DevicePools;
use crate::memory::{format_address, MemoryTracker};
use crate::metadata::{self, MetadataError};
use crate::process::{Descriptor, OpCategory, Operation, PcbState, Process};
use crate::ready_queue::ReadyQueue;
use crate::trace::TraceLog;

/// Batch-loader tick count.
const BATCH_TICKS: u32 = 10;
/// Interval between batch ingestions.
const BATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Top-level simulator error: everything fatal happens at boot.
#[derive(Debug)]
#[non_exhaustive]
pub enum SimError {
    Config(ConfigError),
    Metadata(MetadataError),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Metadata(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Metadata(err) => Some(err),
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<MetadataError> for SimError {
    fn from(err: MetadataError) -> Self {
        Self::Metadata(err)
    }
}

/// The simulator runtime. Build with a parsed [`SimConfig`], then [`run`]
/// once; the trace comes back when the workload drains.
///
/// [`run`]: Engine::run
pub struct Engine {
    cfg: SimConfig,
    metadata_text: Arc<str>,
    ready: Arc<Mutex<ReadyQueue>>,
    pools: DevicePools,
    memory: MemoryTracker,
    trace: TraceLog,
    rr_flag: Arc<AtomicBool>,
    str_flag: Arc<AtomicBool>,
}

impl Engine {
    /// Build an engine. Reads the metadata file here so an unreadable path
    /// fails at boot; the retained text is re-parsed at every batch tick.
    /// The trace clock anchors now.
    pub fn new(cfg: SimConfig) -> Result<Self, SimError> {
        let metadata_text: Arc<str> = fs::read_to_string(&cfg.metadata_path)
            .map_err(MetadataError::Io)?
            .into();
        let ready = Arc::new(Mutex::new(ReadyQueue::new(cfg.policy)));
        let pools = DevicePools::new(&cfg.device_quantities);
        let memory = MemoryTracker::new(cfg.system_memory_kb, cfg.block_size_kb);
        Ok(Self {
            metadata_text,
            ready,
            pools,
            memory,
            trace: TraceLog::start(),
            rr_flag: Arc::new(AtomicBool::new(false)),
            str_flag: Arc::new(AtomicBool::new(false)),
            cfg,
        })
    }

    /// Run the workload until the ready queue drains, then return the trace.
    ///
    /// The loop pops the head process and steps its operations, checking the
    /// policy's preemption flag before each one. Batches ingested after the
    /// queue is observed empty are dropped unrun; both helper threads are
    /// joined before returning.
    pub fn run(mut self) -> Result<TraceLog, SimError> {
        {
            let mut queue = self.ready.lock().expect("ready queue lock poisoned");
            metadata::load_batch(&self.metadata_text, &self.cfg.cycle_times, &mut queue)?;
            if self.cfg.policy == SchedPolicy::Str {
                queue.resort();
            }
        }

        let loader = self.spawn_batch_loader();
        let (op_started_tx, op_started_rx) = bounded::<()>(1);
        let mut quantum_timer: Option<JoinHandle<()>> = None;

        loop {
            let mut current = {
                let mut queue = self.ready.lock().expect("ready queue lock poisoned");
                if queue.is_empty() {
                    break;
                }
                queue.pop().expect("non-empty ready queue yields a process")
            };
            current.set_state(PcbState::Running);

            let mut preempted = false;
            while !current.is_terminal() {
                match self.cfg.policy {
                    SchedPolicy::Rr => {
                        // The quantum timer arms lazily at the engine's first
                        // dispatched operation.
                        if quantum_timer.is_none() {
                            quantum_timer = Some(self.spawn_quantum_timer(op_started_rx.clone()));
                        }
                        if self.rr_flag.swap(false, Ordering::AcqRel) {
                            preempted = true;
                            break;
                        }
                        let _ = op_started_tx.try_send(());
                        self.execute_current(&mut current);
                        current.advance();
                    }
                    SchedPolicy::Str => {
                        if self.str_flag.swap(false, Ordering::AcqRel) {
                            preempted = true;
                            break;
                        }
                        let executed_ms = current.current_op().map_or(0, |op| op.ms);
                        self.execute_current(&mut current);
                        current.retire_ms(executed_ms);
                        current.advance();
                    }
                }
            }

            if preempted {
                self.requeue_interrupted(current);
            } else {
                // APP/finish already emitted the End-process event.
                current.set_state(PcbState::Exit);
            }
        }

        // Dropping the op-start sender ends the quantum timer's recv loop.
        drop(op_started_tx);
        if let Some(timer) = quantum_timer {
            timer.join().expect("quantum timer panicked");
        }
        loader.join().expect("batch loader panicked");

        Ok(self.trace)
    }

    /// Put a preempted process back in the queue and log the interrupt.
    fn requeue_interrupted(&mut self, process: Process) {
        let pid = process.pid();
        {
            let mut queue = self.ready.lock().expect("ready queue lock poisoned");
            queue.insert(process);
            queue.resort();
        }
        let message = match self.cfg.policy {
            SchedPolicy::Rr => "Process interrupted by round robin scheduling algorithm.",
            SchedPolicy::Str => "Process interrupted by STR scheduling algorithm.",
        };
        self.trace.emit(actor(pid), message);
    }

    /// Execute the operation at the program counter: emit its trace events,
    /// sleep its wall-clock cost, and touch the allocator or a device pool
    /// as the category requires.
    fn execute_current(&mut self, process: &mut Process) {
        let Some(op) = process.current_op() else {
            unreachable!("execute called past the final operation");
        };
        let pid = process.pid();

        match op.category {
            OpCategory::App => match op.descriptor {
                Descriptor::Begin => {
                    self.trace.emit("OS", format!("preparing process {pid}"));
                    self.trace.emit("OS", format!("starting process {pid}"));
                }
                Descriptor::Finish => {
                    self.trace.emit("OS", format!("End process {pid}"));
                }
                _ => unreachable!("APP operation outside begin/finish"),
            },
            OpCategory::Cpu => {
                self.timed_action(pid, "start processing action", op.ms, "end processing action");
            }
            OpCategory::Mem => match op.descriptor {
                Descriptor::Block => {
                    self.timed_action(pid, "start memory blocking", op.ms, "end memory blocking");
                }
                Descriptor::Allocate => {
                    self.trace.emit(actor(pid), "allocating memory");
                    sleep_ms(op.ms);
                    let addr = self.memory.allocate();
                    self.trace
                        .emit(actor(pid), format!("memory allocated at {}", format_address(addr)));
                }
                _ => unreachable!("MEM operation outside block/allocate"),
            },
            OpCategory::In | OpCategory::Out => self.device_action(process, op),
            OpCategory::Sys => unreachable!("SYS tokens never become operations"),
        }
    }

    /// CPU and memory-block operations: start event, sleep, end event.
    fn timed_action(&mut self, pid: u32, start: &str, ms: u64, end: &str) {
        self.trace.emit(actor(pid), start);
        sleep_ms(ms);
        self.trace.emit(actor(pid), end);
    }

    /// I/O operations: borrow a handle from the descriptor's pool for the
    /// duration of the sleep. The start timestamp is taken before the
    /// possibly blocking acquisition; the line is appended once the lease is
    /// granted, because it names the handle.
    fn device_action(&mut self, process: &mut Process, op: Operation) {
        let Some(kind) = op.descriptor.device_kind() else {
            unreachable!("I/O operation with non-device descriptor");
        };
        let direction = match op.category {
            OpCategory::In => "input",
            _ => "output",
        };
        let phrase = format!("{} {}", op.descriptor.as_str(), direction);
        let pid = process.pid();

        let started_at = self.trace.now();
        process.set_state(PcbState::Waiting);
        let lease = self.pools.acquire(kind);
        self.trace
            .emit_at(started_at, actor(pid), format!("start {} on {}", phrase, lease.handle()));
        sleep_ms(op.ms);
        drop(lease);
        process.set_state(PcbState::Running);
        self.trace.emit(actor(pid), format!("end {phrase}"));
    }

    /// Ten ticks, 100 ms apart: lock the queue, re-ingest the metadata text,
    /// and under STR raise the preemption flag.
    fn spawn_batch_loader(&self) -> JoinHandle<()> {
        let ready = Arc::clone(&self.ready);
        let text = Arc::clone(&self.metadata_text);
        let times = self.cfg.cycle_times;
        let policy = self.cfg.policy;
        let str_flag = Arc::clone(&self.str_flag);
        thread::Builder::new()
            .name("batch-loader".into())
            .spawn(move || {
                for _ in 0..BATCH_TICKS {
                    thread::sleep(BATCH_INTERVAL);
                    {
                        let mut queue = ready.lock().expect("ready queue lock poisoned");
                        metadata::load_batch(&text, &times, &mut queue)
                            .expect("metadata reparse failed after boot validation");
                    }
                    if policy == SchedPolicy::Str {
                        str_flag.store(true, Ordering::Release);
                    }
                }
            })
            .expect("spawn batch-loader thread")
    }

    /// Armed by the start of an operation, the timer sleeps one quantum and
    /// raises the RR flag. The engine dropping its sender ends the loop.
    fn spawn_quantum_timer(&self, op_started: Receiver<()>) -> JoinHandle<()> {
        let quantum = Duration::from_millis(self.cfg.quantum_ms);
        let rr_flag = Arc::clone(&self.rr_flag);
        thread::Builder::new()
            .name("quantum-timer".into())
            .spawn(move || {
                while op_started.recv().is_ok() {
                    thread::sleep(quantum);
                    rr_flag.store(true, Ordering::Release);
                }
            })
            .expect("spawn quantum-timer thread")
    }
}

fn actor(pid: u32) -> String {
    format!("Process {pid}")
}

fn sleep_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
