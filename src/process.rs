//! Process records and their operation streams.
//!
//! A process is an ordered list of operations, a program counter, and the
//! total milliseconds left in not-yet-executed operations. The engine steps
//! the counter forward one operation at a time; a preempted process keeps its
//! counter and re-enters the ready queue.

use serde::{Deserialize, Serialize};

use crate::config::CycleKind;
use crate::devices::DeviceKind;

/// Operation category from the metadata stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCategory {
    /// `S`: brackets a whole workload stream.
    Sys,
    /// `A`: brackets one process.
    App,
    /// `P`: processor work.
    Cpu,
    /// `I`: input device.
    In,
    /// `O`: output device.
    Out,
    /// `M`: memory action.
    Mem,
}

impl OpCategory {
    /// Category letter as it appears in metadata tokens.
    pub fn code(self) -> char {
        match self {
            OpCategory::Sys => 'S',
            OpCategory::App => 'A',
            OpCategory::Cpu => 'P',
            OpCategory::In => 'I',
            OpCategory::Out => 'O',
            OpCategory::Mem => 'M',
        }
    }

    pub(crate) fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'S' => OpCategory::Sys,
            'A' => OpCategory::App,
            'P' => OpCategory::Cpu,
            'I' => OpCategory::In,
            'O' => OpCategory::Out,
            'M' => OpCategory::Mem,
            _ => return None,
        })
    }

    /// Whether `descriptor` is legal under this category.
    pub fn allows(self, descriptor: Descriptor) -> bool {
        use Descriptor::*;
        match self {
            OpCategory::Sys | OpCategory::App => matches!(descriptor, Begin | Finish),
            OpCategory::Cpu => descriptor == Run,
            OpCategory::In => matches!(descriptor, HardDrive | Keyboard | Scanner),
            OpCategory::Out => matches!(descriptor, HardDrive | Monitor | Projector),
            OpCategory::Mem => matches!(descriptor, Block | Allocate),
        }
    }
}

/// Operation descriptor, the braced word of a metadata token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Descriptor {
    Begin,
    Finish,
    Run,
    HardDrive,
    Keyboard,
    Scanner,
    Monitor,
    Projector,
    Block,
    Allocate,
}

impl Descriptor {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "begin" => Descriptor::Begin,
            "finish" => Descriptor::Finish,
            "run" => Descriptor::Run,
            "hard drive" => Descriptor::HardDrive,
            "keyboard" => Descriptor::Keyboard,
            "scanner" => Descriptor::Scanner,
            "monitor" => Descriptor::Monitor,
            "projector" => Descriptor::Projector,
            "block" => Descriptor::Block,
            "allocate" => Descriptor::Allocate,
            _ => return None,
        })
    }

    /// Descriptor spelling as it appears in metadata tokens.
    pub fn as_str(self) -> &'static str {
        match self {
            Descriptor::Begin => "begin",
            Descriptor::Finish => "finish",
            Descriptor::Run => "run",
            Descriptor::HardDrive => "hard drive",
            Descriptor::Keyboard => "keyboard",
            Descriptor::Scanner => "scanner",
            Descriptor::Monitor => "monitor",
            Descriptor::Projector => "projector",
            Descriptor::Block => "block",
            Descriptor::Allocate => "allocate",
        }
    }

    /// The cycle-time class this descriptor is billed against, if any.
    /// `begin`/`finish` take no time.
    pub fn cycle_kind(self) -> Option<CycleKind> {
        Some(match self {
            Descriptor::Run => CycleKind::Processor,
            Descriptor::HardDrive => CycleKind::HardDrive,
            Descriptor::Keyboard => CycleKind::Keyboard,
            Descriptor::Scanner => CycleKind::Scanner,
            Descriptor::Monitor => CycleKind::Monitor,
            Descriptor::Projector => CycleKind::Projector,
            Descriptor::Block | Descriptor::Allocate => CycleKind::Memory,
            Descriptor::Begin | Descriptor::Finish => return None,
        })
    }

    /// The device pool this descriptor draws from, for I/O operations.
    pub fn device_kind(self) -> Option<DeviceKind> {
        Some(match self {
            Descriptor::HardDrive => DeviceKind::HardDrive,
            Descriptor::Keyboard => DeviceKind::Keyboard,
            Descriptor::Scanner => DeviceKind::Scanner,
            Descriptor::Monitor => DeviceKind::Monitor,
            Descriptor::Projector => DeviceKind::Projector,
            _ => return None,
        })
    }
}

/// One metadata step: category, descriptor, cycle count, and the wall-clock
/// cost computed at parse time (`cycles x ms-per-cycle`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub category: OpCategory,
    pub descriptor: Descriptor,
    pub cycles: u64,
    pub ms: u64,
}

/// Process control block state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcbState {
    /// Built by the loader, not yet queued.
    Start,
    /// In the ready queue.
    Ready,
    /// Being stepped by the engine.
    Running,
    /// Blocked on a device handle or holding one through its sleep.
    Waiting,
    /// Final operation executed.
    Exit,
}

/// A synthetic process: its operations, program counter, remaining
/// milliseconds, pid, and PCB state.
#[derive(Clone, Debug)]
pub struct Process {
    ops: Vec<Operation>,
    pc: usize,
    rem_ms: u64,
    pid: u32,
    state: PcbState,
}

impl Process {
    /// Build a process from its assembled operations. `rem_ms` starts as the
    /// sum of every operation's ms; the pid is stamped by the loader.
    pub fn new(pid: u32, ops: Vec<Operation>) -> Self {
        debug_assert!(!ops.is_empty(), "process with no operations");
        let rem_ms = ops.iter().map(|op| op.ms).sum();
        Self {
            ops,
            pc: 0,
            rem_ms,
            pid,
            state: PcbState::Start,
        }
    }

    #[inline]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[inline]
    pub fn state(&self) -> PcbState {
        self.state
    }

    pub fn set_state(&mut self, state: PcbState) {
        self.state = state;
    }

    /// Program counter: index of the next operation to execute.
    #[inline]
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Milliseconds of configured work not yet executed. Excludes any time
    /// spent waiting on device contention.
    #[inline]
    pub fn rem_ms(&self) -> u64 {
        self.rem_ms
    }

    #[inline]
    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// The operation at the program counter, or `None` when terminal.
    pub fn current_op(&self) -> Option<Operation> {
        self.ops.get(self.pc).copied()
    }

    /// All operations completed; the process has exited or is about to.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.pc >= self.ops.len()
    }

    /// Step past the operation just executed.
    pub fn advance(&mut self) {
        debug_assert!(self.pc < self.ops.len(), "advance past final operation");
        self.pc += 1;
    }

    /// Deduct an executed operation's cost from the remaining-ms key.
    pub fn retire_ms(&mut self, ms: u64) {
        self.rem_ms = self.rem_ms.saturating_sub(ms);
    }
}
