//! Configuration-file parsing.
//!
//! The file is line-oriented `key: value` pairs bracketed between
//! `Start Simulator Configuration File` and `End Simulator Configuration
//! File`. Parsing produces an immutable [`SimConfig`] snapshot: scheduling
//! policy and quantum, memory geometry, the per-device cycle-time table, and
//! per-device handle quantities. All validation happens here; a parsed
//! config cannot fail later at runtime.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::devices::{DeviceKind, NUM_DEVICE_KINDS};

/// CPU scheduling discipline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedPolicy {
    /// Round-Robin with a quantum timer.
    Rr,
    /// Shortest-Time-Remaining, preempted at each batch arrival.
    Str,
}

/// Where the rendered trace goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogMode {
    Monitor,
    File,
    Both,
}

/// Device/action classes with a configured ms-per-cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleKind {
    Processor,
    Memory,
    HardDrive,
    Keyboard,
    Scanner,
    Monitor,
    Projector,
}

/// Number of cycle-time classes.
pub const NUM_CYCLE_KINDS: usize = 7;

impl CycleKind {
    /// Stable index into the cycle-time table.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            CycleKind::Processor => 0,
            CycleKind::Memory => 1,
            CycleKind::HardDrive => 2,
            CycleKind::Keyboard => 3,
            CycleKind::Scanner => 4,
            CycleKind::Monitor => 5,
            CycleKind::Projector => 6,
        }
    }
}

/// Immutable ms-per-cycle table, one entry per [`CycleKind`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleTimes {
    ms_per_cycle: [u64; NUM_CYCLE_KINDS],
}

impl CycleTimes {
    /// Milliseconds per cycle for one kind.
    #[inline]
    pub fn get(&self, kind: CycleKind) -> u64 {
        self.ms_per_cycle[kind.index()]
    }

    pub(crate) fn set(&mut self, kind: CycleKind, ms: u64) {
        self.ms_per_cycle[kind.index()] = ms;
    }
}

/// Parsed configuration snapshot. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    pub version: f64,
    pub metadata_path: PathBuf,
    pub log_mode: LogMode,
    /// Required when `log_mode` routes to a file.
    pub log_file_path: Option<PathBuf>,
    pub policy: SchedPolicy,
    pub quantum_ms: u64,
    /// Normalized to kB.
    pub system_memory_kb: u64,
    /// Normalized to kB.
    pub block_size_kb: u64,
    pub cycle_times: CycleTimes,
    /// Handle count per device kind, indexed by [`DeviceKind::index`].
    pub device_quantities: [usize; NUM_DEVICE_KINDS],
}

/// Errors from configuration parsing. All are fatal at boot.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// Config path unreadable.
    Io(io::Error),
    /// Line is neither a bracket line nor `key: value`.
    MalformedLine { line: String },
    /// Key not in the recognized set.
    UnknownKey { key: String },
    /// Value failed to parse or is out of range for its key.
    InvalidValue { key: String, value: String },
    /// Scheduling code other than `RR` or `STR`.
    UnknownSchedulerCode { value: String },
    /// Log mode other than the three recognized phrases.
    UnknownLogMode { value: String },
    /// Device quantity below 1.
    QuantityOutOfRange { key: String, value: String },
    /// A required key never appeared.
    MissingKey { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cannot read configuration file: {err}"),
            Self::MalformedLine { line } => write!(f, "malformed configuration line: {line:?}"),
            Self::UnknownKey { key } => write!(f, "unknown configuration key: {key:?}"),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value {value:?} for configuration key {key:?}")
            }
            Self::UnknownSchedulerCode { value } => {
                write!(f, "unknown CPU scheduling code {value:?} (expected RR or STR)")
            }
            Self::UnknownLogMode { value } => write!(
                f,
                "unknown log mode {value:?} (expected Log to Monitor, Log to File, or Log to Both)"
            ),
            Self::QuantityOutOfRange { key, value } => {
                write!(f, "device quantity {value:?} for {key:?} must be >= 1")
            }
            Self::MissingKey { key } => write!(f, "missing required configuration key {key:?}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

const START_BRACKET: &[&str] = &["Start", "Simulator", "Configuration", "File"];
const END_BRACKET: &[&str] = &["End", "Simulator", "Configuration", "File"];

/// Parse the configuration file at `path`.
pub fn parse_config_file(path: &Path) -> Result<SimConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config_str(&text)
}

/// Parse configuration text. Idempotent on identical input.
pub fn parse_config_str(text: &str) -> Result<SimConfig, ConfigError> {
    let mut builder = Builder::default();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || is_bracket_line(line) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(ConfigError::MalformedLine { line: line.to_string() });
        };
        builder.apply(key.trim(), value.trim())?;
    }
    builder.finish()
}

fn is_bracket_line(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    words == START_BRACKET || words == END_BRACKET
}

#[derive(Default)]
struct Builder {
    version: Option<f64>,
    metadata_path: Option<PathBuf>,
    log_mode: Option<LogMode>,
    log_file_path: Option<PathBuf>,
    policy: Option<SchedPolicy>,
    quantum_ms: Option<u64>,
    system_memory_kb: Option<u64>,
    block_size_kb: Option<u64>,
    cycle_times: [Option<u64>; NUM_CYCLE_KINDS],
    quantities: [Option<usize>; NUM_DEVICE_KINDS],
}

impl Builder {
    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "Version/Phase" => {
                let version: f64 = value
                    .parse()
                    .ok()
                    .filter(|v: &f64| v.is_finite() && *v >= 0.0)
                    .ok_or_else(|| invalid(key, value))?;
                self.version = Some(version);
            }
            "File Path" => self.metadata_path = Some(PathBuf::from(value)),
            "Log" => {
                self.log_mode = Some(match value {
                    "Log to Monitor" => LogMode::Monitor,
                    "Log to File" => LogMode::File,
                    "Log to Both" => LogMode::Both,
                    _ => return Err(ConfigError::UnknownLogMode { value: value.to_string() }),
                });
            }
            "Log File Path" => self.log_file_path = Some(PathBuf::from(value)),
            "CPU Scheduling Code" => {
                self.policy = Some(match value {
                    "RR" => SchedPolicy::Rr,
                    "STR" => SchedPolicy::Str,
                    _ => {
                        return Err(ConfigError::UnknownSchedulerCode { value: value.to_string() })
                    }
                });
            }
            "Quantum Number {msec}" => self.quantum_ms = Some(parse_u64(key, value)?),
            "System memory {kbytes}" => self.system_memory_kb = Some(parse_u64(key, value)?),
            "System memory {Mbytes}" => {
                self.system_memory_kb = Some(parse_u64(key, value)?.saturating_mul(1_000));
            }
            "System memory {Gbytes}" => {
                self.system_memory_kb = Some(parse_u64(key, value)?.saturating_mul(1_000_000));
            }
            "Memory block size {kbytes}" => self.block_size_kb = Some(parse_u64(key, value)?),
            "Memory block size {Mbytes}" => {
                self.block_size_kb = Some(parse_u64(key, value)?.saturating_mul(1_000));
            }
            "Memory block size {Gbytes}" => {
                self.block_size_kb = Some(parse_u64(key, value)?.saturating_mul(1_000_000));
            }
            "Processor cycle time {msec}" => self.set_cycle(CycleKind::Processor, key, value)?,
            "Memory cycle time {msec}" => self.set_cycle(CycleKind::Memory, key, value)?,
            "Hard drive cycle time {msec}" => self.set_cycle(CycleKind::HardDrive, key, value)?,
            "Keyboard cycle time {msec}" => self.set_cycle(CycleKind::Keyboard, key, value)?,
            "Scanner cycle time {msec}" => self.set_cycle(CycleKind::Scanner, key, value)?,
            // The monitor entry is historically spelled "display time";
            // the generic spelling is accepted as well.
            "Monitor display time {msec}" | "Monitor cycle time {msec}" => {
                self.set_cycle(CycleKind::Monitor, key, value)?
            }
            "Projector cycle time {msec}" => self.set_cycle(CycleKind::Projector, key, value)?,
            "Hard drive quantity" => self.set_quantity(DeviceKind::HardDrive, key, value)?,
            "Keyboard quantity" => self.set_quantity(DeviceKind::Keyboard, key, value)?,
            "Scanner quantity" => self.set_quantity(DeviceKind::Scanner, key, value)?,
            "Monitor quantity" => self.set_quantity(DeviceKind::Monitor, key, value)?,
            "Projector quantity" => self.set_quantity(DeviceKind::Projector, key, value)?,
            _ => return Err(ConfigError::UnknownKey { key: key.to_string() }),
        }
        Ok(())
    }

    fn set_cycle(&mut self, kind: CycleKind, key: &str, value: &str) -> Result<(), ConfigError> {
        self.cycle_times[kind.index()] = Some(parse_u64(key, value)?);
        Ok(())
    }

    fn set_quantity(&mut self, kind: DeviceKind, key: &str, value: &str) -> Result<(), ConfigError> {
        let n = value.parse::<usize>().map_err(|_| invalid(key, value))?;
        if n < 1 {
            return Err(ConfigError::QuantityOutOfRange {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        self.quantities[kind.index()] = Some(n);
        Ok(())
    }

    fn finish(self) -> Result<SimConfig, ConfigError> {
        let missing = |key| ConfigError::MissingKey { key };

        let mut cycle_times = CycleTimes::default();
        for (&(kind, key), slot) in CYCLE_KEYS.iter().zip(self.cycle_times) {
            cycle_times.set(kind, slot.ok_or(ConfigError::MissingKey { key })?);
        }

        let log_mode = self.log_mode.ok_or_else(|| missing("Log"))?;
        let log_file_path = self.log_file_path;
        if log_mode != LogMode::Monitor && log_file_path.is_none() {
            return Err(missing("Log File Path"));
        }

        // Quantity keys are optional; an absent device defaults to one
        // handle.
        let mut device_quantities = [1usize; NUM_DEVICE_KINDS];
        for (slot, parsed) in device_quantities.iter_mut().zip(self.quantities.iter()) {
            if let Some(n) = parsed {
                *slot = *n;
            }
        }

        Ok(SimConfig {
            version: self.version.ok_or_else(|| missing("Version/Phase"))?,
            metadata_path: self.metadata_path.ok_or_else(|| missing("File Path"))?,
            log_mode,
            log_file_path,
            policy: self.policy.ok_or_else(|| missing("CPU Scheduling Code"))?,
            quantum_ms: self.quantum_ms.ok_or_else(|| missing("Quantum Number {msec}"))?,
            system_memory_kb: self
                .system_memory_kb
                .ok_or_else(|| missing("System memory {kbytes|Mbytes|Gbytes}"))?,
            block_size_kb: self
                .block_size_kb
                .ok_or_else(|| missing("Memory block size {kbytes|Mbytes|Gbytes}"))?,
            cycle_times,
            device_quantities,
        })
    }
}

/// Cycle-kind table order paired with the key reported when absent.
const CYCLE_KEYS: [(CycleKind, &str); NUM_CYCLE_KINDS] = [
    (CycleKind::Processor, "Processor cycle time {msec}"),
    (CycleKind::Memory, "Memory cycle time {msec}"),
    (CycleKind::HardDrive, "Hard drive cycle time {msec}"),
    (CycleKind::Keyboard, "Keyboard cycle time {msec}"),
    (CycleKind::Scanner, "Scanner cycle time {msec}"),
    (CycleKind::Monitor, "Monitor display time {msec}"),
    (CycleKind::Projector, "Projector cycle time {msec}"),
];

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
