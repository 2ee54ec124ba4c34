//! Metadata-stream parsing and re-entrant batch ingestion.
//!
//! A metadata source is a stream of `C{descriptor}cycles;` tokens, several
//! per line, bracketed between `Start Program Meta-Data Code` and
//! `End Program Meta-Data Code`. The first token must be `S{begin}` and the
//! second `A{begin}`; each `A{begin}`..`A{finish}` span (inclusive) assembles
//! one process, and `S{finish}` stops ingestion for the batch.
//!
//! [`load_batch`] is re-entrant: the engine invokes it once at boot and the
//! batch-loader timer invokes it again at each tick, appending to the same
//! ready queue. Pids stay unique because the queue's counter only moves
//! forward.

use std::fmt;
use std::io;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::CycleTimes;
use crate::process::{Descriptor, OpCategory, Operation, Process};
use crate::ready_queue::ReadyQueue;

/// Errors from metadata parsing. All are fatal at boot; re-ingestion of
/// text that parsed at boot cannot fail.
#[derive(Debug)]
#[non_exhaustive]
pub enum MetadataError {
    /// Metadata path unreadable.
    Io(io::Error),
    /// Text between tokens that matches no token at all.
    BadToken { fragment: String },
    /// Descriptor unknown or not legal for the category.
    DescriptorMismatch { code: char, descriptor: String },
    /// Cycle count does not fit the counter.
    CyclesOutOfRange { literal: String },
    /// Stream did not open with `S{begin}`.
    MissingSysBegin,
    /// Second token of the stream was not `A{begin}`.
    MissingAppBegin,
    /// Token legal on its own but out of place: `S{begin}` mid-stream,
    /// an operation outside any process, or `A{begin}` inside one.
    UnexpectedToken { token: String },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cannot read metadata file: {err}"),
            Self::BadToken { fragment } => {
                write!(f, "metadata text does not match the token grammar: {fragment:?}")
            }
            Self::DescriptorMismatch { code, descriptor } => {
                write!(f, "descriptor {descriptor:?} is not valid for category '{code}'")
            }
            Self::CyclesOutOfRange { literal } => {
                write!(f, "cycle count {literal:?} is out of range")
            }
            Self::MissingSysBegin => write!(f, "metadata stream must open with S{{begin}}"),
            Self::MissingAppBegin => {
                write!(f, "metadata stream must continue with A{{begin}} after S{{begin}}")
            }
            Self::UnexpectedToken { token } => {
                write!(f, "metadata token out of place: {token}")
            }
        }
    }
}

impl std::error::Error for MetadataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

const START_BRACKET: &[&str] = &["Start", "Program", "Meta-Data", "Code"];
const END_BRACKET: &[&str] = &["End", "Program", "Meta-Data", "Code"];

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(S|A|P|I|O|M)\{([a-z ]+)\}([0-9]+);").expect("token regex compiles")
    })
}

/// Parse one batch of `text` from the beginning and append every assembled
/// process to `queue`, stamping pids from the queue's counter. Returns the
/// number of processes ingested.
pub fn load_batch(
    text: &str,
    times: &CycleTimes,
    queue: &mut ReadyQueue,
) -> Result<usize, MetadataError> {
    let mut asm = Assembler::new(times);

    'lines: for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || is_bracket_line(line) {
            continue;
        }

        let mut last_end = 0usize;
        for m in token_re().captures_iter(line) {
            let whole = m.get(0).expect("capture 0 always present");
            reject_gap(&line[last_end..whole.start()])?;
            last_end = whole.end();

            asm.push(&m[1], &m[2], &m[3], queue)?;
            if asm.done {
                // Everything after S{finish} is ignored.
                break 'lines;
            }
        }
        reject_gap(&line[last_end..])?;
    }

    Ok(asm.ingested)
}

fn is_bracket_line(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    words == START_BRACKET || words == END_BRACKET
}

fn reject_gap(gap: &str) -> Result<(), MetadataError> {
    if gap.trim().is_empty() {
        Ok(())
    } else {
        Err(MetadataError::BadToken {
            fragment: gap.trim().to_string(),
        })
    }
}

/// Per-batch assembly state: token position, the open process, and the
/// ingestion count.
struct Assembler<'a> {
    times: &'a CycleTimes,
    seen: usize,
    current: Option<Vec<Operation>>,
    ingested: usize,
    done: bool,
}

impl<'a> Assembler<'a> {
    fn new(times: &'a CycleTimes) -> Self {
        Self {
            times,
            seen: 0,
            current: None,
            ingested: 0,
            done: false,
        }
    }

    fn push(
        &mut self,
        code: &str,
        descriptor: &str,
        cycles: &str,
        queue: &mut ReadyQueue,
    ) -> Result<(), MetadataError> {
        let code_char = code.chars().next().expect("regex yields one category char");
        let category =
            OpCategory::from_code(code_char).expect("regex restricts category codes");

        let descriptor = Descriptor::parse(descriptor)
            .filter(|d| category.allows(*d))
            .ok_or_else(|| MetadataError::DescriptorMismatch {
                code: code_char,
                descriptor: descriptor.to_string(),
            })?;

        let cycles: u64 = cycles.parse().map_err(|_| MetadataError::CyclesOutOfRange {
            literal: cycles.to_string(),
        })?;

        let index = self.seen;
        self.seen += 1;

        // S{begin} opens the stream and S{finish} closes it; neither becomes
        // an operation of any process.
        if index == 0 {
            if (category, descriptor) != (OpCategory::Sys, Descriptor::Begin) {
                return Err(MetadataError::MissingSysBegin);
            }
            return Ok(());
        }
        if index == 1 && (category, descriptor) != (OpCategory::App, Descriptor::Begin) {
            return Err(MetadataError::MissingAppBegin);
        }
        if (category, descriptor) == (OpCategory::Sys, Descriptor::Finish) {
            self.done = true;
            self.current = None;
            return Ok(());
        }
        if category == OpCategory::Sys {
            return Err(unexpected_token(category, descriptor, cycles));
        }

        let ms = descriptor
            .cycle_kind()
            .map(|kind| self.times.get(kind))
            .unwrap_or(0)
            .saturating_mul(cycles);
        let op = Operation {
            category,
            descriptor,
            cycles,
            ms,
        };

        match (category, descriptor) {
            (OpCategory::App, Descriptor::Begin) => {
                if self.current.is_some() {
                    return Err(unexpected_token(category, descriptor, cycles));
                }
                self.current = Some(vec![op]);
            }
            (OpCategory::App, Descriptor::Finish) => {
                let Some(mut ops) = self.current.take() else {
                    return Err(unexpected_token(category, descriptor, cycles));
                };
                ops.push(op);
                let pid = queue.allocate_pid();
                queue.insert(Process::new(pid, ops));
                self.ingested += 1;
            }
            _ => match self.current.as_mut() {
                Some(ops) => ops.push(op),
                None => return Err(unexpected_token(category, descriptor, cycles)),
            },
        }
        Ok(())
    }
}

fn unexpected_token(category: OpCategory, descriptor: Descriptor, cycles: u64) -> MetadataError {
    MetadataError::UnexpectedToken {
        token: format!("{}{{{}}}{};", category.code(), descriptor.as_str(), cycles),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CycleKind, SchedPolicy};
    use crate::process::PcbState;

    fn times() -> CycleTimes {
        let mut t = CycleTimes::default();
        t.set(CycleKind::Processor, 10);
        t.set(CycleKind::Memory, 5);
        t.set(CycleKind::HardDrive, 40);
        t.set(CycleKind::Keyboard, 60);
        t.set(CycleKind::Scanner, 30);
        t.set(CycleKind::Monitor, 20);
        t.set(CycleKind::Projector, 25);
        t
    }

    fn queue() -> ReadyQueue {
        ReadyQueue::new(SchedPolicy::Rr)
    }

    #[test]
    fn assembles_one_process_with_computed_ms() {
        let text = "\
Start Program Meta-Data Code
S{begin}0; A{begin}0; P{run}3; M{allocate}2; A{finish}0;
S{finish}0;
End Program Meta-Data Code
";
        let mut q = queue();
        let n = load_batch(text, &times(), &mut q).unwrap();
        assert_eq!(n, 1);

        let p = q.pop().unwrap();
        assert_eq!(p.pid(), 1);
        assert_eq!(p.state(), PcbState::Ready);
        assert_eq!(p.num_ops(), 4);
        // 3 cycles x 10 ms + 2 cycles x 5 ms.
        assert_eq!(p.rem_ms(), 40);

        let first = p.current_op().unwrap();
        assert_eq!(first.descriptor, Descriptor::Begin);
        assert_eq!(first.ms, 0);
    }

    #[test]
    fn assembles_multiple_processes_in_arrival_order() {
        let text = "S{begin}0; A{begin}0; P{run}1; A{finish}0; \
                    A{begin}0; I{hard drive}2; A{finish}0; S{finish}0;";
        let mut q = queue();
        let n = load_batch(text, &times(), &mut q).unwrap();
        assert_eq!(n, 2);
        assert_eq!(q.pop().unwrap().pid(), 1);
        let second = q.pop().unwrap();
        assert_eq!(second.pid(), 2);
        // 2 cycles x 40 ms for the hard drive input.
        assert_eq!(second.rem_ms(), 80);
    }

    #[test]
    fn reingestion_continues_pid_sequence() {
        let text = "S{begin}0; A{begin}0; P{run}1; A{finish}0; S{finish}0;";
        let mut q = queue();
        load_batch(text, &times(), &mut q).unwrap();
        load_batch(text, &times(), &mut q).unwrap();
        load_batch(text, &times(), &mut q).unwrap();

        let pids: Vec<u32> = std::iter::from_fn(|| q.pop()).map(|p| p.pid()).collect();
        assert_eq!(pids, vec![1, 2, 3]);
    }

    #[test]
    fn tokens_after_sys_finish_are_ignored() {
        let text = "S{begin}0; A{begin}0; P{run}1; A{finish}0; S{finish}0; this is not a token";
        let mut q = queue();
        assert_eq!(load_batch(text, &times(), &mut q).unwrap(), 1);
    }

    #[test]
    fn process_left_open_at_sys_finish_is_dropped() {
        let text = "S{begin}0; A{begin}0; P{run}1; S{finish}0;";
        let mut q = queue();
        assert_eq!(load_batch(text, &times(), &mut q).unwrap(), 0);
        assert!(q.is_empty());
        // The pid counter never moved for the dropped process.
        assert_eq!(q.next_pid(), 1);
    }

    #[test]
    fn rejects_stream_not_opening_with_sys_begin() {
        let mut q = queue();
        let err = load_batch("A{begin}0; A{finish}0;", &times(), &mut q).unwrap_err();
        assert!(matches!(err, MetadataError::MissingSysBegin));
    }

    #[test]
    fn rejects_second_token_not_app_begin() {
        let mut q = queue();
        let err = load_batch("S{begin}0; P{run}3;", &times(), &mut q).unwrap_err();
        assert!(matches!(err, MetadataError::MissingAppBegin));
    }

    #[test]
    fn rejects_category_descriptor_mismatch() {
        let mut q = queue();
        let err = load_batch(
            "S{begin}0; A{begin}0; I{monitor}3; A{finish}0; S{finish}0;",
            &times(),
            &mut q,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MetadataError::DescriptorMismatch { code: 'I', .. }
        ));
    }

    #[test]
    fn rejects_unknown_descriptor() {
        let mut q = queue();
        let err = load_batch(
            "S{begin}0; A{begin}0; I{hard driv}3; A{finish}0; S{finish}0;",
            &times(),
            &mut q,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::DescriptorMismatch { .. }));
    }

    #[test]
    fn rejects_text_outside_token_grammar() {
        let mut q = queue();
        let err = load_batch(
            "S{begin}0; A{begin}0; garbage P{run}3; A{finish}0; S{finish}0;",
            &times(),
            &mut q,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::BadToken { .. }));
    }

    #[test]
    fn rejects_operation_outside_process() {
        let mut q = queue();
        let err = load_batch(
            "S{begin}0; A{begin}0; A{finish}0; P{run}3; S{finish}0;",
            &times(),
            &mut q,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::UnexpectedToken { .. }));
    }

    #[test]
    fn rejects_nested_app_begin() {
        let mut q = queue();
        let err = load_batch(
            "S{begin}0; A{begin}0; A{begin}0; A{finish}0; S{finish}0;",
            &times(),
            &mut q,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::UnexpectedToken { .. }));
    }

    #[test]
    fn rejects_cycle_count_overflow() {
        let mut q = queue();
        let err = load_batch(
            "S{begin}0; A{begin}0; P{run}99999999999999999999999; A{finish}0; S{finish}0;",
            &times(),
            &mut q,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::CyclesOutOfRange { .. }));
    }
}
