//! Policy-aware ready queue and pid counter.
//!
//! Under RR the queue is plain FIFO by arrival. Under STR `resort` orders by
//! ascending remaining milliseconds with a stable sort, so processes with
//! equal keys keep arrival order (first seen dispatches first).

use crate::config::SchedPolicy;
use crate::process::{PcbState, Process};

/// Ordered container of ready processes plus the next-pid counter.
#[derive(Debug)]
pub struct ReadyQueue {
    procs: Vec<Process>,
    policy: SchedPolicy,
    next_pid: u32,
}

impl ReadyQueue {
    pub fn new(policy: SchedPolicy) -> Self {
        Self {
            procs: Vec::new(),
            policy,
            next_pid: 1,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.procs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    /// Pid the next arriving process will be stamped with.
    #[inline]
    pub fn next_pid(&self) -> u32 {
        self.next_pid
    }

    /// Hand out the next pid and advance the counter. Monotone across all
    /// batches, so re-ingestion can never duplicate a pid.
    pub fn allocate_pid(&mut self) -> u32 {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    /// Append at the tail and mark the process ready.
    pub fn insert(&mut self, mut process: Process) {
        process.set_state(PcbState::Ready);
        self.procs.push(process);
    }

    /// Remove and return the head of the queue.
    pub fn pop(&mut self) -> Option<Process> {
        if self.procs.is_empty() {
            None
        } else {
            Some(self.procs.remove(0))
        }
    }

    /// Re-establish dispatch order for the current policy: a no-op for RR,
    /// a stable ascending sort by remaining ms for STR.
    pub fn resort(&mut self) {
        match self.policy {
            SchedPolicy::Rr => {}
            SchedPolicy::Str => self.procs.sort_by_key(Process::rem_ms),
        }
    }
}
