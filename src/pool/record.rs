use std::fmt;
use std::path::PathBuf;

use nix::sys::time::TimeValLike;
use nix::time::{ClockId, clock_gettime};

/// Identifier used for jobs whose process could never be created. Never a
/// real child pid, and such records bypass the active index entirely.
pub const FAILED_SPAWN_PID: u32 = 0;

/// Bookkeeping for one solver child, from launch to reaping.
///
/// A record lives in exactly one place at a time: the active index while the
/// child runs, the completion log once it has been reaped. [`finish`] is
/// called exactly once, at the hand-over between the two.
///
/// [`finish`]: ProcessRecord::finish
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub input: PathBuf,
    started_ns: i64,
    /// Whole seconds from launch to reaping; -1 while running.
    pub elapsed_secs: i64,
    /// Exit code; -1 while running, or when the child did not exit normally.
    pub status: i32,
    pub ok: bool,
}

impl ProcessRecord {
    pub fn started(pid: u32, input: PathBuf) -> Self {
        Self {
            pid,
            input,
            started_ns: monotonic_ns(),
            elapsed_secs: -1,
            status: -1,
            ok: false,
        }
    }

    /// Record for a job whose process never came to life.
    pub fn spawn_failed(input: PathBuf) -> Self {
        Self {
            pid: FAILED_SPAWN_PID,
            input,
            started_ns: monotonic_ns(),
            elapsed_secs: 0,
            status: -1,
            ok: false,
        }
    }

    /// Fill in the completion half of the record. `code` is `None` when the
    /// child did not terminate normally (e.g. killed by a signal).
    pub fn finish(&mut self, code: Option<i32>, observed_ns: i64) {
        self.status = code.unwrap_or(-1);
        self.ok = code == Some(0);
        self.elapsed_secs = round_to_secs(observed_ns - self.started_ns);
    }
}

impl fmt::Display for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CHILD EXITED (PID={}; return {}OK; {} s)",
            self.pid,
            if self.ok { "" } else { "N" },
            self.elapsed_secs
        )
    }
}

/// Insertion-ordered, append-only log of reaped children. Written by the
/// completion notifier, drained and printed once at shutdown.
#[derive(Debug, Default)]
pub struct CompletionLog {
    records: Vec<ProcessRecord>,
}

impl CompletionLog {
    pub fn push(&mut self, record: ProcessRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.iter()
    }
}

pub(crate) fn monotonic_ns() -> i64 {
    clock_gettime(ClockId::CLOCK_MONOTONIC)
        .unwrap()
        .num_nanoseconds()
}

fn round_to_secs(ns: i64) -> i64 {
    let mut secs = ns / 1_000_000_000;
    let rem = ns % 1_000_000_000;
    if rem > 500_000_000 {
        secs += 1;
    } else if rem < -500_000_000 {
        secs -= 1;
    }
    secs
}
