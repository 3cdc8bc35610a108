//! Process-pool scheduler for solver children.
//!
//! The pool owns all shared bookkeeping: the active-process index, the
//! completion log and the concurrency ceiling. Child terminations are not
//! handled in a signal handler; each launched child gets a detached waiter
//! task whose `wait()` is woken by the runtime's SIGCHLD-driven reaper, and
//! the observation is forwarded as a message on a completion channel. The
//! pool is the only consumer of that channel, so the "check capacity, then
//! wait" sequence cannot lose a wakeup: an event arriving in between simply
//! stays queued until the pool awaits it.

mod record;

pub use record::{CompletionLog, FAILED_SPAWN_PID, ProcessRecord};

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use tokio::process::Command;
use tokio::sync::mpsc;

use crate::prelude::*;
use crate::table::OpenTable;

/// Default thread count handed to the solver (`-t`).
pub const DEFAULT_PARALLELISM: u32 = 8;

/// Index capacity for an unbounded pool; a bounded pool is pre-sized from
/// its ceiling instead.
const UNBOUNDED_INITIAL_CAPACITY: usize = 1 << 8;

/// How a solver child is launched: `<path> -t <parallelism> <input>`.
#[derive(Debug, Clone)]
pub struct SolverSpec {
    pub path: PathBuf,
    pub parallelism: u32,
}

/// One child-termination observation, sent by a waiter task.
#[derive(Debug)]
struct ExitEvent {
    pid: u32,
    status: std::io::Result<ExitStatus>,
    observed_ns: i64,
}

/// Internal-consistency violations. None of these are recoverable: each one
/// means the active/finished bookkeeping no longer reflects reality, so the
/// process exits with a class-specific status instead of limping on.
#[derive(Debug)]
pub enum Fatal {
    /// A freshly launched child collided with a pid already tracked as
    /// active.
    DuplicateChild { pid: u32 },
    /// A reaped pid was not present in the active index.
    UntrackedChild { pid: u32 },
    /// The completion channel closed while children were still tracked.
    NotifierGone { active: usize },
}

impl Fatal {
    pub fn exit_code(&self) -> i32 {
        match self {
            Fatal::DuplicateChild { .. } | Fatal::UntrackedChild { .. } => 2,
            Fatal::NotifierGone { .. } => 3,
        }
    }
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::DuplicateChild { pid } => {
                write!(f, "pid {pid} is already tracked as an active child")
            }
            Fatal::UntrackedChild { pid } => {
                write!(f, "reaped pid {pid} is not tracked as an active child")
            }
            Fatal::NotifierGone { active } => {
                write!(f, "completion channel closed with {active} children active")
            }
        }
    }
}

impl std::error::Error for Fatal {}

/// Scheduler for solver child processes.
///
/// `submit` admits and launches one job, blocking (asynchronously) while the
/// pool is at its ceiling; `drain` waits out every active child and hands
/// back the completion log for reporting. There is no cancellation: exit is
/// run-to-completion, and a hung solver keeps the drain waiting.
pub struct ProcessPool {
    solver: SolverSpec,
    max_children: Option<usize>,
    active: OpenTable<u32, ProcessRecord>,
    finished: CompletionLog,
    exits_tx: mpsc::UnboundedSender<ExitEvent>,
    exits_rx: mpsc::UnboundedReceiver<ExitEvent>,
}

impl ProcessPool {
    pub fn new(solver: SolverSpec, max_children: Option<usize>) -> Self {
        // a bounded pool holds at most max_children entries, so twice that
        // keeps the index under half full and it never rehashes mid-run
        let capacity = match max_children {
            Some(limit) => limit * 2,
            None => UNBOUNDED_INITIAL_CAPACITY,
        };
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            solver,
            max_children,
            active: OpenTable::with_capacity(capacity),
            finished: CompletionLog::default(),
            exits_tx,
            exits_rx,
        }
    }

    /// Number of children currently tracked as active. Always equal to the
    /// size of the active index.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn completed(&self) -> &CompletionLog {
        &self.finished
    }

    /// Admit and launch one solve job. Returns as soon as the child is
    /// launched and registered, without waiting for it to finish.
    ///
    /// A failure to create the process is not fatal: it is logged and the
    /// job is recorded as failed in the completion log, so nothing is
    /// silently dropped. Index inconsistencies abort with [`Fatal`].
    pub async fn submit(&mut self, input: &Path) -> Result<()> {
        self.absorb_exits()?;
        while self.at_capacity() {
            self.wait_for_exit().await?;
        }

        let mut cmd = Command::new(&self.solver.path);
        cmd.arg("-t")
            .arg(self.solver.parallelism.to_string())
            .arg(input);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("failed to launch solver for {}: {err}", input.display());
                self.finished.push(ProcessRecord::spawn_failed(input.to_path_buf()));
                return Ok(());
            }
        };
        let pid = child.id().expect("child has no pid before it is polled");
        debug!("launched solver pid {pid} for {}", input.display());

        let record = ProcessRecord::started(pid, input.to_path_buf());
        if self.active.insert(pid, record).is_err() {
            error!("pid {pid} is already active; active/finished bookkeeping is broken");
            return Err(Fatal::DuplicateChild { pid }.into());
        }

        let exits = self.exits_tx.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            let _ = exits.send(ExitEvent {
                pid,
                status,
                observed_ns: record::monotonic_ns(),
            });
        });

        Ok(())
    }

    /// Stop admitting work and wait for every active child to finish, then
    /// hand back the completion log for reporting.
    pub async fn drain(&mut self) -> Result<&CompletionLog> {
        self.absorb_exits()?;
        while !self.active.is_empty() {
            self.wait_for_exit().await?;
        }
        Ok(&self.finished)
    }

    fn at_capacity(&self) -> bool {
        self.max_children
            .is_some_and(|limit| self.active.len() >= limit)
    }

    /// Apply every completion that has already been observed, without
    /// blocking. Near-simultaneous terminations each carry their own event,
    /// so none can be collapsed into another or lost.
    fn absorb_exits(&mut self) -> Result<()> {
        while let Ok(event) = self.exits_rx.try_recv() {
            self.apply_exit(event)?;
        }
        Ok(())
    }

    /// Park until at least one completion is handed over.
    async fn wait_for_exit(&mut self) -> Result<()> {
        match self.exits_rx.recv().await {
            Some(event) => self.apply_exit(event),
            None => Err(Fatal::NotifierGone {
                active: self.active.len(),
            }
            .into()),
        }
    }

    /// Move one record from the active index to the completion log.
    fn apply_exit(&mut self, event: ExitEvent) -> Result<()> {
        let Some(mut record) = self.active.remove(&event.pid) else {
            error!("reaped pid {} was never tracked as active", event.pid);
            return Err(Fatal::UntrackedChild { pid: event.pid }.into());
        };

        let code = match event.status {
            Ok(status) => status.code(),
            Err(ref err) => {
                warn!("wait on pid {} failed: {err}", event.pid);
                None
            }
        };
        record.finish(code, event.observed_ns);
        debug!(
            "reaped solver pid {} for {} (ok: {}, {} s)",
            record.pid,
            record.input.display(),
            record.ok,
            record.elapsed_secs
        );
        self.finished.push(record);
        Ok(())
    }
}
