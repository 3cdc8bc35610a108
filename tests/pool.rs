use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use circuit_shell::pool::{FAILED_SPAWN_PID, ProcessPool, SolverSpec};
use tempfile::TempDir;

// Stand-in for the solver: the first line of the input file is how long to
// sleep, the second is the exit code. Invoked as `solver -t <n> <input>`.
const FAKE_SOLVER: &str = "#!/bin/sh\nsleep \"$(sed -n 1p \"$3\")\"\nexit \"$(sed -n 2p \"$3\")\"\n";

fn fake_solver(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("fake-solver");
    fs::write(&path, FAKE_SOLVER)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

fn job(dir: &Path, name: &str, sleep: &str, exit_code: u32) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, format!("{sleep}\n{exit_code}\n"))?;
    Ok(path)
}

fn pool(solver: PathBuf, limit: Option<usize>) -> ProcessPool {
    ProcessPool::new(
        SolverSpec {
            path: solver,
            parallelism: 1,
        },
        limit,
    )
}

#[tokio::test]
async fn drain_with_no_jobs_reports_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let mut pool = pool(fake_solver(dir.path())?, None);

    let log = pool.drain().await?;
    assert!(log.is_empty());
    Ok(())
}

#[tokio::test]
async fn successful_run_is_logged_ok() -> Result<()> {
    let dir = TempDir::new()?;
    let input = job(dir.path(), "quick.txt", "0", 0)?;
    let mut pool = pool(fake_solver(dir.path())?, None);

    pool.submit(&input).await?;
    assert_eq!(pool.active_count(), 1);

    let log = pool.drain().await?;
    assert_eq!(log.len(), 1);
    let record = log.iter().next().unwrap();
    assert!(record.ok);
    assert_eq!(record.status, 0);
    assert_ne!(record.pid, FAILED_SPAWN_PID);
    assert!(record.elapsed_secs >= 0);
    assert_eq!(pool.active_count(), 0);
    Ok(())
}

#[tokio::test]
async fn failing_solver_is_logged_not_ok() -> Result<()> {
    let dir = TempDir::new()?;
    let input = job(dir.path(), "broken.txt", "0", 3)?;
    let mut pool = pool(fake_solver(dir.path())?, None);

    pool.submit(&input).await?;
    let log = pool.drain().await?;

    assert_eq!(log.len(), 1);
    let record = log.iter().next().unwrap();
    assert!(!record.ok);
    assert_eq!(record.status, 3);
    assert!(record.elapsed_secs >= 0);
    Ok(())
}

#[tokio::test]
async fn admission_ceiling_blocks_until_a_slot_frees() -> Result<()> {
    let dir = TempDir::new()?;
    let slow = job(dir.path(), "slow.txt", "1", 0)?;
    let quick_a = job(dir.path(), "quick_a.txt", "0.2", 0)?;
    let quick_b = job(dir.path(), "quick_b.txt", "0", 0)?;
    let mut pool = pool(fake_solver(dir.path())?, Some(2));

    pool.submit(&slow).await?;
    pool.submit(&quick_a).await?;
    assert_eq!(pool.active_count(), 2);

    // the third submit must park until one of the first two is reaped
    pool.submit(&quick_b).await?;
    assert!(!pool.completed().is_empty());
    assert!(pool.active_count() <= 2);

    let log = pool.drain().await?;
    assert_eq!(log.len(), 3);
    Ok(())
}

#[tokio::test]
async fn drain_reaps_every_child_exactly_once() -> Result<()> {
    let dir = TempDir::new()?;
    let mut pool = pool(fake_solver(dir.path())?, Some(4));

    let mut inputs = Vec::new();
    for i in 0..6 {
        inputs.push(job(dir.path(), &format!("job{i}.txt"), "0.1", 0)?);
    }
    for input in &inputs {
        pool.submit(input).await?;
    }

    let log = pool.drain().await?;
    assert_eq!(log.len(), inputs.len());
    assert_eq!(pool.active_count(), 0);

    // every reaped pid is distinct and no longer active
    let pids: HashSet<u32> = pool.completed().iter().map(|r| r.pid).collect();
    assert_eq!(pids.len(), inputs.len());
    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_recorded_as_failed() -> Result<()> {
    let dir = TempDir::new()?;
    let input = job(dir.path(), "orphan.txt", "0", 0)?;
    let mut pool = pool(dir.path().join("no-such-solver"), None);

    pool.submit(&input).await?;

    // the job never became a process, so it goes straight to the log
    assert_eq!(pool.active_count(), 0);
    let log = pool.drain().await?;
    assert_eq!(log.len(), 1);
    let record = log.iter().next().unwrap();
    assert!(!record.ok);
    assert_eq!(record.pid, FAILED_SPAWN_PID);
    assert_eq!(record.elapsed_secs, 0);
    Ok(())
}
