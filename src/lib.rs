//! Shell core for queueing circuit-maze solver runs as child processes.
//!
//! The solver itself is an external executable; this crate only schedules
//! it: admission control against a concurrency ceiling, asynchronous reaping
//! of finished children, and a final report when the pool drains.

pub mod command;
pub mod pool;
pub mod prelude;
pub mod table;
