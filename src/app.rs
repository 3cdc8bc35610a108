use std::path::{Path, PathBuf};

use circuit_shell::command::{self, Command, Origin};
use circuit_shell::pool::{DEFAULT_PARALLELISM, ProcessPool, SolverSpec};
use circuit_shell::prelude::*;
use clap::Parser;
use nix::unistd::{AccessFlags, access};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(version, about = "Queue and run circuit-maze solve jobs as child processes")]
pub struct Cli {
    /// Maximum number of concurrently running solver processes
    /// (absent means unbounded)
    max_children: Option<String>,

    /// Path to the solver executable
    #[arg(long, env = "CIRCUIT_SHELL_SOLVER", default_value = "CircuitRouter-ParSolver")]
    solver: PathBuf,

    /// Thread count passed to the solver
    #[arg(short = 't', long, default_value_t = DEFAULT_PARALLELISM)]
    parallelism: u32,
}

impl Cli {
    fn max_children(&self) -> Result<Option<usize>> {
        let Some(raw) = self.max_children.as_deref() else {
            return Ok(None);
        };
        match raw.parse::<i64>() {
            Ok(limit) if limit <= 0 => {
                bail!("max_children must be a positive integer (got {raw})")
            }
            Ok(limit) => Ok(Some(limit as usize)),
            // an unparsable limit falls back to unbounded
            Err(_) => Ok(None),
        }
    }
}

fn check_solver(path: &Path) -> Result<()> {
    access(path, AccessFlags::X_OK)
        .with_context(|| format!("could not find an executable solver at {}", path.display()))
}

fn print_help() {
    eprintln!("Invalid command entered");
    eprintln!("Command list:");
    eprintln!("run <inputfile>\t: queue a solver run for inputfile");
    eprintln!("exit\t\t: drain the pool and print every child's result");
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let max_children = cli.max_children()?;
    check_solver(&cli.solver)?;

    let mut pool = ProcessPool::new(
        SolverSpec {
            path: cli.solver,
            parallelism: cli.parallelism,
        },
        max_children,
    );

    // EOF on stdin drains exactly like a typed `exit`
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match command::parse_line(&line, Origin::Stdin).command {
            Command::Run { input } => pool.submit(&input).await?,
            Command::Exit => break,
            Command::Invalid => print_help(),
        }
    }

    for record in pool.drain().await?.iter() {
        println!("{record}");
    }
    println!("END.");
    Ok(())
}
