//! Command interpreter: one text line in, one parsed request out.
//!
//! Purely a parser, no side effects. The scheduler does not care how a line
//! arrived; a remote line differs only in carrying the client's reply FIFO
//! as its first token.

use std::path::PathBuf;

/// Longest accepted input-file path, in bytes. Longer paths are silently
/// truncated, never rejected.
pub const MAX_PATH_BYTES: usize = 1 << 10;

/// Where a request line came from. Pipe-origin lines lead with the reply
/// path, and may not stop the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Stdin,
    Pipe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run { input: PathBuf },
    Exit,
    Invalid,
}

/// A parsed request: the command plus, for remote lines, the path of the
/// reply channel the one-line answer should be written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub reply_to: Option<PathBuf>,
    pub command: Command,
}

pub fn parse_line(line: &str, origin: Origin) -> Request {
    let mut tokens = line.split_whitespace();

    let reply_to = match origin {
        Origin::Stdin => None,
        Origin::Pipe => match tokens.next() {
            Some(path) => Some(PathBuf::from(path)),
            None => {
                return Request {
                    reply_to: None,
                    command: Command::Invalid,
                };
            }
        },
    };

    let command = match tokens.next() {
        Some("run") => match (tokens.next(), tokens.next()) {
            (Some(path), None) => Command::Run {
                input: truncate_path(path),
            },
            _ => Command::Invalid,
        },
        Some("exit") if origin == Origin::Stdin => match tokens.next() {
            None => Command::Exit,
            Some(_) => Command::Invalid,
        },
        _ => Command::Invalid,
    };

    Request { reply_to, command }
}

fn truncate_path(path: &str) -> PathBuf {
    if path.len() <= MAX_PATH_BYTES {
        return PathBuf::from(path);
    }
    let mut end = MAX_PATH_BYTES;
    while !path.is_char_boundary(end) {
        end -= 1;
    }
    PathBuf::from(&path[..end])
}
