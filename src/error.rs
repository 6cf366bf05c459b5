use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {phase} range: min {min_ms} ms > max {max_ms} ms")]
    InvalidRange {
        phase: &'static str,
        min_ms: u64,
        max_ms: u64,
    },

    // 1 人だと左右の箸が同じになってしまう
    #[error("need at least 2 philosophers, got {0}")]
    TooFewPhilosophers(usize),

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to register signal handler: {0}")]
    Signal(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
