use thiserror::Error;

use crate::sync::{ForkId, PhilosopherId};

/// A message that cannot happen under a correct topology and transport.
///
/// Fatal for the philosopher that received it: its loop stops and the harness
/// is expected to stop the whole table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("philosopher {philosopher} got a message about fork {fork}, which is not next to it")]
    NotAdjacent {
        philosopher: PhilosopherId,
        fork: ForkId,
    },
    #[error("philosopher {philosopher} was granted fork {fork}, which it already holds")]
    DuplicateGrant {
        philosopher: PhilosopherId,
        fork: ForkId,
    },
    #[error("philosopher {philosopher} got a message about fork {fork} from {from}, who does not share it")]
    UnexpectedSender {
        philosopher: PhilosopherId,
        fork: ForkId,
        from: PhilosopherId,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("a ring needs at least 2 philosophers, got {0}")]
    TooFewPhilosophers(usize),
    #[error(transparent)]
    Violation(#[from] ProtocolViolation),
    #[error("fork {fork} is held by both philosopher {first} and philosopher {second}")]
    DoubleHeld {
        fork: ForkId,
        first: PhilosopherId,
        second: PhilosopherId,
    },
    #[error("philosopher {0} panicked")]
    Panicked(PhilosopherId),
    #[error("philosopher {0} did not leave the table in time")]
    Unresponsive(PhilosopherId),
    #[error("invalid table configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
