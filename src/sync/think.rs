use std::{hint::black_box, thread, time::Duration};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// What a philosopher does between meals. The protocol only needs it to return.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Think {
    Idle,
    /// Sleep a random time in `min_ms..=max_ms`
    Nap { min_ms: u64, max_ms: u64 },
    /// Count the primes up to `limit` by trial division
    Primes { limit: u64 },
}

impl Think {
    /// Around 65ms of cpu per thought on a desktop
    pub const PRIMES_LIMIT: u64 = 0x1_0000 - 1;

    // The result only keeps the work from being optimised away
    pub fn run(&self) -> u64 {
        match *self {
            Think::Idle => 0,
            Think::Nap { min_ms, max_ms } => {
                let t = rand::thread_rng().gen_range(min_ms..=max_ms.max(min_ms));
                thread::sleep(Duration::from_millis(t));
                t
            }
            Think::Primes { limit } => count_primes(black_box(limit)),
        }
    }
}

impl Default for Think {
    fn default() -> Self {
        Think::Nap {
            min_ms: 0,
            max_ms: 2,
        }
    }
}

fn count_primes(limit: u64) -> u64 {
    (2..=limit).filter(|&k| is_prime(k)).count() as u64
}

fn is_prime(k: u64) -> bool {
    (2..).take_while(|d| d * d <= k).all(|d| k % d != 0)
}
