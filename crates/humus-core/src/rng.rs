//! Deterministic random number generator
//!
//! Uses xorshift64 so a run seeded from `Settings::seed` replays the same
//! sequence on every platform.

use serde::{Deserialize, Serialize};

/// A seeded xorshift64 generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        // xorshift is stuck at zero
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Get the current state
    pub fn state(&self) -> u64 {
        self.state
    }

    /// Generate the next raw u64 value
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Generate a value in `[0, bound)`, or `None` for an empty range
    pub fn below(&mut self, bound: u64) -> Option<u64> {
        if bound == 0 {
            None
        } else {
            Some(self.next_u64() % bound)
        }
    }
}

impl Default for SeededRng {
    fn default() -> Self {
        Self::new(12345)
    }
}
