//! Seeded pseudo-random engine shared by the gridbang opcodes.
//!
//! The engine is a Mersenne Twister (MT19937) seeded with the legacy Knuth
//! line-25 recurrence. Every draw is a pure function of the seed and the exact
//! sequence of calls made so far, so grid runs replay bit-for-bit.

use rand::rand_core::impls;
use rand::{RngCore, SeedableRng};
use std::fmt;
use thiserror::Error;

const N: usize = 624;
const M: usize = 397;
const MATRIX_A: u32 = 0x9908_b0df;
const UPPER_MASK: u32 = 0x8000_0000;
const LOWER_MASK: u32 = 0x7fff_ffff;

/// Seed substituted for zero, which would otherwise produce an all-zero state.
pub const DEFAULT_SEED: u32 = 4357;

/// Errors emitted by bounded draws.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RngError {
    /// `choice` was asked for a value in an empty range.
    #[error("range must be non-zero")]
    EmptyRange,
}

/// Mersenne Twister generator with a cached gaussian sample.
#[derive(Clone)]
pub struct Mt19937 {
    state: [u32; N],
    index: usize,
    saved_normal: Option<f64>,
}

impl fmt::Debug for Mt19937 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mt19937")
            .field("index", &self.index)
            .field("saved_normal", &self.saved_normal)
            .finish()
    }
}

impl Mt19937 {
    /// Create a generator from the low 32 bits of `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut low = (seed & 0xffff_ffff) as u32;
        if low == 0 {
            low = DEFAULT_SEED;
        }
        let mut state = [0u32; N];
        state[0] = low;
        for i in 1..N {
            state[i] = state[i - 1].wrapping_mul(69069);
        }
        Self {
            state,
            index: N,
            saved_normal: None,
        }
    }

    fn regenerate(&mut self) {
        let mag = |y: u32| if y & 1 == 0 { 0 } else { MATRIX_A };
        for kk in 0..N - M {
            let y = (self.state[kk] & UPPER_MASK) | (self.state[kk + 1] & LOWER_MASK);
            self.state[kk] = self.state[kk + M] ^ (y >> 1) ^ mag(y);
        }
        for kk in N - M..N - 1 {
            let y = (self.state[kk] & UPPER_MASK) | (self.state[kk + 1] & LOWER_MASK);
            self.state[kk] = self.state[kk + M - N] ^ (y >> 1) ^ mag(y);
        }
        let y = (self.state[N - 1] & UPPER_MASK) | (self.state[0] & LOWER_MASK);
        self.state[N - 1] = self.state[M - 1] ^ (y >> 1) ^ mag(y);
        self.index = 0;
    }

    /// Draw the next tempered 32-bit word.
    pub fn next_word(&mut self) -> u32 {
        if self.index >= N {
            self.regenerate();
        }
        let mut y = self.state[self.index];
        self.index += 1;
        y ^= y >> 11;
        y ^= (y << 7) & 0x9d2c_5680;
        y ^= (y << 15) & 0xefc6_0000;
        y ^= y >> 18;
        y
    }

    /// Uniform double in `[0, 1)` with 53 bits of resolution; consumes two words.
    pub fn next_f64(&mut self) -> f64 {
        let a = f64::from(self.next_word() >> 5);
        let b = f64::from(self.next_word() >> 6);
        (a * 67_108_864.0 + b) / 9_007_199_254_740_992.0
    }

    /// Standard normal sample via the polar method.
    ///
    /// Each accepted pair yields two samples; the second is cached and returned
    /// by the next call without touching the word stream.
    pub fn normal(&mut self) -> f64 {
        if let Some(saved) = self.saved_normal.take() {
            return saved;
        }
        loop {
            let u = 2.0 * self.next_f64() - 1.0;
            let v = 2.0 * self.next_f64() - 1.0;
            let r2 = u * u + v * v;
            if r2 > 1.0 || r2 == 0.0 {
                continue;
            }
            let scale = (-2.0 * r2.ln() / r2).sqrt();
            self.saved_normal = Some(v * scale);
            return u * scale;
        }
    }

    /// Gaussian sample with mean `mu` and standard deviation `sigma`.
    pub fn gaussian(&mut self, mu: f64, sigma: f64) -> f64 {
        mu + self.normal() * sigma
    }

    /// Unbiased integer in `[0, range)` using rejection sampling.
    pub fn choice(&mut self, range: u32) -> Result<u32, RngError> {
        if range == 0 {
            return Err(RngError::EmptyRange);
        }
        let bucket = u32::MAX / range;
        let limit = bucket * range;
        loop {
            let r = self.next_word();
            if r < limit {
                return Ok(r / bucket);
            }
        }
    }
}

impl RngCore for Mt19937 {
    fn next_u32(&mut self) -> u32 {
        self.next_word()
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        impls::fill_bytes_via_next(self, dst);
    }
}

impl SeedableRng for Mt19937 {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from(u32::from_le_bytes(seed)))
    }

    fn seed_from_u64(state: u64) -> Self {
        Self::new(state)
    }
}
