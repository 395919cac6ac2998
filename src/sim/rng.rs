//! Seeded random stream for puzzle generation
//!
//! A seed string always yields the same infinite sequence. Reproducibility is
//! guaranteed within this crate only; other implementations of the game are
//! free to use a different bit-level generator.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Deterministic float stream derived from a seed string
#[derive(Debug, Clone)]
pub struct PuzzleRng {
    rng: Pcg32,
}

/// Create a generator for `seed`
pub fn create_rng(seed: &str) -> PuzzleRng {
    PuzzleRng {
        rng: Pcg32::seed_from_u64(hash_seed(seed)),
    }
}

/// 31-multiplier string hash, folded to 32 bits
fn hash_seed(seed: &str) -> u64 {
    let h = seed
        .chars()
        .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32));
    h as u64
}

impl PuzzleRng {
    /// Next value in [0, 1)
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Uniform value in [lo, hi)
    #[inline]
    pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
        (self.next_f64() * (hi - lo) as f64) as f32 + lo
    }

    /// True with probability `p`
    #[inline]
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniformly pick one element
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        let idx = (self.next_f64() * items.len() as f64) as usize;
        &items[idx.min(items.len() - 1)]
    }
}
