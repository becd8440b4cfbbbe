//! Pseudo-random number generation for syscalls 15-17.
//!
//! The original seeds the C standard library's `srand`/`rand`; here a
//! reseedable `rand::rngs::StdRng` gives the same "explicit seed, repeatable
//! stream" contract without reaching for a process-global generator.

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};

pub struct Rng {
    inner: StdRng,
}

impl Rng {
    pub fn seeded(seed: u64) -> Self {
        Self { inner: StdRng::seed_from_u64(seed) }
    }

    pub fn from_time() -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::seeded(seed)
    }

    pub fn reseed(&mut self, seed: u64) {
        self.inner = StdRng::seed_from_u64(seed);
    }

    pub fn next_i32(&mut self) -> i32 {
        self.inner.gen()
    }

    pub fn next_f32(&mut self) -> f32 {
        self.inner.gen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reseeding_to_the_same_value_reproduces_the_stream() {
        let mut a = Rng::seeded(42);
        let mut b = Rng::seeded(42);
        for _ in 0..8 {
            assert_eq!(a.next_i32(), b.next_i32());
        }
    }

    #[test]
    fn reseed_resets_the_stream() {
        let mut rng = Rng::seeded(1);
        let first_run: Vec<i32> = (0..4).map(|_| rng.next_i32()).collect();
        rng.reseed(1);
        let second_run: Vec<i32> = (0..4).map(|_| rng.next_i32()).collect();
        assert_eq!(first_run, second_run);
    }
}
