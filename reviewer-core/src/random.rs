//! Injectable randomness for reviewer selection.
//!
//! `ReviewService` owns one `RandomSource` for its whole lifetime. The source
//! is never reseeded per call; a seeded instance makes every assignment
//! reproducible.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::model::UserId;

/// Source of uniform random choices used by the selector and the
/// reassignment engine.
pub trait RandomSource: Send + Sync {
    /// Shuffle `ids` in place, every permutation equally likely.
    fn shuffle(&self, ids: &mut [UserId]);

    /// Pick an index in `0..len` uniformly. `len` is never zero.
    fn pick_index(&self, len: usize) -> usize;
}

/// `RandomSource` backed by a `StdRng` behind a mutex.
pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    /// Seed once from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic source for reproducible runs and tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        // A panic while holding the lock cannot leave the RNG in an invalid
        // state, so a poisoned lock is still usable.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for StdRandom {
    fn shuffle(&self, ids: &mut [UserId]) {
        self.with_rng(|rng| ids.shuffle(rng));
    }

    fn pick_index(&self, len: usize) -> usize {
        self.with_rng(|rng| rng.gen_range(0..len))
    }
}
