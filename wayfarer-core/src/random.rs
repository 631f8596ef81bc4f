//! Random number generation provider abstraction.
//!
//! Endpoint selection shuffles candidate lists. Routing that through a
//! provider keeps production on the thread-local RNG while tests can pin a
//! seed and get reproducible orders.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::cell::RefCell;
use std::sync::{Mutex, PoisonError};

/// Provider trait for random number generation.
///
/// Object safe so that a runtime can hold it as `Arc<dyn RandomProvider>`
/// and share it across threads.
pub trait RandomProvider: Send + Sync {
    /// Generate a random index in `0..upper`.
    ///
    /// `upper` must be non-zero.
    fn random_index(&self, upper: usize) -> usize;
}

/// Shuffle `items` in place with a Fisher-Yates pass driven by `random`.
pub fn shuffle<T>(random: &dyn RandomProvider, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = random.random_index(i + 1);
        items.swap(i, j);
    }
}

/// Production random provider using thread-local RNG.
///
/// # Example
///
/// ```rust
/// use wayfarer_core::{RandomProvider, ThreadRandomProvider};
///
/// let random = ThreadRandomProvider::new();
/// let index = random.random_index(10);
/// assert!(index < 10);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandomProvider;

impl ThreadRandomProvider {
    /// Create a new production random provider.
    pub fn new() -> Self {
        Self
    }
}

thread_local! {
    static RNG: RefCell<rand::rngs::ThreadRng> = RefCell::new(rand::rng());
}

impl RandomProvider for ThreadRandomProvider {
    fn random_index(&self, upper: usize) -> usize {
        RNG.with(|rng| rng.borrow_mut().random_range(0..upper))
    }
}

/// Deterministic random provider seeded with a fixed value.
///
/// Two providers built from the same seed produce the same sequence.
#[derive(Debug)]
pub struct SeededRandomProvider {
    rng: Mutex<ChaCha8Rng>,
}

impl SeededRandomProvider {
    /// Create a provider from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl RandomProvider for SeededRandomProvider {
    fn random_index(&self, upper: usize) -> usize {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(0..upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_provider_is_reproducible() {
        let a = SeededRandomProvider::new(42);
        let b = SeededRandomProvider::new(42);
        let from_a: Vec<usize> = (0..16).map(|_| a.random_index(1000)).collect();
        let from_b: Vec<usize> = (0..16).map(|_| b.random_index(1000)).collect();
        assert_eq!(from_a, from_b);
    }

    #[test]
    fn test_shuffle_keeps_every_item() {
        let random = SeededRandomProvider::new(7);
        let mut items: Vec<u32> = (0..20).collect();
        shuffle(&random, &mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_handles_short_slices() {
        let random = ThreadRandomProvider::new();
        let mut empty: Vec<u8> = Vec::new();
        shuffle(&random, &mut empty);
        assert!(empty.is_empty());

        let mut single = vec![1];
        shuffle(&random, &mut single);
        assert_eq!(single, vec![1]);
    }
}
