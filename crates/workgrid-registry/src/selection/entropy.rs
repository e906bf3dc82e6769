//! External entropy providers
//!
//! The selection engine never generates randomness itself. Production code
//! injects [`OsEntropy`]; tests inject a fixed or seeded source so draws are
//! reproducible.

use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

/// Bytes drawn per entropy request
pub const ENTROPY_LEN: usize = 32;

/// Provider of a fresh unpredictable value on demand
pub trait EntropySource: Send + Sync {
    fn next_entropy(&self) -> Vec<u8>;
}

/// Operating system randomness
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn next_entropy(&self) -> Vec<u8> {
        let mut buf = vec![0u8; ENTROPY_LEN];
        OsRng.fill_bytes(&mut buf);
        buf
    }
}

/// Always returns the same bytes
#[derive(Debug, Clone)]
pub struct FixedEntropy(pub Vec<u8>);

impl FixedEntropy {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }
}

impl EntropySource for FixedEntropy {
    fn next_entropy(&self) -> Vec<u8> {
        self.0.clone()
    }
}

/// Reproducible stream of entropy from a 64-bit seed
#[derive(Debug)]
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn next_entropy(&self) -> Vec<u8> {
        let mut buf = vec![0u8; ENTROPY_LEN];
        self.rng.lock().fill_bytes(&mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_entropy_is_fresh() {
        let source = OsEntropy;
        let a = source.next_entropy();
        assert_eq!(a.len(), ENTROPY_LEN);
        assert_ne!(a, source.next_entropy());
    }

    #[test]
    fn test_seeded_entropy_reproducible() {
        let a = SeededEntropy::new(42);
        let b = SeededEntropy::new(42);
        let first = a.next_entropy();
        assert_eq!(first, b.next_entropy());
        assert_ne!(first, a.next_entropy());
    }
}
