//! Weak sources of randomness (WSR).
//!
//! The WSR is the classical seed that picks which Mermin circuit runs in each
//! round and later feeds the second input of the two-source extractor. It is
//! only assumed to be a Santha-Vazirani source, so any reasonable generator
//! works; the default reads the OS CSPRNG.
//!
//! Every draw must be fresh: the circuit choice and both extractor stages
//! consume separate draws and rely on them being independent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::bits::bytes_to_bits;
use crate::error::{Result, RngError};

/// Producer of WSR bits.
pub trait WsrGenerator: Send + Sync {
    /// Return exactly `num_bits` values, each 0 or 1.
    fn generate(&self, num_bits: usize) -> Result<Vec<u8>>;
}

impl<F> WsrGenerator for F
where
    F: Fn(usize) -> Vec<u8> + Send + Sync,
{
    fn generate(&self, num_bits: usize) -> Result<Vec<u8>> {
        Ok(self(num_bits))
    }
}

/// Shared, type-erased generator.
pub type SharedWsr = Arc<dyn WsrGenerator>;

/// WSR read from the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsWsr;

impl WsrGenerator for OsWsr {
    fn generate(&self, num_bits: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; num_bits.div_ceil(8)];
        getrandom::fill(&mut buf)
            .map_err(|e| RngError::Wsr(format!("OS CSPRNG unavailable: {e}")))?;
        let mut bits = bytes_to_bits(&buf);
        bits.truncate(num_bits);
        Ok(bits)
    }
}

/// Generate `num_bits` WSR bits from the OS CSPRNG.
pub fn generate_wsr(num_bits: usize) -> Result<Vec<u8>> {
    OsWsr.generate(num_bits)
}

/// Deterministic WSR expanded from a seed with SHA-256 in counter mode.
///
/// Block `i` of the stream is `SHA-256(seed || i)`. Each call consumes whole
/// blocks from a shared counter, so consecutive draws never overlap while a
/// fresh generator with the same seed replays the same sequence of draws.
/// Intended for reproducible runs and tests.
#[derive(Debug)]
pub struct HashWsr {
    seed: [u8; 32],
    next_block: AtomicU64,
}

impl HashWsr {
    pub fn new(seed: &[u8]) -> Self {
        Self {
            seed: Sha256::digest(seed).into(),
            next_block: AtomicU64::new(0),
        }
    }

    /// Number of 32-byte blocks consumed so far.
    pub fn blocks_used(&self) -> u64 {
        self.next_block.load(Ordering::Relaxed)
    }
}

impl WsrGenerator for HashWsr {
    fn generate(&self, num_bits: usize) -> Result<Vec<u8>> {
        let n_bytes = num_bits.div_ceil(8);
        let blocks = n_bytes.div_ceil(32) as u64;
        let start = self.next_block.fetch_add(blocks, Ordering::Relaxed);
        let mut out = Vec::with_capacity(n_bytes + 32);
        for counter in start..start + blocks {
            let mut h = Sha256::new();
            h.update(self.seed);
            h.update(counter.to_le_bytes());
            out.extend_from_slice(&h.finalize());
        }
        let mut bits = bytes_to_bits(&out);
        bits.truncate(num_bits);
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::is_bit_string;

    #[test]
    fn test_os_wsr_length_and_values() {
        for n in [0, 1, 7, 8, 9, 300] {
            let bits = generate_wsr(n).unwrap();
            assert_eq!(bits.len(), n);
            assert!(is_bit_string(&bits));
        }
    }

    #[test]
    fn test_hash_wsr_deterministic() {
        let a = HashWsr::new(b"seed").generate(500).unwrap();
        let b = HashWsr::new(b"seed").generate(500).unwrap();
        assert_eq!(a, b);
        assert!(is_bit_string(&a));
    }

    #[test]
    fn test_hash_wsr_consecutive_draws_differ() {
        let wsr = HashWsr::new(b"seed");
        let circuits = wsr.generate(300).unwrap();
        let ext1 = wsr.generate(1000).unwrap();
        let ext2 = wsr.generate(1000).unwrap();
        assert_ne!(&ext1[..300], &circuits[..]);
        assert_ne!(ext1, ext2);
        assert_eq!(wsr.blocks_used(), 2 + 4 + 4);
    }

    #[test]
    fn test_hash_wsr_replays_draw_sequence() {
        let a = HashWsr::new(b"replay");
        let b = HashWsr::new(b"replay");
        assert_eq!(a.generate(40).unwrap(), b.generate(40).unwrap());
        assert_eq!(a.generate(400).unwrap(), b.generate(400).unwrap());
    }

    #[test]
    fn test_hash_wsr_seeds_differ() {
        let a = HashWsr::new(b"a").generate(256).unwrap();
        let b = HashWsr::new(b"b").generate(256).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_bits_consume_nothing() {
        let wsr = HashWsr::new(b"empty");
        assert!(wsr.generate(0).unwrap().is_empty());
        assert_eq!(wsr.blocks_used(), 0);
    }

    #[test]
    fn test_closure_is_generator() {
        let ones = |n: usize| vec![1u8; n];
        assert_eq!(ones.generate(3).unwrap(), vec![1, 1, 1]);
    }

    #[test]
    fn test_failing_generator_propagates() {
        struct Broken;
        impl WsrGenerator for Broken {
            fn generate(&self, _num_bits: usize) -> Result<Vec<u8>> {
                Err(RngError::Wsr("entropy source offline".to_string()))
            }
        }
        assert!(matches!(Broken.generate(8), Err(RngError::Wsr(_))));
    }
}
