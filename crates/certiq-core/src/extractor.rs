//! Randomness extraction.
//!
//! The raw bits of a Mermin run are only weakly random. Extraction combines
//! them with an independent WSR in two stages:
//!
//! ```text
//! raw bits (n) ─┐
//!               ├─ stage 1: two-source cyclic-shift extractor ─→ m bits
//! WSR (n) ──────┘                                                 │ seed
//! WSR (c·m) ──── stage 2: privacy amplification (optional) ──────┴─→ (c-1)·m bits
//! ```
//!
//! [`Extractor`] is the seam for remote extraction services;
//! [`LocalExtractor`] computes both stages in-process.

use serde::{Deserialize, Serialize};

use crate::bits::{PackedBits, bits_to_bytes, is_bit_string, pack_lsb_first};
use crate::error::{Result, RngError};

/// Everything an extractor needs, derived from a sampling result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorParams {
    /// Stage 1 input length `n`.
    pub ext1_input_num_bits: usize,
    /// Stage 1 output length `m`.
    pub ext1_output_num_bits: usize,
    /// First `n` raw bits.
    pub ext1_raw_bits: Vec<u8>,
    /// `n` WSR bits for stage 1.
    pub ext1_wsr_bits: Vec<u8>,
    /// Stage 2 seed length (`m` with privacy amplification, else 0).
    pub ext2_seed_num_bits: usize,
    /// Stage 2 multiplier `c` (0 disables stage 2).
    pub ext2_wsr_multiplier: usize,
    /// `c·m` WSR bits for stage 2.
    pub ext2_wsr_bits: Vec<u8>,
    /// Correlator the entropy bound was computed from.
    pub certified_correlator: f64,
    /// Min-entropy per raw bit.
    pub min_entropy_rate: f64,
}

impl ExtractorParams {
    /// Whether stage 2 runs.
    pub fn privacy_amplification(&self) -> bool {
        self.ext2_wsr_multiplier >= 2
    }

    /// Number of bits [`LocalExtractor`] returns for these parameters.
    pub fn output_num_bits(&self) -> usize {
        if self.privacy_amplification() {
            (self.ext2_wsr_multiplier - 1).saturating_mul(self.ext2_seed_num_bits)
        } else {
            self.ext1_output_num_bits
        }
    }

    /// Stage 1 raw bits in the LSB-first byte layout extraction services read.
    pub fn ext1_raw_bytes(&self) -> Vec<u8> {
        pack_lsb_first(&self.ext1_raw_bits)
    }

    /// Stage 1 WSR, LSB-first like [`Self::ext1_raw_bytes`].
    pub fn ext1_wsr_bytes(&self) -> Vec<u8> {
        pack_lsb_first(&self.ext1_wsr_bits)
    }

    /// Check lengths and bit values.
    pub fn validate(&self) -> Result<()> {
        let n = self.ext1_input_num_bits;
        let m = self.ext1_output_num_bits;
        let bad = |msg: String| Err(RngError::InvalidExtractorParams(msg));
        if n == 0 || m == 0 {
            return bad(format!("stage 1 sizes must be positive (n={n}, m={m})"));
        }
        if m > n {
            return bad(format!("stage 1 output {m} exceeds input {n}"));
        }
        if self.ext1_raw_bits.len() != n || self.ext1_wsr_bits.len() != n {
            return bad(format!(
                "stage 1 expects {n} raw and WSR bits, got {} and {}",
                self.ext1_raw_bits.len(),
                self.ext1_wsr_bits.len()
            ));
        }
        if !is_bit_string(&self.ext1_raw_bits) || !is_bit_string(&self.ext1_wsr_bits) {
            return bad("stage 1 inputs must contain only 0/1 values".to_string());
        }
        match self.ext2_wsr_multiplier {
            0 => Ok(()),
            1 => bad("stage 2 multiplier must be at least 2".to_string()),
            c => {
                if self.ext2_seed_num_bits != m {
                    return bad(format!(
                        "stage 2 seed length {} must equal stage 1 output {m}",
                        self.ext2_seed_num_bits
                    ));
                }
                let Some(expected) = c.checked_mul(m) else {
                    return bad(format!("stage 2 size overflows: multiplier {c} x {m} bits"));
                };
                if self.ext2_wsr_bits.len() != expected {
                    return bad(format!(
                        "stage 2 expects {expected} WSR bits, got {}",
                        self.ext2_wsr_bits.len()
                    ));
                }
                if !is_bit_string(&self.ext2_wsr_bits) {
                    return bad("stage 2 WSR must contain only 0/1 values".to_string());
                }
                Ok(())
            }
        }
    }
}

/// A randomness extractor, local or remote.
pub trait Extractor: Send + Sync {
    /// Extract uniform bits (0/1 values).
    fn extract(&self, params: &ExtractorParams) -> Result<Vec<u8>>;

    /// Extract and pack MSB-first into bytes.
    fn extract_bytes(&self, params: &ExtractorParams) -> Result<Vec<u8>> {
        Ok(bits_to_bytes(&self.extract(params)?))
    }
}

/// In-process two-stage extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExtractor;

impl LocalExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for LocalExtractor {
    fn extract(&self, params: &ExtractorParams) -> Result<Vec<u8>> {
        params.validate()?;
        let stage1 = two_source_extract(
            &params.ext1_raw_bits,
            &params.ext1_wsr_bits,
            params.ext1_output_num_bits,
        );
        if !params.privacy_amplification() {
            return Ok(stage1);
        }
        Ok(privacy_amplify(
            &stage1,
            &params.ext2_wsr_bits,
            params.ext2_wsr_multiplier,
        ))
    }
}

/// Cyclic-shift two-source extractor: bit `i` is the GF(2) inner product of
/// `x` with `y` rotated left by `i`.
pub fn two_source_extract(x: &[u8], y: &[u8], output_bits: usize) -> Vec<u8> {
    let px = PackedBits::from_bits(x);
    let yy = PackedBits::doubled(y);
    (0..output_bits).map(|i| px.dot_window(&yy, i % y.len().max(1))).collect()
}

/// Privacy amplification with a uniform `seed` of `m` bits and a weak input
/// of `c·m` bits, producing `(c-1)·m` bits.
///
/// The weak input is split into blocks `x_1..x_c`; output block `j` is
/// `x_j XOR (rot(seed, j) ⊛ x_c)` where `⊛` is cyclic convolution over GF(2).
pub fn privacy_amplify(seed: &[u8], weak: &[u8], multiplier: usize) -> Vec<u8> {
    let m = seed.len();
    let Some(total) = multiplier.checked_mul(m) else {
        return Vec::new();
    };
    if m == 0 || multiplier < 2 || weak.len() < total {
        return Vec::new();
    }
    let last = &weak[total - m..total];
    // last_rev[l] = last[-l mod m], so last[(k - l) mod m] = last_rev[(l - k) mod m].
    let last_rev: Vec<u8> = (0..m).map(|l| last[(m - l) % m]).collect();
    let doubled = PackedBits::doubled(&last_rev);

    let mut out = Vec::with_capacity(total - m);
    for j in 0..multiplier - 1 {
        let rotated: Vec<u8> = (0..m).map(|l| seed[(l + j) % m]).collect();
        let packed = PackedBits::from_bits(&rotated);
        let block = &weak[j * m..(j + 1) * m];
        for (k, &xb) in block.iter().enumerate() {
            out.push(xb ^ packed.dot_window(&doubled, (m - k) % m));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsr::{HashWsr, WsrGenerator};

    fn params(n: usize, m: usize, c: usize) -> ExtractorParams {
        let raw = HashWsr::new(b"raw").generate(n).unwrap();
        let wsr = HashWsr::new(b"wsr").generate(n).unwrap();
        let ext2 = if c >= 2 {
            HashWsr::new(b"ext2").generate(c * m).unwrap()
        } else {
            Vec::new()
        };
        ExtractorParams {
            ext1_input_num_bits: n,
            ext1_output_num_bits: m,
            ext1_raw_bits: raw,
            ext1_wsr_bits: wsr,
            ext2_seed_num_bits: if c >= 2 { m } else { 0 },
            ext2_wsr_multiplier: c,
            ext2_wsr_bits: ext2,
            certified_correlator: 3.0,
            min_entropy_rate: 0.5,
        }
    }

    #[test]
    fn test_two_source_matches_definition() {
        let x = vec![1, 0, 1, 1, 0];
        let y = vec![0, 1, 1, 0, 1];
        let out = two_source_extract(&x, &y, 4);
        for (i, &bit) in out.iter().enumerate() {
            let expected = x
                .iter()
                .enumerate()
                .fold(0u8, |acc, (j, &xb)| acc ^ (xb & y[(j + i) % 5]));
            assert_eq!(bit, expected, "bit {i}");
        }
    }

    #[test]
    fn test_privacy_amplify_matches_definition() {
        let m = 5;
        let seed = vec![1, 1, 0, 1, 0];
        let weak = vec![0, 1, 0, 0, 1, 1, 0, 1, 1, 1, 1, 0, 0, 1, 0];
        let out = privacy_amplify(&seed, &weak, 3);
        assert_eq!(out.len(), 10);
        let last = &weak[10..15];
        for j in 0..2 {
            for k in 0..m {
                let mut conv = 0u8;
                for l in 0..m {
                    conv ^= seed[(l + j) % m] & last[(k + m - l) % m];
                }
                assert_eq!(out[j * m + k], weak[j * m + k] ^ conv, "block {j} bit {k}");
            }
        }
    }

    #[test]
    fn test_local_extractor_output_length() {
        let p = params(100, 40, 0);
        let bits = LocalExtractor::new().extract(&p).unwrap();
        assert_eq!(bits.len(), 40);
        assert_eq!(p.output_num_bits(), 40);
        let bytes = LocalExtractor::new().extract_bytes(&p).unwrap();
        assert_eq!(bytes.len(), 5);
    }

    #[test]
    fn test_local_extractor_with_privacy() {
        let p = params(100, 40, 4);
        let bits = LocalExtractor::new().extract(&p).unwrap();
        assert_eq!(bits.len(), 120);
        assert_eq!(p.output_num_bits(), 120);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let p = params(256, 100, 3);
        let a = LocalExtractor::new().extract(&p).unwrap();
        let b = LocalExtractor::new().extract(&p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_rejects_bad_lengths() {
        let mut p = params(100, 40, 0);
        p.ext1_wsr_bits.pop();
        assert!(matches!(
            LocalExtractor::new().extract(&p),
            Err(RngError::InvalidExtractorParams(_))
        ));

        let mut p = params(100, 40, 3);
        p.ext2_wsr_bits.truncate(10);
        assert!(p.validate().is_err());

        let mut p = params(100, 40, 0);
        p.ext1_output_num_bits = 101;
        assert!(p.validate().is_err());

        let mut p = params(100, 40, 0);
        p.ext2_wsr_multiplier = 1;
        assert!(p.validate().is_err());

        let mut p = params(10, 5, 0);
        p.ext1_raw_bits[0] = 2;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_multiplier() {
        let mut p = params(10, 2, 0);
        p.ext2_seed_num_bits = 2;
        p.ext2_wsr_multiplier = 1 << (usize::BITS - 1);
        assert!(matches!(
            LocalExtractor::new().extract(&p),
            Err(RngError::InvalidExtractorParams(_))
        ));
    }

    #[test]
    fn test_privacy_amplify_overflow_yields_nothing() {
        assert!(privacy_amplify(&[1, 0], &[], usize::MAX).is_empty());
    }

    #[test]
    fn test_params_serde() {
        let p = params(30, 10, 2);
        let json = serde_json::to_string(&p).unwrap();
        let back: ExtractorParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_packed_bytes_accessors() {
        let mut p = params(16, 8, 0);
        p.ext1_raw_bits = vec![1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(p.ext1_raw_bytes(), vec![0x03, 0x80]);
        assert_eq!(p.ext1_wsr_bytes().len(), 2);
        let back = crate::bits::unpack_lsb_first(&p.ext1_wsr_bytes(), 16).unwrap();
        assert_eq!(back, p.ext1_wsr_bits);
    }
}
