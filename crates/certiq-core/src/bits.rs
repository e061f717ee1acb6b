//! Bit-vector helpers.
//!
//! Bits travel through the pipeline as `Vec<u8>` holding 0/1 values. Output
//! packing is MSB-first with the final byte zero-padded. Extractor inputs
//! exchanged as bytes use the LSB-first layout of [`pack_lsb_first`].

use crate::error::{Result, RngError};

/// Pack 0/1 values into bytes, MSB first.
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bits.len().div_ceil(8));
    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            byte |= (bit & 1) << (7 - i);
        }
        out.push(byte);
    }
    out
}

/// Unpack bytes into 0/1 values, MSB first.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1);
        }
    }
    bits
}

/// Pack 0/1 values into bytes, bit `i` at position `i % 8` of byte `i / 8`.
pub fn pack_lsb_first(bits: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        out[i >> 3] |= (bit & 1) << (i & 7);
    }
    out
}

/// Inverse of [`pack_lsb_first`]: the first `num_bits` bits of `bytes`.
pub fn unpack_lsb_first(bytes: &[u8], num_bits: usize) -> Result<Vec<u8>> {
    if bytes.len() < num_bits.div_ceil(8) {
        return Err(RngError::invalid_argument(format!(
            "{} bytes cannot hold {num_bits} bits",
            bytes.len()
        )));
    }
    Ok((0..num_bits).map(|i| (bytes[i >> 3] >> (i & 7)) & 1).collect())
}

/// True when every element is 0 or 1.
pub fn is_bit_string(bits: &[u8]) -> bool {
    bits.iter().all(|&b| b <= 1)
}

/// Render bits as a `0`/`1` string.
pub fn bits_to_string(bits: &[u8]) -> String {
    bits.iter().map(|&b| if b == 1 { '1' } else { '0' }).collect()
}

/// Lowercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Bits packed into `u64` words, LSB-first within each word.
///
/// Used by the extractor for word-at-a-time GF(2) inner products over
/// cyclically rotated windows.
#[derive(Debug, Clone)]
pub(crate) struct PackedBits {
    words: Vec<u64>,
    len: usize,
}

impl PackedBits {
    pub(crate) fn from_bits(bits: &[u8]) -> Self {
        let mut words = vec![0u64; bits.len().div_ceil(64)];
        for (i, &b) in bits.iter().enumerate() {
            if b & 1 == 1 {
                words[i / 64] |= 1u64 << (i % 64);
            }
        }
        Self {
            words,
            len: bits.len(),
        }
    }

    /// The sequence concatenated with itself, plus one spare word so unaligned
    /// windows never read past the end.
    pub(crate) fn doubled(bits: &[u8]) -> Self {
        let mut twice = Vec::with_capacity(bits.len() * 2 + 64);
        twice.extend_from_slice(bits);
        twice.extend_from_slice(bits);
        twice.extend(std::iter::repeat_n(0u8, 64));
        Self::from_bits(&twice)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// 64 bits starting at bit `offset`.
    fn word_at(&self, offset: usize) -> u64 {
        let q = offset / 64;
        let r = offset % 64;
        let lo = self.words.get(q).copied().unwrap_or(0);
        if r == 0 {
            lo
        } else {
            let hi = self.words.get(q + 1).copied().unwrap_or(0);
            (lo >> r) | (hi << (64 - r))
        }
    }

    /// Parity of `self AND other[offset..offset + self.len]`.
    pub(crate) fn dot_window(&self, other: &PackedBits, offset: usize) -> u8 {
        let mut acc = 0u64;
        let full = self.len / 64;
        for w in 0..full {
            acc ^= self.words[w] & other.word_at(offset + 64 * w);
        }
        let rem = self.len % 64;
        if rem > 0 {
            let mask = (1u64 << rem) - 1;
            acc ^= self.words[full] & other.word_at(offset + 64 * full) & mask;
        }
        (acc.count_ones() & 1) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_to_bytes_pads_final_byte() {
        assert_eq!(bits_to_bytes(&[1, 0, 1]), vec![0b1010_0000]);
        assert_eq!(bits_to_bytes(&[1; 9]), vec![0xff, 0x80]);
        assert!(bits_to_bytes(&[]).is_empty());
    }

    #[test]
    fn test_bytes_to_bits_msb_first() {
        assert_eq!(bytes_to_bits(&[0x81]), vec![1, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_lsb_first_known_vector() {
        let bits = [1, 0, 0, 0, 0, 0, 0, 0, 1, 1];
        assert_eq!(pack_lsb_first(&bits), vec![0x01, 0x03]);
        assert_eq!(pack_lsb_first(&[0, 0, 0, 0, 0, 0, 0, 1]), vec![0x80]);
        assert_eq!(unpack_lsb_first(&[0x01, 0x03], 10).unwrap(), bits.to_vec());
        assert_eq!(unpack_lsb_first(&[0xa5], 8).unwrap(), vec![1, 0, 1, 0, 0, 1, 0, 1]);
    }

    #[test]
    fn test_unpack_lsb_first_rejects_short_input() {
        assert!(unpack_lsb_first(&[0xff], 9).is_err());
        assert!(unpack_lsb_first(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_is_bit_string() {
        assert!(is_bit_string(&[0, 1, 1, 0]));
        assert!(!is_bit_string(&[0, 2]));
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0xab, 0x01]), "ab01");
    }

    #[test]
    fn test_dot_window_matches_naive() {
        let x: Vec<u8> = (0..150).map(|i| ((i * 7 + 3) % 5 % 2) as u8).collect();
        let y: Vec<u8> = (0..150).map(|i| ((i * 11 + 1) % 3 % 2) as u8).collect();
        let px = PackedBits::from_bits(&x);
        let py = PackedBits::doubled(&y);
        for shift in [0usize, 1, 63, 64, 65, 149] {
            let naive = x
                .iter()
                .enumerate()
                .fold(0u8, |acc, (j, &xb)| acc ^ (xb & y[(j + shift) % 150]));
            assert_eq!(px.dot_window(&py, shift), naive, "shift {shift}");
        }
    }
}
