//! Statistical checks for certified random bits.
//!
//! A small NIST SP 800-22 style battery run over bit sequences (0/1 values,
//! as produced by the extractor). Each test returns a [`TestResult`] with a
//! p-value where one exists, a pass/fail verdict at `alpha = 0.01` and a
//! letter grade.
//!
//! Passing the battery says nothing about certification; it only catches
//! gross failures such as a stuck WSR or a mis-wired extractor.

use flate2::Compression;
use flate2::write::ZlibEncoder;
use rustfft::{FftPlanner, num_complex::Complex};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use statrs::function::erf::erfc;
use std::io::Write;

/// Significance level used for pass/fail.
pub const ALPHA: f64 = 0.01;

/// Result of a single test.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub p_value: Option<f64>,
    pub statistic: f64,
    pub details: String,
    pub grade: char,
}

impl TestResult {
    /// Letter grade for a p-value: A (>= 0.1) down to F (< 1e-4 or none).
    pub fn grade_from_p(p: Option<f64>) -> char {
        match p {
            Some(p) if p >= 0.1 => 'A',
            Some(p) if p >= 0.01 => 'B',
            Some(p) if p >= 0.001 => 'C',
            Some(p) if p >= 0.0001 => 'D',
            _ => 'F',
        }
    }

    fn from_p(name: &str, p: f64, statistic: f64, details: String) -> Self {
        let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            name: name.to_string(),
            passed: p >= ALPHA,
            p_value: Some(p),
            statistic,
            details,
            grade: Self::grade_from_p(Some(p)),
        }
    }

    fn failed(name: &str, details: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            p_value: None,
            statistic: 0.0,
            details,
            grade: 'F',
        }
    }

    fn insufficient(name: &str, needed: usize, got: usize) -> Self {
        Self::failed(name, format!("Insufficient data: need {needed} bits, got {got}"))
    }
}

fn pack(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &b)| acc | ((b & 1) << (7 - i)))
        })
        .collect()
}

fn chi2_sf(df: f64, x: f64) -> f64 {
    ChiSquared::new(df).map_or(0.0, |d| d.sf(x))
}

fn signed(bit: u8) -> i64 {
    if bit == 1 { 1 } else { -1 }
}

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// Proportion of ones should be close to one half.
pub fn monobit_frequency(bits: &[u8]) -> TestResult {
    let name = "Monobit Frequency";
    let n = bits.len();
    if n < 100 {
        return TestResult::insufficient(name, 100, n);
    }
    let s: i64 = bits.iter().map(|&b| signed(b)).sum();
    let s_obs = s.unsigned_abs() as f64 / (n as f64).sqrt();
    let p = erfc(s_obs / std::f64::consts::SQRT_2);
    TestResult::from_p(name, p, s_obs, format!("S={s}, n={n}"))
}

/// Proportion of ones within 128-bit blocks.
pub fn block_frequency(bits: &[u8]) -> TestResult {
    let name = "Block Frequency";
    const M: usize = 128;
    let blocks = bits.len() / M;
    if blocks < 10 {
        return TestResult::insufficient(name, 10 * M, bits.len());
    }
    let chi2: f64 = bits
        .chunks_exact(M)
        .map(|block| {
            let pi = block.iter().map(|&b| f64::from(b)).sum::<f64>() / M as f64;
            (pi - 0.5).powi(2)
        })
        .sum::<f64>()
        * 4.0
        * M as f64;
    let p = chi2_sf(blocks as f64, chi2);
    TestResult::from_p(name, p, chi2, format!("blocks={blocks}, M={M}"))
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Number of uninterrupted runs of identical bits.
pub fn runs_test(bits: &[u8]) -> TestResult {
    let name = "Runs";
    let n = bits.len();
    if n < 100 {
        return TestResult::insufficient(name, 100, n);
    }
    let nf = n as f64;
    let pi = bits.iter().map(|&b| f64::from(b)).sum::<f64>() / nf;
    if (pi - 0.5).abs() >= 2.0 / nf.sqrt() {
        return TestResult {
            p_value: Some(0.0),
            ..TestResult::failed(name, format!("Frequency pre-test failed: pi={pi:.4}"))
        };
    }
    let runs = 1 + bits.windows(2).filter(|w| w[0] != w[1]).count();
    let num = (runs as f64 - 2.0 * nf * pi * (1.0 - pi)).abs();
    let den = 2.0 * (2.0 * nf).sqrt() * pi * (1.0 - pi);
    let p = erfc(num / den);
    TestResult::from_p(name, p, runs as f64, format!("runs={runs}, n={n}"))
}

/// Longest run of ones within 8-bit blocks.
pub fn longest_run_of_ones(bits: &[u8]) -> TestResult {
    let name = "Longest Run of Ones";
    const M: usize = 8;
    // Bins: <=1, 2, 3, >=4.
    const PROBS: [f64; 4] = [0.2148, 0.3672, 0.2305, 0.1875];
    if bits.len() < 128 {
        return TestResult::insufficient(name, 128, bits.len());
    }
    let mut observed = [0u64; 4];
    for block in bits.chunks_exact(M) {
        let (longest, _) = block.iter().fold((0usize, 0usize), |(best, cur), &b| {
            let cur = if b == 1 { cur + 1 } else { 0 };
            (best.max(cur), cur)
        });
        observed[longest.saturating_sub(1).min(3)] += 1;
    }
    let blocks = (bits.len() / M) as f64;
    let chi2: f64 = observed
        .iter()
        .zip(PROBS)
        .map(|(&o, p)| (o as f64 - blocks * p).powi(2) / (blocks * p))
        .sum();
    let p = chi2_sf(3.0, chi2);
    TestResult::from_p(name, p, chi2, format!("bins={observed:?}"))
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// Frequencies of overlapping 2- and 3-bit patterns.
pub fn approximate_entropy(bits: &[u8]) -> TestResult {
    let name = "Approximate Entropy";
    const M: usize = 2;
    let bits = &bits[..bits.len().min(1 << 20)];
    let n = bits.len();
    if n < 100 {
        return TestResult::insufficient(name, 100, n);
    }
    let phi = |m: usize| -> f64 {
        let mut counts = vec![0u64; 1 << m];
        for i in 0..n {
            let idx = (0..m).fold(0usize, |acc, j| (acc << 1) | usize::from(bits[(i + j) % n]));
            counts[idx] += 1;
        }
        counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let f = c as f64 / n as f64;
                f * f.ln()
            })
            .sum()
    };
    let apen = phi(M) - phi(M + 1);
    let chi2 = 2.0 * n as f64 * (std::f64::consts::LN_2 - apen);
    let p = chi2_sf((1u64 << M) as f64, chi2);
    TestResult::from_p(name, p, chi2, format!("ApEn={apen:.6}, m={M}"))
}

// ---------------------------------------------------------------------------
// Spectral
// ---------------------------------------------------------------------------

/// Periodic structure visible as peaks in the DFT of the +/-1 sequence.
pub fn dft_spectral(bits: &[u8]) -> TestResult {
    let name = "DFT Spectral";
    let bits = &bits[..bits.len().min(1 << 20)];
    let n = bits.len();
    if n < 1000 {
        return TestResult::insufficient(name, 1000, n);
    }
    let mut buffer: Vec<Complex<f64>> = bits
        .iter()
        .map(|&b| Complex::new(signed(b) as f64, 0.0))
        .collect();
    FftPlanner::new().plan_fft_forward(n).process(&mut buffer);

    let nf = n as f64;
    let threshold = ((1.0f64 / 0.05).ln() * nf).sqrt();
    let expected = 0.95 * nf / 2.0;
    let below = buffer[..n / 2].iter().filter(|c| c.norm() < threshold).count() as f64;
    let d = (below - expected) / (nf * 0.95 * 0.05 / 4.0).sqrt();
    let p = erfc(d.abs() / std::f64::consts::SQRT_2);
    TestResult::from_p(name, p, d, format!("below_threshold={below}/{}", n / 2))
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

/// Maximum excursion of the forward cumulative sum.
pub fn cusum_test(bits: &[u8]) -> TestResult {
    let name = "Cumulative Sums";
    let n = bits.len();
    if n < 100 {
        return TestResult::insufficient(name, 100, n);
    }
    let z = bits
        .iter()
        .scan(0i64, |s, &b| {
            *s += signed(b);
            Some(s.unsigned_abs())
        })
        .max()
        .unwrap_or(0) as f64;
    if z == 0.0 {
        return TestResult::from_p(name, 1.0, 0.0, format!("max|S|=0, n={n}"));
    }
    let nf = n as f64;
    let sqrt_n = nf.sqrt();
    let norm = Normal::standard();
    let phi = |x: f64| norm.cdf(x);
    let term = |lo: f64, hi: f64, a: f64, b: f64| -> f64 {
        let mut sum = 0.0;
        let mut k = lo.floor() as i64;
        while (k as f64) <= hi {
            let kf = k as f64;
            sum += phi((4.0 * kf + a) * z / sqrt_n) - phi((4.0 * kf + b) * z / sqrt_n);
            k += 1;
        }
        sum
    };
    let first = term((-nf / z + 1.0) / 4.0, (nf / z - 1.0) / 4.0, 1.0, -1.0);
    let second = term((-nf / z - 3.0) / 4.0, (nf / z - 1.0) / 4.0, 3.0, 1.0);
    let p = 1.0 - first + second;
    TestResult::from_p(name, p, z, format!("max|S|={z}, n={n}"))
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// zlib output size over input size of the packed bytes; random data does not
/// compress.
pub fn compression_ratio(bits: &[u8]) -> TestResult {
    let name = "Compression Ratio";
    let bytes = pack(bits);
    if bytes.len() < 64 {
        return TestResult::insufficient(name, 64 * 8, bits.len());
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    let compressed = match encoder.write_all(&bytes).and_then(|()| encoder.finish()) {
        Ok(c) => c,
        Err(e) => return TestResult::failed(name, format!("zlib failed: {e}")),
    };
    let ratio = compressed.len() as f64 / bytes.len() as f64;
    let grade = match ratio {
        r if r > 0.95 => 'A',
        r if r > 0.85 => 'B',
        r if r > 0.7 => 'C',
        r if r > 0.5 => 'D',
        _ => 'F',
    };
    TestResult {
        name: name.to_string(),
        passed: ratio > 0.85,
        p_value: None,
        statistic: ratio,
        details: format!("{}/{} = {ratio:.4}", compressed.len(), bytes.len()),
        grade,
    }
}

// ---------------------------------------------------------------------------
// Battery
// ---------------------------------------------------------------------------

/// Run every test on `bits`.
pub fn run_all_tests(bits: &[u8]) -> Vec<TestResult> {
    let tests: [fn(&[u8]) -> TestResult; 8] = [
        monobit_frequency,
        block_frequency,
        runs_test,
        longest_run_of_ones,
        approximate_entropy,
        dft_spectral,
        cusum_test,
        compression_ratio,
    ];
    tests.iter().map(|test| test(bits)).collect()
}

/// Mean grade score (A=100, B=75, C=50, D=25, F=0).
pub fn calculate_quality_score(results: &[TestResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: f64 = results
        .iter()
        .map(|r| match r.grade {
            'A' => 100.0,
            'B' => 75.0,
            'C' => 50.0,
            'D' => 25.0,
            _ => 0.0,
        })
        .sum();
    total / results.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn pseudo_random_bits(n: usize) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(0x9E37_79B9_7F4A_7C15);
        (0..n).map(|_| u8::from(rng.random::<bool>())).collect()
    }

    #[test]
    fn test_pack_msb_first() {
        assert_eq!(pack(&[1, 0, 1, 1, 0, 0, 0, 1, 1]), vec![0b1011_0001, 0b1000_0000]);
    }

    #[test]
    fn test_grade_from_p() {
        assert_eq!(TestResult::grade_from_p(Some(0.5)), 'A');
        assert_eq!(TestResult::grade_from_p(Some(0.05)), 'B');
        assert_eq!(TestResult::grade_from_p(Some(0.005)), 'C');
        assert_eq!(TestResult::grade_from_p(Some(0.0005)), 'D');
        assert_eq!(TestResult::grade_from_p(Some(1e-8)), 'F');
        assert_eq!(TestResult::grade_from_p(None), 'F');
    }

    #[test]
    fn test_insufficient_data() {
        let r = monobit_frequency(&[1, 0, 1]);
        assert!(!r.passed);
        assert!(r.details.contains("Insufficient"));
    }

    #[test]
    fn test_monobit_nist_example() {
        // SP 800-22 section 2.1.8 prefix (S = 2) padded to 100 bits with a
        // balanced tail.
        let mut bits = vec![1, 0, 1, 1, 0, 1, 0, 1, 0, 1];
        bits.extend([0, 1].iter().cycle().take(90));
        let r = monobit_frequency(&bits);
        let expected = erfc(2.0 / 10.0 / std::f64::consts::SQRT_2);
        assert!((r.p_value.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_constant_bits_fail() {
        let bits = vec![1u8; 20_000];
        let results = run_all_tests(&bits);
        let passed = results.iter().filter(|r| r.passed).count();
        assert!(passed < results.len() / 2, "{passed} passed");
    }

    #[test]
    fn test_alternating_bits_fail_runs() {
        let bits: Vec<u8> = [0u8, 1].iter().copied().cycle().take(10_000).collect();
        assert!(!runs_test(&bits).passed);
        assert!(!compression_ratio(&bits).passed);
    }

    #[test]
    fn test_pseudo_random_passes() {
        let bits = pseudo_random_bits(100_000);
        let results = run_all_tests(&bits);
        assert_eq!(results.len(), 8);
        let passed = results.iter().filter(|r| r.passed).count();
        assert!(passed >= 6, "only {passed}/8 passed: {results:#?}");
        assert!(calculate_quality_score(&results) > 50.0);
    }

    #[test]
    fn test_longest_run_bins() {
        // Every block is 11110000: longest run 4 lands in the last bin.
        let bits: Vec<u8> = [1u8, 1, 1, 1, 0, 0, 0, 0].iter().copied().cycle().take(1024).collect();
        let r = longest_run_of_ones(&bits);
        assert!(r.details.contains("[0, 0, 0, 128]"));
        assert!(!r.passed);
    }

    #[test]
    fn test_quality_score() {
        let a = TestResult::from_p("a", 0.5, 0.0, String::new());
        let f = TestResult::from_p("f", 0.0, 0.0, String::new());
        assert!((calculate_quality_score(&[a, f]) - 50.0).abs() < 1e-9);
        assert_eq!(calculate_quality_score(&[]), 0.0);
    }
}
