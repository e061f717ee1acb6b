//! Entropy bounds and extractor sizing.
//!
//! Converts an observed (or profiled) Mermin violation into a min-entropy
//! rate for the raw bits, and sizes the two extractor stages:
//!
//! - the two-source cyclic-shift extractor needs an input length `n` such
//!   that `n + 1` is prime and 2 is a primitive root modulo `n + 1`
//!   ([`na_set`]);
//! - its output length follows from the min-entropy of both sources
//!   ([`dodis_output_size`]);
//! - optional privacy amplification trades WSR length against security via
//!   the multiplier `c` ([`hayashi_parameters`]).
//!
//! `bt` values below are Mermin *losing* probabilities: `0` for a perfect
//! quantum device, `1/8` at the classical bound.

use crate::error::{Result, RngError};

/// Classical (local hidden variable) bound on the Mermin correlator.
pub const CLASSICAL_BOUND: f64 = 2.0;

/// Quantum maximum of the Mermin correlator.
pub const QUANTUM_BOUND: f64 = 4.0;

/// Losing probability corresponding to a correlator value.
pub fn losing_probability(correlator: f64) -> f64 {
    (QUANTUM_BOUND - correlator) / 16.0
}

/// Trial-division primality test.
pub fn prime_check(num: u64) -> bool {
    if num < 2 {
        return false;
    }
    let mut i = 2u64;
    while i * i <= num {
        if num % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

/// Prime factorisation as `(prime, power)` pairs in ascending order.
///
/// `prime_factors(12) == [(2, 2), (3, 1)]`; `0` and `1` have no factors.
pub fn prime_factors(mut num: u64) -> Vec<(u64, u32)> {
    let mut factors: Vec<(u64, u32)> = Vec::new();
    if num < 2 {
        return factors;
    }
    let mut i = 2u64;
    while i * i <= num {
        while num % i == 0 {
            match factors.last_mut() {
                Some((p, k)) if *p == i => *k += 1,
                _ => factors.push((i, 1)),
            }
            num /= i;
        }
        i += 1;
    }
    if num > 1 {
        factors.push((num, 1));
    }
    factors
}

fn pow_mod(base: u64, mut exp: u64, modulus: u64) -> u64 {
    let m = modulus as u128;
    let mut result: u128 = 1 % m;
    let mut b = base as u128 % m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        b = b * b % m;
        exp >>= 1;
    }
    result as u64
}

/// True if 2 generates the multiplicative group modulo the prime `p`.
fn two_is_primitive_root(p: u64) -> bool {
    let order = p - 1;
    prime_factors(order)
        .iter()
        .all(|&(q, _)| pow_mod(2, order / q, p) != 1)
}

/// Largest even `m <= num_bits` such that `m + 1` is prime and 2 is a
/// primitive root modulo `m + 1`. Returns 0 when no such `m` exists.
pub fn na_set(num_bits: u64) -> u64 {
    let mut m = num_bits - num_bits % 2;
    while m >= 2 {
        if prime_check(m + 1) && two_is_primitive_root(m + 1) {
            return m;
        }
        m -= 2;
    }
    0
}

/// Adjust a Bell value for a biased WSR (and optional finite statistics).
pub fn bt_adjusting(bt_value: f64, epsilon: f64, delta_finite_stat: f64) -> f64 {
    (bt_value + delta_finite_stat) / (8.0 * (0.5 - epsilon).powi(3))
}

/// Probability that an adversary guesses an output pair, given an adjusted
/// Bell value.
pub fn guessing_probability(bt_adjusted: f64) -> f64 {
    if bt_adjusted >= 1.0 / 8.0 {
        1.0
    } else if bt_adjusted >= 1.0 / 16.0 {
        0.5 + 4.0 * bt_adjusted
    } else {
        0.25 + 2.0 * bt_adjusted
            + 3f64.sqrt() * (bt_adjusted - 4.0 * bt_adjusted * bt_adjusted).max(0.0).sqrt()
    }
}

/// Min-entropy rate per raw bit.
///
/// `rate_sv` is the assumed randomness rate of the WSR as a Santha-Vazirani
/// source; its bias `2^-rate_sv - 1/2` weakens the Bell bound.
pub fn h_mins(bt_value: f64, num_bits: u64, rate_sv: f64) -> f64 {
    if num_bits == 0 {
        return 0.0;
    }
    let epsilon_sv = 2f64.powf(-rate_sv) - 0.5;
    let n = num_bits as f64;
    let h_min = -n / 2.0 * guessing_probability(bt_adjusting(bt_value, epsilon_sv, 0.0)).log2();
    h_min / n
}

/// Output length of the two-source extractor. Negative means no output is
/// possible at this security level.
pub fn dodis_output_size(
    num_bits: u64,
    rate_bt: f64,
    rate_sv: f64,
    epsilon_dodis: f64,
    quantum_proof: bool,
) -> i64 {
    let n = num_bits as f64;
    let entropy = n * (rate_bt + rate_sv - 1.0) + 1.0;
    let security = (1.0 / epsilon_dodis).log2();
    let size = if quantum_proof {
        (entropy - 8.0 * security - 8.0 * (3f64.sqrt() / 2.0).log2()) / 5.0
    } else {
        entropy - 2.0 * security
    };
    size.floor() as i64
}

/// Privacy amplification multiplier and its security parameter.
///
/// Returns `(c, epsilon)` with `c = c_max - c_penalty`; fails when `c < 2`.
pub fn hayashi_parameters(
    input_size: u64,
    rate_sv: f64,
    c_max: u64,
    c_penalty: u64,
) -> Result<(u64, f64)> {
    let c = c_max.saturating_sub(c_penalty);
    if c < 2 {
        return Err(RngError::InvalidExtractorParams(
            "invalid parameters for the second extractor".to_string(),
        ));
    }
    let cf = c as f64;
    let epsilon = (cf - 1.0).sqrt() * 2f64.powf(input_size as f64 / 2.0 * (cf * (1.0 - rate_sv) - 1.0));
    Ok((c, epsilon))
}

/// Upper limit on the privacy amplification multiplier.
///
/// Stage 2 draws `c·m` WSR bits, so `c` is kept small enough for that draw
/// to stay in memory.
pub const MAX_HAYASHI_MULTIPLIER: u64 = 1024;

/// Largest multiplier `c` whose exponent `c (1 - rate_sv) - 1` is negative,
/// capped at [`MAX_HAYASHI_MULTIPLIER`].
pub fn hayashi_c_max(rate_sv: f64) -> u64 {
    if rate_sv >= 1.0 {
        return MAX_HAYASHI_MULTIPLIER;
    }
    let gap = 1.0 - rate_sv;
    let mut c = (1.0 / gap).floor().min(MAX_HAYASHI_MULTIPLIER as f64 + 1.0) as u64;
    while c > 0 && c as f64 * gap >= 1.0 - 1e-9 {
        c -= 1;
    }
    c.min(MAX_HAYASHI_MULTIPLIER)
}

/// Choose the largest multiplier meeting `epsilon_target`, i.e. the smallest
/// penalty below [`hayashi_c_max`].
///
/// A WSR with `rate_sv >= 1` is already uniform and gives no finite bound.
pub fn choose_hayashi_parameters(
    input_size: u64,
    rate_sv: f64,
    epsilon_target: f64,
) -> Result<(u64, f64)> {
    if !(rate_sv > 0.0 && rate_sv < 1.0) {
        return Err(RngError::InvalidExtractorParams(format!(
            "privacy amplification needs rate_sv in (0, 1), got {rate_sv}"
        )));
    }
    let c_max = hayashi_c_max(rate_sv);
    let mut penalty = 0;
    while c_max.saturating_sub(penalty) >= 2 {
        let (c, eps) = hayashi_parameters(input_size, rate_sv, c_max, penalty)?;
        if eps <= epsilon_target {
            return Ok((c, eps));
        }
        penalty += 1;
    }
    Err(RngError::InvalidExtractorParams(format!(
        "no privacy amplification multiplier reaches epsilon {epsilon_target:e} \
         with {input_size} seed bits at rate_sv {rate_sv}"
    )))
}
