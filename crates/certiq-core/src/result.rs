//! Results of a Mermin sampling run and the extractor parameters they certify.

use serde::Serialize;

use crate::bounds::{self, CLASSICAL_BOUND};
use crate::circuit::Label;
use crate::config::ExtractorConfig;
use crate::constants;
use crate::error::{Result, RngError};
use crate::extractor::ExtractorParams;
use crate::wsr::WsrGenerator;

/// Outcome of a sampling run, one entry per shot.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratorResult {
    pub backend_name: String,
    /// WSR triple that selected the circuit of each shot.
    pub wsr: Vec<Label>,
    /// Measured triple of each shot, indexed by qubit.
    pub raw_bits_list: Vec<Label>,
    /// Every measured bit, shot by shot.
    pub raw_bits: Vec<u8>,
    pub losing_probability: f64,
    pub winning_probability: f64,
    pub mermin_correlator: f64,
}

impl GeneratorResult {
    /// Score the run. `wsr` and `raw_bits_list` must be aligned shot by shot.
    pub fn new(
        backend_name: impl Into<String>,
        wsr: Vec<Label>,
        raw_bits_list: Vec<Label>,
    ) -> Result<Self> {
        let (losing_probability, winning_probability, mermin_correlator) =
            bell_value(&wsr, &raw_bits_list)?;
        let raw_bits = raw_bits_list.iter().flatten().copied().collect();
        Ok(Self {
            backend_name: backend_name.into(),
            wsr,
            raw_bits_list,
            raw_bits,
            losing_probability,
            winning_probability,
            mermin_correlator,
        })
    }

    pub fn num_shots(&self) -> usize {
        self.raw_bits_list.len()
    }

    /// Extractor input: the first two bits of every shot.
    ///
    /// The third bit is fixed by the first two through the GHZ parity, so it
    /// carries no extra entropy.
    pub fn extractor_bits(&self) -> Vec<u8> {
        self.raw_bits_list
            .iter()
            .flat_map(|triple| [triple[0], triple[1]])
            .collect()
    }

    /// Derive extractor parameters, drawing fresh WSR bits from `wsr`.
    pub fn extractor_params(
        &self,
        config: &ExtractorConfig,
        wsr: &dyn WsrGenerator,
    ) -> Result<ExtractorParams> {
        config.validate()?;
        let correlator = self.certified_correlator(config)?;
        if correlator <= CLASSICAL_BOUND {
            return Err(RngError::InsufficientRandomness(format!(
                "correlator {correlator:.4} does not exceed the classical bound {CLASSICAL_BOUND}"
            )));
        }

        let extractor_bits = self.extractor_bits();
        let n = bounds::na_set(extractor_bits.len() as u64);
        if n == 0 {
            return Err(RngError::InsufficientRandomness(format!(
                "{} raw bits are too few for the extractor",
                extractor_bits.len()
            )));
        }
        let bt = bounds::losing_probability(correlator);
        let rate_bt = bounds::h_mins(bt, n, config.rate_sv);
        let m = bounds::dodis_output_size(
            n,
            rate_bt,
            config.rate_sv,
            config.epsilon_dodis,
            config.quantum_proof,
        );
        if m <= 0 {
            return Err(RngError::InsufficientRandomness(format!(
                "not enough raw bits: {n} extractor input bits at min-entropy rate \
                 {rate_bt:.4} yield no output"
            )));
        }
        let n = n as usize;
        let m = (m as usize).min(n);
        log::debug!("stage 1: n={n} m={m} rate_bt={rate_bt:.6} correlator={correlator}");

        let ext1_raw_bits = extractor_bits[..n].to_vec();
        let ext1_wsr_bits = draw(wsr, n)?;

        let (ext2_seed_num_bits, ext2_wsr_multiplier, ext2_wsr_bits) =
            if config.privacy_amplification {
                let (c, eps) =
                    bounds::choose_hayashi_parameters(m as u64, config.rate_sv, config.epsilon_privacy)?;
                let c = c as usize;
                log::debug!("stage 2: c={c} epsilon={eps:e}");
                let num_bits = c.checked_mul(m).ok_or_else(|| {
                    RngError::InvalidExtractorParams(format!(
                        "stage 2 WSR size overflows: multiplier {c} x {m} bits"
                    ))
                })?;
                (m, c, draw(wsr, num_bits)?)
            } else {
                (0, 0, Vec::new())
            };

        Ok(ExtractorParams {
            ext1_input_num_bits: n,
            ext1_output_num_bits: m,
            ext1_raw_bits,
            ext1_wsr_bits,
            ext2_seed_num_bits,
            ext2_wsr_multiplier,
            ext2_wsr_bits,
            certified_correlator: correlator,
            min_entropy_rate: rate_bt,
        })
    }

    fn certified_correlator(&self, config: &ExtractorConfig) -> Result<f64> {
        let measured = self.mermin_correlator;
        if config.trusted_backend {
            let expected = config
                .expected_correlator
                .or_else(|| constants::expected_correlator(&self.backend_name))
                .ok_or_else(|| {
                    RngError::invalid_argument(format!(
                        "no expected correlator for backend '{}'; set expected_correlator \
                         or disable trusted_backend",
                        self.backend_name
                    ))
                })?;
            warn_if_below(measured, expected);
            Ok(expected)
        } else {
            if let Some(expected) = config.expected_correlator {
                warn_if_below(measured, expected);
            }
            Ok(measured)
        }
    }
}

fn warn_if_below(measured: f64, expected: f64) {
    if measured < expected {
        log::warn!(
            "Measured correlator {measured:.4} is below the expected {expected:.4}; \
             the raw bits may be less random than certified"
        );
    }
}

fn draw(wsr: &dyn WsrGenerator, num_bits: usize) -> Result<Vec<u8>> {
    let bits = wsr.generate(num_bits)?;
    if bits.len() != num_bits || !crate::bits::is_bit_string(&bits) {
        return Err(RngError::invalid_argument(format!(
            "WSR generator returned {} values for a request of {num_bits} bits",
            bits.len()
        )));
    }
    Ok(bits)
}

/// Mermin game score: `(losing, winning, correlator)`.
///
/// A round with an odd number of 1s in its WSR triple is lost on odd output
/// parity when the triple sums to 1 and on even parity when it sums to 3.
pub fn bell_value(wsr: &[Label], raw_bits: &[Label]) -> Result<(f64, f64, f64)> {
    if wsr.len() != raw_bits.len() {
        return Err(RngError::invalid_argument(format!(
            "WSR has {} rounds but raw bits have {}",
            wsr.len(),
            raw_bits.len()
        )));
    }
    if wsr.is_empty() {
        return Err(RngError::invalid_argument("no rounds to score"));
    }
    let lost = wsr
        .iter()
        .zip(raw_bits)
        .filter(|(w, r)| {
            let label_sum: u8 = w.iter().sum();
            let parity = r.iter().sum::<u8>() % 2;
            (label_sum == 1 && parity == 1) || (label_sum == 3 && parity == 0)
        })
        .count();
    let losing = lost as f64 / wsr.len() as f64;
    Ok((losing, 1.0 - losing, 4.0 - 16.0 * losing))
}
