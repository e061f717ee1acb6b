//! Sample, certify and extract in one call.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{ExtractorConfig, PipelineConfig};
use crate::constants;
use crate::error::{Result, RngError};
use crate::extractor::{Extractor, ExtractorParams, LocalExtractor};
use crate::generator::Generator;
use crate::result::GeneratorResult;

/// Raw-bit requests stop doubling past this size.
const MAX_RAW_BITS: usize = 1 << 24;
const MAX_ROUNDS: usize = 64;

/// One sampling run and what was extracted from it.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub result: GeneratorResult,
    pub params: ExtractorParams,
    /// Extracted bits, 0/1 values.
    pub bits: Vec<u8>,
}

/// A generator paired with an extractor.
#[derive(Clone)]
pub struct Pipeline {
    generator: Generator,
    extractor: Arc<dyn Extractor>,
    extractor_config: ExtractorConfig,
    num_raw_bits: usize,
}

impl Pipeline {
    pub fn new(
        generator: Generator,
        extractor: Arc<dyn Extractor>,
        extractor_config: ExtractorConfig,
        num_raw_bits: usize,
    ) -> Self {
        Self {
            generator,
            extractor,
            extractor_config,
            num_raw_bits,
        }
    }

    /// Build a simulator-backed pipeline with the local extractor.
    ///
    /// A trusted simulator with no profiled correlator is certified against
    /// the correlator of its own noise model.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.extractor.validate()?;
        let mut backend = config.backend.build()?;
        if config.generator.save_local {
            backend = backend.with_job_store(&config.generator.checkpoint_dir);
        }
        let mut extractor_config = config.extractor.clone();
        if extractor_config.trusted_backend
            && extractor_config.expected_correlator.is_none()
            && constants::expected_correlator(&config.backend.name).is_none()
        {
            extractor_config.expected_correlator = Some(backend.noise().expected_correlator());
        }

        let mut generator =
            Generator::new(Arc::new(backend)).with_shared_wsr(config.generator.wsr_generator());
        if config.generator.save_local {
            generator = generator.with_checkpoint_dir(&config.generator.checkpoint_dir);
        }
        Ok(Self::new(
            generator,
            Arc::new(LocalExtractor::new()),
            extractor_config,
            config.generator.num_raw_bits,
        ))
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn extractor_config(&self) -> &ExtractorConfig {
        &self.extractor_config
    }

    pub fn num_raw_bits(&self) -> usize {
        self.num_raw_bits
    }

    pub fn backend_name(&self) -> &str {
        self.generator.backend().name()
    }

    /// Sample `num_raw_bits` and wait for the result.
    pub fn sample(&self, num_raw_bits: usize) -> Result<GeneratorResult> {
        self.generator.sample(num_raw_bits)?.block_until_ready()
    }

    /// Extractor parameters for `result`, with WSR from this pipeline.
    pub fn params(&self, result: &GeneratorResult) -> Result<ExtractorParams> {
        result.extractor_params(
            &self.extractor_config,
            self.generator.wsr_generator().as_ref(),
        )
    }

    pub fn extract(&self, params: &ExtractorParams) -> Result<Vec<u8>> {
        self.extractor.extract(params)
    }

    /// Sample, derive parameters and extract.
    pub fn run(&self, num_raw_bits: usize) -> Result<PipelineOutput> {
        let result = self.sample(num_raw_bits)?;
        let params = self.params(&result)?;
        let bits = self.extract(&params)?;
        log::info!(
            "Extracted {} bits from {} raw bits (correlator {:.4})",
            bits.len(),
            result.raw_bits.len(),
            result.mermin_correlator
        );
        Ok(PipelineOutput {
            result,
            params,
            bits,
        })
    }

    /// Collect exactly `num_bits` extracted bits.
    ///
    /// Runs repeat until enough bits are collected. A run that certifies no
    /// randomness is retried with twice the raw bits.
    pub fn random_bits(&self, num_bits: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(num_bits);
        let mut raw = self.num_raw_bits.max(1);
        for _ in 0..MAX_ROUNDS {
            if out.len() >= num_bits {
                break;
            }
            match self.run(raw) {
                Ok(output) => out.extend(output.bits),
                Err(RngError::InsufficientRandomness(msg)) if raw < MAX_RAW_BITS => {
                    log::debug!("{msg}; retrying with {} raw bits", raw * 2);
                    raw *= 2;
                }
                Err(e) => return Err(e),
            }
        }
        if out.len() < num_bits {
            return Err(RngError::InsufficientRandomness(format!(
                "collected {} of {num_bits} bits after {MAX_ROUNDS} runs",
                out.len()
            )));
        }
        out.truncate(num_bits);
        Ok(out)
    }
}
