//! Pipeline configuration.
//!
//! All sections deserialize with defaults, so a config file only needs the
//! fields it changes:
//!
//! ```json
//! {
//!   "backend": { "name": "ibmq_valencia", "seed": 7 },
//!   "generator": { "num_raw_bits": 30000 },
//!   "extractor": { "privacy_amplification": true }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::{NoiseModel, SimulatorBackend};
use crate::error::{Result, RngError};
use crate::wsr::{HashWsr, OsWsr, SharedWsr};

/// Options for deriving extractor parameters from a sampling result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Assumed randomness rate of the WSR as a Santha-Vazirani source, in `(0, 1]`.
    pub rate_sv: f64,
    /// Correlator to certify against; falls back to the backend profile.
    pub expected_correlator: Option<f64>,
    /// Distance to uniform of the stage 1 output.
    pub epsilon_dodis: f64,
    /// Distance to uniform of the stage 2 output.
    pub epsilon_privacy: f64,
    /// Size the stage 1 output for quantum-proof security.
    pub quantum_proof: bool,
    /// Trust the backend to perform as profiled. When false the measured
    /// correlator is certified instead.
    pub trusted_backend: bool,
    /// Run stage 2 (privacy amplification).
    pub privacy_amplification: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            rate_sv: 0.95,
            expected_correlator: None,
            epsilon_dodis: 2f64.powi(-100),
            epsilon_privacy: 2f64.powi(-100),
            quantum_proof: false,
            trusted_backend: true,
            privacy_amplification: false,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.rate_sv > 0.0 && self.rate_sv <= 1.0) {
            return Err(RngError::invalid_argument(format!(
                "rate_sv must be in (0, 1], got {}",
                self.rate_sv
            )));
        }
        if self.privacy_amplification && self.rate_sv >= 1.0 {
            return Err(RngError::invalid_argument(
                "privacy_amplification needs rate_sv below 1",
            ));
        }
        for (name, eps) in [
            ("epsilon_dodis", self.epsilon_dodis),
            ("epsilon_privacy", self.epsilon_privacy),
        ] {
            if !(eps > 0.0 && eps < 1.0) {
                return Err(RngError::invalid_argument(format!(
                    "{name} must be in (0, 1), got {eps}"
                )));
            }
        }
        if let Some(c) = self.expected_correlator {
            if !(c > 0.0 && c <= 4.0) {
                return Err(RngError::invalid_argument(format!(
                    "expected_correlator must be in (0, 4], got {c}"
                )));
            }
        }
        Ok(())
    }
}

/// Sampling options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Raw bits requested per sampling run.
    pub num_raw_bits: usize,
    /// Seed for a deterministic WSR. `None` reads the OS CSPRNG.
    pub wsr_seed: Option<String>,
    /// Write a checkpoint for every sampling run.
    pub save_local: bool,
    /// Directory for checkpoint files.
    pub checkpoint_dir: PathBuf,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            num_raw_bits: 12_000,
            wsr_seed: None,
            save_local: false,
            checkpoint_dir: PathBuf::from("."),
        }
    }
}

impl GeneratorConfig {
    /// WSR generator selected by this config.
    pub fn wsr_generator(&self) -> SharedWsr {
        match &self.wsr_seed {
            Some(seed) => std::sync::Arc::new(HashWsr::new(seed.as_bytes())),
            None => std::sync::Arc::new(OsWsr),
        }
    }
}

/// Which backend to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSelection {
    /// Device profile name, or `statevector_simulator`.
    pub name: String,
    /// Override the readout error of the selected backend.
    pub readout_error: Option<f64>,
    /// Sampling seed.
    pub seed: Option<u64>,
    /// Override the per-circuit shot limit.
    pub max_shots: Option<usize>,
    /// Override the per-job circuit limit.
    pub max_experiments: Option<usize>,
}

impl Default for BackendSelection {
    fn default() -> Self {
        Self {
            name: "statevector_simulator".to_string(),
            readout_error: None,
            seed: None,
            max_shots: None,
            max_experiments: None,
        }
    }
}

impl BackendSelection {
    /// Build the simulator backend this selection describes.
    pub fn build(&self) -> Result<SimulatorBackend> {
        let mut backend = if self.name == "statevector_simulator" {
            SimulatorBackend::new()
        } else {
            SimulatorBackend::profile(&self.name).ok_or_else(|| {
                RngError::invalid_argument(format!(
                    "unknown backend '{}' (available: statevector_simulator, {})",
                    self.name,
                    crate::backend::simulator::profile_names().join(", ")
                ))
            })?
        };
        if let Some(p) = self.readout_error {
            if !(0.0..=0.5).contains(&p) {
                return Err(RngError::invalid_argument(format!(
                    "readout_error must be in [0, 0.5], got {p}"
                )));
            }
            backend = backend.with_noise(NoiseModel::readout(p));
        }
        if let Some(seed) = self.seed {
            backend = backend.with_seed(seed);
        }
        if self.max_shots.is_some() || self.max_experiments.is_some() {
            let cfg = crate::backend::Backend::configuration(&backend).clone();
            backend = backend.with_limits(
                self.max_shots.unwrap_or(cfg.max_shots),
                self.max_experiments.unwrap_or(cfg.max_experiments),
            );
        }
        Ok(backend)
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub backend: BackendSelection,
    pub generator: GeneratorConfig,
    pub extractor: ExtractorConfig,
}

impl PipelineConfig {
    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.extractor.validate()?;
        Ok(config)
    }
}
